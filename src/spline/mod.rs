pub mod curve;
pub mod fitter;
pub mod plane;

pub use curve::Curve3D;
pub use fitter::QuadraticSplineFitter;
pub use plane::Plane3D;
