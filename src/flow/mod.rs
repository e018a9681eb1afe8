pub mod intersection;
pub mod intersection_set;

pub use intersection::Intersection;
pub use intersection_set::IntersectionSet;

/// A lazily computed scalar. Reading a value that was never computed is
/// explicit instead of returning a stale default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Estimate {
    #[default]
    Uncomputed,
    Computed(f64),
}

impl Estimate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Estimate::Uncomputed => None,
            Estimate::Computed(v) => Some(*v),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Estimate::Computed(_))
    }
}
