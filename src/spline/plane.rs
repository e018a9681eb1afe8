use nalgebra::{Matrix4, Point3, Vector3};

/// Plane `a*x + b*y + c*z + d = distance`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane3D {
    coeffs: [f64; 4],
}

impl Plane3D {
    pub fn from_coefficients(coeffs: [f64; 4]) -> Self {
        Self { coeffs }
    }

    /// Plane through the pose origin with the pose's third column as normal.
    pub fn from_pose(pose: &Matrix4<f64>) -> Self {
        let mut coeffs = [0.0; 4];
        for i in 0..3 {
            coeffs[i] = pose[(i, 2)];
        }
        coeffs[3] = -(0..3).map(|i| coeffs[i] * pose[(i, 3)]).sum::<f64>();
        Self { coeffs }
    }

    pub fn coefficient(&self, i: usize) -> f64 {
        self.coeffs[i]
    }

    pub fn set_coefficient(&mut self, i: usize, c: f64) {
        self.coeffs[i] = c;
    }

    pub fn normal(&self) -> Vector3<f64> {
        Vector3::new(self.coeffs[0], self.coeffs[1], self.coeffs[2])
    }

    /// Signed distance, scaled by the normal's length.
    pub fn distance(&self, pt: &Point3<f64>) -> f64 {
        self.normal().dot(&pt.coords) + self.coeffs[3]
    }

    /// Moves `pt` along the normal onto the plane.
    pub fn project_onto(&self, pt: &Point3<f64>) -> Point3<f64> {
        let normal = self.normal();
        pt - normal * (self.distance(pt) / normal.norm_squared())
    }
}

#[cfg(test)]
mod plane_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_pose_contains_origin() {
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = 2.0;
        pose[(1, 3)] = -1.0;
        pose[(2, 3)] = 5.0;
        let plane = Plane3D::from_pose(&pose);
        assert_relative_eq!(plane.distance(&Point3::new(2.0, -1.0, 5.0)), 0.0);
        assert_relative_eq!(plane.distance(&Point3::new(0.0, 0.0, 7.0)), 2.0);
        assert_relative_eq!(plane.distance(&Point3::new(9.0, 9.0, 4.0)), -1.0);
        assert_relative_eq!(plane.coefficient(3), -5.0);
    }

    #[test]
    fn test_project_onto_tilted_plane() {
        // x + y = 2, normal not unit length
        let plane = Plane3D::from_coefficients([1.0, 1.0, 0.0, -2.0]);
        let projected = plane.project_onto(&Point3::new(3.0, 3.0, 1.0));
        assert_relative_eq!(plane.distance(&projected), 0.0, epsilon = 1e-12);
        assert_relative_eq!(projected.z, 1.0);
        assert_relative_eq!(projected.x, projected.y, epsilon = 1e-12);
    }

    #[test]
    fn test_set_coefficient() {
        let mut plane = Plane3D::default();
        plane.set_coefficient(2, 1.0);
        plane.set_coefficient(3, -0.5);
        assert_relative_eq!(plane.distance(&Point3::new(0.0, 0.0, 1.0)), 0.5);
    }
}
