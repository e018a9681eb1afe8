use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{AngleCorrectionError, Result};
use crate::spline::plane::Plane3D;

/// One 2D Doppler velocity frame positioned in world space.
///
/// `pose` maps image space to world space: columns 0 and 1 are the image x/y
/// axes, column 2 is the plane normal and column 3 the image origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pixels: Vec<f64>,
    width: usize,
    height: usize,
    spacing: (f64, f64),
    pose: Matrix4<f64>,
    idx: usize,
}

impl FrameSample {
    pub fn new(
        pixels: Vec<f64>,
        width: usize,
        height: usize,
        spacing: (f64, f64),
        pose: Matrix4<f64>,
        idx: usize,
    ) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(AngleCorrectionError::InvalidParameter {
                name: "pixels",
                reason: format!(
                    "buffer holds {} samples, expected {}x{}",
                    pixels.len(),
                    width,
                    height
                ),
            });
        }
        if !(spacing.0 > 0.0 && spacing.1 > 0.0) {
            return Err(AngleCorrectionError::InvalidParameter {
                name: "spacing",
                reason: format!("pixel spacing must be positive, got {:?}", spacing),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            spacing,
            pose,
            idx,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn spacing(&self) -> (f64, f64) {
        self.spacing
    }

    pub fn pose(&self) -> &Matrix4<f64> {
        &self.pose
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> f64 {
        self.pixels[x + y * self.width]
    }

    /// Image plane in world space.
    pub fn plane(&self) -> Plane3D {
        Plane3D::from_pose(&self.pose)
    }

    /// Pose column `axis` (`transform == true`) or row `axis`, negated.
    /// This is the beam direction used for the angle estimate.
    pub fn beam_axis(&self, axis: usize, transform: bool) -> Vector3<f64> {
        if transform {
            Vector3::new(
                -self.pose[(0, axis)],
                -self.pose[(1, axis)],
                -self.pose[(2, axis)],
            )
        } else {
            Vector3::new(
                -self.pose[(axis, 0)],
                -self.pose[(axis, 1)],
                -self.pose[(axis, 2)],
            )
        }
    }

    /// World point to (fractional) pixel coordinates, i.e. `R^T (p - o)` scaled
    /// by the pixel spacing.
    pub fn to_img_coords(&self, p: &Point3<f64>) -> (f64, f64) {
        let mut x = 0.0;
        let mut y = 0.0;
        for i in 0..3 {
            let d = p[i] - self.pose[(i, 3)];
            x += self.pose[(i, 0)] * d;
            y += self.pose[(i, 1)] * d;
        }
        (x / self.spacing.0, y / self.spacing.1)
    }

    pub fn in_image(&self, img_x: f64, img_y: f64) -> bool {
        !(img_x < 0.0
            || img_x >= self.width as f64
            || img_y < 0.0
            || img_y >= self.height as f64)
    }

    fn contains_pixel(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// 4-connected flood fill over non-zero pixels starting at the seed.
    ///
    /// The seed value is always part of the result, even when it is zero; a
    /// non-zero seed is reported a second time by the fill itself. Pixels outside
    /// the frame are never visited.
    pub fn region_grow(&self, seed_x: i64, seed_y: i64) -> Vec<f64> {
        let mut samples = Vec::new();
        if !self.contains_pixel(seed_x, seed_y) {
            return samples;
        }
        samples.push(self.pixels[seed_x as usize + seed_y as usize * self.width]);

        let mut visited = vec![false; self.width * self.height];
        let mut stack = vec![(seed_x, seed_y)];

        while let Some((x, y)) = stack.pop() {
            if !self.contains_pixel(x, y) {
                continue;
            }
            let i = x as usize + y as usize * self.width;
            let value = self.pixels[i];
            if value != 0.0 {
                if visited[i] {
                    continue;
                }
                samples.push(value);
                stack.extend([(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]);
            }
            visited[i] = true;
        }
        samples
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;
    use crate::utils::test_utils::axial_pose;
    use approx::assert_relative_eq;

    fn frame_from(pixels: Vec<f64>, width: usize, height: usize) -> FrameSample {
        FrameSample::new(pixels, width, height, (1.0, 1.0), Matrix4::identity(), 0)
            .expect("valid frame")
    }

    #[test]
    fn test_new_rejects_mismatched_buffer() {
        let err = FrameSample::new(vec![0.0; 5], 2, 2, (1.0, 1.0), Matrix4::identity(), 0);
        assert!(matches!(
            err,
            Err(AngleCorrectionError::InvalidParameter { name: "pixels", .. })
        ));
        let err = FrameSample::new(vec![0.0; 4], 2, 2, (0.0, 1.0), Matrix4::identity(), 0);
        assert!(err.is_err());
    }

    #[test]
    fn test_world_to_pixel_mapping() {
        // origin at (-5, -5, 1), spacing 0.5 x 2.0
        let pose = axial_pose(Point3::new(-5.0, -5.0, 1.0));
        let frame = FrameSample::new(vec![0.0; 400], 20, 20, (0.5, 2.0), pose, 3).unwrap();
        let (x, y) = frame.to_img_coords(&Point3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(x, 10.0);
        assert_relative_eq!(y, 2.5);
        assert!(frame.in_image(x, y));
        assert!(!frame.in_image(-0.1, 2.0));
        assert!(!frame.in_image(20.0, 2.0));
        assert_eq!(frame.idx(), 3);
    }

    #[test]
    fn test_region_grow_connected_component() {
        #[rustfmt::skip]
        let pixels = vec![
            1.0, 1.0, 0.0, 4.0,
            0.0, 2.0, 0.0, 4.0,
            0.0, 3.0, 0.0, 0.0,
        ];
        let frame = frame_from(pixels, 4, 3);
        let mut samples = frame.region_grow(0, 0);
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        // seed reported twice, isolated 4.0 component excluded
        assert_eq!(samples, vec![1.0, 1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_region_grow_zero_seed_kept() {
        let frame = frame_from(vec![0.0, 5.0, 5.0, 5.0], 2, 2);
        assert_eq!(frame.region_grow(0, 0), vec![0.0]);
    }

    #[test]
    fn test_region_grow_stays_in_bounds() {
        let frame = frame_from(vec![-1.0; 9], 3, 3);
        let samples = frame.region_grow(2, 2);
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().all(|&s| s == -1.0));
        assert!(frame.region_grow(3, 0).is_empty());
        assert!(frame.region_grow(-1, 0).is_empty());
    }

    #[test]
    fn test_beam_axis_column_or_row() {
        let mut pose = Matrix4::identity();
        pose[(0, 1)] = 0.5;
        let frame = FrameSample::new(vec![0.0], 1, 1, (1.0, 1.0), pose, 0).unwrap();
        assert_eq!(frame.beam_axis(1, true), Vector3::new(-0.5, -1.0, 0.0));
        assert_eq!(frame.beam_axis(1, false), Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(frame.beam_axis(0, false), Vector3::new(-1.0, -0.5, 0.0));
    }
}
