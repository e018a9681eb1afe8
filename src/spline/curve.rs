use nalgebra::{Point3, Vector3};

use super::fitter::QuadraticSplineFitter;
use super::plane::Plane3D;
use crate::error::{AngleCorrectionError, Result};
use crate::flow::{Intersection, IntersectionSet};
use crate::frame::FrameSample;
use crate::utils::sgn;

/// Below this the leading coefficient is treated as zero and the crossing is
/// solved linearly.
const LINEAR_EPS: f64 = 1e-12;

/// Discriminants in `[DISC_TOLERANCE, 0)` are rounding noise of a tangent root.
const DISC_TOLERANCE: f64 = -0.01;

/// Quadratic B-spline through an ordered vessel branch, parameterised so that
/// `t = k` hits the k-th interpolation point.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve3D {
    points: [Vec<f64>; 3],
    cpoints: [Vec<f64>; 3],
    initialized: bool,
    axis: usize,
    transform: bool,
    intersections: IntersectionSet,
}

impl Default for Curve3D {
    fn default() -> Self {
        Self {
            points: Default::default(),
            cpoints: Default::default(),
            initialized: false,
            axis: 1,
            transform: true,
            intersections: IntersectionSet::default(),
        }
    }
}

impl Curve3D {
    /// Curve with `n` interpolation points at the origin.
    pub fn new(n: usize) -> Self {
        Self {
            points: [vec![0.0; n], vec![0.0; n], vec![0.0; n]],
            ..Default::default()
        }
    }

    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut curve = Self::new(points.len());
        for (i, p) in points.iter().enumerate() {
            curve.set_point(i, p);
        }
        curve
    }

    pub fn set_point(&mut self, i: usize, p: &Point3<f64>) {
        for d in 0..3 {
            self.points[d][i] = p[d];
        }
        self.initialized = false;
    }

    /// Replaces all interpolation points. The three sequences must have equal length.
    pub fn set_points(&mut self, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<()> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(AngleCorrectionError::InvalidParameter {
                name: "points",
                reason: format!(
                    "axis lengths differ: {} / {} / {}",
                    x.len(),
                    y.len(),
                    z.len()
                ),
            });
        }
        self.points = [x, y, z];
        self.initialized = false;
        Ok(())
    }

    pub fn point(&self, i: usize) -> Point3<f64> {
        Point3::new(self.points[0][i], self.points[1][i], self.points[2][i])
    }

    pub fn points(&self) -> Vec<Point3<f64>> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Number of interpolation points; the parameter range is `[0, len - 1]`.
    pub fn len(&self) -> usize {
        self.points[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn set_axis(&mut self, axis: usize) {
        self.axis = axis;
    }

    pub fn transform(&self) -> bool {
        self.transform
    }

    pub fn set_transform(&mut self, transform: bool) {
        self.transform = transform;
    }

    pub fn intersections(&self) -> &IntersectionSet {
        &self.intersections
    }

    pub fn intersections_mut(&mut self) -> &mut IntersectionSet {
        &mut self.intersections
    }

    /// One three-tap smoothing pass per axis with mirrored ends. Curves with
    /// fewer than two points are left untouched.
    pub fn apply_convolution(&mut self, mask: &[f64; 3]) {
        let n = self.len();
        if n < 2 {
            return;
        }
        for axis in self.points.iter_mut() {
            let p = axis.as_slice();
            let mut smoothed = Vec::with_capacity(n);
            smoothed.push(2.0 * mask[0] * p[1] + mask[1] * p[0]);
            for i in 1..n - 1 {
                smoothed.push(mask[0] * p[i - 1] + mask[1] * p[i] + mask[2] * p[i + 1]);
            }
            smoothed.push(2.0 * mask[0] * p[n - 2] + mask[1] * p[n - 1]);
            *axis = smoothed;
        }
        self.initialized = false;
    }

    /// Fits the control points of each axis.
    pub fn compute(&mut self) {
        for d in 0..3 {
            self.cpoints[d] =
                QuadraticSplineFitter::new(self.points[d].clone()).compute_control_points();
        }
        self.initialized = true;
    }

    /// Control point window and local fraction for parameter `t`.
    fn window(&self, t: f64) -> Result<(usize, f64)> {
        if !self.initialized {
            return Err(AngleCorrectionError::CurveNotInitialized);
        }
        if self.is_empty() {
            return Err(AngleCorrectionError::EmptyCenterline);
        }
        let s = t + 1.5;
        let pos = (s.floor() as i64).clamp(1, self.len() as i64) as usize;
        Ok((pos, s - pos as f64))
    }

    pub fn evaluate_single(&self, t: f64) -> Result<Point3<f64>> {
        let (pos, f) = self.window(t)?;
        let mut out = Point3::origin();
        for d in 0..3 {
            let cp = &self.cpoints[d];
            out[d] = 0.5 * f * f * cp[pos + 1]
                + (-f * f + f + 0.5) * cp[pos]
                + 0.5 * (1.0 - f) * (1.0 - f) * cp[pos - 1];
        }
        Ok(out)
    }

    pub fn derivative_single(&self, t: f64) -> Result<Vector3<f64>> {
        let (pos, f) = self.window(t)?;
        let mut out = Vector3::zeros();
        for d in 0..3 {
            let cp = &self.cpoints[d];
            out[d] = f * (cp[pos + 1] - cp[pos]) + (1.0 - f) * (cp[pos] - cp[pos - 1]);
        }
        Ok(out)
    }

    /// Roots in `[0, 1]` of the plane distance along the segment whose middle
    /// control point is `cp[bracket + 1]`.
    fn find_roots(&self, bracket: usize, plane: &Plane3D) -> Vec<f64> {
        let p = bracket + 1;
        let mut a = 0.0;
        let mut b = 0.0;
        let mut c = plane.coefficient(3);
        for d in 0..3 {
            let cp = &self.cpoints[d];
            let k = plane.coefficient(d);
            a += k * (0.5 * cp[p - 1] - cp[p] + 0.5 * cp[p + 1]);
            b += k * (cp[p] - cp[p - 1]);
            c += k * (0.5 * cp[p - 1] + 0.5 * cp[p]);
        }

        let in_unit = |r: &f64| (0.0..=1.0).contains(r);
        if a.abs() < LINEAR_EPS {
            if b == 0.0 {
                return Vec::new();
            }
            return std::iter::once(-c / b).filter(in_unit).collect();
        }

        let mut disc = b * b - 4.0 * a * c;
        if (DISC_TOLERANCE..0.0).contains(&disc) {
            disc = 0.0;
        }
        if disc < 0.0 {
            return Vec::new();
        }
        let sq = disc.sqrt();
        [(-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a)]
            .into_iter()
            .filter(in_unit)
            .collect()
    }

    /// First crossing of the curve with `plane`, as `(t, point)`.
    ///
    /// Only the first pair of interpolation points whose plane distances change
    /// sign is examined; if rounding leaves it without a root the following
    /// segment is tried once.
    pub fn intersect(&self, plane: &Plane3D) -> Result<Option<(f64, Point3<f64>)>> {
        if !self.initialized {
            return Err(AngleCorrectionError::CurveNotInitialized);
        }
        let n = self.len();
        if n < 2 {
            return Ok(None);
        }

        let mut prev_sign = sgn(plane.distance(&self.point(0)));
        let mut bracket = None;
        for i in 1..n {
            let sign = sgn(plane.distance(&self.point(i)));
            if sign != prev_sign {
                bracket = Some(i - 1);
                break;
            }
            prev_sign = sign;
        }
        let Some(mut pos) = bracket else {
            return Ok(None);
        };

        let mut roots = self.find_roots(pos, plane);
        if roots.is_empty() {
            pos += 1;
            roots = self.find_roots(pos, plane);
        }
        match roots.first() {
            Some(&root) => {
                let t = root + pos as f64 - 0.5;
                Ok(Some((t, self.evaluate_single(t)?)))
            }
            None => Ok(None),
        }
    }

    /// Cosine of the angle between the curve tangent at `t` and the beam axis
    /// of `frame`.
    pub fn cos_theta(&self, t: f64, frame: &FrameSample) -> Result<f64> {
        let tangent = self.derivative_single(t)?;
        let beam = frame.beam_axis(self.axis, self.transform);
        let cos = tangent.dot(&beam) / (tangent.norm() * beam.norm());
        Ok(cos.clamp(-1.0, 1.0))
    }

    /// Intersection of the curve with the plane of `frame`, if any.
    pub fn find_intersection(
        &self,
        frame: &FrameSample,
        frame_index: usize,
    ) -> Result<Option<Intersection>> {
        match self.intersect(&frame.plane())? {
            Some((t, _)) => {
                let cos = self.cos_theta(t, frame)?;
                Ok(Some(Intersection::new(t, cos, frame_index)))
            }
            None => Ok(None),
        }
    }

    /// Appends the intersection with every frame, in frame order.
    pub fn find_all_intersections(&mut self, frames: &[FrameSample]) -> Result<()> {
        for (frame_index, frame) in frames.iter().enumerate() {
            if let Some(intersection) = self.find_intersection(frame, frame_index)? {
                self.intersections.push(intersection);
            }
        }
        Ok(())
    }

    /// Region grows every valid intersection in its frame.
    pub fn region_grow_intersections(&mut self, frames: &[FrameSample]) -> Result<()> {
        let positions = self
            .intersections
            .iter()
            .map(|i| self.evaluate_single(i.parameter_position()))
            .collect::<Result<Vec<_>>>()?;
        for (intersection, position) in self.intersections.iter_mut().zip(positions.iter()) {
            if let Some(frame) = frames.get(intersection.frame_index()) {
                intersection.region_grow(position, frame);
            }
        }
        Ok(())
    }
}
