use serde::{Deserialize, Serialize};

use super::BranchEstimate;
use crate::error::Result;
use crate::spline::Curve3D;

/// Parameter step between candidate arrows along a branch.
const ARROW_STEP: f64 = 0.3;

/// Visualization-ready flow arrows: parallel arrays keyed by point index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowField {
    pub points: Vec<[f64; 3]>,
    pub flow_direction: Vec<[f64; 3]>,
    pub direction_uncertainty: Vec<f64>,
    pub velocity: Vec<f64>,
    /// Branches dropped by the uncertainty limit.
    pub skipped_branches: usize,
}

impl FlowField {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn push(&mut self, point: [f64; 3], direction: [f64; 3], uncertainty: f64, velocity: f64) {
        self.points.push(point);
        self.flow_direction.push(direction);
        self.direction_uncertainty.push(uncertainty);
        self.velocity.push(velocity);
    }
}

/// Samples every branch at parameter steps of 0.3 and emits one arrow per
/// sample that is at least `min_arrow_dist` away from the previous one.
///
/// Branches with `|direction| < uncertainty_limit` are counted and skipped;
/// branches with NaN estimates are skipped silently. Arrow vectors are the
/// tangent scaled by the direction and normalized, so a zero direction emits
/// nothing.
pub fn assemble(
    branches: &[Curve3D],
    estimates: &[BranchEstimate],
    uncertainty_limit: f64,
    min_arrow_dist: f64,
) -> Result<FlowField> {
    let mut field = FlowField::default();

    for (branch, estimate) in branches.iter().zip(estimates.iter()) {
        let abs_dir = estimate.direction.abs();
        let abs_vel = estimate.velocity.abs();
        if abs_dir < uncertainty_limit {
            field.skipped_branches += 1;
            continue;
        }
        if abs_dir.is_nan() || abs_vel.is_nan() {
            continue;
        }

        let end = branch.len() as f64 - 1.0;
        let mut prev = branch.evaluate_single(0.0)?;
        let mut t = 0.0;
        while t < end {
            let p = branch.evaluate_single(t)?;
            let t_here = t;
            t += ARROW_STEP;
            if p.iter().any(|c| c.is_nan()) {
                continue;
            }
            if (p - prev).norm() < min_arrow_dist {
                continue;
            }
            prev = p;

            let flow = (branch.derivative_single(t_here)? * estimate.direction).normalize();
            if flow.iter().any(|c| c.is_nan()) {
                continue;
            }
            field.push([p.x, p.y, p.z], [flow.x, flow.y, flow.z], abs_dir, abs_vel);
        }
    }

    if field.skipped_branches > 0 {
        log::warn!(
            "removed {} branch(es) due to an uncertainty limit of {}",
            field.skipped_branches,
            uncertainty_limit
        );
    }
    Ok(field)
}
