use std::ops::{Deref, DerefMut};

use super::{Estimate, Intersection};

/// All intersections of one branch with the frame stack, plus the branch-level
/// direction and velocity estimates derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionSet {
    items: Vec<Intersection>,
    direction: Estimate,
    velocity_ls: Estimate,
    dir_weight: f64,
    dir_lower: f64,
    dir_upper: f64,
    vel_lower: f64,
    vel_upper: f64,
}

impl Default for IntersectionSet {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            direction: Estimate::Uncomputed,
            velocity_ls: Estimate::Uncomputed,
            dir_weight: 10.0,
            dir_lower: 0.07,
            dir_upper: 0.9,
            vel_lower: 0.17,
            vel_upper: 1.0,
        }
    }
}

impl Deref for IntersectionSet {
    type Target = [Intersection];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl DerefMut for IntersectionSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

impl IntersectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, intersection: Intersection) {
        self.items.push(intersection);
    }

    /// Drops all intersections and cached estimates; parameters are kept.
    pub fn clear(&mut self) {
        self.items.clear();
        self.direction = Estimate::Uncomputed;
        self.velocity_ls = Estimate::Uncomputed;
    }

    pub fn set_direction_estimation_parameters(&mut self, weight: f64, lower: f64, upper: f64) {
        self.dir_weight = weight;
        self.dir_lower = lower;
        self.dir_upper = upper;
    }

    pub fn set_velocity_estimation_cutoff(&mut self, lower: f64, upper: f64) {
        self.vel_lower = lower;
        self.vel_upper = upper;
    }

    pub fn direction(&self) -> Estimate {
        self.direction
    }

    pub fn velocity(&self) -> Estimate {
        self.velocity_ls
    }

    /// Weighted vote over the sign of `average * cos_theta`, in [-1, 1].
    ///
    /// Invalid intersections and NaN votes are skipped. A set without any vote
    /// gives 0.
    pub fn estimate_direction(&mut self) -> f64 {
        let (weight, lower, upper) = (self.dir_weight, self.dir_lower, self.dir_upper);
        let mut vote_sum = 0.0;
        let mut weight_sum = 0.0;
        for intersection in self.items.iter_mut() {
            let avg = intersection.average();
            if !intersection.is_valid() {
                continue;
            }
            let w = intersection.sample_weight(weight, lower, upper);
            let tmp = avg * intersection.cos_theta();
            let vote = w * tmp / tmp.abs();
            if vote.is_nan() {
                continue;
            }
            vote_sum += vote;
            weight_sum += w;
        }
        let direction = vote_sum / weight_sum;
        let direction = if direction.is_nan() { 0.0 } else { direction };
        self.direction = Estimate::Computed(direction);
        direction
    }

    /// Least-squares velocity `sum(avg * cos) / sum(cos^2)` over valid
    /// intersections with `lower <= |cos| <= upper`. 0 when nothing qualifies.
    pub fn estimate_velocity_ls(&mut self) -> f64 {
        let (lower, upper) = (self.vel_lower, self.vel_upper);
        let mut num = 0.0;
        let mut den = 0.0;
        for intersection in self.items.iter_mut() {
            let cos = intersection.cos_theta();
            if cos.abs() < lower || cos.abs() > upper {
                continue;
            }
            let avg = intersection.average();
            if !intersection.is_valid() || (avg * cos).is_nan() {
                continue;
            }
            num += avg * cos;
            den += cos * cos;
        }
        let velocity = num / den;
        let velocity = if velocity.is_nan() { 0.0 } else { velocity };
        self.velocity_ls = Estimate::Computed(velocity);
        velocity
    }

    /// Cached direction, estimated on first use.
    pub fn estimated_direction(&mut self) -> f64 {
        match self.direction {
            Estimate::Computed(d) => d,
            Estimate::Uncomputed => self.estimate_direction(),
        }
    }

    /// Cached least-squares velocity, estimated on first use.
    pub fn estimated_velocity(&mut self) -> f64 {
        match self.velocity_ls {
            Estimate::Computed(v) => v,
            Estimate::Uncomputed => self.estimate_velocity_ls(),
        }
    }

    /// Unwraps aliasing on every intersection using the branch direction.
    /// Invalidates the cached velocity.
    pub fn correct_aliasing(&mut self, vnyq: f64) {
        let direction = self.estimated_direction();
        for intersection in self.items.iter_mut() {
            intersection.correct_aliasing(direction, vnyq);
        }
        self.velocity_ls = Estimate::Uncomputed;
    }

    /// Mean of the per-intersection velocities over valid intersections.
    pub fn mean_simple_velocity(&mut self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for intersection in self.items.iter_mut() {
            let v = intersection.estimate_velocity_simple();
            if intersection.is_valid() {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}
