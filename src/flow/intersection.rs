use nalgebra::Point3;

use super::Estimate;
use crate::frame::FrameSample;
use crate::utils::sgn;

/// Crossing of a branch curve with one frame plane, plus the Doppler samples
/// collected around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    parameter_position: f64,
    cos_theta: f64,
    frame_index: usize,
    valid: bool,
    samples: Vec<f64>,
    average: Estimate,
    orig_average: Estimate,
}

impl Default for Intersection {
    /// An invalid intersection without samples.
    fn default() -> Self {
        Self {
            parameter_position: 0.0,
            cos_theta: 0.0,
            frame_index: 0,
            valid: false,
            samples: Vec::new(),
            average: Estimate::Uncomputed,
            orig_average: Estimate::Uncomputed,
        }
    }
}

impl Intersection {
    /// `frame_index` is the position of the intersected frame in the frame list.
    pub fn new(parameter_position: f64, cos_theta: f64, frame_index: usize) -> Self {
        Self {
            parameter_position,
            cos_theta,
            frame_index,
            valid: true,
            ..Default::default()
        }
    }

    pub fn parameter_position(&self) -> f64 {
        self.parameter_position
    }

    pub fn cos_theta(&self) -> f64 {
        self.cos_theta
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Replaces the samples and drops the cached average.
    pub fn set_samples(&mut self, samples: Vec<f64>) {
        self.samples = samples;
        self.average = Estimate::Uncomputed;
    }

    pub fn push_sample(&mut self, sample: f64) {
        self.samples.push(sample);
        self.average = Estimate::Uncomputed;
    }

    /// Mean of the samples, computed once and cached. No samples means an
    /// average of 0 and the intersection becomes invalid.
    pub fn average(&mut self) -> f64 {
        if let Estimate::Computed(avg) = self.average {
            return avg;
        }
        let avg = self.compute_average();
        if self.orig_average == Estimate::Uncomputed {
            self.orig_average = Estimate::Computed(avg);
        }
        avg
    }

    /// Average as first computed, before any aliasing correction.
    pub fn orig_average(&self) -> Option<f64> {
        self.orig_average.value()
    }

    fn compute_average(&mut self) -> f64 {
        let avg = if self.samples.is_empty() {
            self.valid = false;
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        };
        self.average = Estimate::Computed(avg);
        avg
    }

    /// Unwraps aliased samples given the estimated flow direction.
    ///
    /// When the direction and the beam angle agree in sign, flow toward the probe
    /// is expected and negative samples are shifted up by `2 * vnyq`; otherwise
    /// positive samples are shifted down. The average is recomputed afterwards.
    pub fn correct_aliasing(&mut self, direction: f64, vnyq: f64) {
        if self.orig_average == Estimate::Uncomputed {
            self.average();
        }
        let same_sign = sgn(direction) == sgn(self.cos_theta);
        for s in self.samples.iter_mut() {
            if *s < 0.0 && same_sign {
                *s += 2.0 * vnyq;
            } else if *s > 0.0 && !same_sign {
                *s -= 2.0 * vnyq;
            }
        }
        self.compute_average();
    }

    /// Voting weight: `((p - n) / (p + n))^2 * weight`, plus one when the beam
    /// angle lies strictly inside (`lower`, `upper`). `p` and `n` count positive
    /// and non-positive samples.
    pub fn sample_weight(&self, weight: f64, lower: f64, upper: f64) -> f64 {
        let positive = self.samples.iter().filter(|&&s| s > 0.0).count() as f64;
        let negative = self.samples.len() as f64 - positive;
        let ratio = (positive - negative) / (positive + negative);
        let cos = self.cos_theta.abs();
        let in_window = if cos > lower && cos < upper { 1.0 } else { 0.0 };
        ratio * ratio * weight + in_window
    }

    /// Angle-corrected velocity of this intersection alone, 0 when invalid.
    pub fn estimate_velocity_simple(&mut self) -> f64 {
        let avg = self.average();
        if self.valid {
            avg / self.cos_theta
        } else {
            0.0
        }
    }

    /// Collects samples by region growing from the pixel under `position`.
    /// Does nothing for invalid intersections or positions outside the frame.
    pub fn region_grow(&mut self, position: &Point3<f64>, frame: &FrameSample) {
        if !self.valid {
            return;
        }
        let (x, y) = frame.to_img_coords(position);
        if frame.in_image(x, y) {
            self.set_samples(frame.region_grow(x as i64, y as i64));
        }
    }
}
