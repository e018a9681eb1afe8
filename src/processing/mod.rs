pub mod flow_field;

use rayon::prelude::*;

use crate::centerline::build_branches;
use crate::error::{AngleCorrectionError, Result};
use crate::frame::FrameSample;
use crate::io::input::CenterlineData;
use crate::spline::Curve3D;
use flow_field::FlowField;

/// Numeric settings of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    /// Nyquist velocity; 0 disables aliasing correction.
    pub vnyq: f64,
    /// Lower |cos theta| bound for the velocity fit, the upper bound is 1.
    pub cutoff: f64,
    pub n_convolutions: i32,
    pub uncertainty_limit: f64,
    pub min_arrow_dist: f64,
    pub convolution_mask: [f64; 3],
    pub axis: usize,
    pub transform: bool,
    pub direction_weight: f64,
    pub direction_lower: f64,
    pub direction_upper: f64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            vnyq: 0.0,
            cutoff: 0.17,
            n_convolutions: 6,
            uncertainty_limit: 0.0,
            min_arrow_dist: 1.0,
            convolution_mask: [0.25, 0.5, 0.25],
            axis: 1,
            transform: true,
            direction_weight: 10.0,
            direction_lower: 0.07,
            direction_upper: 0.9,
        }
    }
}

fn invalid(name: &'static str, reason: String) -> AngleCorrectionError {
    AngleCorrectionError::InvalidParameter { name, reason }
}

impl PipelineParams {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("uncertainty_limit", self.uncertainty_limit),
            ("min_arrow_dist", self.min_arrow_dist),
            ("vnyq", self.vnyq),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(invalid(name, format!("must be >= 0, got {}", value)));
            }
        }
        if self.n_convolutions < 0 {
            return Err(invalid(
                "n_convolutions",
                format!("must be >= 0, got {}", self.n_convolutions),
            ));
        }
        if !(0.0..=1.0).contains(&self.cutoff) {
            return Err(invalid(
                "cutoff",
                format!("must lie in [0, 1], got {}", self.cutoff),
            ));
        }
        if self.axis > 2 {
            return Err(invalid(
                "axis",
                format!("must be 0, 1 or 2, got {}", self.axis),
            ));
        }
        if self.convolution_mask.iter().any(|m| !m.is_finite()) {
            return Err(invalid(
                "convolution_mask",
                format!("must be finite, got {:?}", self.convolution_mask),
            ));
        }
        Ok(())
    }

    /// True when switching from `other` to `self` needs the branches rebuilt.
    fn needs_recompute(&self, other: &PipelineParams) -> bool {
        self.vnyq != other.vnyq
            || self.cutoff != other.cutoff
            || self.n_convolutions != other.n_convolutions
            || self.convolution_mask != other.convolution_mask
            || self.axis != other.axis
            || self.transform != other.transform
            || self.direction_weight != other.direction_weight
            || self.direction_lower != other.direction_lower
            || self.direction_upper != other.direction_upper
    }

    fn needs_reassembly(&self, other: &PipelineParams) -> bool {
        self.uncertainty_limit != other.uncertainty_limit
            || self.min_arrow_dist != other.min_arrow_dist
    }
}

/// Per-branch summary of the estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEstimate {
    /// Signed flow direction relative to the curve parameter, in [-1, 1].
    pub direction: f64,
    /// Least-squares angle corrected velocity.
    pub velocity: f64,
    /// Mean of the per-intersection `average / cos theta` velocities.
    pub mean_simple_velocity: f64,
    pub intersections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    InputsSet,
    Computed,
}

/// Runs the angle correction pipeline and keeps its results.
///
/// Inputs are checked by [`AngleCorrection::set_input`]; [`AngleCorrection::calculate`]
/// then only redoes what the changed inputs require.
#[derive(Debug, Clone)]
pub struct AngleCorrection {
    state: PipelineState,
    centerline: CenterlineData,
    frames: Vec<FrameSample>,
    params: PipelineParams,
    full_recompute: bool,
    reassemble: bool,
    branches: Vec<Curve3D>,
    estimates: Vec<BranchEstimate>,
    output: FlowField,
    steps_ran: u8,
}

impl Default for AngleCorrection {
    fn default() -> Self {
        Self {
            state: PipelineState::Uninitialized,
            centerline: CenterlineData::default(),
            frames: Vec::new(),
            params: PipelineParams::default(),
            full_recompute: false,
            reassemble: false,
            branches: Vec::new(),
            estimates: Vec::new(),
            output: FlowField::default(),
            steps_ran: 0,
        }
    }
}

impl AngleCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores the inputs. On error nothing is changed.
    pub fn set_input(
        &mut self,
        centerline: CenterlineData,
        frames: Vec<FrameSample>,
        params: PipelineParams,
    ) -> Result<()> {
        params.validate()?;
        centerline.validate()?;

        if self.state == PipelineState::Uninitialized {
            self.full_recompute = true;
        } else {
            if !centerline.approx_eq(&self.centerline)
                || frames != self.frames
                || params.needs_recompute(&self.params)
            {
                self.full_recompute = true;
            }
            if params.needs_reassembly(&self.params) {
                self.reassemble = true;
            }
        }

        self.centerline = centerline;
        self.frames = frames;
        self.params = params;
        self.state = PipelineState::InputsSet;
        Ok(())
    }

    /// Runs whatever the last input change requires: the full per-branch
    /// estimation and/or the arrow assembly.
    pub fn calculate(&mut self) -> Result<()> {
        if self.state == PipelineState::Uninitialized {
            return Err(AngleCorrectionError::InputsNotSet);
        }
        self.steps_ran = 0;

        if self.full_recompute {
            self.run_branches()?;
            self.full_recompute = false;
            self.reassemble = true;
            self.steps_ran += 1;
        }
        if self.reassemble {
            self.output = flow_field::assemble(
                &self.branches,
                &self.estimates,
                self.params.uncertainty_limit,
                self.params.min_arrow_dist,
            )?;
            self.reassemble = false;
            self.steps_ran += 1;
        }

        self.state = PipelineState::Computed;
        log::debug!("calculate ran {} step(s)", self.steps_ran);
        Ok(())
    }

    fn run_branches(&mut self) -> Result<()> {
        let mut branches = build_branches(&self.centerline);
        let frames = &self.frames;
        let params = &self.params;

        let estimates = branches
            .par_iter_mut()
            .enumerate()
            .map(|(i, branch)| {
                let estimate = process_branch(branch, frames, params)?;
                log::info!(
                    "branch {}: direction {:.4}, velocity {:.4} from {} intersection(s)",
                    i,
                    estimate.direction,
                    estimate.velocity,
                    estimate.intersections
                );
                Ok(estimate)
            })
            .collect::<Result<Vec<_>>>()?;

        self.branches = branches;
        self.estimates = estimates;
        log::info!(
            "{} branch(es), {} intersection(s) with {} frame(s)",
            self.branch_count(),
            self.intersection_count(),
            self.frames.len()
        );
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Fitted branch curves with their intersections.
    pub fn branches(&self) -> &[Curve3D] {
        &self.branches
    }

    pub fn branch_estimates(&self) -> &[BranchEstimate] {
        &self.estimates
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.branches.iter().map(|b| b.intersections().len()).sum()
    }

    /// 2 after a full recompute, 1 after reassembly only, 0 when nothing changed.
    pub fn steps_ran(&self) -> u8 {
        self.steps_ran
    }

    /// Flow arrows, available once computed.
    pub fn output(&self) -> Option<&FlowField> {
        match self.state {
            PipelineState::Computed => Some(&self.output),
            _ => None,
        }
    }
}

/// Smoothing, fitting, intersection, region growing and estimation for one branch.
fn process_branch(
    branch: &mut Curve3D,
    frames: &[FrameSample],
    params: &PipelineParams,
) -> Result<BranchEstimate> {
    branch.set_axis(params.axis);
    branch.set_transform(params.transform);
    for _ in 0..params.n_convolutions {
        branch.apply_convolution(&params.convolution_mask);
    }
    branch.compute();
    branch.find_all_intersections(frames)?;
    branch.region_grow_intersections(frames)?;

    let set = branch.intersections_mut();
    set.set_direction_estimation_parameters(
        params.direction_weight,
        params.direction_lower,
        params.direction_upper,
    );
    set.set_velocity_estimation_cutoff(params.cutoff, 1.0);

    let direction = set.estimate_direction();
    if params.vnyq > 0.0 {
        set.correct_aliasing(params.vnyq);
    }
    let velocity = set.estimate_velocity_ls();

    Ok(BranchEstimate {
        direction,
        velocity,
        mean_simple_velocity: set.mean_simple_velocity(),
        intersections: set.len(),
    })
}
