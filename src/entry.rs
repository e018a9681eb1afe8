use anyhow::{anyhow, Context, Result};
use crossbeam::thread;

use std::path::PathBuf;

use crate::config::AngleCorrectionConfig;
use crate::io::input::CenterlineData;
use crate::io::metaimage::read_frames;
use crate::io::output::write_flow_field;
use crate::processing::flow_field::FlowField;
use crate::processing::AngleCorrection;

/// Where a centerline is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum CenterlineSource {
    Vtk(PathBuf),
    Csv { points: PathBuf, lines: PathBuf },
}

impl CenterlineSource {
    pub fn load(&self) -> Result<CenterlineData> {
        match self {
            CenterlineSource::Vtk(path) => CenterlineData::read_vtk(path),
            CenterlineSource::Csv { points, lines } => CenterlineData::read_csv(points, lines),
        }
    }
}

/// One dataset: a centerline, a frame prefix and optionally where to write.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub name: String,
    pub centerline: CenterlineSource,
    pub image_prefix: String,
    /// Output path without extension; `.vtk` and `.json` are written next to it.
    pub output: Option<PathBuf>,
}

/// Loads the inputs, runs the full pipeline and returns the flow arrows.
pub fn run_angle_correction(
    centerline: &CenterlineSource,
    image_prefix: &str,
    config: &AngleCorrectionConfig,
) -> Result<FlowField> {
    let params = config.validate().context("invalid configuration")?;
    let centerline = centerline.load()?;
    let frames = read_frames(image_prefix)?;

    let mut ac = AngleCorrection::new();
    ac.set_input(centerline, frames, params)
        .context("failed to set pipeline input")?;
    ac.calculate().context("angle correction failed")?;
    ac.output()
        .cloned()
        .ok_or_else(|| anyhow!("pipeline finished without output"))
}

pub fn run_case(case: &Case, config: &AngleCorrectionConfig) -> Result<FlowField> {
    let field = run_angle_correction(&case.centerline, &case.image_prefix, config)
        .with_context(|| format!("case '{}' failed", case.name))?;
    if let Some(output) = &case.output {
        write_flow_field(output, &field)
            .with_context(|| format!("failed to write output of case '{}'", case.name))?;
    }
    log::info!("case '{}': {} arrow(s)", case.name, field.len());
    Ok(field)
}

/// Runs independent cases concurrently, one scoped thread each. Results come
/// back in input order; the first failure is returned.
pub fn run_cases(cases: &[Case], config: &AngleCorrectionConfig) -> Result<Vec<FlowField>> {
    thread::scope(|s| -> Result<Vec<FlowField>> {
        let handles: Vec<_> = cases
            .iter()
            .map(|case| (case, s.spawn(move |_| run_case(case, config))))
            .collect();

        handles
            .into_iter()
            .map(|(case, handle)| {
                handle
                    .join()
                    .map_err(|_| anyhow!("case '{}' panicked", case.name))?
            })
            .collect()
    })
    .map_err(|panic_payload| anyhow!("parallel case threads panicked: {:?}", panic_payload))?
}
