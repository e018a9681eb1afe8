pub mod centerline;
pub mod config;
pub mod entry;
pub mod error;
pub mod flow;
pub mod frame;
pub mod io;
pub mod processing;
pub mod spline;
pub mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use config::{load_config, AngleCorrectionConfig};
pub use error::{AngleCorrectionError, Result};
pub use processing::flow_field::FlowField;
pub use processing::{AngleCorrection, BranchEstimate, PipelineParams};

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use python_bind::PyFlowField;

/// Python entry point: loads a VTK centerline and the `<prefix>N.mhd` frames,
/// runs the angle correction and optionally writes `<output_path>.vtk/.json`.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(
    signature = (
        centerline_path,
        image_prefix,
        vnyq,
        cutoff,
        n_convolutions,
        uncertainty_limit = 0.0f64,
        min_arrow_dist = 1.0f64,
        output_path = None
    )
)]
#[allow(clippy::too_many_arguments)]
fn angle_correction(
    centerline_path: &str,
    image_prefix: &str,
    vnyq: f64,
    cutoff: f64,
    n_convolutions: i32,
    uncertainty_limit: f64,
    min_arrow_dist: f64,
    output_path: Option<&str>,
) -> PyResult<PyFlowField> {
    let config = AngleCorrectionConfig {
        vnyq,
        cutoff,
        n_convolutions,
        uncertainty_limit,
        min_arrow_dist,
        ..Default::default()
    };
    let case = entry::Case {
        name: centerline_path.to_string(),
        centerline: entry::CenterlineSource::Vtk(centerline_path.into()),
        image_prefix: image_prefix.to_string(),
        output: output_path.map(Into::into),
    };
    let field = entry::run_case(&case, &config)
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(format!("{:#}", e)))?;
    Ok(PyFlowField::from(&field))
}

/// ```python
/// import anglecorrs
/// field = anglecorrs.angle_correction("cl.vtk", "frames/US_", 0.312, 0.18, 6)
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn anglecorrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(angle_correction, m)?)?;
    m.add_class::<PyFlowField>()?;
    Ok(())
}
