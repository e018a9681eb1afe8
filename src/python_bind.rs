use pyo3::prelude::*;

use crate::processing::flow_field::FlowField;

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyFlowField {
    #[pyo3(get)]
    pub points: Vec<(f64, f64, f64)>,
    #[pyo3(get)]
    pub flow_direction: Vec<(f64, f64, f64)>,
    #[pyo3(get)]
    pub direction_uncertainty: Vec<f64>,
    #[pyo3(get)]
    pub velocity: Vec<f64>,
    #[pyo3(get)]
    pub skipped_branches: usize,
}

#[pymethods]
impl PyFlowField {
    fn __len__(&self) -> usize {
        self.points.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "FlowField(arrows={}, skipped_branches={})",
            self.points.len(),
            self.skipped_branches
        )
    }

    /// Mean velocity over all arrows, 0 when empty.
    fn mean_velocity(&self) -> f64 {
        if self.velocity.is_empty() {
            return 0.0;
        }
        self.velocity.iter().sum::<f64>() / self.velocity.len() as f64
    }
}

impl From<&FlowField> for PyFlowField {
    fn from(field: &FlowField) -> Self {
        let tuple = |p: &[f64; 3]| (p[0], p[1], p[2]);
        Self {
            points: field.points.iter().map(tuple).collect(),
            flow_direction: field.flow_direction.iter().map(tuple).collect(),
            direction_uncertainty: field.direction_uncertainty.clone(),
            velocity: field.velocity.clone(),
            skipped_branches: field.skipped_branches,
        }
    }
}
