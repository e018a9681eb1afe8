use thiserror::Error;

/// Failures raised by the estimation pipeline itself.
///
/// Numerical degeneracy (NaN estimates, empty sample sets, zero-length tangents)
/// is not represented here: those cases are absorbed locally and processing
/// continues with neutral values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AngleCorrectionError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("no points found in the centerline")]
    EmptyCenterline,

    #[error("no lines found in the centerline, the centerline must be a linked list")]
    NoLines,

    #[error("centerline line {line} references point {index}, but only {n_points} points exist")]
    LineIndexOutOfRange {
        line: usize,
        index: usize,
        n_points: usize,
    },

    #[error("curve evaluated before its control points were computed")]
    CurveNotInitialized,

    #[error("pipeline inputs were never validly set")]
    InputsNotSet,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for AngleCorrectionError {
    fn from(e: toml::de::Error) -> Self {
        AngleCorrectionError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AngleCorrectionError>;
