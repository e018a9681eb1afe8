use serde::Deserialize;

use std::path::Path;

use crate::error::{AngleCorrectionError, Result};
use crate::processing::PipelineParams;

/// Voting parameters of the direction estimate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    /// Lower |cos theta| bound of the bonus window.
    pub a: f64,
    /// Upper |cos theta| bound of the bonus window.
    pub b: f64,
    /// Multiplier of the sample sign agreement term.
    pub weight: f64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            a: 0.07,
            b: 0.9,
            weight: 10.0,
        }
    }
}

/// Pipeline configuration as read from TOML. Every field is optional.
///
/// ```toml
/// vnyq = 0.312
/// cutoff = 0.18
/// n_convolutions = 6
///
/// [direction]
/// weight = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AngleCorrectionConfig {
    pub vnyq: f64,
    pub cutoff: f64,
    pub n_convolutions: i32,
    pub uncertainty_limit: f64,
    pub min_arrow_dist: f64,
    pub convolution_mask: [f64; 3],
    /// Pose column (or row, see `transform`) used as the beam axis.
    pub axis: usize,
    pub transform: bool,
    pub direction: DirectionConfig,
}

impl Default for AngleCorrectionConfig {
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
            direction: DirectionConfig::default(),
        }
    }
}

impl AngleCorrectionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Pipeline parameters, checked for range errors.
    pub fn validate(&self) -> Result<PipelineParams> {
        let params = PipelineParams {
            vnyq: self.vnyq,
            cutoff: self.cutoff,
            n_convolutions: self.n_convolutions,
            uncertainty_limit: self.uncertainty_limit,
            min_arrow_dist: self.min_arrow_dist,
            convolution_mask: self.convolution_mask,
            axis: self.axis,
            transform: self.transform,
            direction_weight: self.direction.weight,
            direction_lower: self.direction.a,
            direction_upper: self.direction.b,
        };
        params.validate()?;
        Ok(params)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AngleCorrectionConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AngleCorrectionError::Config(format!("{}: {}", path.display(), e)))?;
    let config = AngleCorrectionConfig::from_toml_str(&contents)?;
    log::info!("loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use crate::utils::test_utils::scratch_dir;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = AngleCorrectionConfig::from_toml_str("").unwrap();
        assert_eq!(config, AngleCorrectionConfig::default());
        assert_eq!(config.validate().unwrap(), PipelineParams::default());
    }

    #[test]
    fn test_partial_override() {
        let config = AngleCorrectionConfig::from_toml_str(
            "vnyq = 0.312\ncutoff = 0.18\n\n[direction]\nweight = 4.0\n",
        )
        .unwrap();
        assert_eq!(config.vnyq, 0.312);
        assert_eq!(config.n_convolutions, 6);
        assert_eq!(config.direction.weight, 4.0);
        assert_eq!(config.direction.a, 0.07);
        let params = config.validate().unwrap();
        assert_eq!(params.direction_weight, 4.0);
        assert_eq!(params.cutoff, 0.18);
    }

    #[test]
    fn test_invalid_values() {
        let config = AngleCorrectionConfig::from_toml_str("n_convolutions = -2").unwrap();
        assert!(matches!(
            config.validate(),
            Err(AngleCorrectionError::InvalidParameter {
                name: "n_convolutions",
                ..
            })
        ));
        assert!(matches!(
            AngleCorrectionConfig::from_toml_str("vnyq = \"fast\""),
            Err(AngleCorrectionError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_file() {
        let dir = scratch_dir("config");
        let path = dir.join("angle.toml");
        std::fs::write(&path, "axis = 2\ntransform = false\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.axis, 2);
        assert!(!config.transform);
        assert!(load_config(dir.join("missing.toml")).is_err());
    }
}
