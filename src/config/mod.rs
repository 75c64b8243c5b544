//! Pipeline configuration
//!
//! Loaded from YAML. Every section has defaults, so a file only needs the
//! keys it overrides:
//!
//! ```yaml
//! model_name: credit-risk-model
//! paths:
//!   predictions_csv: /data/predictions.csv
//! gate:
//!   min_f1_improvement_pct: 3.0
//! segments:
//!   rules:
//!     - feature: age
//!       bins: [30, 45, 60]
//! ```

mod validate;


use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::SegmentConfig;
use crate::monitor::DriftConfig;
use crate::retrain::{GateConfig, TrainerConfig};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// File locations for the file-backed services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub predictions_csv: PathBuf,
    pub labels_json: PathBuf,
    pub decisions_dir: PathBuf,
    pub drift_reports_dir: PathBuf,
    pub registry_file: PathBuf,
    pub monitoring_dir: PathBuf,
    pub tracking_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            predictions_csv: PathBuf::from("data/predictions.csv"),
            labels_json: PathBuf::from("data/labels.json"),
            decisions_dir: PathBuf::from("data/decisions"),
            drift_reports_dir: PathBuf::from("data/drift_reports"),
            registry_file: PathBuf::from("data/registry.json"),
            monitoring_dir: PathBuf::from("data/monitoring"),
            tracking_dir: PathBuf::from("data/runs"),
        }
    }
}

impl PathsConfig {
    /// All paths relocated under `root`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            predictions_csv: root.join("predictions.csv"),
            labels_json: root.join("labels.json"),
            decisions_dir: root.join("decisions"),
            drift_reports_dir: root.join("drift_reports"),
            registry_file: root.join("registry.json"),
            monitoring_dir: root.join("monitoring"),
            tracking_dir: root.join("runs"),
        }
    }
}

/// Pre-training data check over recent predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub lookback_days: i64,
    pub min_labeled: usize,
    /// Fraction in [0, 1]
    pub min_coverage_rate: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { lookback_days: 30, min_labeled: 200, min_coverage_rate: 0.2 }
    }
}

/// Complete retraining pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model_name: String,
    pub paths: PathsConfig,
    pub gate: GateConfig,
    pub drift: DriftConfig,
    pub trainer: TrainerConfig,
    pub readiness: ReadinessConfig,
    pub segments: SegmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_name: "credit-risk-model".to_string(),
            paths: PathsConfig::default(),
            gate: GateConfig::default(),
            drift: DriftConfig::default(),
            trainer: TrainerConfig::default(),
            readiness: ReadinessConfig::default(),
            segments: SegmentConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject out-of-range thresholds
    pub fn validate(&self) -> Result<()> {
        validate::validate_config(self)
    }
}
