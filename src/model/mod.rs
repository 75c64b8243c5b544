//! Classifier abstraction and the fixed-hyperparameter trainer
//!
//! The retraining core treats models as opaque probability scorers over a
//! named feature list. [`ModelArtifact`] is the serializable form stored in the
//! registry; [`ClassifierTrainer`] is the seam for swapping model families.

mod logistic;


use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logistic::{Hyperparameters, LogisticModel, LogisticTrainer};

/// Model fitting and scoring errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training labels contain a single class")]
    SingleClass,

    #[error("Dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Row count mismatch: {rows} rows, {labels} labels")]
    RowCountMismatch { rows: usize, labels: usize },

    #[error("Non-finite value in {0}")]
    NonFinite(String),

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Binary classifier scoring rows in `feature_columns()` order
pub trait Classifier {
    /// Feature names the model was trained on, in input order
    fn feature_columns(&self) -> &[String];

    /// Probability of the positive class for each row
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Hard predictions at the 0.5 threshold
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        Ok(self.predict_proba(rows)?.into_iter().map(|p| u8::from(p >= 0.5)).collect())
    }
}

/// Serializable model stored in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticModel),
}

impl Classifier for ModelArtifact {
    fn feature_columns(&self) -> &[String] {
        match self {
            ModelArtifact::LogisticRegression(m) => m.feature_columns(),
        }
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            ModelArtifact::LogisticRegression(m) => m.predict_proba(rows),
        }
    }
}

/// Fits a model on a training matrix
pub trait ClassifierTrainer: Send + Sync {
    /// Model family name, logged as a run parameter
    fn model_type(&self) -> &'static str;

    /// Hyperparameters as run parameters
    fn params(&self) -> HashMap<String, String>;

    /// Fit on `rows` (in `feature_columns` order) and binary `labels`
    fn fit(&self, feature_columns: &[&str], rows: &[Vec<f64>], labels: &[u8])
        -> Result<ModelArtifact>;
}
