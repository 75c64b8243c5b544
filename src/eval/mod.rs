//! Replay-based evaluation
//!
//! Both the incumbent and the challenger are re-scored on one identical
//! evaluation frame, then reduced to [`MetricsBundle`]s by the same routine.
//! Only these replay metrics feed the promotion gate; the shadow trainer's
//! own metrics are diagnostic.

mod comparison;
mod confusion;
mod frame;
mod metrics;
mod replay;
mod segments;


use thiserror::Error;

use crate::data::SchemaError;
use crate::model::ModelError;
use crate::registry::RegistryError;

pub use comparison::{compare_models, Comparison};
pub use confusion::BinaryConfusion;
pub use frame::EvalFrame;
pub use metrics::{
    brier_score, evaluate_predictions, expected_calibration_error, roc_auc, CalibrationMetrics,
    MetricsBundle, PrimaryMetrics,
};
pub use replay::ReplayEvaluator;
pub use segments::{SegmentConfig, SegmentPerformance, SegmentRule};

/// Evaluation errors
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Nothing to evaluate: empty input")]
    EmptyEvaluation,

    #[error("Length mismatch: {expected} labels, {actual} predictions")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Model v{version} was trained on features {actual:?}, evaluation requested {expected:?}")]
    FeatureMismatch { version: u32, expected: Vec<String>, actual: Vec<String> },
}

/// Result type for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;
