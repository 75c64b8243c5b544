//! Crate-level error type and the best-effort side-effect wrapper.
//!
//! Module errors stay specific (`SplitError`, `StorageError`, ...) and are
//! lifted into [`RetrainError`] at the pipeline boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::{SchemaError, SplitError};
use crate::eval::EvalError;
use crate::model::ModelError;
use crate::registry::RegistryError;
use crate::retrain::PromotionError;
use crate::storage::StorageError;
use crate::tracking::TrackingError;

/// Errors that abort a retraining run.
///
/// Data-adequacy problems and gate rejections are *not* errors; they are
/// recorded outcomes. Everything here is either a caller bug (temporal leak),
/// a contract violation, or a critical dependency failure.
#[derive(Debug, Error)]
pub enum RetrainError {
    #[error("Temporal split failed: {0}")]
    Split(#[from] SplitError),

    #[error("Schema violation: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Model training error: {0}")]
    Model(#[from] ModelError),

    #[error("Promotion error: {0}")]
    Promotion(#[from] PromotionError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for pipeline-level operations
pub type Result<T> = std::result::Result<T, RetrainError>;

/// Run a non-critical side effect: log and continue on failure.
///
/// Used for audit writes after a completed transition, monitoring sink
/// writes and registry annotations. Critical operations must propagate
/// with `?` instead.
pub fn best_effort<T, E, F>(operation: &str, f: F) -> Option<T>
where
    E: std::fmt::Display,
    F: FnOnce() -> std::result::Result<T, E>,
{
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "best-effort operation failed (non-critical)");
            None
        }
    }
}
