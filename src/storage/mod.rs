//! Persistence for predictions, labels and decision audit records
//!
//! - [`PredictionLog`]: append-only CSV, exclusive lock per append, header
//!   validation and repair on open
//! - [`LabelStore`]: idempotent upsert keyed by prediction id, dedupe on read
//! - [`DecisionLog`]: append-only audit files plus a single last-promotion
//!   pointer used by the cooldown gate

mod decision_log;
mod label_store;
mod prediction_log;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::data::SchemaError;

pub use decision_log::{DecisionLog, InMemoryDecisionLog, JsonDecisionLog, LAST_PROMOTION_FILE};
pub use label_store::{
    InMemoryLabelBackend, JsonFileLabelBackend, LabelBackend, LabelCoverage, LabelStore,
    LabelWrite,
};
pub use prediction_log::{HeaderCheck, PredictionLog, PREDICTION_COLUMNS};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Attach a path to an I/O error
pub(crate) fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io { path: path.to_path_buf(), source }
}

/// Write `contents` to a sibling temp file and rename it over `path`
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, contents).map_err(io_at(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_at(path))?;
    Ok(())
}
