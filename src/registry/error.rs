//! Registry error types

use thiserror::Error;

use super::stage::ModelStage;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Version not found: {0} v{1}")]
    VersionNotFound(String, u32),

    #[error("Invalid stage transition for {name} v{version}: {from} -> {to}")]
    InvalidTransition { name: String, version: u32, from: ModelStage, to: ModelStage },

    #[error("{name} v{existing} is already in Production; archive it before promoting v{requested}")]
    ProductionConflict { name: String, existing: u32, requested: u32 },

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry error: {0}")]
    Internal(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
