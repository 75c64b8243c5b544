//! Model registry with Staging -> Production -> Archived lifecycle
//!
//! The retraining core needs only `load`, `get_latest`, `transition_stage` and
//! `search_versions`; `register` and `link_decision` are used by the shadow
//! trainer and promoter to record lineage.
//!
//! Invariant: at most one version per model name is in `Production`.
//! `transition_stage` refuses a second one with
//! [`RegistryError::ProductionConflict`], so promotion must archive the
//! incumbent first.
//!
//! # Example
//!
//! ```ignore
//! use retrainer::registry::{InMemoryRegistry, ModelRegistry, ModelStage, NewModelVersion};
//!
//! let mut registry = InMemoryRegistry::new();
//! let v = registry.register("credit-risk-model", NewModelVersion::new(artifact))?;
//! registry.transition_stage("credit-risk-model", v.version, ModelStage::Staging, Some("trainer"))?;
//! ```

mod error;
mod json_file;
mod memory;
mod stage;
mod traits;
mod transition;
mod version;

#[cfg(test)]
mod tests;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use error::{RegistryError, Result};
pub use json_file::JsonFileRegistry;
pub use memory::InMemoryRegistry;
pub use stage::ModelStage;
pub use traits::ModelRegistry;
pub use transition::StageTransition;
pub use version::{ModelVersion, NewModelVersion, VersionFilter};

/// Registry handle shared between trainer, evaluator and promoter
pub type SharedRegistry<R> = Arc<RwLock<R>>;

/// Wrap a registry for sharing
pub fn shared<R: ModelRegistry>(registry: R) -> SharedRegistry<R> {
    Arc::new(RwLock::new(registry))
}

pub(crate) fn read<R: ModelRegistry + ?Sized>(
    registry: &RwLock<R>,
) -> Result<RwLockReadGuard<'_, R>> {
    registry.read().map_err(|e| RegistryError::Internal(format!("registry lock poisoned: {e}")))
}

pub(crate) fn write<R: ModelRegistry + ?Sized>(
    registry: &RwLock<R>,
) -> Result<RwLockWriteGuard<'_, R>> {
    registry.write().map_err(|e| RegistryError::Internal(format!("registry lock poisoned: {e}")))
}
