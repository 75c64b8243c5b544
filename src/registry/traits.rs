//! Model registry trait definition

use super::error::Result;
use super::stage::ModelStage;
use super::transition::StageTransition;
use super::version::{ModelVersion, NewModelVersion, VersionFilter};
use crate::model::ModelArtifact;

/// Model registry trait
///
/// Remote implementations must bound every call with a timeout and surface
/// expiry as [`RegistryError::Unavailable`](super::RegistryError::Unavailable).
pub trait ModelRegistry: Send + Sync {
    /// Register a new version (stage `None`)
    fn register(&mut self, name: &str, new: NewModelVersion) -> Result<ModelVersion>;

    /// Load the model artifact for a version
    fn load(&self, name: &str, version: u32) -> Result<ModelArtifact>;

    /// Get a version's metadata
    fn get_version(&self, name: &str, version: u32) -> Result<ModelVersion>;

    /// Latest version at a stage; `None` if the model or stage is empty
    fn get_latest(&self, name: &str, stage: ModelStage) -> Result<Option<ModelVersion>>;

    /// Move a version to a new stage
    fn transition_stage(
        &mut self,
        name: &str,
        version: u32,
        target: ModelStage,
        actor: Option<&str>,
    ) -> Result<ModelVersion>;

    /// Versions matching a filter, newest first
    fn search_versions(&self, name: &str, filter: &VersionFilter) -> Result<Vec<ModelVersion>>;

    /// Attach a gate decision id to a version
    fn link_decision(&mut self, name: &str, version: u32, decision_id: &str) -> Result<()>;

    /// Transition history for a model, oldest first
    fn transition_history(&self, name: &str) -> Result<Vec<StageTransition>>;
}
