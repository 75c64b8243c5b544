//! JSON file-backed model registry

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{RegistryError, Result};
use super::memory::InMemoryRegistry;
use super::stage::ModelStage;
use super::traits::ModelRegistry;
use super::transition::StageTransition;
use super::version::{ModelVersion, NewModelVersion, VersionFilter};
use crate::model::ModelArtifact;

/// Registry persisted as a single JSON document.
///
/// Mutations are applied to a copy of the state, written to disk, and only
/// then swapped in, so a failed write leaves both disk and memory unchanged.
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    state: InMemoryRegistry,
}

impl JsonFileRegistry {
    /// Open the registry at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                RegistryError::Internal(format!("corrupt registry {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => InMemoryRegistry::new(),
            Err(e) => {
                return Err(RegistryError::Unavailable(format!("{}: {e}", path.display())));
            }
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &InMemoryRegistry) -> Result<()> {
        let unavailable = |e: String| {
            RegistryError::Unavailable(format!("failed to persist {}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| unavailable(e.to_string()))?;
        crate::storage::write_atomic(&self.path, &json).map_err(|e| unavailable(e.to_string()))
    }

    fn mutate<T>(&mut self, f: impl FnOnce(&mut InMemoryRegistry) -> Result<T>) -> Result<T> {
        let mut next = self.state.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        self.state = next;
        Ok(out)
    }
}

impl ModelRegistry for JsonFileRegistry {
    fn register(&mut self, name: &str, new: NewModelVersion) -> Result<ModelVersion> {
        self.mutate(|s| s.register(name, new))
    }

    fn load(&self, name: &str, version: u32) -> Result<ModelArtifact> {
        self.state.load(name, version)
    }

    fn get_version(&self, name: &str, version: u32) -> Result<ModelVersion> {
        self.state.get_version(name, version)
    }

    fn get_latest(&self, name: &str, stage: ModelStage) -> Result<Option<ModelVersion>> {
        self.state.get_latest(name, stage)
    }

    fn transition_stage(
        &mut self,
        name: &str,
        version: u32,
        target: ModelStage,
        actor: Option<&str>,
    ) -> Result<ModelVersion> {
        self.mutate(|s| s.transition_stage(name, version, target, actor))
    }

    fn search_versions(&self, name: &str, filter: &VersionFilter) -> Result<Vec<ModelVersion>> {
        self.state.search_versions(name, filter)
    }

    fn link_decision(&mut self, name: &str, version: u32, decision_id: &str) -> Result<()> {
        self.mutate(|s| s.link_decision(name, version, decision_id))
    }

    fn transition_history(&self, name: &str) -> Result<Vec<StageTransition>> {
        self.state.transition_history(name)
    }
}
