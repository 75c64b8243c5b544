//! In-memory model registry

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{RegistryError, Result};
use super::stage::ModelStage;
use super::traits::ModelRegistry;
use super::transition::StageTransition;
use super::version::{ModelVersion, NewModelVersion, VersionFilter};
use crate::model::ModelArtifact;

/// In-memory model registry; also the persisted state of [`JsonFileRegistry`](super::JsonFileRegistry)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRegistry {
    /// Models by name -> version -> ModelVersion
    pub(crate) models: HashMap<String, HashMap<u32, ModelVersion>>,
    pub(crate) artifacts: HashMap<String, HashMap<u32, ModelArtifact>>,
    pub(crate) transitions: Vec<StageTransition>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self, name: &str) -> u32 {
        self.models.get(name).map_or(1, |versions| versions.keys().max().copied().unwrap_or(0) + 1)
    }

    fn version_mut(&mut self, name: &str, version: u32) -> Result<&mut ModelVersion> {
        self.models
            .get_mut(name)
            .and_then(|versions| versions.get_mut(&version))
            .ok_or_else(|| RegistryError::VersionNotFound(name.to_string(), version))
    }

    /// Versions currently in Production for a model
    pub fn production_versions(&self, name: &str) -> Vec<u32> {
        let mut v: Vec<u32> = self
            .models
            .get(name)
            .map(|versions| {
                versions.values().filter(|m| m.stage == ModelStage::Production).map(|m| m.version).collect()
            })
            .unwrap_or_default();
        v.sort_unstable();
        v
    }
}

impl ModelRegistry for InMemoryRegistry {
    fn register(&mut self, name: &str, new: NewModelVersion) -> Result<ModelVersion> {
        let version = self.next_version(name);
        let model = ModelVersion {
            name: name.to_string(),
            version,
            stage: ModelStage::None,
            run_id: new.run_id,
            training_context: new.training_context,
            metrics: new.metrics,
            decision_id: None,
            created_at: Utc::now(),
            promoted_at: None,
            promoted_by: None,
        };

        self.models.entry(name.to_string()).or_default().insert(version, model.clone());
        self.artifacts.entry(name.to_string()).or_default().insert(version, new.artifact);
        info!(model = name, version, "registered model version");
        Ok(model)
    }

    fn load(&self, name: &str, version: u32) -> Result<ModelArtifact> {
        self.artifacts
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| RegistryError::VersionNotFound(name.to_string(), version))
    }

    fn get_version(&self, name: &str, version: u32) -> Result<ModelVersion> {
        self.models
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| RegistryError::VersionNotFound(name.to_string(), version))
    }

    fn get_latest(&self, name: &str, stage: ModelStage) -> Result<Option<ModelVersion>> {
        Ok(self.models.get(name).and_then(|versions| {
            versions.values().filter(|m| m.stage == stage).max_by_key(|m| m.version).cloned()
        }))
    }

    fn transition_stage(
        &mut self,
        name: &str,
        version: u32,
        target: ModelStage,
        actor: Option<&str>,
    ) -> Result<ModelVersion> {
        let from = self.get_version(name, version)?.stage;
        if from == target {
            return self.get_version(name, version);
        }
        if !from.can_transition_to(target) {
            return Err(RegistryError::InvalidTransition {
                name: name.to_string(),
                version,
                from,
                to: target,
            });
        }
        if target == ModelStage::Production {
            if let Some(existing) = self.production_versions(name).into_iter().find(|v| *v != version) {
                return Err(RegistryError::ProductionConflict {
                    name: name.to_string(),
                    existing,
                    requested: version,
                });
            }
        }

        let now = Utc::now();
        let model = self.version_mut(name, version)?;
        model.stage = target;
        if target == ModelStage::Production {
            model.promoted_at = Some(now);
            model.promoted_by = actor.map(ToString::to_string);
        }
        let updated = model.clone();

        self.transitions.push(StageTransition {
            model_name: name.to_string(),
            version,
            from_stage: from,
            to_stage: target,
            timestamp: now,
            actor: actor.map(ToString::to_string),
        });
        info!(model = name, version, from = %from, to = %target, "stage transition");
        Ok(updated)
    }

    fn search_versions(&self, name: &str, filter: &VersionFilter) -> Result<Vec<ModelVersion>> {
        let mut found: Vec<ModelVersion> = self
            .models
            .get(name)
            .map(|versions| versions.values().filter(|m| filter.matches(m)).cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(found)
    }

    fn link_decision(&mut self, name: &str, version: u32, decision_id: &str) -> Result<()> {
        self.version_mut(name, version)?.decision_id = Some(decision_id.to_string());
        Ok(())
    }

    fn transition_history(&self, name: &str) -> Result<Vec<StageTransition>> {
        if !self.models.contains_key(name) {
            return Err(RegistryError::ModelNotFound(name.to_string()));
        }
        Ok(self.transitions.iter().filter(|t| t.model_name == name).cloned().collect())
    }
}
