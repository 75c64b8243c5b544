//! Model version metadata

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::ModelStage;
use crate::model::ModelArtifact;

/// Model version record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    /// Monotonically increasing per model name
    pub version: u32,
    pub stage: ModelStage,
    /// Training run that produced this version
    pub run_id: Option<String>,
    /// Trigger, window boundaries, dataset fingerprint
    pub training_context: BTreeMap<String, String>,
    pub metrics: HashMap<String, f64>,
    /// Gate decision that last moved this version
    pub decision_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub promoted_by: Option<String>,
}

/// Input to `ModelRegistry::register`
#[derive(Debug, Clone)]
pub struct NewModelVersion {
    pub artifact: ModelArtifact,
    pub run_id: Option<String>,
    pub training_context: BTreeMap<String, String>,
    pub metrics: HashMap<String, f64>,
}

impl NewModelVersion {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self {
            artifact,
            run_id: None,
            training_context: BTreeMap::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.training_context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// Filter for `ModelRegistry::search_versions`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    pub run_id: Option<String>,
    pub stage: Option<ModelStage>,
}

impl VersionFilter {
    pub fn run_id(run_id: &str) -> Self {
        Self { run_id: Some(run_id.to_string()), stage: None }
    }

    pub fn stage(stage: ModelStage) -> Self {
        Self { run_id: None, stage: Some(stage) }
    }

    pub fn matches(&self, version: &ModelVersion) -> bool {
        self.run_id.as_ref().is_none_or(|r| version.run_id.as_ref() == Some(r))
            && self.stage.is_none_or(|s| version.stage == s)
    }
}
