//! Experiment run tracking
//!
//! Every shadow-training attempt, including aborted ones, gets a run with
//! its parameters, metrics and tags. The run id is the lineage key stored on
//! the registered model version and on the decision record.
//!
//! # Example
//!
//! ```ignore
//! use retrainer::tracking::{ExperimentTracker, InMemoryBackend, RunStatus};
//!
//! let mut tracker = ExperimentTracker::new("shadow-training", InMemoryBackend::new());
//! let run_id = tracker.start_run(Some("shadow-scheduled"))?;
//! tracker.log_param(&run_id, "model_type", "logistic_regression")?;
//! tracker.log_metric(&run_id, "diagnostic_f1_score", 0.71, 0)?;
//! tracker.end_run(&run_id, RunStatus::Completed)?;
//! ```

pub mod storage;


use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use storage::{InMemoryBackend, JsonFileBackend, TrackingBackend, TrackingStorageError};

/// Status of a tracking run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
    /// Stopped before fitting, e.g. on invalid data
    Aborted,
    Failed,
}

/// One recorded metric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    pub step: u64,
}

/// A single tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: Option<String>,
    pub experiment_name: String,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
    pub tags: BTreeMap<String, String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Run {
    fn new(run_name: Option<String>, experiment_name: String) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name,
            experiment_name,
            status: RunStatus::Active,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Most recently logged value of a metric
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|points| points.last()).map(|p| p.value)
    }
}

/// Errors from experiment tracking operations
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run is not active: {0}")]
    RunNotActive(String),

    #[error("Storage error: {0}")]
    Storage(#[from] TrackingStorageError),
}

/// Result alias for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Manages runs under one experiment name.
///
/// Active runs live in memory and are persisted to the backend when ended.
#[derive(Debug)]
pub struct ExperimentTracker<B: TrackingBackend> {
    experiment_name: String,
    tags: BTreeMap<String, String>,
    backend: B,
    active_runs: HashMap<String, Run>,
}

impl<B: TrackingBackend> ExperimentTracker<B> {
    pub fn new(experiment_name: impl Into<String>, backend: B) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            tags: BTreeMap::new(),
            backend,
            active_runs: HashMap::new(),
        }
    }

    /// Experiment-level tag, inherited by runs started afterwards
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start a run and return its id
    pub fn start_run(&mut self, run_name: Option<&str>) -> Result<String> {
        let mut run = Run::new(run_name.map(String::from), self.experiment_name.clone());
        run.tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        let run_id = run.run_id.clone();
        self.active_runs.insert(run_id.clone(), run);
        Ok(run_id)
    }

    /// Close a run and persist it
    pub fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<Run> {
        let mut run = self
            .active_runs
            .remove(run_id)
            .ok_or_else(|| TrackingError::RunNotFound(run_id.to_string()))?;
        run.status = status;
        run.end_time = Some(Utc::now());
        self.backend.save_run(&run)?;
        Ok(run)
    }

    fn active(&mut self, run_id: &str) -> Result<&mut Run> {
        self.active_runs
            .get_mut(run_id)
            .ok_or_else(|| TrackingError::RunNotActive(run_id.to_string()))
    }

    pub fn log_param(&mut self, run_id: &str, key: &str, value: impl Into<String>) -> Result<()> {
        self.active(run_id)?.params.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn log_params<I, K, V>(&mut self, run_id: &str, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let run = self.active(run_id)?;
        run.params.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        Ok(())
    }

    pub fn log_metric(&mut self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        self.active(run_id)?
            .metrics
            .entry(key.to_string())
            .or_default()
            .push(MetricPoint { value, step });
        Ok(())
    }

    pub fn set_tag(&mut self, run_id: &str, key: &str, value: impl Into<String>) -> Result<()> {
        self.active(run_id)?.tags.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Active runs first, then the backend
    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        if let Some(run) = self.active_runs.get(run_id) {
            return Ok(run.clone());
        }
        self.backend.load_run(run_id).map_err(|e| match e {
            TrackingStorageError::RunNotFound(id) => TrackingError::RunNotFound(id),
            other => TrackingError::Storage(other),
        })
    }

    /// Active and persisted runs, newest first
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.active_runs.values().cloned().collect();
        runs.extend(
            self.backend
                .list_runs()?
                .into_iter()
                .filter(|r| !self.active_runs.contains_key(&r.run_id)),
        );
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(runs)
    }
}
