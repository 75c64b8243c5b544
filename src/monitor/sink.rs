//! Write-only monitoring sink

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::drift::DriftDetails;
use super::proxy::ProxyStats;
use crate::storage::{self, io_at, write_atomic, StorageError};

/// Monitoring state captured at the start of a retraining run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub timestamp: DateTime<Utc>,
    pub proxy: Option<ProxyStats>,
    pub drift_flagged: bool,
    pub drift: DriftDetails,
}

/// Destination for monitoring snapshots; never read back by the pipeline
pub trait MonitoringSink: Send + Sync {
    fn write(&self, snapshot: &MonitoringSnapshot) -> storage::Result<()>;
}

/// One JSON file per snapshot
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MonitoringSink for JsonDirSink {
    fn write(&self, snapshot: &MonitoringSnapshot) -> storage::Result<()> {
        fs::create_dir_all(&self.dir).map_err(io_at(&self.dir))?;
        let name = format!("monitoring_{}.json", snapshot.timestamp.format("%Y%m%dT%H%M%S_%6f"));
        write_atomic(&self.dir.join(name), &serde_json::to_vec_pretty(snapshot)?)
    }
}

/// In-memory sink for testing
#[derive(Debug, Default)]
pub struct InMemorySink {
    snapshots: Mutex<Vec<MonitoringSnapshot>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<MonitoringSnapshot> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MonitoringSink for InMemorySink {
    fn write(&self, snapshot: &MonitoringSnapshot) -> storage::Result<()> {
        self.snapshots
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?
            .push(snapshot.clone());
        Ok(())
    }
}

impl<S: MonitoringSink + ?Sized> MonitoringSink for std::sync::Arc<S> {
    fn write(&self, snapshot: &MonitoringSnapshot) -> storage::Result<()> {
        (**self).write(snapshot)
    }
}
