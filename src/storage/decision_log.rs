//! Append-only decision audit log
//!
//! Every terminal outcome of a retraining run is written as its own
//! timestamped JSON file and never rewritten. The cooldown gate reads a single
//! `last_promotion.json` pointer instead of scanning the directory; the
//! pointer is moved only by `promote` records and is rebuilt from the audit
//! files if it goes missing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{io_at, write_atomic, Result, StorageError};
use crate::retrain::{DecisionAction, DecisionRecord};

/// Pointer file holding the most recent promotion
pub const LAST_PROMOTION_FILE: &str = "last_promotion.json";

/// Audit log of promotion decisions
pub trait DecisionLog: Send + Sync {
    /// Persist a new record; existing records are never modified
    fn append(&self, record: &DecisionRecord) -> Result<()>;

    /// Timestamp of the most recent `promote` record
    fn last_promotion(&self) -> Result<Option<DateTime<Utc>>>;

    /// Most recent records first
    fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<DecisionRecord>,
    last_promotion: Option<DateTime<Utc>>,
}

/// In-memory decision log for testing
#[derive(Debug, Default)]
pub struct InMemoryDecisionLog {
    state: Mutex<MemoryState>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log whose last promotion happened at `at`
    pub fn with_last_promotion(at: DateTime<Utc>) -> Self {
        let log = Self::default();
        if let Ok(mut state) = log.state.lock() {
            state.last_promotion = Some(at);
        }
        log
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.state.lock().map(|s| s.records.clone()).unwrap_or_default()
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, record: &DecisionRecord) -> Result<()> {
        let mut state = self.state.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        if record.action == DecisionAction::Promote {
            state.last_promotion = state.last_promotion.max(Some(record.timestamp));
        }
        state.records.push(record.clone());
        Ok(())
    }

    fn last_promotion(&self) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(state.last_promotion)
    }

    fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>> {
        let state = self.state.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(state.records.iter().rev().take(limit).cloned().collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PromotionPointer {
    timestamp: DateTime<Utc>,
    record_id: String,
}

/// Directory of `decision_<timestamp>_<action>.json` files
#[derive(Debug)]
pub struct JsonDecisionLog {
    dir: PathBuf,
    pointer_lock: Mutex<()>,
}

impl JsonDecisionLog {
    /// Open the log, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        Ok(Self { dir, pointer_lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(LAST_PROMOTION_FILE)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(io_at(&self.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                    n.starts_with("decision_") && n.ends_with(".json")
                })
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_record(path: &Path) -> Option<DecisionRecord> {
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read decision record");
                None
            }
        }
    }

    fn write_pointer(&self, pointer: &PromotionPointer) -> Result<()> {
        let json = serde_json::to_vec_pretty(pointer)?;
        write_atomic(&self.pointer_path(), &json)
    }

    fn read_pointer(&self) -> Result<Option<PromotionPointer>> {
        let path = self.pointer_path();
        match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(p) => Ok(Some(p)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable promotion pointer; rebuilding");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_at(&path)(e)),
        }
    }

    /// Rebuild the pointer from the audit files
    fn rebuild_pointer(&self) -> Result<Option<PromotionPointer>> {
        let latest = self
            .record_files()?
            .iter()
            .filter_map(|p| Self::read_record(p))
            .filter(|r| r.action == DecisionAction::Promote)
            .max_by_key(|r| r.timestamp)
            .map(|r| PromotionPointer { timestamp: r.timestamp, record_id: r.record_id });

        if let Some(pointer) = &latest {
            self.write_pointer(pointer)?;
            info!(timestamp = %pointer.timestamp, "rebuilt last-promotion pointer from audit files");
        }
        Ok(latest)
    }
}

impl DecisionLog for JsonDecisionLog {
    fn append(&self, record: &DecisionRecord) -> Result<()> {
        let stem = format!(
            "decision_{}_{}",
            record.timestamp.format("%Y%m%dT%H%M%S_%6f"),
            record.action.as_str()
        );
        let json = serde_json::to_vec_pretty(record)?;

        // create_new: an existing audit file is never overwritten
        let mut attempt = 0u32;
        let path = loop {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&json).map_err(io_at(&path))?;
                    break path;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(io_at(&path)(e)),
            }
        };
        info!(action = record.action.as_str(), path = %path.display(), "decision recorded");

        if record.action == DecisionAction::Promote {
            let _guard =
                self.pointer_lock.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
            let current = self.read_pointer()?;
            if current.as_ref().is_none_or(|p| p.timestamp <= record.timestamp) {
                self.write_pointer(&PromotionPointer {
                    timestamp: record.timestamp,
                    record_id: record.record_id.clone(),
                })?;
            }
        }
        Ok(())
    }

    fn last_promotion(&self) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.pointer_lock.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        let pointer = match self.read_pointer()? {
            Some(p) => Some(p),
            None => self.rebuild_pointer()?,
        };
        Ok(pointer.map(|p| p.timestamp))
    }

    fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>> {
        let mut records: Vec<DecisionRecord> =
            self.record_files()?.iter().filter_map(|p| Self::read_record(p)).collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}
