//! Idempotent label store

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{io_at, write_atomic, Result, StorageError};
use crate::data::{LabelRecord, LabeledPrediction, PredictionRecord, SchemaError};

/// Persistence behind a [`LabelStore`]
pub trait LabelBackend: Send + Sync {
    /// Load every persisted label row
    fn load(&self) -> Result<Vec<LabelRecord>>;

    /// Replace the persisted rows
    fn save(&self, labels: &[LabelRecord]) -> Result<()>;
}

/// In-memory backend for testing
#[derive(Debug, Default)]
pub struct InMemoryLabelBackend {
    rows: Mutex<Vec<LabelRecord>>,
}

impl InMemoryLabelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw rows, including ones that violate the one-label-per-id rule
    pub fn with_rows(rows: Vec<LabelRecord>) -> Self {
        Self { rows: Mutex::new(rows) }
    }

    /// Number of raw persisted rows
    pub fn raw_len(&self) -> usize {
        self.rows.lock().map_or(0, |r| r.len())
    }
}

impl LabelBackend for InMemoryLabelBackend {
    fn load(&self) -> Result<Vec<LabelRecord>> {
        let rows = self.rows.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(rows.clone())
    }

    fn save(&self, labels: &[LabelRecord]) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        *rows = labels.to_vec();
        Ok(())
    }
}

/// JSON file backend: one array of label rows, replaced atomically on save
#[derive(Debug)]
pub struct JsonFileLabelBackend {
    path: PathBuf,
}

impl JsonFileLabelBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl LabelBackend for JsonFileLabelBackend {
    fn load(&self) -> Result<Vec<LabelRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(json) if json.trim().is_empty() => Ok(Vec::new()),
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_at(&self.path)(e)),
        }
    }

    fn save(&self, labels: &[LabelRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let json = serde_json::to_vec_pretty(labels)?;
        write_atomic(&self.path, &json)
    }
}

/// Outcome of a label upsert
#[derive(Debug, Clone, PartialEq)]
pub enum LabelWrite {
    /// First label for this prediction
    Inserted,
    /// Same value re-delivered; metadata refreshed
    Updated,
    /// Value changed; newest wins
    Conflict { previous: u8 },
}

/// Label coverage over a set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelCoverage {
    pub total_predictions: usize,
    pub labeled_predictions: usize,
    /// `labeled / total`, 0 when there are no predictions
    pub coverage_rate: f64,
    pub unlabeled_predictions: usize,
}

impl LabelCoverage {
    pub fn from_counts(total: usize, labeled: usize) -> Self {
        let labeled = labeled.min(total);
        Self {
            total_predictions: total,
            labeled_predictions: labeled,
            coverage_rate: if total == 0 { 0.0 } else { labeled as f64 / total as f64 },
            unlabeled_predictions: total - labeled,
        }
    }

    pub fn coverage_pct(&self) -> f64 {
        self.coverage_rate * 100.0
    }
}

/// Ground-truth store with exactly one live label per prediction id.
///
/// Writers are serialized in-process; the invariant is enforced by
/// upsert-on-write and dedupe (keep last) on read.
#[derive(Debug)]
pub struct LabelStore<B: LabelBackend> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: LabelBackend> LabelStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, write_lock: Mutex::new(()) }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Upsert a label received now
    pub fn store_label(
        &self,
        prediction_id: &str,
        true_label: u8,
        source: &str,
        prediction_timestamp: Option<DateTime<Utc>>,
    ) -> Result<LabelWrite> {
        self.store_label_at(prediction_id, true_label, source, prediction_timestamp, Utc::now())
    }

    /// Upsert a label with an explicit arrival time
    pub fn store_label_at(
        &self,
        prediction_id: &str,
        true_label: u8,
        source: &str,
        prediction_timestamp: Option<DateTime<Utc>>,
        label_timestamp: DateTime<Utc>,
    ) -> Result<LabelWrite> {
        if prediction_id.trim().is_empty() {
            return Err(SchemaError::invalid("prediction_id", "must not be empty").into());
        }
        if true_label > 1 {
            return Err(SchemaError::invalid(
                "true_label",
                format!("expected 0 or 1, got {true_label}"),
            )
            .into());
        }

        let days_delayed = prediction_timestamp
            .map(|p| (label_timestamp - p).num_seconds().div_euclid(86_400));

        let _guard = self.write_lock.lock().map_err(|e| StorageError::Lock(e.to_string()))?;
        let (mut rows, _) = dedupe_keep_last(self.backend.load()?);

        let outcome = match rows.iter_mut().find(|r| r.prediction_id == prediction_id) {
            Some(existing) => {
                let previous = existing.true_label;
                existing.true_label = true_label;
                existing.label_timestamp = label_timestamp;
                existing.label_source = source.to_string();
                existing.days_delayed = days_delayed.or(existing.days_delayed);
                existing.updated_at = label_timestamp;
                if previous == true_label {
                    debug!(prediction_id, "label re-delivered with same value");
                    LabelWrite::Updated
                } else {
                    warn!(
                        prediction_id,
                        old_label = previous,
                        new_label = true_label,
                        source,
                        "label conflict; newest value wins"
                    );
                    LabelWrite::Conflict { previous }
                }
            }
            None => {
                rows.push(LabelRecord {
                    prediction_id: prediction_id.to_string(),
                    true_label,
                    label_timestamp,
                    label_source: source.to_string(),
                    days_delayed,
                    updated_at: label_timestamp,
                });
                LabelWrite::Inserted
            }
        };

        self.backend.save(&rows)?;
        Ok(outcome)
    }

    /// All live labels, deduplicated (keep last)
    pub fn load_labels(&self) -> Result<Vec<LabelRecord>> {
        let (rows, duplicates) = dedupe_keep_last(self.backend.load()?);
        if duplicates > 0 {
            error!(
                duplicates,
                "label store holds duplicate prediction ids; idempotency violated in persistence layer"
            );
        }
        Ok(rows)
    }

    /// Live label for one prediction
    pub fn get_label(&self, prediction_id: &str) -> Result<Option<LabelRecord>> {
        Ok(self.load_labels()?.into_iter().find(|r| r.prediction_id == prediction_id))
    }

    /// Inner join of `predictions` with live labels, in prediction order
    pub fn get_labeled_predictions(
        &self,
        predictions: &[PredictionRecord],
    ) -> Result<Vec<LabeledPrediction>> {
        let labels: HashMap<String, LabelRecord> =
            self.load_labels()?.into_iter().map(|l| (l.prediction_id.clone(), l)).collect();

        let joined: Vec<LabeledPrediction> = predictions
            .iter()
            .filter_map(|p| {
                labels.get(&p.prediction_id).map(|l| LabeledPrediction {
                    prediction: p.clone(),
                    true_label: l.true_label,
                    label_source: l.label_source.clone(),
                    days_delayed: l.days_delayed,
                })
            })
            .collect();

        info!(predictions = predictions.len(), labeled = joined.len(), "joined predictions with labels");
        Ok(joined)
    }

    /// Coverage over the distinct prediction ids in `predictions`
    pub fn get_label_coverage(&self, predictions: &[PredictionRecord]) -> Result<LabelCoverage> {
        let labeled_ids: HashSet<String> =
            self.load_labels()?.into_iter().map(|l| l.prediction_id).collect();
        let ids: HashSet<&str> = predictions.iter().map(|p| p.prediction_id.as_str()).collect();
        let labeled = ids.iter().filter(|id| labeled_ids.contains(**id)).count();
        Ok(LabelCoverage::from_counts(ids.len(), labeled))
    }
}

/// Keep the last row per prediction id, preserving first-seen order
fn dedupe_keep_last(rows: Vec<LabelRecord>) -> (Vec<LabelRecord>, usize) {
    let total = rows.len();
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, LabelRecord> = HashMap::with_capacity(total);
    for row in rows {
        if !latest.contains_key(&row.prediction_id) {
            order.push(row.prediction_id.clone());
        }
        latest.insert(row.prediction_id.clone(), row);
    }
    let deduped: Vec<LabelRecord> = order.into_iter().filter_map(|id| latest.remove(&id)).collect();
    let duplicates = total - deduped.len();
    (deduped, duplicates)
}
