//! Shadow model training on temporal windows

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::decision::TriggerReason;
use crate::data::{
    DatasetFingerprint, DateColumn, LabelRecord, LabeledPrediction, PredictionRecord, SplitError,
    TemporalWindows, FEATURE_COLUMNS,
};
use crate::error::{best_effort, Result};
use crate::eval::{evaluate_predictions, EvalFrame, MetricsBundle};
use crate::model::{Classifier, ClassifierTrainer, Hyperparameters, ModelArtifact};
use crate::registry::{self, ModelRegistry, ModelStage, NewModelVersion, SharedRegistry};
use crate::tracking::{ExperimentTracker, RunStatus, TrackingBackend};

/// Trainer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub min_eval_samples: usize,
    /// Share of labeled rows (by application date) used for training when
    /// windows are planned from the data
    pub train_fraction: f64,
    pub hyperparameters: Hyperparameters,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self { min_eval_samples: 30, train_fraction: 0.7, hyperparameters: Hyperparameters::default() }
    }
}

/// Outcome of data validation; training must not start when `valid` is false
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStatus {
    pub valid: bool,
    pub message: String,
    pub issues: Vec<String>,
}

impl ValidationStatus {
    fn ok() -> Self {
        Self { valid: true, message: "OK".to_string(), issues: Vec::new() }
    }

    fn fail(&mut self, issue: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.message = message.into();
        self.issues.push(issue.into());
    }
}

/// Joined, deduplicated and temporally split training data
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub windows: TemporalWindows,
    pub train: Vec<LabeledPrediction>,
    pub eval: Vec<LabeledPrediction>,
    pub validation: ValidationStatus,
}

fn feature_matrix(rows: &[LabeledPrediction]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| r.features().to_array().to_vec()).collect()
}

fn label_vector(rows: &[LabeledPrediction]) -> Vec<u8> {
    rows.iter().map(|r| r.true_label).collect()
}

fn class_count(labels: &[u8]) -> usize {
    labels.iter().collect::<HashSet<_>>().len()
}

impl PreparedData {
    pub fn x_train(&self) -> Vec<Vec<f64>> {
        feature_matrix(&self.train)
    }

    pub fn y_train(&self) -> Vec<u8> {
        label_vector(&self.train)
    }

    pub fn x_eval(&self) -> Vec<Vec<f64>> {
        feature_matrix(&self.eval)
    }

    pub fn y_eval(&self) -> Vec<u8> {
        label_vector(&self.eval)
    }

    /// Eval split as a frame for replay evaluation
    pub fn eval_frame(&self) -> EvalFrame {
        EvalFrame::from_labeled(&self.eval)
    }
}

/// Successfully trained and staged challenger
#[derive(Debug, Clone)]
pub struct TrainedShadow {
    pub run_id: String,
    pub version: u32,
    pub model: ModelArtifact,
    /// Metrics on the eval split; diagnostic only, never used for promotion
    pub diagnostics: MetricsBundle,
    pub fingerprint: DatasetFingerprint,
}

/// Result of a training attempt
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    /// Data validation failed; nothing was fitted
    Aborted { run_id: String, reason: String },
    Success(Box<TrainedShadow>),
}

/// Trains challengers and registers them in `Staging`
pub struct ShadowTrainer<R: ModelRegistry, B: TrackingBackend, T: ClassifierTrainer> {
    registry: SharedRegistry<R>,
    tracker: ExperimentTracker<B>,
    trainer: T,
    model_name: String,
    config: TrainerConfig,
}

impl<R: ModelRegistry, B: TrackingBackend, T: ClassifierTrainer> ShadowTrainer<R, B, T> {
    pub fn new(
        registry: SharedRegistry<R>,
        tracker: ExperimentTracker<B>,
        trainer: T,
        model_name: impl Into<String>,
        config: TrainerConfig,
    ) -> Self {
        let model_name = model_name.into();
        let mut tracker = tracker;
        tracker.add_tag("model_name", model_name.as_str());
        Self { registry, tracker, trainer, model_name, config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ExperimentTracker<B> {
        &self.tracker
    }

    /// Join, deduplicate and split by `application_date`.
    ///
    /// Overlapping windows are a caller bug and fail with
    /// [`SplitError::TemporalLeak`]. Inadequate data (nothing labeled, an
    /// empty window, a small or single-class eval set) is reported through
    /// `validation` instead.
    #[instrument(skip(self, predictions, labels), fields(num_predictions = predictions.len(), num_labels = labels.len()))]
    pub fn prepare_training_data_temporal(
        &self,
        predictions: &[PredictionRecord],
        labels: &[LabelRecord],
        train_end: DateTime<Utc>,
        eval_start: DateTime<Utc>,
        eval_end: DateTime<Utc>,
    ) -> std::result::Result<PreparedData, SplitError> {
        let windows = TemporalWindows::new(train_end, eval_start, eval_end)?;
        let mut validation = ValidationStatus::ok();
        let empty = |windows, validation| PreparedData {
            windows,
            train: Vec::new(),
            eval: Vec::new(),
            validation,
        };

        let merged = inner_join(predictions, labels);
        if merged.is_empty() {
            validation.fail("no_labeled_data", "No labeled data available");
            warn!("no labeled data available");
            return Ok(empty(windows, validation));
        }

        let (merged, duplicates) = dedupe_keep_last(merged);
        if duplicates > 0 {
            warn!(duplicates, "duplicate prediction ids after join; keeping last");
            validation.issues.push(format!("dropped_{duplicates}_duplicates"));
        }
        info!(samples = merged.len(), "labeled samples after deduplication");

        let (train, eval) = match windows.split(&merged, DateColumn::ApplicationDate) {
            Ok(split) => split,
            Err(SplitError::EmptyWindow { window }) => {
                validation.fail(format!("empty_{window}_window"), format!("Empty {window} window"));
                warn!(%window, "temporal window is empty");
                return Ok(empty(windows, validation));
            }
            Err(e) => return Err(e),
        };

        let min_eval = self.config.min_eval_samples;
        if eval.len() < min_eval {
            validation.fail("eval_too_small", format!("Eval set too small: {} < {min_eval}", eval.len()));
            warn!(message = %validation.message, "eval validation failed");
        }
        let eval_classes = class_count(&label_vector(&eval));
        if eval_classes < 2 {
            validation.fail(
                "eval_single_class",
                format!("Eval set is single-class: {eval_classes} class(es) found"),
            );
            warn!(message = %validation.message, "eval validation failed");
        }
        let train_classes = class_count(&label_vector(&train));
        if train_classes < 2 {
            validation.fail(
                "train_single_class",
                format!("Train set is single-class: {train_classes} class(es) found"),
            );
            warn!(message = %validation.message, "train validation failed");
        }
        if validation.valid {
            info!(eval_samples = eval.len(), eval_classes, "eval set validation passed");
        }

        Ok(PreparedData { windows, train, eval, validation })
    }

    /// Fit, diagnose and stage a challenger.
    ///
    /// An invalid `prepared.validation` aborts before fitting and is a normal
    /// outcome. Every attempt gets a tracking run.
    #[instrument(skip(self, prepared), fields(model = %self.model_name, %trigger))]
    pub fn train_shadow_model(
        &mut self,
        prepared: &PreparedData,
        trigger: TriggerReason,
    ) -> Result<TrainOutcome> {
        let run_name = format!("shadow_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let run_id = self.tracker.start_run(Some(&run_name))?;
        let validation = &prepared.validation;

        let status = if validation.valid { "valid" } else { "invalid" };
        self.tracker.log_param(&run_id, "data_validation_status", status)?;
        self.tracker.log_param(&run_id, "validation_message", validation.message.as_str())?;
        if !validation.issues.is_empty() {
            self.tracker.log_param(&run_id, "validation_issues", validation.issues.join(","))?;
        }
        self.tracker.log_param(&run_id, "model_type", self.trainer.model_type())?;
        self.tracker.log_param(&run_id, "trigger_reason", trigger.as_str())?;

        if !validation.valid {
            error!(run_id = %run_id, reason = %validation.message, "data validation failed; training aborted");
            self.tracker.log_param(&run_id, "training_status", "aborted_validation_failure")?;
            self.tracker.set_tag(&run_id, "outcome", "aborted")?;
            self.tracker.end_run(&run_id, RunStatus::Aborted)?;
            return Ok(TrainOutcome::Aborted { run_id, reason: validation.message.clone() });
        }

        match self.fit_and_stage(&run_id, prepared, trigger) {
            Ok(trained) => {
                self.tracker.set_tag(&run_id, "outcome", "staged")?;
                self.tracker.end_run(&run_id, RunStatus::Completed)?;
                info!(run_id = %run_id, version = trained.version, "shadow model staged");
                Ok(TrainOutcome::Success(Box::new(trained)))
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "shadow training failed");
                best_effort("close failed tracking run", || {
                    self.tracker.set_tag(&run_id, "outcome", "failed")?;
                    self.tracker.end_run(&run_id, RunStatus::Failed)
                });
                Err(e)
            }
        }
    }

    fn fit_and_stage(
        &mut self,
        run_id: &str,
        prepared: &PreparedData,
        trigger: TriggerReason,
    ) -> Result<TrainedShadow> {
        let (x_train, y_train) = (prepared.x_train(), prepared.y_train());
        let (x_eval, y_eval) = (prepared.x_eval(), prepared.y_eval());

        self.tracker.log_param(run_id, "train_size", x_train.len().to_string())?;
        self.tracker.log_param(run_id, "eval_size", x_eval.len().to_string())?;
        self.tracker.log_params(run_id, self.trainer.params())?;

        let all_rows: Vec<Vec<f64>> = x_train.iter().chain(&x_eval).cloned().collect();
        let fingerprint = DatasetFingerprint::compute(&FEATURE_COLUMNS, &all_rows);
        self.tracker.log_params(run_id, fingerprint.to_params())?;

        let model = self.trainer.fit(&FEATURE_COLUMNS, &x_train, &y_train)?;

        let y_prob = model.predict_proba(&x_eval)?;
        let y_pred: Vec<u8> = y_prob.iter().map(|p| u8::from(*p >= 0.5)).collect();
        let diagnostics = evaluate_predictions(&y_eval, &y_pred, &y_prob)?;
        self.log_diagnostics(run_id, &diagnostics)?;

        let windows = prepared.windows;
        let new_version = NewModelVersion::new(model.clone())
            .with_run_id(run_id)
            .with_context("trigger_reason", trigger.as_str())
            .with_context("train_end", windows.train_end.to_rfc3339())
            .with_context("eval_start", windows.eval_start.to_rfc3339())
            .with_context("eval_end", windows.eval_end.to_rfc3339())
            .with_context("dataset_hash", fingerprint.hash.as_str())
            .with_metric("diagnostic_f1_score", diagnostics.f1())
            .with_metric("diagnostic_brier_score", diagnostics.brier());

        let version = {
            let mut registry = registry::write(&self.registry)?;
            let registered = registry.register(&self.model_name, new_version)?;
            registry.transition_stage(
                &self.model_name,
                registered.version,
                ModelStage::Staging,
                Some("shadow_trainer"),
            )?;
            registered.version
        };
        self.tracker.log_param(run_id, "registered_version", version.to_string())?;
        info!(version, "model registered -> Staging");

        Ok(TrainedShadow { run_id: run_id.to_string(), version, model, diagnostics, fingerprint })
    }

    fn log_diagnostics(&mut self, run_id: &str, metrics: &MetricsBundle) -> Result<()> {
        for (name, value) in metrics.primary_metrics.entries() {
            self.tracker.log_metric(run_id, &format!("diagnostic_{name}"), value, 0)?;
            info!(metric = name, value, "diagnostic");
        }
        self.tracker.log_metric(run_id, "diagnostic_brier_score", metrics.brier(), 0)?;
        if let Some(ece) = metrics.calibration_metrics.expected_calibration_error {
            self.tracker.log_metric(run_id, "diagnostic_expected_calibration_error", ece, 0)?;
        }

        let cm = metrics.confusion_matrix;
        for (name, value) in [
            ("confusion_matrix_tn", cm.true_negatives),
            ("confusion_matrix_fp", cm.false_positives),
            ("confusion_matrix_fn", cm.false_negatives),
            ("confusion_matrix_tp", cm.true_positives),
        ] {
            self.tracker.log_metric(run_id, name, value as f64, 0)?;
        }
        info!(
            tn = cm.true_negatives,
            fp = cm.false_positives,
            fn_ = cm.false_negatives,
            tp = cm.true_positives,
            "diagnostic confusion matrix"
        );
        if cm.is_perfect() {
            warn!("perfect predictions on the eval split (no FP/FN); check for leakage or duplication");
        }
        Ok(())
    }
}

/// Every (prediction, label) pair sharing an id, in prediction order
fn inner_join(predictions: &[PredictionRecord], labels: &[LabelRecord]) -> Vec<LabeledPrediction> {
    let mut by_id: HashMap<&str, Vec<&LabelRecord>> = HashMap::new();
    for label in labels {
        by_id.entry(label.prediction_id.as_str()).or_default().push(label);
    }
    predictions
        .iter()
        .flat_map(|p| {
            by_id.get(p.prediction_id.as_str()).into_iter().flatten().map(move |l| LabeledPrediction {
                prediction: p.clone(),
                true_label: l.true_label,
                label_source: l.label_source.clone(),
                days_delayed: l.days_delayed,
            })
        })
        .collect()
}

/// Keep the last row per prediction id, in last-occurrence order
fn dedupe_keep_last(rows: Vec<LabeledPrediction>) -> (Vec<LabeledPrediction>, usize) {
    let total = rows.len();
    let mut last_index: HashMap<String, usize> = HashMap::with_capacity(total);
    for (i, row) in rows.iter().enumerate() {
        last_index.insert(row.prediction_id().to_string(), i);
    }
    let kept: Vec<LabeledPrediction> = rows
        .into_iter()
        .enumerate()
        .filter(|(i, row)| last_index.get(row.prediction_id()) == Some(i))
        .map(|(_, row)| row)
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}
