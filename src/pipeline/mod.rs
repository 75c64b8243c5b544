//! One retraining run: check -> train -> evaluate -> gate -> promote/reject
//!
//! Services are constructed once and injected; [`FilePipeline::from_config`]
//! wires the file-backed implementations. At most one run may be in flight
//! per model; the scheduler enforces that, not this type.
//!
//! Every terminal outcome (skip, abort, reject, promote) lands in the
//! decision log. Drift is observed and attached to the gate decision, never
//! used to start or stop a run.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::data::{DateColumn, PredictionRecord, TemporalWindows, FEATURE_COLUMNS};
use crate::error::{best_effort, Result, RetrainError};
use crate::eval::{compare_models, EvalFrame, ReplayEvaluator};
use crate::model::{ClassifierTrainer, LogisticTrainer};
use crate::monitor::{
    DriftDetails, DriftSignalAggregator, DriftStatus, JsonDirSink, MonitoringSink,
    MonitoringSnapshot, ProxyStats,
};
use crate::registry::{self, shared, JsonFileRegistry, ModelRegistry, ModelStage, SharedRegistry};
use crate::retrain::{
    DecisionAction, DecisionRecord, EvaluationGate, GateDecision, ModelPromoter, ShadowTrainer,
    TrainOutcome, TrainedShadow, TriggerContext, TriggerReason,
};
use crate::storage::{
    DecisionLog, JsonDecisionLog, JsonFileLabelBackend, LabelBackend, LabelCoverage, LabelStore,
    PredictionLog,
};
use crate::tracking::{ExperimentTracker, JsonFileBackend, TrackingBackend};

/// Actor recorded on decisions made by a pipeline run
pub const PIPELINE_ACTOR: &str = "retraining_pipeline";

/// Terminal outcome of a run
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Readiness check failed; nothing was trained
    Skipped { reason: String, coverage: Option<LabelCoverage> },
    /// Training did not produce a challenger
    Aborted { run_id: Option<String>, reason: String },
    /// The gate kept the challenger out of production
    Rejected { run_id: String, shadow_version: u32, decision: GateDecision },
    Promoted {
        run_id: String,
        version: u32,
        previous_version: Option<u32>,
        first_deployment: bool,
        decision: GateDecision,
    },
}

impl PipelineOutcome {
    pub fn action(&self) -> DecisionAction {
        match self {
            PipelineOutcome::Skipped { .. } => DecisionAction::Skip,
            PipelineOutcome::Aborted { .. } => DecisionAction::Abort,
            PipelineOutcome::Rejected { .. } => DecisionAction::Reject,
            PipelineOutcome::Promoted { .. } => DecisionAction::Promote,
        }
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        match self {
            PipelineOutcome::Skipped { reason, .. } => format!("skipped: {reason}"),
            PipelineOutcome::Aborted { reason, .. } => format!("aborted: {reason}"),
            PipelineOutcome::Rejected { shadow_version, decision, .. } => {
                format!("rejected shadow v{shadow_version}: {}", decision.reason.join("; "))
            }
            PipelineOutcome::Promoted { version, previous_version, first_deployment, .. } => {
                match (first_deployment, previous_version) {
                    (true, _) => format!("promoted v{version} (first deployment)"),
                    (false, Some(prev)) => format!("promoted v{version} (archived v{prev})"),
                    (false, None) => format!("promoted v{version}"),
                }
            }
        }
    }
}

/// Services a pipeline runs against
pub struct PipelineServices<R, D, L, B, T>
where
    R: ModelRegistry,
    D: DecisionLog,
    L: LabelBackend,
    B: TrackingBackend,
    T: ClassifierTrainer,
{
    pub predictions: PredictionLog,
    pub labels: LabelStore<L>,
    pub registry: SharedRegistry<R>,
    pub decisions: Arc<D>,
    pub tracker: ExperimentTracker<B>,
    pub trainer: T,
    pub sink: Box<dyn MonitoringSink>,
}

/// Training step result; an abort has already been audited
enum Training {
    Ready(Box<TrainedShadow>, EvalFrame),
    Aborted(PipelineOutcome),
}

/// Pipeline over the file-backed services
pub type FilePipeline =
    RetrainingPipeline<JsonFileRegistry, JsonDecisionLog, JsonFileLabelBackend, JsonFileBackend, LogisticTrainer>;

/// Sequential retraining run over injected services
pub struct RetrainingPipeline<R, D, L, B, T>
where
    R: ModelRegistry,
    D: DecisionLog,
    L: LabelBackend,
    B: TrackingBackend,
    T: ClassifierTrainer,
{
    config: PipelineConfig,
    predictions: PredictionLog,
    labels: LabelStore<L>,
    registry: SharedRegistry<R>,
    decisions: Arc<D>,
    sink: Box<dyn MonitoringSink>,
    drift: DriftSignalAggregator,
    trainer: ShadowTrainer<R, B, T>,
    evaluator: ReplayEvaluator<R>,
    gate: EvaluationGate<D>,
    promoter: ModelPromoter<R, D>,
}

impl FilePipeline {
    /// Validate `config` and open every file-backed service it names
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let paths = &config.paths;
        let services = PipelineServices {
            predictions: PredictionLog::open(&paths.predictions_csv)?,
            labels: LabelStore::new(JsonFileLabelBackend::new(&paths.labels_json)),
            registry: shared(JsonFileRegistry::open(&paths.registry_file)?),
            decisions: Arc::new(JsonDecisionLog::new(&paths.decisions_dir)?),
            tracker: ExperimentTracker::new(
                format!("{}-shadow-training", config.model_name),
                JsonFileBackend::new(&paths.tracking_dir),
            ),
            trainer: LogisticTrainer::new(config.trainer.hyperparameters.clone()),
            sink: Box::new(JsonDirSink::new(paths.monitoring_dir.clone())),
        };
        Ok(Self::new(config, services))
    }
}

impl<R, D, L, B, T> RetrainingPipeline<R, D, L, B, T>
where
    R: ModelRegistry,
    D: DecisionLog,
    L: LabelBackend,
    B: TrackingBackend,
    T: ClassifierTrainer,
{
    pub fn new(config: PipelineConfig, services: PipelineServices<R, D, L, B, T>) -> Self {
        let name = config.model_name.clone();
        let PipelineServices { predictions, labels, registry, decisions, tracker, trainer, sink } =
            services;
        Self {
            drift: DriftSignalAggregator::new(
                config.paths.drift_reports_dir.clone(),
                config.drift.clone(),
            ),
            trainer: ShadowTrainer::new(
                registry.clone(),
                tracker,
                trainer,
                name.clone(),
                config.trainer.clone(),
            ),
            evaluator: ReplayEvaluator::new(registry.clone(), name.clone())
                .with_segments(config.segments.clone()),
            gate: EvaluationGate::new(config.gate.clone(), decisions.clone()),
            promoter: ModelPromoter::new(registry.clone(), decisions.clone(), name),
            config,
            predictions,
            labels,
            registry,
            decisions,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn predictions(&self) -> &PredictionLog {
        &self.predictions
    }

    pub fn labels(&self) -> &LabelStore<L> {
        &self.labels
    }

    pub fn registry(&self) -> &SharedRegistry<R> {
        &self.registry
    }

    /// Promoter for manual rollback and history queries
    pub fn promoter(&self) -> &ModelPromoter<R, D> {
        &self.promoter
    }

    pub fn shadow_trainer(&self) -> &ShadowTrainer<R, B, T> {
        &self.trainer
    }

    /// Execute one run.
    ///
    /// Data inadequacy and gate rejection are outcomes, not errors. `Err`
    /// means a critical dependency failed or the temporal split was invalid;
    /// an already-trained shadow stays inert in `Staging`.
    #[instrument(skip(self), fields(model = %self.config.model_name))]
    pub fn run(&mut self, trigger: TriggerReason, now: DateTime<Utc>) -> Result<PipelineOutcome> {
        let readiness = &self.config.readiness;
        let recent = self.predictions.get_recent_predictions(
            readiness.lookback_days,
            DateColumn::Timestamp,
            now,
        )?;
        let context = self.observe(&recent, trigger, now);

        // 1. readiness
        if recent.is_empty() {
            let reason = format!("No predictions in last {} days", readiness.lookback_days);
            return Ok(self.skip(reason, None, &context, now));
        }
        let coverage = self.labels.get_label_coverage(&recent)?;
        info!(
            total = coverage.total_predictions,
            labeled = coverage.labeled_predictions,
            coverage_pct = coverage.coverage_pct(),
            "label coverage over recent predictions"
        );
        if coverage.labeled_predictions < readiness.min_labeled
            || coverage.coverage_rate < readiness.min_coverage_rate
        {
            let reason = format!(
                "Insufficient data: {} labeled ({:.1}% coverage)",
                coverage.labeled_predictions,
                coverage.coverage_pct()
            );
            return Ok(self.skip(reason, Some(coverage), &context, now));
        }

        // 2. train
        let (trained, eval_frame) = match self.train(trigger, now)? {
            Training::Ready(trained, eval_frame) => (*trained, eval_frame),
            Training::Aborted(outcome) => return Ok(outcome),
        };
        let TrainedShadow { run_id, version: shadow_version, .. } = trained;

        // 3. first deployment
        let production = registry::read(&self.registry)?
            .get_latest(&self.config.model_name, ModelStage::Production)?;
        let Some(production) = production else {
            warn!("no production model: first deployment");
            let (_, decision) = self.gate.evaluate_first_deployment(Some(context), now);
            let record =
                self.promoter.promote_to_production(&run_id, &decision, PIPELINE_ACTOR, now)?;
            return Ok(PipelineOutcome::Promoted {
                run_id,
                version: shadow_version,
                previous_version: record.previous_production_version,
                first_deployment: true,
                decision,
            });
        };

        // 4. replay evaluation on the shadow's own eval window
        let replay = self.evaluator.replay_evaluation(
            &eval_frame,
            production.version,
            shadow_version,
            &FEATURE_COLUMNS,
        );
        let (prod_metrics, shadow_metrics) = match replay {
            Ok(metrics) => metrics,
            Err(e) => {
                error!(error = %e, "replay evaluation failed; shadow left in Staging");
                let record = DecisionRecord::new(
                    DecisionAction::Abort,
                    &self.config.model_name,
                    PIPELINE_ACTOR,
                    now,
                )
                .with_shadow(&run_id, Some(shadow_version))
                .with_previous_production(Some(production.version))
                .with_reason("Replay evaluation failed")
                .with_error(e.to_string());
                self.audit(&record);
                return Err(e.into());
            }
        };
        let comparison = compare_models(&prod_metrics, &shadow_metrics);
        info!(
            f1_improvement_pct = comparison.f1_improvement_pct,
            brier_change = comparison.brier_change,
            "replay comparison"
        );

        // 5. gate
        let (should_promote, decision) = self.gate.evaluate(
            &prod_metrics,
            &shadow_metrics,
            &comparison,
            Some(&coverage),
            Some(context),
            now,
        );

        // 6. promote or reject
        if should_promote {
            let record =
                self.promoter.promote_to_production(&run_id, &decision, PIPELINE_ACTOR, now)?;
            Ok(PipelineOutcome::Promoted {
                run_id,
                version: shadow_version,
                previous_version: record.previous_production_version,
                first_deployment: false,
                decision,
            })
        } else {
            self.promoter.reject_shadow_model(&run_id, &decision, PIPELINE_ACTOR, now);
            Ok(PipelineOutcome::Rejected { run_id, shadow_version, decision })
        }
    }

    /// Drift and proxy metrics for this run; advisory only
    fn observe(
        &self,
        recent: &[PredictionRecord],
        trigger: TriggerReason,
        now: DateTime<Utc>,
    ) -> TriggerContext {
        let (drift_flagged, drift) = best_effort("check drift signals", || {
            self.drift.check_drift_signals_at(now)
        })
        .unwrap_or_else(|| {
            (false, DriftDetails::empty(DriftStatus::NoReports, self.config.drift.threshold))
        });

        if drift_flagged {
            warn!(
                drift_share = drift.drift_share,
                drifted_features = ?drift.drifted_feature_names,
                "drift detected (observation only): no automated retraining triggered"
            );
        } else {
            info!(drift_share = drift.drift_share, "no significant drift");
        }

        let snapshot = MonitoringSnapshot {
            timestamp: now,
            proxy: ProxyStats::compute(recent),
            drift_flagged,
            drift: drift.clone(),
        };
        best_effort("write monitoring snapshot", || self.sink.write(&snapshot));

        TriggerContext::new(trigger).with_drift(drift_flagged, drift)
    }

    /// Plan windows from the labeled data, prepare and train
    fn train(&mut self, trigger: TriggerReason, now: DateTime<Utc>) -> Result<Training> {
        let predictions = self.predictions.get_predictions_with_features(None)?;
        let labels = self.labels.load_labels()?;
        let labeled = self.labels.get_labeled_predictions(&predictions)?;

        let Some(windows) = TemporalWindows::plan(
            &labeled,
            DateColumn::ApplicationDate,
            self.config.trainer.train_fraction,
        ) else {
            let reason = format!("Cannot plan temporal windows from {} labeled rows", labeled.len());
            return Ok(Training::Aborted(self.abort(None, reason, now)));
        };
        info!(
            train_end = %windows.train_end,
            eval_start = %windows.eval_start,
            eval_end = %windows.eval_end,
            "temporal windows"
        );

        let prepared = match self.trainer.prepare_training_data_temporal(
            &predictions,
            &labels,
            windows.train_end,
            windows.eval_start,
            windows.eval_end,
        ) {
            Ok(prepared) => prepared,
            Err(e) => {
                let record =
                    DecisionRecord::new(DecisionAction::Abort, &self.config.model_name, PIPELINE_ACTOR, now)
                        .with_reason("Temporal split rejected")
                        .with_error(e.to_string());
                self.audit(&record);
                return Err(RetrainError::Split(e));
            }
        };

        match self.trainer.train_shadow_model(&prepared, trigger) {
            Ok(TrainOutcome::Success(trained)) => Ok(Training::Ready(trained, prepared.eval_frame())),
            Ok(TrainOutcome::Aborted { run_id, reason }) => {
                Ok(Training::Aborted(self.abort(Some(run_id), reason, now)))
            }
            Err(e) => {
                let record =
                    DecisionRecord::new(DecisionAction::Abort, &self.config.model_name, PIPELINE_ACTOR, now)
                        .with_reason("Shadow training failed")
                        .with_error(e.to_string());
                self.audit(&record);
                Err(e)
            }
        }
    }

    fn skip(
        &self,
        reason: String,
        coverage: Option<LabelCoverage>,
        context: &TriggerContext,
        now: DateTime<Utc>,
    ) -> PipelineOutcome {
        info!(%reason, drift_flagged = context.drift_flagged, "skipping retraining");
        let record =
            DecisionRecord::new(DecisionAction::Skip, &self.config.model_name, PIPELINE_ACTOR, now)
                .with_reason(reason.clone());
        self.audit(&record);
        PipelineOutcome::Skipped { reason, coverage }
    }

    fn abort(&self, run_id: Option<String>, reason: String, now: DateTime<Utc>) -> PipelineOutcome {
        warn!(run_id = ?run_id, %reason, "shadow training aborted");
        let mut record =
            DecisionRecord::new(DecisionAction::Abort, &self.config.model_name, PIPELINE_ACTOR, now)
                .with_reason(reason.clone());
        if let Some(run_id) = &run_id {
            record = record.with_shadow(run_id, None);
        }
        self.audit(&record);
        PipelineOutcome::Aborted { run_id, reason }
    }

    fn audit(&self, record: &DecisionRecord) {
        best_effort("record decision", || self.decisions.append(record));
    }
}
