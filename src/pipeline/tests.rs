//! End-to-end runs over in-memory services and a temp prediction log

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use super::*;
use crate::config::PathsConfig;
use crate::data::LabeledPrediction;
use crate::fixtures::{artifact, label_records, labeled_series, t0};
use crate::model::LogisticTrainer;
use crate::monitor::{DriftReport, FeatureDrift, InMemorySink};
use crate::registry::{InMemoryRegistry, NewModelVersion};
use crate::storage::{InMemoryDecisionLog, InMemoryLabelBackend};
use crate::telemetry::init_test_tracing;
use crate::tracking::{InMemoryBackend, RunStatus};

type TestPipeline = RetrainingPipeline<
    InMemoryRegistry,
    InMemoryDecisionLog,
    InMemoryLabelBackend,
    InMemoryBackend,
    LogisticTrainer,
>;

struct Harness {
    dir: TempDir,
    pipeline: TestPipeline,
    decisions: Arc<InMemoryDecisionLog>,
    sink: Arc<InMemorySink>,
    registry: SharedRegistry<InMemoryRegistry>,
}

fn now() -> DateTime<Utc> {
    t0() + Duration::days(20)
}

/// `rows` in the prediction log, the first `labeled` of them labeled
fn harness(
    rows: &[LabeledPrediction],
    labeled: usize,
    configure: impl FnOnce(&mut PipelineConfig),
) -> Harness {
    init_test_tracing();
    let dir = TempDir::new().expect("operation should succeed");
    let mut config = PipelineConfig { paths: PathsConfig::under(dir.path()), ..PipelineConfig::default() };
    configure(&mut config);

    let predictions = PredictionLog::open(&config.paths.predictions_csv).expect("operation should succeed");
    for row in rows {
        predictions.append(&row.prediction).expect("operation should succeed");
    }
    let labels = LabelStore::new(InMemoryLabelBackend::with_rows(label_records(&rows[..labeled])));

    let registry = shared(InMemoryRegistry::new());
    let decisions = Arc::new(InMemoryDecisionLog::new());
    let sink = Arc::new(InMemorySink::new());
    let services = PipelineServices {
        predictions,
        labels,
        registry: registry.clone(),
        decisions: decisions.clone(),
        tracker: ExperimentTracker::new("shadow-training", InMemoryBackend::new()),
        trainer: LogisticTrainer::default(),
        sink: Box::new(sink.clone()),
    };

    Harness { pipeline: RetrainingPipeline::new(config, services), dir, decisions, sink, registry }
}

fn production_versions(h: &Harness) -> Vec<u32> {
    registry::read(&h.registry).expect("operation should succeed").production_versions("credit-risk-model")
}

/// Register an uninformative production model directly in the registry
fn seed_production(h: &Harness) -> u32 {
    let mut guard = registry::write(&h.registry).expect("operation should succeed");
    let v = guard
        .register("credit-risk-model", NewModelVersion::new(artifact(0.0, 0.0)))
        .expect("operation should succeed")
        .version;
    guard
        .transition_stage("credit-risk-model", v, ModelStage::Staging, None)
        .expect("operation should succeed");
    guard
        .transition_stage("credit-risk-model", v, ModelStage::Production, None)
        .expect("operation should succeed");
    v
}

// -----------------------------------------------------------------------------
// Readiness
// -----------------------------------------------------------------------------

#[test]
fn test_skip_without_recent_predictions() {
    let mut h = harness(&[], 0, |_| {});

    let outcome = h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    assert!(matches!(outcome, PipelineOutcome::Skipped { coverage: None, .. }));
    assert_eq!(outcome.summary(), "skipped: No predictions in last 30 days");
    let records = h.decisions.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, DecisionAction::Skip);
    assert_eq!(records[0].outcome, "skipped");

    let snapshots = h.sink.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].proxy.is_none());
    assert!(!snapshots[0].drift_flagged);
}

#[test]
fn test_skip_with_insufficient_labels() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 100, |_| {});

    let outcome = h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    match &outcome {
        PipelineOutcome::Skipped { reason, coverage: Some(coverage) } => {
            assert_eq!(reason, "Insufficient data: 100 labeled (33.3% coverage)");
            assert_eq!(coverage.total_predictions, 300);
        }
        other => panic!("expected skip, got {other:?}"),
    }
    assert_eq!(h.sink.snapshots()[0].proxy.as_ref().map(|p| p.count), Some(300));
    assert!(h.pipeline.shadow_trainer().tracker().list_runs().expect("operation should succeed").is_empty());
}

#[test]
fn test_predictions_outside_lookback_are_ignored() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |_| {});

    let outcome = h
        .pipeline
        .run(TriggerReason::Scheduled, now() + Duration::days(60))
        .expect("operation should succeed");
    assert_eq!(outcome.action(), DecisionAction::Skip);
}

// -----------------------------------------------------------------------------
// Training
// -----------------------------------------------------------------------------

#[test]
fn test_abort_is_recorded_when_eval_set_too_small() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |c| c.trainer.min_eval_samples = 100);

    let outcome = h.pipeline.run(TriggerReason::Manual, now()).expect("operation should succeed");

    let PipelineOutcome::Aborted { run_id: Some(run_id), reason } = &outcome else {
        panic!("expected abort, got {outcome:?}");
    };
    assert_eq!(reason, "Eval set too small: 89 < 100");
    let records = h.decisions.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, DecisionAction::Abort);
    assert_eq!(records[0].shadow_run_id.as_deref(), Some(run_id.as_str()));

    let run = h.pipeline.shadow_trainer().tracker().get_run(run_id).expect("operation should succeed");
    assert_eq!(run.status, RunStatus::Aborted);
    assert!(production_versions(&h).is_empty());
}

// -----------------------------------------------------------------------------
// Promotion paths
// -----------------------------------------------------------------------------

#[test]
fn test_first_deployment_auto_promotes() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |_| {});

    let outcome = h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    let PipelineOutcome::Promoted { version, first_deployment, previous_version, decision, .. } = &outcome
    else {
        panic!("expected promotion, got {outcome:?}");
    };
    assert!(*first_deployment);
    assert_eq!(*previous_version, None);
    assert_eq!(decision.evaluated_gates(), vec![crate::retrain::GateName::FirstDeployment]);
    assert_eq!(production_versions(&h), vec![*version]);
    assert_eq!(outcome.summary(), format!("promoted v{version} (first deployment)"));

    let records = h.decisions.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, DecisionAction::Promote);
    assert_eq!(h.decisions.last_promotion().expect("operation should succeed"), Some(now()));
}

#[test]
fn test_second_run_rejected_on_sample_gate() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |_| {});
    h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");
    let incumbent = production_versions(&h);

    let outcome = h
        .pipeline
        .run(TriggerReason::Scheduled, now() + Duration::hours(1))
        .expect("operation should succeed");

    let PipelineOutcome::Rejected { shadow_version, decision, .. } = &outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(decision.reason, vec!["Insufficient samples: 89 < 200"]);
    assert_eq!(production_versions(&h), incumbent);
    let shadow = registry::read(&h.registry)
        .expect("operation should succeed")
        .get_version("credit-risk-model", *shadow_version)
        .expect("operation should succeed");
    assert_eq!(shadow.stage, ModelStage::Archived);

    let last = h.decisions.records().pop().expect("operation should succeed");
    assert_eq!(last.action, DecisionAction::Reject);
    assert_eq!(last.outcome, "successful_rejection");
}

#[test]
fn test_improved_challenger_replaces_incumbent() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |c| c.gate.min_samples_for_decision = 50);
    let incumbent = seed_production(&h);

    let outcome = h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    let PipelineOutcome::Promoted { version, previous_version, first_deployment, decision, .. } = &outcome
    else {
        panic!("expected promotion, got {outcome:?}");
    };
    assert!(!first_deployment);
    assert_eq!(*previous_version, Some(incumbent));
    assert_eq!(decision.gate_results.len(), 6);
    assert!(decision.gate_results.iter().all(|g| g.passed));
    assert_eq!(production_versions(&h), vec![*version]);
}

#[test]
fn test_cooldown_blocks_back_to_back_promotion() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |c| c.gate.min_samples_for_decision = 50);
    seed_production(&h);
    h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    let outcome = h
        .pipeline
        .run(TriggerReason::Manual, now() + Duration::days(3))
        .expect("operation should succeed");

    let PipelineOutcome::Rejected { decision, .. } = &outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(decision.failed_gate(), Some(crate::retrain::GateName::PromotionCooldown));
}

#[test]
fn test_drift_is_attached_but_advisory() {
    let rows = labeled_series(300);
    let mut h = harness(&rows, 300, |_| {});
    let report = DriftReport::new(
        0.5,
        vec![FeatureDrift::new("age", true), FeatureDrift::new("DebtRatio", false)],
    );
    report
        .write_to_dir(&h.dir.path().join("drift_reports"), now() - Duration::hours(2))
        .expect("operation should succeed");

    let outcome = h.pipeline.run(TriggerReason::Scheduled, now()).expect("operation should succeed");

    let PipelineOutcome::Promoted { decision, .. } = &outcome else {
        panic!("expected promotion, got {outcome:?}");
    };
    let trigger = decision.trigger.as_ref().expect("operation should succeed");
    assert!(trigger.drift_flagged);
    assert_eq!(trigger.reason, TriggerReason::Scheduled);
    assert_eq!(
        trigger.drift.as_ref().map(|d| d.drifted_feature_names.clone()),
        Some(vec!["age".to_string()])
    );
    assert!(h.sink.snapshots()[0].drift_flagged);
}
