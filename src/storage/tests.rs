//! Tests for prediction log, label store and decision log

use std::fs;
use std::sync::Arc;
use std::thread;

use chrono::Duration;
use tempfile::TempDir;

use super::*;
use crate::data::DateColumn;
use crate::fixtures::{features, prediction, t0};
use crate::retrain::{DecisionAction, DecisionRecord};

fn log_in(dir: &TempDir) -> PredictionLog {
    PredictionLog::open(dir.path().join("predictions.csv")).expect("operation should succeed")
}

// -----------------------------------------------------------------------------
// Prediction log
// -----------------------------------------------------------------------------

#[test]
fn test_open_creates_header() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    assert_eq!(log.header_check(), &HeaderCheck::Created);

    let content = fs::read_to_string(log.path()).expect("file read should succeed");
    assert_eq!(content.trim_end(), PREDICTION_COLUMNS.join(","));

    let reopened = log_in(&dir);
    assert_eq!(reopened.header_check(), &HeaderCheck::Valid);
}

#[test]
fn test_log_prediction_generates_id() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);

    let record = log
        .log_prediction(&features(1.0).to_map(), 1, 0.81, "v3", None, None)
        .expect("operation should succeed");
    assert_eq!(record.prediction_id.len(), 36);
    assert_eq!(record.application_date, record.timestamp);

    let all = log.read_all().expect("operation should succeed");
    assert_eq!(all, vec![record]);
}

#[test]
fn test_log_prediction_missing_feature() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    let mut map = features(1.0).to_map();
    map.remove("age");

    let err = log.log_prediction(&map, 0, 0.1, "v1", None, Some("p-1")).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Schema(crate::data::SchemaError::MissingFeature(ref f)) if f == "age"
    ));
    assert!(log.read_all().expect("operation should succeed").is_empty());
}

#[test]
fn test_append_rejects_delimiter_in_id() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    let bad = prediction("a,b", t0());
    assert!(log.append(&bad).is_err());
}

#[test]
fn test_get_predictions_by_ids() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    for i in 0..5 {
        log.append(&prediction(&format!("p-{i}"), t0() + Duration::hours(i)))
            .expect("operation should succeed");
    }

    let ids = vec!["p-1".to_string(), "p-3".to_string(), "missing".to_string()];
    let found = log.get_predictions_with_features(Some(&ids)).expect("operation should succeed");
    let found_ids: Vec<&str> = found.iter().map(|r| r.prediction_id.as_str()).collect();
    assert_eq!(found_ids, vec!["p-1", "p-3"]);

    assert_eq!(log.get_predictions_with_features(None).expect("operation should succeed").len(), 5);
}

#[test]
fn test_get_recent_predictions_by_column() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    let now = t0() + Duration::days(40);

    let mut old_business = prediction("old-business", now - Duration::hours(1));
    old_business.application_date = now - Duration::days(60);
    log.append(&old_business).expect("operation should succeed");
    log.append(&prediction("recent", now - Duration::days(2))).expect("operation should succeed");
    log.append(&prediction("stale", now - Duration::days(31))).expect("operation should succeed");

    let by_app = log
        .get_recent_predictions(30, DateColumn::ApplicationDate, now)
        .expect("operation should succeed");
    assert_eq!(by_app.len(), 1);
    assert_eq!(by_app[0].prediction_id, "recent");

    let by_ts =
        log.get_recent_predictions(30, DateColumn::Timestamp, now).expect("operation should succeed");
    assert_eq!(by_ts.len(), 2);
}

#[test]
fn test_reader_skips_torn_and_malformed_rows() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = log_in(&dir);
    log.append(&prediction("good", t0())).expect("operation should succeed");

    let mut content = fs::read_to_string(log.path()).expect("file read should succeed");
    content.push_str("garbage,row\n");
    content.push_str("2024-01-01T00:00:00Z,torn,2024-01");
    fs::write(log.path(), content).expect("file write should succeed");

    let all = log.read_all().expect("operation should succeed");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].prediction_id, "good");
}

#[test]
fn test_header_permutation_is_reordered() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let path = dir.path().join("predictions.csv");
    {
        let log = PredictionLog::open(&path).expect("operation should succeed");
        log.append(&prediction("p-1", t0())).expect("operation should succeed");
        log.append(&prediction("p-2", t0() + Duration::hours(1))).expect("operation should succeed");
    }

    // Swap the first two columns in header and rows
    let content = fs::read_to_string(&path).expect("file read should succeed");
    let swapped: String = content
        .lines()
        .map(|line| {
            let mut f: Vec<&str> = line.split(',').collect();
            f.swap(0, 1);
            format!("{}\n", f.join(","))
        })
        .collect();
    fs::write(&path, swapped).expect("file write should succeed");

    let log = PredictionLog::open(&path).expect("operation should succeed");
    assert_eq!(log.header_check(), &HeaderCheck::Reordered { rows: 2 });
    let ids: Vec<String> =
        log.read_all().expect("operation should succeed").into_iter().map(|r| r.prediction_id).collect();
    assert_eq!(ids, vec!["p-1", "p-2"]);
}

#[test]
fn test_unrecognized_header_is_moved_aside() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let path = dir.path().join("predictions.csv");
    fs::write(&path, "id,score\nx,0.4\n").expect("file write should succeed");

    let log = PredictionLog::open(&path).expect("operation should succeed");
    let HeaderCheck::Reinitialized { backup } = log.header_check().clone() else {
        panic!("expected reinitialization, got {:?}", log.header_check());
    };
    assert_eq!(fs::read_to_string(backup).expect("file read should succeed"), "id,score\nx,0.4\n");
    assert!(log.read_all().expect("operation should succeed").is_empty());

    log.append(&prediction("fresh", t0())).expect("operation should succeed");
    assert_eq!(log.read_all().expect("operation should succeed").len(), 1);
}

#[test]
fn test_concurrent_appends_are_not_interleaved() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = Arc::new(log_in(&dir));

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..50 {
                    log.append(&prediction(&format!("w{w}-{i}"), t0()))
                        .expect("operation should succeed");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("writer thread should not panic");
    }

    assert_eq!(log.read_all().expect("operation should succeed").len(), 200);
}

// -----------------------------------------------------------------------------
// Label store
// -----------------------------------------------------------------------------

#[test]
fn test_store_label_insert_then_same_value() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    let first = store.store_label("p-1", 1, "bureau", None).expect("operation should succeed");
    let second = store.store_label("p-1", 1, "bureau", None).expect("operation should succeed");

    assert_eq!(first, LabelWrite::Inserted);
    assert_eq!(second, LabelWrite::Updated);
    assert_eq!(store.backend().raw_len(), 1);
}

#[test]
fn test_store_label_conflict_updates_in_place() {
    crate::telemetry::init_test_tracing();
    let store = LabelStore::new(InMemoryLabelBackend::new());
    store.store_label("p-1", 0, "bureau", None).expect("operation should succeed");
    let write = store.store_label("p-1", 1, "collections", None).expect("operation should succeed");

    assert_eq!(write, LabelWrite::Conflict { previous: 0 });
    assert_eq!(store.backend().raw_len(), 1);
    let label = store.get_label("p-1").expect("operation should succeed").expect("label exists");
    assert_eq!(label.true_label, 1);
    assert_eq!(label.label_source, "collections");
}

#[test]
fn test_store_label_days_delayed_floor() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    let predicted = t0();
    store
        .store_label_at("p-1", 1, "bureau", Some(predicted), predicted + Duration::hours(47))
        .expect("operation should succeed");
    store
        .store_label_at("p-2", 0, "bureau", None, predicted + Duration::days(3))
        .expect("operation should succeed");

    assert_eq!(store.get_label("p-1").expect("ok").map(|l| l.days_delayed), Some(Some(1)));
    assert_eq!(store.get_label("p-2").expect("ok").map(|l| l.days_delayed), Some(None));
}

#[test]
fn test_store_label_rejects_invalid_label() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    assert!(store.store_label("p-1", 2, "bureau", None).is_err());
    assert!(store.store_label("", 1, "bureau", None).is_err());
}

#[test]
fn test_duplicates_in_backend_are_deduped_keep_last() {
    let dup = |label: u8, source: &str| crate::data::LabelRecord {
        prediction_id: "p-1".to_string(),
        true_label: label,
        label_timestamp: t0(),
        label_source: source.to_string(),
        days_delayed: None,
        updated_at: t0(),
    };
    let store = LabelStore::new(InMemoryLabelBackend::with_rows(vec![dup(0, "a"), dup(1, "b")]));

    let labels = store.load_labels().expect("operation should succeed");
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].true_label, 1);

    let joined = store
        .get_labeled_predictions(&[prediction("p-1", t0())])
        .expect("operation should succeed");
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].label_source, "b");

    // A write heals the persisted duplicates
    store.store_label("p-1", 1, "c", None).expect("operation should succeed");
    assert_eq!(store.backend().raw_len(), 1);
}

#[test]
fn test_get_labeled_predictions_inner_join() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    store.store_label("p-2", 1, "bureau", None).expect("operation should succeed");
    store.store_label("orphan", 0, "bureau", None).expect("operation should succeed");

    let preds = vec![prediction("p-1", t0()), prediction("p-2", t0())];
    let joined = store.get_labeled_predictions(&preds).expect("operation should succeed");
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].prediction_id(), "p-2");
    assert_eq!(joined[0].true_label, 1);
}

#[test]
fn test_label_coverage_counts() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    store.store_label("p-0", 1, "bureau", None).expect("operation should succeed");
    store.store_label("p-1", 0, "bureau", None).expect("operation should succeed");

    let preds: Vec<_> = (0..8).map(|i| prediction(&format!("p-{i}"), t0())).collect();
    let coverage = store.get_label_coverage(&preds).expect("operation should succeed");
    assert_eq!(coverage.total_predictions, 8);
    assert_eq!(coverage.labeled_predictions, 2);
    assert_eq!(coverage.unlabeled_predictions, 6);
    assert!((coverage.coverage_rate - 0.25).abs() < 1e-12);
    assert!((coverage.coverage_pct() - 25.0).abs() < 1e-9);
}

#[test]
fn test_label_coverage_empty() {
    let store = LabelStore::new(InMemoryLabelBackend::new());
    let coverage = store.get_label_coverage(&[]).expect("operation should succeed");
    assert_eq!(coverage, LabelCoverage::from_counts(0, 0));
    assert_eq!(coverage.coverage_rate, 0.0);
}

#[test]
fn test_json_label_backend_persists() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let path = dir.path().join("labels").join("labels.json");
    {
        let store = LabelStore::new(JsonFileLabelBackend::new(&path));
        store.store_label("p-1", 1, "bureau", None).expect("operation should succeed");
        store.store_label("p-1", 0, "bureau", None).expect("operation should succeed");
    }
    let store = LabelStore::new(JsonFileLabelBackend::new(&path));
    let labels = store.load_labels().expect("operation should succeed");
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].true_label, 0);
}

// -----------------------------------------------------------------------------
// Decision log
// -----------------------------------------------------------------------------

fn record(action: DecisionAction, days_after_t0: i64) -> DecisionRecord {
    DecisionRecord::new(action, "credit-risk-model", "system", t0() + Duration::days(days_after_t0))
}

#[test]
fn test_in_memory_last_promotion_ignores_other_actions() {
    let log = InMemoryDecisionLog::new();
    log.append(&record(DecisionAction::Promote, 1)).expect("operation should succeed");
    log.append(&record(DecisionAction::Reject, 5)).expect("operation should succeed");
    log.append(&record(DecisionAction::Rollback, 6)).expect("operation should succeed");

    assert_eq!(
        log.last_promotion().expect("operation should succeed"),
        Some(t0() + Duration::days(1))
    );
    let history = log.history(2).expect("operation should succeed");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, DecisionAction::Rollback);
}

#[test]
fn test_json_log_writes_one_file_per_record() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = JsonDecisionLog::new(dir.path()).expect("operation should succeed");
    let a = record(DecisionAction::Reject, 1);
    let mut b = record(DecisionAction::Reject, 1);
    b.record_id = "second".to_string();
    log.append(&a).expect("operation should succeed");
    log.append(&b).expect("operation should succeed");

    let files: Vec<_> = fs::read_dir(dir.path())
        .expect("operation should succeed")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("decision_"))
        .collect();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|n| n.contains("_reject")));
    assert!(!dir.path().join(LAST_PROMOTION_FILE).exists());
}

#[test]
fn test_json_log_pointer_tracks_promotions() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let log = JsonDecisionLog::new(dir.path()).expect("operation should succeed");
    assert_eq!(log.last_promotion().expect("operation should succeed"), None);

    log.append(&record(DecisionAction::Promote, 2)).expect("operation should succeed");
    log.append(&record(DecisionAction::Rollback, 4)).expect("operation should succeed");
    assert_eq!(
        log.last_promotion().expect("operation should succeed"),
        Some(t0() + Duration::days(2))
    );
}

#[test]
fn test_json_log_rebuilds_missing_pointer() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    {
        let log = JsonDecisionLog::new(dir.path()).expect("operation should succeed");
        log.append(&record(DecisionAction::Promote, 1)).expect("operation should succeed");
        log.append(&record(DecisionAction::Promote, 9)).expect("operation should succeed");
        log.append(&record(DecisionAction::Reject, 12)).expect("operation should succeed");
    }
    fs::remove_file(dir.path().join(LAST_PROMOTION_FILE)).expect("pointer should exist");
    fs::write(dir.path().join("decision_garbage.json"), "{not json").expect("file write should succeed");

    let log = JsonDecisionLog::new(dir.path()).expect("operation should succeed");
    assert_eq!(
        log.last_promotion().expect("operation should succeed"),
        Some(t0() + Duration::days(9))
    );
    assert!(dir.path().join(LAST_PROMOTION_FILE).exists());

    let history = log.history(10).expect("operation should succeed");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].action, DecisionAction::Reject);
}
