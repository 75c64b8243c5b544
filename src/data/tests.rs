//! Tests for typed records and the temporal splitter

use std::collections::HashMap;

use chrono::Duration;
use proptest::prelude::*;

use super::*;
use crate::fixtures::{features, labeled_series, prediction, t0};

// -----------------------------------------------------------------------------
// Feature schema
// -----------------------------------------------------------------------------

#[test]
fn test_feature_vector_from_map_complete() {
    let map = features(2.0).to_map();
    let parsed = FeatureVector::from_map(&map).expect("operation should succeed");
    assert_eq!(parsed, features(2.0));
}

#[test]
fn test_feature_vector_from_map_missing_key() {
    let mut map = features(1.0).to_map();
    map.remove("DebtRatio");
    let err = FeatureVector::from_map(&map).unwrap_err();
    assert_eq!(err, SchemaError::MissingFeature("DebtRatio".to_string()));
}

#[test]
fn test_feature_vector_from_map_rejects_nan() {
    let mut map = features(1.0).to_map();
    map.insert("MonthlyIncome".to_string(), f64::NAN);
    assert!(matches!(
        FeatureVector::from_map(&map),
        Err(SchemaError::InvalidValue { ref field, .. }) if field == "MonthlyIncome"
    ));
}

#[test]
fn test_feature_vector_ignores_extra_keys() {
    let mut map: HashMap<String, f64> = features(1.0).to_map();
    map.insert("request_latency_ms".to_string(), 12.0);
    assert!(FeatureVector::from_map(&map).is_ok());
}

#[test]
fn test_feature_vector_get_by_name() {
    let f = features(3.0);
    assert_eq!(f.get("age"), Some(33.0));
    assert_eq!(f.get("not_a_feature"), None);
}

#[test]
fn test_feature_vector_serde_uses_schema_names() {
    let json = serde_json::to_value(features(1.0)).expect("operation should succeed");
    assert!(json.get("NumberOfTime30_59DaysPastDueNotWorse").is_some());
    assert!(json.get("past_due_30_59").is_none());
}

#[test]
fn test_prediction_record_validate() {
    let mut p = prediction("a", t0());
    assert!(p.validate().is_ok());

    p.probability = 1.2;
    assert!(p.validate().is_err());

    p.probability = 0.5;
    p.prediction = 2;
    assert!(p.validate().is_err());

    p.prediction = 1;
    p.prediction_id = "  ".to_string();
    assert!(p.validate().is_err());
}

// -----------------------------------------------------------------------------
// Temporal split
// -----------------------------------------------------------------------------

#[test]
fn test_split_partitions_by_time() {
    let rows = labeled_series(10);
    let (train, eval) = create_temporal_split(
        &rows,
        t0() + Duration::hours(6),
        t0() + Duration::hours(6),
        t0() + Duration::hours(10),
        DateColumn::ApplicationDate,
    )
    .expect("operation should succeed");

    assert_eq!(train.len(), 6);
    assert_eq!(eval.len(), 4);
}

#[test]
fn test_split_rejects_overlap() {
    let rows = labeled_series(10);
    let err = create_temporal_split(
        &rows,
        t0() + Duration::hours(6),
        t0() + Duration::hours(5),
        t0() + Duration::hours(10),
        DateColumn::ApplicationDate,
    )
    .unwrap_err();
    assert!(matches!(err, SplitError::TemporalLeak { .. }));
    assert!(err.to_string().contains("Temporal leak"));
}

#[test]
fn test_split_empty_train_window() {
    let rows = labeled_series(5);
    let err = create_temporal_split(
        &rows,
        t0(),
        t0(),
        t0() + Duration::hours(5),
        DateColumn::ApplicationDate,
    )
    .unwrap_err();
    assert_eq!(err, SplitError::EmptyWindow { window: Window::Train });
}

#[test]
fn test_split_empty_eval_window() {
    let rows = labeled_series(5);
    let err = create_temporal_split(
        &rows,
        t0() + Duration::hours(3),
        t0() + Duration::days(10),
        t0() + Duration::days(11),
        DateColumn::ApplicationDate,
    )
    .unwrap_err();
    assert_eq!(err, SplitError::EmptyWindow { window: Window::Eval });
}

#[test]
fn test_split_uses_requested_column() {
    let mut rows = labeled_series(4);
    // Serving time is a day later than business time for every row
    for r in &mut rows {
        r.prediction.timestamp = r.prediction.application_date + Duration::days(1);
    }
    let result = create_temporal_split(
        &rows,
        t0() + Duration::hours(2),
        t0() + Duration::hours(2),
        t0() + Duration::hours(4),
        DateColumn::Timestamp,
    );
    assert_eq!(result.unwrap_err(), SplitError::EmptyWindow { window: Window::Train });
}

#[test]
fn test_plan_windows_seventy_thirty() {
    let rows = labeled_series(10);
    let windows =
        TemporalWindows::plan(&rows, DateColumn::ApplicationDate, 0.7).expect("enough rows");

    assert_eq!(windows.train_end, t0() + Duration::hours(7));
    assert_eq!(windows.eval_start, windows.train_end + Duration::seconds(1));
    assert_eq!(windows.eval_end, t0() + Duration::hours(9) + Duration::seconds(1));

    let (train, eval) =
        windows.split(&rows, DateColumn::ApplicationDate).expect("operation should succeed");
    assert_eq!(train.len(), 7);
    // The row sitting exactly on train_end belongs to neither window
    assert_eq!(eval.len(), 2);
}

#[test]
fn test_plan_windows_needs_two_rows() {
    let rows = labeled_series(1);
    assert!(TemporalWindows::plan(&rows, DateColumn::ApplicationDate, 0.7).is_none());
    let rows = labeled_series(5);
    assert!(TemporalWindows::plan(&rows, DateColumn::ApplicationDate, 1.0).is_none());
}

// -----------------------------------------------------------------------------
// Fingerprint
// -----------------------------------------------------------------------------

#[test]
fn test_fingerprint_ignores_column_order() {
    let a = DatasetFingerprint::compute(&["x", "y"], &[vec![1.0, 2.0], vec![3.0, 4.0]]);
    let b = DatasetFingerprint::compute(&["y", "x"], &[vec![2.0, 1.0], vec![4.0, 3.0]]);
    assert_eq!(a.hash, b.hash);
    assert_eq!(a.hash.len(), 64);
}

#[test]
fn test_fingerprint_counts_duplicates() {
    let fp = DatasetFingerprint::compute(
        &["x", "y"],
        &[vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0, 3.0], vec![1.0, 2.0]],
    );
    assert_eq!(fp.rows, 4);
    assert_eq!(fp.columns, 2);
    assert_eq!(fp.duplicate_rows, 2);
    assert_eq!(fp.to_params().get("dataset_rows").map(String::as_str), Some("4"));
}

#[test]
fn test_fingerprint_changes_with_content() {
    let a = DatasetFingerprint::compute(&["x"], &[vec![1.0]]);
    let b = DatasetFingerprint::compute(&["x"], &[vec![1.5]]);
    assert_ne!(a.hash, b.hash);
}

// -----------------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_overlapping_windows_always_leak(
        train_end_h in 1i64..500,
        back in 1i64..400,
        span in 0i64..300,
    ) {
        let rows = labeled_series(20);
        let train_end = t0() + Duration::hours(train_end_h);
        let eval_start = train_end - Duration::hours(back);
        let eval_end = eval_start + Duration::hours(span);
        let result = create_temporal_split(&rows, train_end, eval_start, eval_end, DateColumn::ApplicationDate);
        prop_assert!(
            matches!(result, Err(SplitError::TemporalLeak { .. })),
            "expected TemporalLeak error"
        );
    }

    #[test]
    fn prop_valid_split_respects_boundaries(
        n in 2usize..120,
        train_end_h in 0i64..120,
        gap in 0i64..24,
        span in 1i64..120,
    ) {
        let rows = labeled_series(n);
        let train_end = t0() + Duration::hours(train_end_h);
        let eval_start = train_end + Duration::hours(gap);
        let eval_end = eval_start + Duration::hours(span);
        if let Ok((train, eval)) =
            create_temporal_split(&rows, train_end, eval_start, eval_end, DateColumn::ApplicationDate)
        {
            for r in &train {
                prop_assert!(r.prediction.application_date < train_end);
            }
            for r in &eval {
                let t = r.prediction.application_date;
                prop_assert!(t >= eval_start && t < eval_end);
            }
        }
    }
}
