//! Shared builders for unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::data::{FeatureVector, LabeledPrediction, PredictionRecord};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid fixture date")
}

pub(crate) fn features(seed: f64) -> FeatureVector {
    FeatureVector::from_array([
        0.1 * seed,
        30.0 + seed,
        0.0,
        0.35,
        4000.0 + 10.0 * seed,
        5.0,
        0.0,
        1.0,
        0.0,
        1.0,
    ])
}

pub(crate) fn prediction(id: &str, at: DateTime<Utc>) -> PredictionRecord {
    PredictionRecord {
        prediction_id: id.to_string(),
        timestamp: at,
        application_date: at,
        model_version: "v1".to_string(),
        prediction: 0,
        probability: 0.2,
        features: features(1.0),
    }
}

/// `n` labeled rows one hour apart, alternating labels, with the signal in
/// `RevolvingUtilizationOfUnsecuredLines`
pub(crate) fn labeled_series(n: usize) -> Vec<LabeledPrediction> {
    (0..n)
        .map(|i| {
            let label = (i % 2) as u8;
            let mut p = prediction(&format!("p-{i:04}"), t0() + Duration::hours(i as i64));
            p.features.revolving_utilization = if label == 1 { 0.9 } else { 0.1 } + (i % 7) as f64 * 0.01;
            p.features.age = 25.0 + (i % 40) as f64;
            LabeledPrediction {
                prediction: p,
                true_label: label,
                label_source: "fixture".to_string(),
                days_delayed: Some(0),
            }
        })
        .collect()
}

/// Logistic model scoring only `RevolvingUtilizationOfUnsecuredLines`
pub(crate) fn artifact(weight: f64, bias: f64) -> crate::model::ModelArtifact {
    let columns = crate::data::FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    let mut weights = vec![0.0; 10];
    weights[0] = weight;
    let model =
        crate::model::LogisticModel::new(columns, vec![0.0; 10], vec![1.0; 10], weights, bias)
            .expect("valid fixture model");
    crate::model::ModelArtifact::LogisticRegression(model)
}

/// Live label rows matching `rows`
pub(crate) fn label_records(rows: &[LabeledPrediction]) -> Vec<crate::data::LabelRecord> {
    rows.iter()
        .map(|r| crate::data::LabelRecord {
            prediction_id: r.prediction_id().to_string(),
            true_label: r.true_label,
            label_timestamp: r.prediction.timestamp + Duration::days(3),
            label_source: r.label_source.clone(),
            days_delayed: Some(3),
            updated_at: r.prediction.timestamp + Duration::days(3),
        })
        .collect()
}

/// Metrics bundle with the given sample count, F1 and Brier score
pub(crate) fn bundle(num_samples: usize, f1: f64, brier: f64) -> crate::eval::MetricsBundle {
    crate::eval::MetricsBundle {
        num_samples,
        primary_metrics: crate::eval::PrimaryMetrics {
            accuracy: f1,
            precision: f1,
            recall: f1,
            f1_score: f1,
            roc_auc: 0.5,
        },
        calibration_metrics: crate::eval::CalibrationMetrics {
            brier_score: brier,
            expected_calibration_error: None,
        },
        confusion_matrix: crate::eval::BinaryConfusion::default(),
        segment_performance: None,
    }
}
