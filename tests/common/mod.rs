//! Shared builders for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use retrainer::data::{FeatureVector, LabelRecord, PredictionRecord, FEATURE_COLUMNS};
use retrainer::eval::{BinaryConfusion, CalibrationMetrics, MetricsBundle, PrimaryMetrics};
use retrainer::model::{LogisticModel, ModelArtifact};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("valid fixture date")
}

/// Metrics bundle with the given sample count, F1 and Brier score
pub fn bundle(num_samples: usize, f1: f64, brier: f64) -> MetricsBundle {
    MetricsBundle {
        num_samples,
        primary_metrics: PrimaryMetrics {
            accuracy: f1,
            precision: f1,
            recall: f1,
            f1_score: f1,
            roc_auc: 0.5,
        },
        calibration_metrics: CalibrationMetrics {
            brier_score: brier,
            expected_calibration_error: None,
        },
        confusion_matrix: BinaryConfusion::default(),
        segment_performance: None,
    }
}

/// Prediction `i` of a series one hour apart; odd rows are defaults with high
/// revolving utilization
pub fn prediction(i: usize) -> PredictionRecord {
    let positive = i % 2 == 1;
    let at = t0() + Duration::hours(i as i64);
    let mut values = [0.0; 10];
    values[0] = if positive { 0.85 } else { 0.15 } + (i % 5) as f64 * 0.02;
    values[1] = 30.0 + (i % 30) as f64;
    values[3] = 0.4;
    values[4] = 5200.0;
    values[5] = 6.0;
    values[9] = 2.0;
    PredictionRecord {
        prediction_id: format!("app-{i:05}"),
        timestamp: at,
        application_date: at,
        model_version: "1".to_string(),
        prediction: u8::from(positive),
        probability: if positive { 0.7 } else { 0.3 },
        features: FeatureVector::from_array(values),
    }
}

/// Ground truth matching [`prediction`]
pub fn label_for(record: &PredictionRecord) -> LabelRecord {
    let arrived = record.timestamp + Duration::days(2);
    LabelRecord {
        prediction_id: record.prediction_id.clone(),
        true_label: record.prediction,
        label_timestamp: arrived,
        label_source: "collections".to_string(),
        days_delayed: Some(2),
        updated_at: arrived,
    }
}

/// Logistic model scoring only `RevolvingUtilizationOfUnsecuredLines`
pub fn artifact(weight: f64, bias: f64) -> ModelArtifact {
    let columns = FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    let mut weights = vec![0.0; 10];
    weights[0] = weight;
    let model = LogisticModel::new(columns, vec![0.0; 10], vec![1.0; 10], weights, bias)
        .expect("valid fixture model");
    ModelArtifact::LogisticRegression(model)
}
