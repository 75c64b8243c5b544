//! Metrics bundle computation

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::confusion::BinaryConfusion;
use super::segments::SegmentPerformance;
use super::{EvalError, Result};

/// Threshold-dependent and ranking metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimaryMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

impl PrimaryMetrics {
    pub fn compute(y_true: &[u8], y_pred: &[u8], y_prob: &[f64]) -> Self {
        let cm = BinaryConfusion::from_predictions(y_true, y_pred);
        Self {
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1(),
            roc_auc: roc_auc(y_true, y_prob),
        }
    }

    /// `(name, value)` pairs, for logging as run metrics
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
            ("roc_auc", self.roc_auc),
        ]
    }
}

/// Probability calibration metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    pub brier_score: f64,
    /// Unweighted mean gap over non-empty uniform bins; `None` if not computable
    pub expected_calibration_error: Option<f64>,
}

/// Full evaluation result for one model on one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsBundle {
    pub num_samples: usize,
    pub primary_metrics: PrimaryMetrics,
    pub calibration_metrics: CalibrationMetrics,
    pub confusion_matrix: BinaryConfusion,
    #[serde(default)]
    pub segment_performance: Option<SegmentPerformance>,
}

impl MetricsBundle {
    pub fn f1(&self) -> f64 {
        self.primary_metrics.f1_score
    }

    pub fn brier(&self) -> f64 {
        self.calibration_metrics.brier_score
    }
}

/// Compute a metrics bundle from labels, hard predictions and probabilities.
///
/// Precision, recall and F1 default to 0 when undefined.
pub fn evaluate_predictions(y_true: &[u8], y_pred: &[u8], y_prob: &[f64]) -> Result<MetricsBundle> {
    if y_true.is_empty() {
        return Err(EvalError::EmptyEvaluation);
    }
    for len in [y_pred.len(), y_prob.len()] {
        if len != y_true.len() {
            return Err(EvalError::LengthMismatch { expected: y_true.len(), actual: len });
        }
    }

    Ok(MetricsBundle {
        num_samples: y_true.len(),
        primary_metrics: PrimaryMetrics::compute(y_true, y_pred, y_prob),
        calibration_metrics: CalibrationMetrics {
            brier_score: brier_score(y_true, y_prob),
            expected_calibration_error: expected_calibration_error(y_true, y_prob),
        },
        confusion_matrix: BinaryConfusion::from_predictions(y_true, y_pred),
        segment_performance: None,
    })
}

/// Mean squared error of probabilities against 0/1 labels
pub fn brier_score(y_true: &[u8], y_prob: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true.iter().zip(y_prob).map(|(t, p)| (p - f64::from(*t)).powi(2)).sum::<f64>()
        / y_true.len() as f64
}

/// Area under the ROC curve via the Mann-Whitney U statistic (average ranks
/// for ties). A single-class label set has no defined AUC; 0.5 is reported.
pub fn roc_auc(y_true: &[u8], y_prob: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|t| **t == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        warn!(n_pos, n_neg, "ROC-AUC undefined for a single-class label set; reporting 0.5");
        return 0.5;
    }

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|a, b| y_prob[*a].total_cmp(&y_prob[*b]));

    let mut ranks = vec![0.0; y_prob.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_prob[order[j + 1]] == y_prob[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 =
        y_true.iter().zip(&ranks).filter(|(t, _)| **t == 1).map(|(_, r)| r).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos as f64 * n_neg as f64)
}

/// Expected calibration error over 10 uniform bins on [0, 1].
///
/// A probability on an inner edge falls in the lower bin. Empty bins are
/// dropped and the remaining per-bin gaps are averaged without weighting.
pub fn expected_calibration_error(y_true: &[u8], y_prob: &[f64]) -> Option<f64> {
    const BINS: usize = 10;
    if y_true.is_empty() || y_prob.iter().any(|p| !(0.0..=1.0).contains(p)) {
        return None;
    }

    let mut count = [0usize; BINS];
    let mut prob_sum = [0.0f64; BINS];
    let mut true_sum = [0.0f64; BINS];
    for (t, p) in y_true.iter().zip(y_prob) {
        // number of inner edges strictly below p
        let bin = (1..BINS).filter(|k| (*k as f64 / BINS as f64) < *p).count();
        count[bin] += 1;
        prob_sum[bin] += p;
        true_sum[bin] += f64::from(*t);
    }

    let gaps: Vec<f64> = (0..BINS)
        .filter(|b| count[*b] > 0)
        .map(|b| (true_sum[b] / count[b] as f64 - prob_sum[b] / count[b] as f64).abs())
        .collect();
    Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
}
