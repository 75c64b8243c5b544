//! Label-free prediction statistics

use serde::{Deserialize, Serialize};

use crate::data::PredictionRecord;

const ENTROPY_BINS: usize = 10;

/// Descriptive statistics of served predictions. Trends, not thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub count: usize,
    pub positive_rate: f64,
    pub probability_mean: f64,
    /// Sample standard deviation; 0 for a single prediction
    pub probability_std: f64,
    pub probability_median: f64,
    pub probability_q25: f64,
    pub probability_q75: f64,
    /// Shannon entropy (nats) of the 10-bin probability histogram
    pub entropy: f64,
}

impl ProxyStats {
    /// `None` for an empty slice
    pub fn compute(records: &[PredictionRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let mut probs: Vec<f64> = records.iter().map(|r| r.probability).collect();
        probs.sort_by(f64::total_cmp);

        let mean = probs.iter().sum::<f64>() / n;
        let std = if records.len() > 1 {
            (probs.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        Some(Self {
            count: records.len(),
            positive_rate: records.iter().filter(|r| r.prediction == 1).count() as f64 / n,
            probability_mean: mean,
            probability_std: std,
            probability_median: quantile(&probs, 0.5),
            probability_q25: quantile(&probs, 0.25),
            probability_q75: quantile(&probs, 0.75),
            entropy: histogram_entropy(&probs),
        })
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn histogram_entropy(probs: &[f64]) -> f64 {
    let mut hist = [0usize; ENTROPY_BINS];
    for p in probs.iter().filter(|p| (0.0..=1.0).contains(*p)) {
        // right edge of the last bin is inclusive
        let bin = ((p * ENTROPY_BINS as f64) as usize).min(ENTROPY_BINS - 1);
        hist[bin] += 1;
    }
    let total: usize = hist.iter().sum();
    let dist: Vec<f64> = hist
        .iter()
        .map(|h| {
            let share = if total > 0 { *h as f64 / total as f64 } else { 0.0 };
            share + 1e-10
        })
        .collect();
    let norm: f64 = dist.iter().sum();
    -dist.iter().map(|d| d / norm).map(|p| p * p.ln()).sum::<f64>()
}
