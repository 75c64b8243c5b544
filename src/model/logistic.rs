//! Standardized logistic regression, fitted by full-batch gradient descent.
//! Deterministic: zero initialization and no sampling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, ClassifierTrainer, ModelArtifact, ModelError, Result};

/// Fixed hyperparameters for shadow training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on weights (not bias)
    pub l2: f64,
    /// Reweight classes to equal total weight
    pub balanced_class_weight: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self { learning_rate: 0.1, epochs: 500, l2: 1e-3, balanced_class_weight: false }
    }
}

/// Fitted logistic regression over standardized inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    feature_columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticModel {
    /// Assemble a model from fitted parameters
    pub fn new(
        feature_columns: Vec<String>,
        means: Vec<f64>,
        scales: Vec<f64>,
        weights: Vec<f64>,
        bias: f64,
    ) -> Result<Self> {
        let n = feature_columns.len();
        for (name, len) in [("means", means.len()), ("scales", scales.len()), ("weights", weights.len())] {
            if len != n {
                debug!(field = name, len, expected = n, "parameter length mismatch");
                return Err(ModelError::DimensionMismatch { expected: n, actual: len });
            }
        }
        if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ModelError::NonFinite("scales".to_string()));
        }
        Ok(Self { feature_columns, means, scales, weights, bias })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    fn logit(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((x, m), s), w)| w * (x - m) / s)
            .sum::<f64>()
            + self.bias
    }
}

impl Classifier for LogisticModel {
    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.feature_columns.len() {
                    return Err(ModelError::DimensionMismatch {
                        expected: self.feature_columns.len(),
                        actual: row.len(),
                    });
                }
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(ModelError::NonFinite("input row".to_string()));
                }
                Ok(sigmoid(self.logit(row)))
            })
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Trainer producing [`LogisticModel`] artifacts
#[derive(Debug, Clone, Default)]
pub struct LogisticTrainer {
    pub hyperparameters: Hyperparameters,
}

impl LogisticTrainer {
    pub fn new(hyperparameters: Hyperparameters) -> Self {
        Self { hyperparameters }
    }

    fn validate(&self) -> Result<()> {
        let h = &self.hyperparameters;
        if !(h.learning_rate.is_finite() && h.learning_rate > 0.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "learning_rate must be positive, got {}",
                h.learning_rate
            )));
        }
        if h.epochs == 0 {
            return Err(ModelError::InvalidHyperparameter("epochs must be > 0".to_string()));
        }
        if !(h.l2.is_finite() && h.l2 >= 0.0) {
            return Err(ModelError::InvalidHyperparameter(format!("l2 must be >= 0, got {}", h.l2)));
        }
        Ok(())
    }
}

impl ClassifierTrainer for LogisticTrainer {
    fn model_type(&self) -> &'static str {
        "logistic_regression"
    }

    fn params(&self) -> HashMap<String, String> {
        let h = &self.hyperparameters;
        HashMap::from([
            ("learning_rate".to_string(), h.learning_rate.to_string()),
            ("epochs".to_string(), h.epochs.to_string()),
            ("l2".to_string(), h.l2.to_string()),
            ("balanced_class_weight".to_string(), h.balanced_class_weight.to_string()),
        ])
    }

    fn fit(
        &self,
        feature_columns: &[&str],
        rows: &[Vec<f64>],
        labels: &[u8],
    ) -> Result<ModelArtifact> {
        self.validate()?;
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if rows.len() != labels.len() {
            return Err(ModelError::RowCountMismatch { rows: rows.len(), labels: labels.len() });
        }
        let d = feature_columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != d) {
            return Err(ModelError::DimensionMismatch { expected: d, actual: bad.len() });
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("training matrix".to_string()));
        }
        let positives = labels.iter().filter(|y| **y == 1).count();
        if positives == 0 || positives == labels.len() {
            return Err(ModelError::SingleClass);
        }

        let n = rows.len() as f64;
        let means: Vec<f64> = (0..d).map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n).collect();
        let scales: Vec<f64> = (0..d)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 1e-12 { sd } else { 1.0 }
            })
            .collect();
        let z: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| (0..d).map(|j| (r[j] - means[j]) / scales[j]).collect())
            .collect();

        let h = &self.hyperparameters;
        let sample_weight: Vec<f64> = if h.balanced_class_weight {
            let pos_w = n / (2.0 * positives as f64);
            let neg_w = n / (2.0 * (labels.len() - positives) as f64);
            labels.iter().map(|y| if *y == 1 { pos_w } else { neg_w }).collect()
        } else {
            vec![1.0; labels.len()]
        };
        let total_weight: f64 = sample_weight.iter().sum();

        let mut weights = vec![0.0; d];
        let mut bias = 0.0;
        for _ in 0..h.epochs {
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;
            for ((zi, yi), ci) in z.iter().zip(labels).zip(&sample_weight) {
                let logit: f64 = zi.iter().zip(&weights).map(|(x, w)| x * w).sum::<f64>() + bias;
                let err = ci * (sigmoid(logit) - f64::from(*yi));
                for (g, x) in grad_w.iter_mut().zip(zi) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= h.learning_rate * (g / total_weight + h.l2 * *w);
            }
            bias -= h.learning_rate * grad_b / total_weight;
        }

        let model = LogisticModel::new(
            feature_columns.iter().map(|c| (*c).to_string()).collect(),
            means,
            scales,
            weights,
            bias,
        )?;
        Ok(ModelArtifact::LogisticRegression(model))
    }
}
