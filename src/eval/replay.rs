//! Replay evaluator: score two registry versions on one frame

use tracing::{info, instrument};

use super::frame::EvalFrame;
use super::metrics::{evaluate_predictions, MetricsBundle};
use super::segments::SegmentConfig;
use super::{EvalError, Result};
use crate::data::SchemaError;
use crate::model::{Classifier, ModelArtifact};
use crate::registry::{self, ModelRegistry, SharedRegistry};

/// Re-scores the production and shadow versions on identical samples
pub struct ReplayEvaluator<R: ModelRegistry> {
    registry: SharedRegistry<R>,
    model_name: String,
    segments: SegmentConfig,
}

impl<R: ModelRegistry> ReplayEvaluator<R> {
    pub fn new(registry: SharedRegistry<R>, model_name: impl Into<String>) -> Self {
        Self { registry, model_name: model_name.into(), segments: SegmentConfig::default() }
    }

    pub fn with_segments(mut self, segments: SegmentConfig) -> Self {
        self.segments = segments;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Score `frame` with both versions and return `(production, shadow)`.
    ///
    /// The frame must carry `true_label` and every requested feature. Both
    /// models see the same matrix in `feature_columns` order; a model trained
    /// on a different feature list is refused.
    #[instrument(skip(self, frame, feature_columns), fields(model = %self.model_name, rows = frame.len()))]
    pub fn replay_evaluation(
        &self,
        frame: &EvalFrame,
        production_version: u32,
        shadow_version: u32,
        feature_columns: &[&str],
    ) -> Result<(MetricsBundle, MetricsBundle)> {
        let y_true = frame
            .true_label()
            .ok_or_else(|| SchemaError::MissingColumn("true_label".into()))?;
        if frame.is_empty() {
            return Err(EvalError::EmptyEvaluation);
        }
        let x = frame.select(feature_columns)?;

        let (production, shadow) = {
            let guard = registry::read(&self.registry)?;
            (
                guard.load(&self.model_name, production_version)?,
                guard.load(&self.model_name, shadow_version)?,
            )
        };

        let prod_metrics = self.score(&production, production_version, frame, &x, y_true, feature_columns)?;
        info!(
            version = production_version,
            f1 = prod_metrics.f1(),
            brier = prod_metrics.brier(),
            "replayed production model"
        );

        let shadow_metrics = self.score(&shadow, shadow_version, frame, &x, y_true, feature_columns)?;
        info!(
            version = shadow_version,
            f1 = shadow_metrics.f1(),
            brier = shadow_metrics.brier(),
            f1_diff = shadow_metrics.f1() - prod_metrics.f1(),
            "replayed shadow model"
        );

        Ok((prod_metrics, shadow_metrics))
    }

    fn score(
        &self,
        model: &ModelArtifact,
        version: u32,
        frame: &EvalFrame,
        x: &[Vec<f64>],
        y_true: &[u8],
        feature_columns: &[&str],
    ) -> Result<MetricsBundle> {
        if model.feature_columns().iter().map(String::as_str).ne(feature_columns.iter().copied()) {
            return Err(EvalError::FeatureMismatch {
                version,
                expected: feature_columns.iter().map(|c| (*c).to_string()).collect(),
                actual: model.feature_columns().to_vec(),
            });
        }

        let y_prob = model.predict_proba(x)?;
        let y_pred: Vec<u8> = y_prob.iter().map(|p| u8::from(*p >= 0.5)).collect();
        let mut bundle = evaluate_predictions(y_true, &y_pred, &y_prob)?;
        if !self.segments.is_empty() {
            bundle.segment_performance = Some(self.segments.compute(frame, y_true, &y_pred, &y_prob));
        }
        Ok(bundle)
    }
}
