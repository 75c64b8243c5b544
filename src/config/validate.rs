//! Range checks for [`PipelineConfig`]

use super::{ConfigError, PipelineConfig, Result};
use crate::data::FEATURE_COLUMNS;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("{name} must be a finite value >= 0, got {value}")));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{name} must be in [0, 1], got {value}")));
    }
    Ok(())
}

pub(super) fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.model_name.trim().is_empty() {
        return Err(invalid("model_name must not be empty"));
    }

    let gate = &config.gate;
    non_negative("gate.min_f1_improvement_pct", gate.min_f1_improvement_pct)?;
    non_negative("gate.max_brier_degradation", gate.max_brier_degradation)?;
    non_negative("gate.max_segment_regression_pct", gate.max_segment_regression_pct)?;
    if gate.min_samples_for_decision == 0 {
        return Err(invalid("gate.min_samples_for_decision must be > 0"));
    }
    if !(0.0..=100.0).contains(&gate.min_coverage_pct) {
        return Err(invalid(format!(
            "gate.min_coverage_pct must be in [0, 100], got {}",
            gate.min_coverage_pct
        )));
    }
    if gate.promotion_cooldown_days < 0 {
        return Err(invalid(format!(
            "gate.promotion_cooldown_days must be >= 0, got {}",
            gate.promotion_cooldown_days
        )));
    }

    unit_interval("drift.threshold", config.drift.threshold)?;
    if config.drift.lookback_hours <= 0 {
        return Err(invalid(format!(
            "drift.lookback_hours must be > 0, got {}",
            config.drift.lookback_hours
        )));
    }

    let trainer = &config.trainer;
    if !(trainer.train_fraction > 0.0 && trainer.train_fraction < 1.0) {
        return Err(invalid(format!(
            "trainer.train_fraction must be in (0, 1), got {}",
            trainer.train_fraction
        )));
    }
    if trainer.min_eval_samples == 0 {
        return Err(invalid("trainer.min_eval_samples must be > 0"));
    }
    let h = &trainer.hyperparameters;
    if !(h.learning_rate.is_finite() && h.learning_rate > 0.0) {
        return Err(invalid(format!(
            "trainer.hyperparameters.learning_rate must be > 0, got {}",
            h.learning_rate
        )));
    }
    if h.epochs == 0 {
        return Err(invalid("trainer.hyperparameters.epochs must be > 0"));
    }
    non_negative("trainer.hyperparameters.l2", h.l2)?;

    if config.readiness.lookback_days <= 0 {
        return Err(invalid(format!(
            "readiness.lookback_days must be > 0, got {}",
            config.readiness.lookback_days
        )));
    }
    unit_interval("readiness.min_coverage_rate", config.readiness.min_coverage_rate)?;

    for rule in &config.segments.rules {
        if !FEATURE_COLUMNS.contains(&rule.feature.as_str()) {
            return Err(invalid(format!("segments: unknown feature {}", rule.feature)));
        }
        if rule.bins.iter().any(|b| !b.is_finite()) {
            return Err(invalid(format!("segments: non-finite bin edge for {}", rule.feature)));
        }
        if rule.bins.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(format!(
                "segments: bin edges for {} must be strictly ascending",
                rule.feature
            )));
        }
    }

    Ok(())
}
