//! Evaluation gate: ordered promotion criteria with short-circuit

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::decision::{GateDecision, GateDetail, GateName, GateResult, TriggerContext};
use crate::eval::{Comparison, MetricsBundle, SegmentPerformance};
use crate::storage::{DecisionLog, LabelCoverage};

/// Gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_f1_improvement_pct: f64,
    pub max_brier_degradation: f64,
    pub max_segment_regression_pct: f64,
    pub min_samples_for_decision: usize,
    /// 0 disables the coverage gate
    pub min_coverage_pct: f64,
    pub promotion_cooldown_days: i64,
    /// Treat production segments absent from the shadow breakdown as regressions
    pub block_on_missing_segments: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_f1_improvement_pct: 2.0,
            max_brier_degradation: 0.01,
            max_segment_regression_pct: 5.0,
            min_samples_for_decision: 200,
            min_coverage_pct: 30.0,
            promotion_cooldown_days: 7,
            block_on_missing_segments: false,
        }
    }
}

/// Multi-criteria promotion gate.
///
/// Sole authority for the promotion cooldown, read from the decision log's
/// last-promotion pointer.
pub struct EvaluationGate<D: DecisionLog> {
    config: GateConfig,
    decisions: Arc<D>,
}

/// Reject at `gate`: record the result and reason, log, return the decision
fn reject(mut decision: GateDecision, result: GateResult, reason: String) -> (bool, GateDecision) {
    info!(gate = %result.gate, passed = false, detail = ?result.detail, "gate evaluated");
    decision.gate_results.push(result);
    decision.reason.push(reason);
    decision.final_decision = false;
    info!(
        reason_code = decision.failed_gate().map(|g| g.as_str()).unwrap_or("unknown"),
        reasons = ?decision.reason,
        "rejection is a successful gate outcome: inadequate model kept out of production"
    );
    (false, decision)
}

fn pass(decision: &mut GateDecision, result: GateResult) {
    info!(gate = %result.gate, passed = true, detail = ?result.detail, "gate evaluated");
    decision.gate_results.push(result);
}

impl<D: DecisionLog> EvaluationGate<D> {
    pub fn new(config: GateConfig, decisions: Arc<D>) -> Self {
        Self { config, decisions }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the gates against replayed metrics.
    ///
    /// The first failing gate ends evaluation; later gates are absent from
    /// the decision. Missing coverage while coverage gating is enabled fails
    /// closed before any gate runs.
    #[instrument(skip_all, fields(shadow_samples = shadow.num_samples))]
    pub fn evaluate(
        &self,
        production: &MetricsBundle,
        shadow: &MetricsBundle,
        comparison: &Comparison,
        coverage: Option<&LabelCoverage>,
        trigger: Option<TriggerContext>,
        now: DateTime<Utc>,
    ) -> (bool, GateDecision) {
        let cfg = &self.config;
        let mut decision = GateDecision::new(now, trigger);

        if cfg.min_coverage_pct > 0.0 && coverage.is_none() {
            let message = format!(
                "Coverage gating enabled (min={}%) but coverage_stats not provided. FAILING CLOSED.",
                cfg.min_coverage_pct
            );
            error!(%message);
            let result = GateResult {
                gate: GateName::CoverageValidation,
                passed: false,
                detail: GateDetail::CoverageValidation { error: "coverage_stats_missing".into() },
            };
            return reject(decision, result, message);
        }

        // 1. sufficient samples
        let num_samples = shadow.num_samples;
        let result = GateResult {
            gate: GateName::SufficientSamples,
            passed: num_samples >= cfg.min_samples_for_decision,
            detail: GateDetail::SufficientSamples {
                num_samples,
                min_required: cfg.min_samples_for_decision,
            },
        };
        if !result.passed {
            let reason =
                format!("Insufficient samples: {num_samples} < {}", cfg.min_samples_for_decision);
            return reject(decision, result, reason);
        }
        pass(&mut decision, result);

        // 2. minimum coverage
        match coverage {
            Some(coverage) => {
                let coverage_pct = coverage.coverage_pct();
                let result = GateResult {
                    gate: GateName::MinimumCoverage,
                    passed: coverage_pct >= cfg.min_coverage_pct,
                    detail: GateDetail::MinimumCoverage {
                        coverage_pct: Some(coverage_pct),
                        min_required_pct: cfg.min_coverage_pct,
                    },
                };
                if !result.passed {
                    let reason = format!(
                        "Insufficient label coverage: {coverage_pct:.1}% < {}%",
                        cfg.min_coverage_pct
                    );
                    return reject(decision, result, reason);
                }
                pass(&mut decision, result);
            }
            // Gating disabled (min 0); recorded so the audit shows every gate
            None => pass(
                &mut decision,
                GateResult {
                    gate: GateName::MinimumCoverage,
                    passed: true,
                    detail: GateDetail::MinimumCoverage {
                        coverage_pct: None,
                        min_required_pct: cfg.min_coverage_pct,
                    },
                },
            ),
        }

        // 3. cooldown
        let (passed, message, days_since_last) = self.check_promotion_cooldown(now);
        let result = GateResult {
            gate: GateName::PromotionCooldown,
            passed,
            detail: GateDetail::PromotionCooldown {
                message: message.clone(),
                days_since_last,
                cooldown_days: cfg.promotion_cooldown_days,
            },
        };
        if !passed {
            return reject(decision, result, message);
        }
        pass(&mut decision, result);

        // 4. metric improvement
        let f1_improvement_pct = comparison.f1_improvement_pct;
        let result = GateResult {
            gate: GateName::MetricImprovement,
            passed: f1_improvement_pct >= cfg.min_f1_improvement_pct,
            detail: GateDetail::MetricImprovement {
                f1_improvement_pct,
                threshold: cfg.min_f1_improvement_pct,
            },
        };
        if !result.passed {
            let reason = format!(
                "Insufficient F1 improvement: {f1_improvement_pct:.2}% < {}%",
                cfg.min_f1_improvement_pct
            );
            return reject(decision, result, reason);
        }
        pass(&mut decision, result);

        // 5. calibration
        let brier_change = comparison.brier_change;
        let result = GateResult {
            gate: GateName::CalibrationMaintained,
            passed: brier_change <= cfg.max_brier_degradation,
            detail: GateDetail::CalibrationMaintained {
                brier_change,
                threshold: cfg.max_brier_degradation,
            },
        };
        if !result.passed {
            let reason = format!(
                "Calibration degraded: Brier change {brier_change:.4} > {}",
                cfg.max_brier_degradation
            );
            return reject(decision, result, reason);
        }
        pass(&mut decision, result);

        // 6. segments
        let (issues, missing_segments) = self.check_segment_regression(
            production.segment_performance.as_ref(),
            shadow.segment_performance.as_ref(),
        );
        decision.missing_segments = missing_segments.clone();
        let result = GateResult {
            gate: GateName::NoSegmentRegression,
            passed: issues.is_empty(),
            detail: GateDetail::NoSegmentRegression { issues: issues.clone(), missing_segments },
        };
        if !result.passed {
            return reject(decision, result, format!("Segment regression: {}", issues.join("; ")));
        }
        pass(&mut decision, result);

        decision.final_decision = true;
        decision.reason = vec![format!(
            "All gates passed. F1 improved {f1_improvement_pct:.2}%, calibration maintained \
             (Brier: {brier_change:+.4}), no segment regression."
        )];
        info!(reason = %decision.reason[0], "decision: promote");
        (true, decision)
    }

    /// Decision for a model with no production incumbent: every gate is
    /// bypassed and promotion is approved.
    pub fn evaluate_first_deployment(
        &self,
        trigger: Option<TriggerContext>,
        now: DateTime<Utc>,
    ) -> (bool, GateDecision) {
        let mut decision = GateDecision::new(now, trigger);
        let message =
            "First deployment: no production model to compare against, gates bypassed".to_string();
        decision.gate_results.push(GateResult {
            gate: GateName::FirstDeployment,
            passed: true,
            detail: GateDetail::FirstDeployment { message: message.clone() },
        });
        decision.reason.push(message);
        decision.final_decision = true;
        info!("first deployment: auto-promote");
        (true, decision)
    }

    /// `(passed, message, days_since_last)`; a failed lookup fails closed
    fn check_promotion_cooldown(&self, now: DateTime<Utc>) -> (bool, String, Option<i64>) {
        let last = match self.decisions.last_promotion() {
            Ok(last) => last,
            Err(e) => {
                error!(error = %e, "last promotion lookup failed");
                return (false, format!("Cooldown lookup failed: {e}. FAILING CLOSED."), None);
            }
        };
        let Some(last) = last else {
            return (true, "No previous promotions found".to_string(), None);
        };

        let days_since = (now - last).num_days();
        let cooldown = self.config.promotion_cooldown_days;
        if days_since < cooldown {
            let remaining = cooldown - days_since;
            return (
                false,
                format!(
                    "Cooldown active: last promotion {days_since} days ago, need {remaining} more days"
                ),
                Some(days_since),
            );
        }
        (true, format!("Cooldown satisfied: {days_since} days since last promotion"), Some(days_since))
    }

    /// `(issues, missing_segments)` over segments present in production
    fn check_segment_regression(
        &self,
        production: Option<&SegmentPerformance>,
        shadow: Option<&SegmentPerformance>,
    ) -> (Vec<String>, Vec<String>) {
        let (Some(production), Some(shadow)) = (production, shadow) else {
            return (Vec::new(), Vec::new());
        };
        if production.is_empty() || shadow.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let mut issues = Vec::new();
        let mut missing = Vec::new();
        for (feature, prod_segments) in production {
            for (segment, prod_metrics) in prod_segments {
                let key = format!("{feature}={segment}");
                let Some(shadow_metrics) = shadow.get(feature).and_then(|s| s.get(segment)) else {
                    warn!(segment = %key, "segment present in production but missing in shadow (insufficient shadow data)");
                    if self.config.block_on_missing_segments {
                        issues.push(format!("{key}: missing in shadow (insufficient data)"));
                    }
                    missing.push(key);
                    continue;
                };

                let prod_f1 = prod_metrics.f1_score;
                if prod_f1 > 0.0 {
                    let regression_pct = (shadow_metrics.f1_score - prod_f1) / prod_f1 * 100.0;
                    if regression_pct < -self.config.max_segment_regression_pct {
                        issues.push(format!("{key}: F1 dropped {:.1}%", regression_pct.abs()));
                    }
                }
            }
        }

        if !missing.is_empty() {
            warn!(count = missing.len(), segments = ?missing, "segments missing in shadow evaluation");
        }
        (issues, missing)
    }
}
