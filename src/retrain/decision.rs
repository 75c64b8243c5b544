//! Gate decisions and audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::DriftDetails;

/// Why a retraining run was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Scheduled,
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Scheduled => "scheduled",
            TriggerReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger and advisory drift context attached to a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub reason: TriggerReason,
    /// Whether the drift aggregator flagged the lookback window (observation only)
    pub drift_flagged: bool,
    pub drift: Option<DriftDetails>,
}

impl TriggerContext {
    pub fn new(reason: TriggerReason) -> Self {
        Self { reason, drift_flagged: false, drift: None }
    }

    pub fn with_drift(mut self, flagged: bool, details: DriftDetails) -> Self {
        self.drift_flagged = flagged;
        self.drift = Some(details);
        self
    }
}

/// Gates of the promotion state machine, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    /// Fail-closed precheck: coverage required but not supplied
    CoverageValidation,
    SufficientSamples,
    MinimumCoverage,
    PromotionCooldown,
    MetricImprovement,
    CalibrationMaintained,
    NoSegmentRegression,
    /// No production model exists; all gates bypassed
    FirstDeployment,
}

impl GateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateName::CoverageValidation => "coverage_validation",
            GateName::SufficientSamples => "sufficient_samples",
            GateName::MinimumCoverage => "minimum_coverage",
            GateName::PromotionCooldown => "promotion_cooldown",
            GateName::MetricImprovement => "metric_improvement",
            GateName::CalibrationMaintained => "calibration_maintained",
            GateName::NoSegmentRegression => "no_segment_regression",
            GateName::FirstDeployment => "first_deployment",
        }
    }
}

impl std::fmt::Display for GateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured values behind one gate result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateDetail {
    CoverageValidation { error: String },
    SufficientSamples { num_samples: usize, min_required: usize },
    /// `coverage_pct` is `None` when the gate is disabled and no coverage was supplied
    MinimumCoverage { coverage_pct: Option<f64>, min_required_pct: f64 },
    PromotionCooldown { message: String, days_since_last: Option<i64>, cooldown_days: i64 },
    MetricImprovement { f1_improvement_pct: f64, threshold: f64 },
    CalibrationMaintained { brier_change: f64, threshold: f64 },
    NoSegmentRegression { issues: Vec<String>, missing_segments: Vec<String> },
    FirstDeployment { message: String },
}

/// Pass/fail of one gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateName,
    pub passed: bool,
    pub detail: GateDetail,
}

/// Terminal output of the evaluation gate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    /// Evaluated gates in order; gates after the first failure are absent
    pub gate_results: Vec<GateResult>,
    pub final_decision: bool,
    pub reason: Vec<String>,
    /// Production segments absent from the shadow breakdown
    #[serde(default)]
    pub missing_segments: Vec<String>,
    pub trigger: Option<TriggerContext>,
}

impl GateDecision {
    pub(crate) fn new(timestamp: DateTime<Utc>, trigger: Option<TriggerContext>) -> Self {
        Self {
            decision_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            gate_results: Vec::new(),
            final_decision: false,
            reason: Vec::new(),
            missing_segments: Vec::new(),
            trigger,
        }
    }

    /// Result for a gate, if it was evaluated
    pub fn gate(&self, name: GateName) -> Option<&GateResult> {
        self.gate_results.iter().find(|r| r.gate == name)
    }

    /// Names of the evaluated gates, in order
    pub fn evaluated_gates(&self) -> Vec<GateName> {
        self.gate_results.iter().map(|r| r.gate).collect()
    }

    /// First failing gate
    pub fn failed_gate(&self) -> Option<GateName> {
        self.gate_results.iter().find(|r| !r.passed).map(|r| r.gate)
    }
}

/// Kind of audited outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Promote,
    Reject,
    Rollback,
    PromoteFailed,
    Skip,
    Abort,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Promote => "promote",
            DecisionAction::Reject => "reject",
            DecisionAction::Rollback => "rollback",
            DecisionAction::PromoteFailed => "promote_failed",
            DecisionAction::Skip => "skip",
            DecisionAction::Abort => "abort",
        }
    }

    fn default_outcome(&self) -> &'static str {
        match self {
            DecisionAction::Promote => "promoted",
            DecisionAction::Reject => "successful_rejection",
            DecisionAction::Rollback => "rolled_back",
            DecisionAction::PromoteFailed => "failed",
            DecisionAction::Skip => "skipped",
            DecisionAction::Abort => "aborted",
        }
    }
}

/// Append-only audit artifact for one terminal outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: DecisionAction,
    pub model_name: String,
    pub actor: String,
    pub outcome: String,
    #[serde(default)]
    pub reason: Vec<String>,
    #[serde(default)]
    pub shadow_run_id: Option<String>,
    #[serde(default)]
    pub shadow_version: Option<u32>,
    #[serde(default)]
    pub previous_production_version: Option<u32>,
    #[serde(default)]
    pub restored_version: Option<u32>,
    #[serde(default)]
    pub evaluation_decision: Option<GateDecision>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DecisionRecord {
    pub fn new(
        action: DecisionAction,
        model_name: &str,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            action,
            model_name: model_name.to_string(),
            actor: actor.to_string(),
            outcome: action.default_outcome().to_string(),
            reason: Vec::new(),
            shadow_run_id: None,
            shadow_version: None,
            previous_production_version: None,
            restored_version: None,
            evaluation_decision: None,
            error: None,
        }
    }

    pub fn with_shadow(mut self, run_id: &str, version: Option<u32>) -> Self {
        self.shadow_run_id = Some(run_id.to_string());
        self.shadow_version = version;
        self
    }

    pub fn with_previous_production(mut self, version: Option<u32>) -> Self {
        self.previous_production_version = version;
        self
    }

    pub fn with_restored(mut self, version: u32) -> Self {
        self.restored_version = Some(version);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason.push(reason.into());
        self
    }

    pub fn with_decision(mut self, decision: &GateDecision) -> Self {
        self.reason.extend(decision.reason.iter().cloned());
        self.evaluation_decision = Some(decision.clone());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
