//! Shadow vs production comparison

use serde::{Deserialize, Serialize};

use super::metrics::MetricsBundle;

/// Differences between two replayed metrics bundles (shadow minus production)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub f1_improvement: f64,
    /// Relative F1 change in percent; 0 when production F1 is not positive
    pub f1_improvement_pct: f64,
    pub roc_auc_improvement: f64,
    /// Positive means the shadow is worse calibrated
    pub brier_change: f64,
    pub calibration_degraded: bool,
}

/// Compare shadow metrics against production metrics
pub fn compare_models(production: &MetricsBundle, shadow: &MetricsBundle) -> Comparison {
    let prod_f1 = production.f1();
    let shadow_f1 = shadow.f1();
    let f1_improvement = shadow_f1 - prod_f1;

    Comparison {
        f1_improvement,
        f1_improvement_pct: if prod_f1 > 0.0 { f1_improvement / prod_f1 * 100.0 } else { 0.0 },
        roc_auc_improvement: shadow.primary_metrics.roc_auc - production.primary_metrics.roc_auc,
        brier_change: shadow.brier() - production.brier(),
        calibration_degraded: shadow.brier() > production.brier(),
    }
}
