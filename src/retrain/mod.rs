//! Retraining decision core
//!
//! - [`ShadowTrainer`]: temporal data preparation and challenger training,
//!   registering the result in `Staging`
//! - [`EvaluationGate`]: six ordered, short-circuiting promotion gates
//! - [`ModelPromoter`]: archive-then-promote as one logical transaction,
//!   rejection, rollback
//!
//! Rejection is a successful terminal outcome and is audited like a
//! promotion.

mod decision;
mod gate;
mod promoter;
mod shadow_trainer;


use thiserror::Error;

use crate::registry::RegistryError;

pub use decision::{
    DecisionAction, DecisionRecord, GateDecision, GateDetail, GateName, GateResult,
    TriggerContext, TriggerReason,
};
pub use gate::{EvaluationGate, GateConfig};
pub use promoter::ModelPromoter;
pub use shadow_trainer::{
    PreparedData, ShadowTrainer, TrainOutcome, TrainedShadow, TrainerConfig, ValidationStatus,
};

/// Promotion and rollback errors
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("No registered version for shadow run {0}")]
    ShadowNotFound(String),

    /// The incumbent was archived but the challenger could not be promoted
    #[error("Promotion failed after archiving v{archived_version} (incumbent restored: {restored}): {source}")]
    PartialFailure {
        archived_version: u32,
        restored: bool,
        #[source]
        source: RegistryError,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
