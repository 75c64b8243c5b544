//! Model lifecycle stages

use serde::{Deserialize, Serialize};

/// Model lifecycle stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStage {
    /// Registered, not yet staged
    None,
    /// Shadow candidate; inert until promoted
    Staging,
    /// Serving traffic
    Production,
    /// Retired (rejected shadow or replaced incumbent)
    Archived,
}

impl ModelStage {
    /// Check if transition to target stage is valid
    pub fn can_transition_to(&self, target: ModelStage) -> bool {
        match (self, target) {
            (a, b) if *a == b => true,
            (_, ModelStage::Archived) => true,
            (ModelStage::None, ModelStage::Staging) => true,
            (ModelStage::Staging, ModelStage::Production) => true,
            // Rollback restores an archived version
            (ModelStage::Archived, ModelStage::Production) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStage::None => "None",
            ModelStage::Staging => "Staging",
            ModelStage::Production => "Production",
            ModelStage::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for ModelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
