//! Model promoter: stage transitions plus audit records

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use super::decision::{DecisionAction, DecisionRecord, GateDecision};
use super::PromotionError;
use crate::error::best_effort;
use crate::registry::{self, ModelRegistry, ModelStage, RegistryError, SharedRegistry, VersionFilter};
use crate::storage::DecisionLog;

type Result<T> = std::result::Result<T, PromotionError>;

/// Applies gate verdicts to the registry.
///
/// Holds the registry write lock across archive-then-promote so no reader
/// observes two production versions, and restores the incumbent if the
/// promotion half fails. Does not check cooldown.
pub struct ModelPromoter<R: ModelRegistry, D: DecisionLog> {
    registry: SharedRegistry<R>,
    decisions: Arc<D>,
    model_name: String,
}

impl<R: ModelRegistry, D: DecisionLog> ModelPromoter<R, D> {
    pub fn new(registry: SharedRegistry<R>, decisions: Arc<D>, model_name: impl Into<String>) -> Self {
        Self { registry, decisions, model_name: model_name.into() }
    }

    /// Archive the current production version (if any) and promote the
    /// shadow version trained by `shadow_run_id`.
    ///
    /// A failure is audited as `promote_failed` and returned. The success
    /// record and the registry decision link are best-effort.
    #[instrument(skip(self, decision), fields(model = %self.model_name))]
    pub fn promote_to_production(
        &self,
        shadow_run_id: &str,
        decision: &GateDecision,
        promoted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord> {
        match self.swap_production(shadow_run_id, promoted_by) {
            Ok((shadow_version, archived)) => {
                info!(shadow_version, archived = ?archived, "promoted shadow to Production");
                let record = DecisionRecord::new(DecisionAction::Promote, &self.model_name, promoted_by, now)
                    .with_shadow(shadow_run_id, Some(shadow_version))
                    .with_previous_production(archived)
                    .with_decision(decision);

                best_effort("record promotion", || self.decisions.append(&record));
                best_effort("link gate decision to model version", || {
                    registry::write(&self.registry)?.link_decision(
                        &self.model_name,
                        shadow_version,
                        &decision.decision_id,
                    )
                });
                Ok(record)
            }
            Err(e) => {
                error!(error = %e, "promotion failed");
                let record =
                    DecisionRecord::new(DecisionAction::PromoteFailed, &self.model_name, promoted_by, now)
                        .with_shadow(shadow_run_id, None)
                        .with_decision(decision)
                        .with_error(e.to_string());
                best_effort("record failed promotion", || self.decisions.append(&record));
                Err(e)
            }
        }
    }

    /// `(shadow_version, archived_version)`
    fn swap_production(&self, shadow_run_id: &str, actor: &str) -> Result<(u32, Option<u32>)> {
        let name = self.model_name.as_str();
        let mut registry = registry::write(&self.registry)?;

        let shadow = registry
            .search_versions(name, &VersionFilter::run_id(shadow_run_id))?
            .into_iter()
            .next()
            .ok_or_else(|| PromotionError::ShadowNotFound(shadow_run_id.to_string()))?;

        let archived = match registry.get_latest(name, ModelStage::Production)? {
            Some(current) if current.version != shadow.version => {
                registry.transition_stage(name, current.version, ModelStage::Archived, Some(actor))?;
                info!(version = current.version, "archived production model");
                Some(current.version)
            }
            _ => None,
        };

        if let Err(source) =
            registry.transition_stage(name, shadow.version, ModelStage::Production, Some(actor))
        {
            let Some(archived_version) = archived else {
                return Err(source.into());
            };
            let restored = registry
                .transition_stage(name, archived_version, ModelStage::Production, Some("promoter-restore"))
                .is_ok();
            error!(archived_version, restored, error = %source, "promotion half failed after archive");
            return Err(PromotionError::PartialFailure { archived_version, restored, source });
        }
        Ok((shadow.version, archived))
    }

    /// Archive the shadow version and audit the rejection.
    ///
    /// Rejection is the gate working as intended; registry trouble while
    /// archiving is recorded on the audit record instead of returned.
    #[instrument(skip(self, decision), fields(model = %self.model_name))]
    pub fn reject_shadow_model(
        &self,
        shadow_run_id: &str,
        decision: &GateDecision,
        rejected_by: &str,
        now: DateTime<Utc>,
    ) -> DecisionRecord {
        let mut record = DecisionRecord::new(DecisionAction::Reject, &self.model_name, rejected_by, now)
            .with_decision(decision);

        match self.archive_shadow(shadow_run_id, rejected_by) {
            Ok(version) => {
                record = record.with_shadow(shadow_run_id, version);
                info!(
                    shadow_version = ?version,
                    "rejection successful: shadow archived, inadequate model kept out of production"
                );
            }
            Err(e) => {
                warn!(error = %e, "could not archive rejected shadow; it stays inert in Staging");
                record = record.with_shadow(shadow_run_id, None).with_error(e.to_string());
            }
        }

        best_effort("record rejection", || self.decisions.append(&record));
        record
    }

    fn archive_shadow(&self, shadow_run_id: &str, actor: &str) -> Result<Option<u32>> {
        let mut registry = registry::write(&self.registry)?;
        let found = registry
            .search_versions(&self.model_name, &VersionFilter::run_id(shadow_run_id))?
            .into_iter()
            .next();
        let Some(shadow) = found else {
            return Ok(None);
        };
        registry.transition_stage(&self.model_name, shadow.version, ModelStage::Archived, Some(actor))?;
        Ok(Some(shadow.version))
    }

    /// Restore an archived version to production. Manual recovery only.
    ///
    /// Audited as `rollback`; rollbacks do not restart the promotion
    /// cooldown.
    #[instrument(skip(self), fields(model = %self.model_name))]
    pub fn rollback_to_version(
        &self,
        version: u32,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord> {
        let name = self.model_name.as_str();
        let rolled_back_from = {
            let mut registry = registry::write(&self.registry)?;
            let target = registry.get_version(name, version)?;
            if target.stage != ModelStage::Archived {
                return Err(RegistryError::InvalidTransition {
                    name: name.to_string(),
                    version,
                    from: target.stage,
                    to: ModelStage::Production,
                }
                .into());
            }

            let current = registry.get_latest(name, ModelStage::Production)?.map(|v| v.version);
            if let Some(current) = current {
                registry.transition_stage(name, current, ModelStage::Archived, Some(actor))?;
            }
            if let Err(source) = registry.transition_stage(name, version, ModelStage::Production, Some(actor)) {
                let Some(archived_version) = current else {
                    return Err(source.into());
                };
                let restored = registry
                    .transition_stage(name, archived_version, ModelStage::Production, Some("promoter-restore"))
                    .is_ok();
                return Err(PromotionError::PartialFailure { archived_version, restored, source });
            }
            current
        };

        warn!(restored_version = version, rolled_back_from = ?rolled_back_from, "rollback: restored archived version to Production");
        let record = DecisionRecord::new(DecisionAction::Rollback, name, actor, now)
            .with_restored(version)
            .with_previous_production(rolled_back_from)
            .with_reason(format!("Manual rollback to v{version}"));
        best_effort("record rollback", || self.decisions.append(&record));
        Ok(record)
    }

    /// Recent audit records, newest first
    pub fn deployment_history(&self, limit: usize) -> crate::storage::Result<Vec<DecisionRecord>> {
        self.decisions.history(limit)
    }
}
