//! Tests for model registries

use tempfile::TempDir;

use super::*;
use crate::fixtures::artifact;

const MODEL: &str = "credit-risk-model";

fn new_version(run_id: &str) -> NewModelVersion {
    NewModelVersion::new(artifact(1.0, 0.0)).with_run_id(run_id).with_context("trigger", "manual")
}

// -----------------------------------------------------------------------------
// Stage machine
// -----------------------------------------------------------------------------

#[test]
fn test_stage_valid_transitions() {
    assert!(ModelStage::None.can_transition_to(ModelStage::Staging));
    assert!(ModelStage::Staging.can_transition_to(ModelStage::Production));
    assert!(ModelStage::Staging.can_transition_to(ModelStage::Archived));
    assert!(ModelStage::Production.can_transition_to(ModelStage::Archived));
    assert!(ModelStage::Archived.can_transition_to(ModelStage::Production));
}

#[test]
fn test_stage_invalid_transitions() {
    assert!(!ModelStage::None.can_transition_to(ModelStage::Production));
    assert!(!ModelStage::Archived.can_transition_to(ModelStage::Staging));
    assert!(!ModelStage::Production.can_transition_to(ModelStage::Staging));
}

#[test]
fn test_stage_display() {
    assert_eq!(ModelStage::Production.to_string(), "Production");
    assert_eq!(ModelStage::Archived.as_str(), "Archived");
}

// -----------------------------------------------------------------------------
// InMemoryRegistry
// -----------------------------------------------------------------------------

#[test]
fn test_register_assigns_increasing_versions() {
    let mut registry = InMemoryRegistry::new();
    let v1 = registry.register(MODEL, new_version("run-a")).expect("operation should succeed");
    let v2 = registry.register(MODEL, new_version("run-b")).expect("operation should succeed");

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_eq!(v2.stage, ModelStage::None);
    assert_eq!(v2.training_context.get("trigger").map(String::as_str), Some("manual"));
    assert_eq!(registry.load(MODEL, 2).expect("operation should succeed"), artifact(1.0, 0.0));
}

#[test]
fn test_load_missing_version() {
    let registry = InMemoryRegistry::new();
    assert!(matches!(registry.load(MODEL, 4), Err(RegistryError::VersionNotFound(_, 4))));
}

#[test]
fn test_get_latest_by_stage() {
    let mut registry = InMemoryRegistry::new();
    assert_eq!(registry.get_latest(MODEL, ModelStage::Production).expect("ok"), None);

    for run in ["a", "b", "c"] {
        let v = registry.register(MODEL, new_version(run)).expect("operation should succeed");
        registry.transition_stage(MODEL, v.version, ModelStage::Staging, None).expect("ok");
    }
    let latest = registry.get_latest(MODEL, ModelStage::Staging).expect("ok").expect("staged");
    assert_eq!(latest.version, 3);
}

#[test]
fn test_search_versions_by_run_id_and_stage() {
    let mut registry = InMemoryRegistry::new();
    registry.register(MODEL, new_version("run-a")).expect("ok");
    let b = registry.register(MODEL, new_version("run-b")).expect("ok");
    registry.transition_stage(MODEL, b.version, ModelStage::Staging, None).expect("ok");

    let by_run = registry.search_versions(MODEL, &VersionFilter::run_id("run-b")).expect("ok");
    assert_eq!(by_run.len(), 1);
    assert_eq!(by_run[0].version, 2);

    let staged = registry.search_versions(MODEL, &VersionFilter::stage(ModelStage::Staging)).expect("ok");
    assert_eq!(staged.len(), 1);

    let all = registry.search_versions(MODEL, &VersionFilter::default()).expect("ok");
    assert_eq!(all.iter().map(|v| v.version).collect::<Vec<_>>(), vec![2, 1]);

    assert!(registry.search_versions("unknown", &VersionFilter::default()).expect("ok").is_empty());
}

#[test]
fn test_second_production_is_refused() {
    let mut registry = InMemoryRegistry::new();
    for run in ["a", "b"] {
        let v = registry.register(MODEL, new_version(run)).expect("ok");
        registry.transition_stage(MODEL, v.version, ModelStage::Staging, None).expect("ok");
    }
    registry.transition_stage(MODEL, 1, ModelStage::Production, Some("system")).expect("ok");

    let err = registry.transition_stage(MODEL, 2, ModelStage::Production, None).unwrap_err();
    assert!(matches!(err, RegistryError::ProductionConflict { existing: 1, requested: 2, .. }));
    assert_eq!(registry.production_versions(MODEL), vec![1]);

    registry.transition_stage(MODEL, 1, ModelStage::Archived, None).expect("ok");
    let promoted =
        registry.transition_stage(MODEL, 2, ModelStage::Production, Some("system")).expect("ok");
    assert_eq!(promoted.promoted_by.as_deref(), Some("system"));
    assert_eq!(registry.production_versions(MODEL), vec![2]);
}

#[test]
fn test_invalid_transition_is_rejected() {
    let mut registry = InMemoryRegistry::new();
    registry.register(MODEL, new_version("a")).expect("ok");
    let err = registry.transition_stage(MODEL, 1, ModelStage::Production, None).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidTransition { from: ModelStage::None, to: ModelStage::Production, .. }
    ));
}

#[test]
fn test_same_stage_transition_is_noop() {
    let mut registry = InMemoryRegistry::new();
    registry.register(MODEL, new_version("a")).expect("ok");
    registry.transition_stage(MODEL, 1, ModelStage::Staging, None).expect("ok");
    registry.transition_stage(MODEL, 1, ModelStage::Staging, None).expect("ok");
    assert_eq!(registry.transition_history(MODEL).expect("ok").len(), 1);
}

#[test]
fn test_link_decision_and_history() {
    let mut registry = InMemoryRegistry::new();
    registry.register(MODEL, new_version("a")).expect("ok");
    registry.link_decision(MODEL, 1, "decision-123").expect("ok");
    assert_eq!(
        registry.get_version(MODEL, 1).expect("ok").decision_id.as_deref(),
        Some("decision-123")
    );
    assert!(registry.link_decision(MODEL, 9, "x").is_err());
    assert!(matches!(registry.transition_history("other"), Err(RegistryError::ModelNotFound(_))));
}

// -----------------------------------------------------------------------------
// JsonFileRegistry
// -----------------------------------------------------------------------------

#[test]
fn test_json_registry_persists_across_open() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let path = dir.path().join("registry").join("registry.json");
    {
        let mut registry = JsonFileRegistry::open(&path).expect("operation should succeed");
        registry.register(MODEL, new_version("run-a")).expect("ok");
        registry.transition_stage(MODEL, 1, ModelStage::Staging, Some("trainer")).expect("ok");
    }

    let registry = JsonFileRegistry::open(&path).expect("operation should succeed");
    let v = registry.get_version(MODEL, 1).expect("ok");
    assert_eq!(v.stage, ModelStage::Staging);
    assert_eq!(v.run_id.as_deref(), Some("run-a"));
    assert_eq!(registry.load(MODEL, 1).expect("ok"), artifact(1.0, 0.0));
    assert_eq!(registry.transition_history(MODEL).expect("ok").len(), 1);
}

#[test]
fn test_json_registry_failed_mutation_leaves_state() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let mut registry =
        JsonFileRegistry::open(dir.path().join("registry.json")).expect("operation should succeed");
    registry.register(MODEL, new_version("run-a")).expect("ok");

    assert!(registry.transition_stage(MODEL, 1, ModelStage::Production, None).is_err());
    assert_eq!(registry.get_version(MODEL, 1).expect("ok").stage, ModelStage::None);
}

#[test]
fn test_json_registry_corrupt_file() {
    let dir = TempDir::new().expect("temp file creation should succeed");
    let path = dir.path().join("registry.json");
    std::fs::write(&path, "not json").expect("file write should succeed");
    assert!(matches!(JsonFileRegistry::open(&path), Err(RegistryError::Internal(_))));
}

#[test]
fn test_shared_registry_lock_helpers() {
    let registry = shared(InMemoryRegistry::new());
    write(&registry).expect("lock").register(MODEL, new_version("a")).expect("ok");
    assert_eq!(read(&registry).expect("lock").get_version(MODEL, 1).expect("ok").version, 1);
}
