//! Retrainer: self-healing retraining decision core
//!
//! Observes served predictions, aggregates drift context, trains challenger
//! ("shadow") models on temporal windows, replays one evaluation set through
//! both the incumbent and the challenger, and gates promotion through an
//! ordered, fail-closed policy.
//!
//! ## Architecture
//!
//! - `data`: typed records, the temporal window splitter, dataset fingerprints
//! - `storage`: prediction log, label store, decision audit log
//! - `registry`: model registry with Staging/Production/Archived stages
//! - `model`: classifier abstraction and the fixed-hyperparameter trainer
//! - `eval`: metrics bundles, replay evaluation, model comparison
//! - `monitor`: drift signal aggregation, proxy metrics, monitoring sink
//! - `retrain`: shadow trainer, evaluation gate, model promoter
//! - `tracking`: experiment runs backing shadow-training lineage
//! - `pipeline`: one sequential retraining run over injected services
//!
//! ## Example
//!
//! ```ignore
//! use retrainer::config::PipelineConfig;
//! use retrainer::pipeline::FilePipeline;
//! use retrainer::retrain::TriggerReason;
//!
//! let config = PipelineConfig::from_yaml_file("retrain.yaml")?;
//! let mut pipeline = FilePipeline::from_config(config)?;
//! let outcome = pipeline.run(TriggerReason::Scheduled, chrono::Utc::now())?;
//! println!("{}", outcome.summary());
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod retrain;
pub mod storage;
pub mod telemetry;
pub mod tracking;

#[cfg(test)]
mod fixtures;

pub use error::{best_effort, Result, RetrainError};
