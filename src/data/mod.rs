//! Typed records and the temporal window splitter
//!
//! Every row entering the retraining path is parsed into a typed record at
//! the boundary ([`FeatureVector::from_map`], [`PredictionRecord::validate`]).
//! Train/eval partitioning goes exclusively through [`TemporalWindows`]; there
//! is no random split anywhere in this crate.

mod fingerprint;
mod schema;
mod temporal;

#[cfg(test)]
mod tests;

pub use fingerprint::DatasetFingerprint;
pub use schema::{
    FeatureVector, LabelRecord, LabeledPrediction, PredictionRecord, SchemaError,
    FEATURE_COLUMNS,
};
pub use temporal::{
    create_temporal_split, DateColumn, SplitError, TemporalWindows, Timestamped, Window,
};
