//! Monitoring context: drift signals, label-free proxy statistics and the
//! write-only monitoring sink
//!
//! Nothing in this module triggers retraining. The aggregator's verdict is
//! attached to gate decisions as advisory context.

mod drift;
mod proxy;
mod sink;


pub use drift::{
    DriftConfig, DriftDetails, DriftReport, DriftSignalAggregator, DriftStatus, FeatureDrift,
    DRIFT_REPORT_PREFIX,
};
pub use proxy::ProxyStats;
pub use sink::{InMemorySink, JsonDirSink, MonitoringSink, MonitoringSnapshot};
