//! Drift report parsing and aggregation

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::storage::{self, io_at, write_atomic};

/// File name prefix of drift summaries
pub const DRIFT_REPORT_PREFIX: &str = "drift_summary_";

const FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Per-feature drift test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    #[serde(default)]
    pub drift_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_score: Option<f64>,
}

impl FeatureDrift {
    pub fn new(feature: impl Into<String>, drift_detected: bool) -> Self {
        Self {
            feature: feature.into(),
            drift_detected,
            stat_test: None,
            p_value: None,
            drift_score: None,
        }
    }
}

/// One drift summary as produced by the external drift detector.
///
/// Older detector versions list features under `feature_drift_details` or as
/// bare names under `drifted_features`; both are still read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub dataset_drift_detected: bool,
    #[serde(default)]
    pub drift_share: f64,
    #[serde(default)]
    pub features: Vec<FeatureDrift>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_drift_details: Vec<FeatureDrift>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drifted_features: Vec<String>,
}

impl DriftReport {
    pub fn new(drift_share: f64, features: Vec<FeatureDrift>) -> Self {
        Self {
            dataset_drift_detected: features.iter().any(|f| f.drift_detected),
            drift_share,
            features,
            ..Self::default()
        }
    }

    /// Names of features flagged as drifted, preferring the current schema
    pub fn drifted_feature_names(&self) -> Vec<String> {
        let flagged = |list: &[FeatureDrift]| -> Vec<String> {
            list.iter().filter(|f| f.drift_detected).map(|f| f.feature.clone()).collect()
        };

        let names = flagged(&self.features);
        if !names.is_empty() {
            return names;
        }
        let names = flagged(&self.feature_drift_details);
        if !names.is_empty() {
            return names;
        }
        self.drifted_features.clone()
    }

    /// `drift_summary_YYYYMMDD_HHMMSS.json`
    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("{DRIFT_REPORT_PREFIX}{}.json", at.format(FILE_TIME_FORMAT))
    }

    /// Report time encoded in a summary file name
    pub fn parse_report_time(file_name: &str) -> Option<DateTime<Utc>> {
        let stamp = file_name.strip_prefix(DRIFT_REPORT_PREFIX)?.strip_suffix(".json")?;
        NaiveDateTime::parse_from_str(stamp, FILE_TIME_FORMAT).ok().map(|t| t.and_utc())
    }

    /// Write under the canonical name for `at`
    pub fn write_to_dir(&self, dir: &Path, at: DateTime<Utc>) -> storage::Result<PathBuf> {
        fs::create_dir_all(dir).map_err(io_at(dir))?;
        let path = dir.join(Self::file_name(at));
        write_atomic(&path, &serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }
}

/// Aggregator thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Minimum drift share for a report to count
    pub threshold: f64,
    pub lookback_hours: i64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { threshold: 0.3, lookback_hours: 24 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    NoReports,
    NoRecentReports,
    Analyzed,
}

/// Aggregated drift context attached to a retraining run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetails {
    pub status: DriftStatus,
    pub num_reports_checked: usize,
    pub drift_threshold: f64,
    /// Largest drift share seen in the window
    pub drift_share: f64,
    /// Sorted union of features named by flagging reports
    pub drifted_feature_names: Vec<String>,
    pub num_drifted_features: usize,
    /// File timestamps (`YYYYMMDD_HHMMSS`) of flagging reports
    pub drift_timestamps: Vec<String>,
}

impl DriftDetails {
    pub(crate) fn empty(status: DriftStatus, threshold: f64) -> Self {
        Self {
            status,
            num_reports_checked: 0,
            drift_threshold: threshold,
            drift_share: 0.0,
            drifted_feature_names: Vec::new(),
            num_drifted_features: 0,
            drift_timestamps: Vec::new(),
        }
    }
}

/// Reads drift summaries from a directory and reduces recent ones to a
/// single advisory signal
#[derive(Debug, Clone)]
pub struct DriftSignalAggregator {
    reports_dir: PathBuf,
    config: DriftConfig,
}

impl DriftSignalAggregator {
    pub fn new(reports_dir: impl Into<PathBuf>, config: DriftConfig) -> Self {
        Self { reports_dir: reports_dir.into(), config }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Reports whose file time is within the lookback window, most recent first.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn recent_reports(&self, now: DateTime<Utc>) -> storage::Result<Vec<(DateTime<Utc>, DriftReport)>> {
        let cutoff = now - Duration::hours(self.config.lookback_hours);
        let entries = match fs::read_dir(&self.reports_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_at(&self.reports_dir)(e)),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_at(&self.reports_dir))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(DRIFT_REPORT_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            let Some(at) = DriftReport::parse_report_time(name) else {
                warn!(file = name, "could not parse drift report time from file name; skipping");
                continue;
            };
            if at < cutoff {
                continue;
            }
            match fs::read(&path).map_err(|e| e.to_string()).and_then(|bytes| {
                serde_json::from_slice::<DriftReport>(&bytes).map_err(|e| e.to_string())
            }) {
                Ok(report) => reports.push((at, report)),
                Err(error) => warn!(file = name, %error, "unreadable drift report; skipping"),
            }
        }

        reports.sort_by(|a, b| b.0.cmp(&a.0));
        debug!(count = reports.len(), lookback_hours = self.config.lookback_hours, "recent drift reports");
        Ok(reports)
    }

    /// Aggregate recent reports into `(should_flag, details)`.
    ///
    /// A report flags only when its drift share reaches the threshold and it
    /// names at least one drifted feature.
    #[instrument(skip(self), fields(dir = %self.reports_dir.display()))]
    pub fn check_drift_signals_at(&self, now: DateTime<Utc>) -> storage::Result<(bool, DriftDetails)> {
        let threshold = self.config.threshold;
        if !self.reports_dir.is_dir() {
            warn!("drift reports directory not found");
            return Ok((false, DriftDetails::empty(DriftStatus::NoReports, threshold)));
        }

        let reports = self.recent_reports(now)?;
        if reports.is_empty() {
            warn!(lookback_hours = self.config.lookback_hours, "no recent drift reports");
            return Ok((false, DriftDetails::empty(DriftStatus::NoRecentReports, threshold)));
        }

        let mut details = DriftDetails::empty(DriftStatus::Analyzed, threshold);
        details.num_reports_checked = reports.len();
        let mut names = BTreeSet::new();
        let mut flagged = false;

        for (at, report) in &reports {
            details.drift_share = details.drift_share.max(report.drift_share);
            let drifted = report.drifted_feature_names();
            if report.drift_share >= threshold && !drifted.is_empty() {
                flagged = true;
                names.extend(drifted);
                details.drift_timestamps.push(at.format(FILE_TIME_FORMAT).to_string());
            }
        }

        details.drifted_feature_names = names.into_iter().collect();
        details.num_drifted_features = details.drifted_feature_names.len();

        info!(
            flagged,
            reports = details.num_reports_checked,
            max_drift_share = details.drift_share,
            threshold,
            "drift signals checked"
        );
        if flagged {
            warn!(
                features = ?details.drifted_feature_names,
                "drift threshold exceeded; recorded as context only, retraining is not triggered"
            );
        }
        Ok((flagged, details))
    }

    pub fn check_drift_signals(&self) -> storage::Result<(bool, DriftDetails)> {
        self.check_drift_signals_at(Utc::now())
    }
}
