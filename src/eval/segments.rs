//! Per-segment performance breakdown

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::frame::EvalFrame;
use super::metrics::PrimaryMetrics;

/// `feature -> segment label -> metrics`
pub type SegmentPerformance = BTreeMap<String, BTreeMap<String, PrimaryMetrics>>;

/// How one feature is cut into segments.
///
/// With no bin edges every distinct value is its own segment. With edges
/// `[e0, e1, .., ek]` the segments are `<e0`, `[e0, e1)`, .., `>=ek`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub feature: String,
    /// Ascending and unique; edges loaded from config are normalized on read
    #[serde(default, deserialize_with = "ascending_edges")]
    pub bins: Vec<f64>,
}

fn normalize_edges(bins: &mut Vec<f64>) {
    bins.sort_by(f64::total_cmp);
    bins.dedup();
}

fn ascending_edges<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    let mut bins = Vec::<f64>::deserialize(deserializer)?;
    normalize_edges(&mut bins);
    Ok(bins)
}

impl SegmentRule {
    pub fn exact(feature: impl Into<String>) -> Self {
        Self { feature: feature.into(), bins: Vec::new() }
    }

    pub fn binned(feature: impl Into<String>, mut bins: Vec<f64>) -> Self {
        normalize_edges(&mut bins);
        Self { feature: feature.into(), bins }
    }

    /// Segment label for one value
    pub fn label(&self, value: f64) -> String {
        if self.bins.is_empty() {
            return format_value(value);
        }
        let idx = self.bins.iter().filter(|edge| **edge <= value).count();
        match idx {
            0 => format!("<{}", format_value(self.bins[0])),
            i if i == self.bins.len() => format!(">={}", format_value(self.bins[i - 1])),
            i => format!("[{}, {})", format_value(self.bins[i - 1]), format_value(self.bins[i])),
        }
    }
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Segment analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub rules: Vec<SegmentRule>,
    /// Segments smaller than this are left out of the breakdown
    pub min_segment_samples: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { rules: Vec::new(), min_segment_samples: 30 }
    }
}

impl SegmentConfig {
    pub fn new(rules: Vec<SegmentRule>) -> Self {
        Self { rules, ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Break the scored frame down by every rule whose feature is present.
    ///
    /// A rule whose feature is missing from the frame produces no entry.
    pub fn compute(
        &self,
        frame: &EvalFrame,
        y_true: &[u8],
        y_pred: &[u8],
        y_prob: &[f64],
    ) -> SegmentPerformance {
        let mut out = SegmentPerformance::new();
        for rule in &self.rules {
            let Some(values) = frame.column(&rule.feature) else {
                continue;
            };

            let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (i, v) in values.iter().enumerate() {
                groups.entry(rule.label(*v)).or_default().push(i);
            }

            let per_feature = groups
                .into_iter()
                .filter(|(_, idx)| idx.len() >= self.min_segment_samples)
                .map(|(label, idx)| {
                    let t: Vec<u8> = idx.iter().map(|i| y_true[*i]).collect();
                    let p: Vec<u8> = idx.iter().map(|i| y_pred[*i]).collect();
                    let s: Vec<f64> = idx.iter().map(|i| y_prob[*i]).collect();
                    (label, PrimaryMetrics::compute(&t, &p, &s))
                })
                .collect();
            out.insert(rule.feature.clone(), per_feature);
        }
        out
    }
}
