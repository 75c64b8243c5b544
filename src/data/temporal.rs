//! Temporal window splitter
//!
//! Train window: `[earliest, train_end)`. Eval window: `[eval_start, eval_end)`.
//! `eval_start >= train_end` is enforced; an overlap is a caller bug and fails
//! the run rather than being reordered.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::schema::{LabeledPrediction, PredictionRecord};

/// Which side of a split came out empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Train,
    Eval,
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::Train => write!(f, "training"),
            Window::Eval => write!(f, "evaluation"),
        }
    }
}

/// Temporal split errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("Temporal leak detected: eval_start ({eval_start}) < train_end ({train_end})")]
    TemporalLeak { train_end: DateTime<Utc>, eval_start: DateTime<Utc> },

    #[error("Empty {window} window")]
    EmptyWindow { window: Window },
}

/// Which timestamp a split or recency filter is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateColumn {
    Timestamp,
    #[default]
    ApplicationDate,
}

impl DateColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateColumn::Timestamp => "timestamp",
            DateColumn::ApplicationDate => "application_date",
        }
    }
}

/// Records that can be placed on a timeline
pub trait Timestamped {
    fn time_of(&self, column: DateColumn) -> DateTime<Utc>;
}

impl Timestamped for PredictionRecord {
    fn time_of(&self, column: DateColumn) -> DateTime<Utc> {
        match column {
            DateColumn::Timestamp => self.timestamp,
            DateColumn::ApplicationDate => self.application_date,
        }
    }
}

impl Timestamped for LabeledPrediction {
    fn time_of(&self, column: DateColumn) -> DateTime<Utc> {
        self.prediction.time_of(column)
    }
}

/// Validated train/eval boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindows {
    pub train_end: DateTime<Utc>,
    pub eval_start: DateTime<Utc>,
    pub eval_end: DateTime<Utc>,
}

impl TemporalWindows {
    /// Validate boundaries; fails with `TemporalLeak` if `eval_start < train_end`
    pub fn new(
        train_end: DateTime<Utc>,
        eval_start: DateTime<Utc>,
        eval_end: DateTime<Utc>,
    ) -> Result<Self, SplitError> {
        if eval_start < train_end {
            return Err(SplitError::TemporalLeak { train_end, eval_start });
        }
        Ok(Self { train_end, eval_start, eval_end })
    }

    /// Derive boundaries from the data itself.
    ///
    /// Rows are ordered by `column`; `train_end` is the time at the
    /// `train_fraction` index, the eval window starts one second later and
    /// runs one second past the latest row. Returns `None` with fewer than two
    /// rows or a fraction outside (0, 1).
    pub fn plan<T: Timestamped>(
        rows: &[T],
        column: DateColumn,
        train_fraction: f64,
    ) -> Option<Self> {
        if rows.len() < 2 || !(train_fraction > 0.0 && train_fraction < 1.0) {
            return None;
        }
        let mut times: Vec<DateTime<Utc>> = rows.iter().map(|r| r.time_of(column)).collect();
        times.sort_unstable();

        let split_idx = ((times.len() as f64) * train_fraction) as usize;
        let train_end = times[split_idx.min(times.len() - 1)];
        let eval_start = train_end + Duration::seconds(1);
        let eval_end = times[times.len() - 1] + Duration::seconds(1);

        Some(Self { train_end, eval_start, eval_end })
    }

    /// Partition rows into (train, eval)
    pub fn split<T: Timestamped + Clone>(
        &self,
        rows: &[T],
        column: DateColumn,
    ) -> Result<(Vec<T>, Vec<T>), SplitError> {
        let train: Vec<T> =
            rows.iter().filter(|r| r.time_of(column) < self.train_end).cloned().collect();
        let eval: Vec<T> = rows
            .iter()
            .filter(|r| {
                let t = r.time_of(column);
                t >= self.eval_start && t < self.eval_end
            })
            .cloned()
            .collect();

        info!(
            column = column.as_str(),
            train_end = %self.train_end,
            eval_start = %self.eval_start,
            eval_end = %self.eval_end,
            train_samples = train.len(),
            eval_samples = eval.len(),
            "temporal split"
        );

        if train.is_empty() {
            return Err(SplitError::EmptyWindow { window: Window::Train });
        }
        if eval.is_empty() {
            return Err(SplitError::EmptyWindow { window: Window::Eval });
        }
        Ok((train, eval))
    }
}

/// Split `rows` into train and eval sets by time.
///
/// The only sanctioned way to partition data for training and evaluation.
pub fn create_temporal_split<T: Timestamped + Clone>(
    rows: &[T],
    train_end: DateTime<Utc>,
    eval_start: DateTime<Utc>,
    eval_end: DateTime<Utc>,
    column: DateColumn,
) -> Result<(Vec<T>, Vec<T>), SplitError> {
    TemporalWindows::new(train_end, eval_start, eval_end)?.split(rows, column)
}
