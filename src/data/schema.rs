//! Feature schema and record types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical feature order (Give Me Some Credit schema)
pub const FEATURE_COLUMNS: [&str; 10] = [
    "RevolvingUtilizationOfUnsecuredLines",
    "age",
    "NumberOfTime30_59DaysPastDueNotWorse",
    "DebtRatio",
    "MonthlyIncome",
    "NumberOfOpenCreditLinesAndLoans",
    "NumberOfTimes90DaysLate",
    "NumberRealEstateLoansOrLines",
    "NumberOfTime60_89DaysPastDueNotWorse",
    "NumberOfDependents",
];

/// Schema and contract violations at a data boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Column length mismatch: {column} has {actual} values, expected {expected}")]
    LengthMismatch { column: String, expected: usize, actual: usize },
}

impl SchemaError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { field: field.to_string(), reason: reason.into() }
    }
}

/// The fixed ten-field feature vector every prediction carries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "RevolvingUtilizationOfUnsecuredLines")]
    pub revolving_utilization: f64,
    #[serde(rename = "age")]
    pub age: f64,
    #[serde(rename = "NumberOfTime30_59DaysPastDueNotWorse")]
    pub past_due_30_59: f64,
    #[serde(rename = "DebtRatio")]
    pub debt_ratio: f64,
    #[serde(rename = "MonthlyIncome")]
    pub monthly_income: f64,
    #[serde(rename = "NumberOfOpenCreditLinesAndLoans")]
    pub open_credit_lines: f64,
    #[serde(rename = "NumberOfTimes90DaysLate")]
    pub times_90_days_late: f64,
    #[serde(rename = "NumberRealEstateLoansOrLines")]
    pub real_estate_loans: f64,
    #[serde(rename = "NumberOfTime60_89DaysPastDueNotWorse")]
    pub past_due_60_89: f64,
    #[serde(rename = "NumberOfDependents")]
    pub dependents: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_COLUMNS`] order
    pub fn to_array(&self) -> [f64; 10] {
        [
            self.revolving_utilization,
            self.age,
            self.past_due_30_59,
            self.debt_ratio,
            self.monthly_income,
            self.open_credit_lines,
            self.times_90_days_late,
            self.real_estate_loans,
            self.past_due_60_89,
            self.dependents,
        ]
    }

    /// Build from values in [`FEATURE_COLUMNS`] order
    pub fn from_array(values: [f64; 10]) -> Self {
        let [revolving_utilization, age, past_due_30_59, debt_ratio, monthly_income, open_credit_lines, times_90_days_late, real_estate_loans, past_due_60_89, dependents] =
            values;
        Self {
            revolving_utilization,
            age,
            past_due_30_59,
            debt_ratio,
            monthly_income,
            open_credit_lines,
            times_90_days_late,
            real_estate_loans,
            past_due_60_89,
            dependents,
        }
    }

    /// Look up a feature by its schema name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_COLUMNS.iter().position(|c| *c == name).map(|i| self.to_array()[i])
    }

    /// Parse a name -> value map, rejecting missing keys and non-finite values.
    ///
    /// Extra keys are ignored; serving payloads often carry request metadata.
    pub fn from_map(map: &HashMap<String, f64>) -> Result<Self, SchemaError> {
        let mut values = [0.0; 10];
        for (slot, name) in values.iter_mut().zip(FEATURE_COLUMNS) {
            let value =
                *map.get(name).ok_or_else(|| SchemaError::MissingFeature(name.to_string()))?;
            if !value.is_finite() {
                return Err(SchemaError::invalid(name, format!("non-finite value {value}")));
            }
            *slot = value;
        }
        Ok(Self::from_array(values))
    }

    /// Render as an owned name -> value map
    pub fn to_map(&self) -> HashMap<String, f64> {
        FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).zip(self.to_array()).collect()
    }
}

/// A served prediction. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub prediction_id: String,
    /// Serving wall-clock time
    pub timestamp: DateTime<Utc>,
    /// Business time of the underlying application
    pub application_date: DateTime<Utc>,
    pub model_version: String,
    pub prediction: u8,
    pub probability: f64,
    pub features: FeatureVector,
}

impl PredictionRecord {
    /// Check field-level invariants
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.prediction_id.trim().is_empty() {
            return Err(SchemaError::invalid("prediction_id", "must not be empty"));
        }
        if self.prediction > 1 {
            return Err(SchemaError::invalid(
                "prediction",
                format!("expected 0 or 1, got {}", self.prediction),
            ));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(SchemaError::invalid(
                "probability",
                format!("{} outside [0, 1]", self.probability),
            ));
        }
        for (name, value) in FEATURE_COLUMNS.iter().zip(self.features.to_array()) {
            if !value.is_finite() {
                return Err(SchemaError::invalid(name, format!("non-finite value {value}")));
            }
        }
        Ok(())
    }
}

/// Ground-truth outcome for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub prediction_id: String,
    pub true_label: u8,
    pub label_timestamp: DateTime<Utc>,
    pub label_source: String,
    /// Whole days between prediction and label; `None` when the prediction time is unknown
    pub days_delayed: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// A prediction joined with its live label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPrediction {
    pub prediction: PredictionRecord,
    pub true_label: u8,
    pub label_source: String,
    pub days_delayed: Option<i64>,
}

impl LabeledPrediction {
    pub fn prediction_id(&self) -> &str {
        &self.prediction.prediction_id
    }

    pub fn features(&self) -> &FeatureVector {
        &self.prediction.features
    }
}
