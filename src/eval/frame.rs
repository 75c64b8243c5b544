//! Column-named evaluation frame

use crate::data::{LabeledPrediction, SchemaError, FEATURE_COLUMNS};

/// Rows of feature values under named columns, with optional ground truth.
///
/// Replay evaluation refuses a frame without `true_label`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    true_label: Option<Vec<u8>>,
}

impl EvalFrame {
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
        true_label: Option<Vec<u8>>,
    ) -> Result<Self, SchemaError> {
        for row in &rows {
            if row.len() != columns.len() {
                return Err(SchemaError::LengthMismatch {
                    column: "row".into(),
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        if let Some(labels) = &true_label {
            if labels.len() != rows.len() {
                return Err(SchemaError::LengthMismatch {
                    column: "true_label".into(),
                    expected: rows.len(),
                    actual: labels.len(),
                });
            }
            if let Some(bad) = labels.iter().find(|l| **l > 1) {
                return Err(SchemaError::invalid("true_label", format!("{bad} is not 0/1")));
            }
        }
        Ok(Self { columns, rows, true_label })
    }

    /// Frame over the full feature schema with labels from the join
    pub fn from_labeled(examples: &[LabeledPrediction]) -> Self {
        Self {
            columns: FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            rows: examples.iter().map(|e| e.features().to_array().to_vec()).collect(),
            true_label: Some(examples.iter().map(|e| e.true_label).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn true_label(&self) -> Option<&[u8]> {
        self.true_label.as_deref()
    }

    /// Values of one column, `None` if absent
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Feature matrix in the requested column order
    pub fn select(&self, names: &[&str]) -> Result<Vec<Vec<f64>>, SchemaError> {
        let idx = names
            .iter()
            .map(|n| {
                self.columns
                    .iter()
                    .position(|c| c == n)
                    .ok_or_else(|| SchemaError::MissingFeature((*n).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.rows.iter().map(|r| idx.iter().map(|i| r[*i]).collect()).collect())
    }
}
