//! Dataset fingerprinting for data -> model lineage

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash plus shape of a training dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFingerprint {
    /// SHA-256 (hex) of the canonical CSV rendering
    pub hash: String,
    pub rows: usize,
    pub columns: usize,
    pub duplicate_rows: usize,
}

impl DatasetFingerprint {
    /// Fingerprint a column-major-named, row-major-valued table.
    ///
    /// Columns are sorted by name before rendering so that column order does
    /// not change the hash.
    pub fn compute(columns: &[&str], rows: &[Vec<f64>]) -> Self {
        let mut order: Vec<usize> = (0..columns.len()).collect();
        order.sort_by(|a, b| columns[*a].cmp(columns[*b]));

        let mut hasher = Sha256::new();
        let header: Vec<&str> = order.iter().map(|i| columns[*i]).collect();
        hasher.update(header.join(","));
        hasher.update(b"\n");

        let mut seen = HashSet::with_capacity(rows.len());
        let mut duplicate_rows = 0;
        for row in rows {
            let line: Vec<String> =
                order.iter().map(|i| row.get(*i).map_or(String::new(), f64::to_string)).collect();
            let line = line.join(",");
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
            if !seen.insert(line) {
                duplicate_rows += 1;
            }
        }

        Self {
            hash: hex::encode(hasher.finalize()),
            rows: rows.len(),
            columns: columns.len(),
            duplicate_rows,
        }
    }

    /// Flatten into tracking params
    pub fn to_params(&self) -> HashMap<String, String> {
        HashMap::from([
            ("dataset_hash".to_string(), self.hash.clone()),
            ("dataset_rows".to_string(), self.rows.to_string()),
            ("dataset_columns".to_string(), self.columns.to_string()),
            ("duplicate_rows".to_string(), self.duplicate_rows.to_string()),
        ])
    }
}
