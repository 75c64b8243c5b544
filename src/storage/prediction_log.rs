//! Append-only prediction log (CSV)

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use tracing::{debug, info, warn};

use super::{io_at, write_atomic, Result};
use crate::data::{DateColumn, FeatureVector, PredictionRecord, SchemaError, Timestamped};

/// Canonical column order of the persisted log
pub const PREDICTION_COLUMNS: [&str; 16] = [
    "timestamp",
    "prediction_id",
    "application_date",
    "model_version",
    "prediction",
    "probability",
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

/// What `open` found in the persisted header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCheck {
    /// New or empty file; header written
    Created,
    /// Header matched the canonical schema
    Valid,
    /// Header was a permutation of the canonical columns; rows rewritten
    Reordered { rows: usize },
    /// Header was unreadable; old file moved aside and the log reinitialized
    Reinitialized { backup: PathBuf },
}

/// Append-only store of served predictions.
///
/// Appends from concurrent writers (threads or processes) are serialized by an
/// exclusive file lock held for the duration of a single `write_all`. Readers
/// take no lock and skip a trailing partial line.
#[derive(Debug)]
pub struct PredictionLog {
    path: PathBuf,
    header_check: HeaderCheck,
}

impl PredictionLog {
    /// Open (or create) the log, validating and repairing its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let header_check = ensure_header(&path)?;
        Ok(Self { path, header_check })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Result of the header validation performed at open
    pub fn header_check(&self) -> &HeaderCheck {
        &self.header_check
    }

    /// Validate and append a served prediction.
    ///
    /// Generates a UUID when `prediction_id` is absent; `application_date`
    /// defaults to the serving time.
    pub fn log_prediction(
        &self,
        features: &HashMap<String, f64>,
        prediction: u8,
        probability: f64,
        model_version: &str,
        application_date: Option<DateTime<Utc>>,
        prediction_id: Option<&str>,
    ) -> Result<PredictionRecord> {
        let features = FeatureVector::from_map(features)?;
        // Persisted at microsecond precision
        let timestamp = Utc::now().trunc_subsecs(6);
        let record = PredictionRecord {
            prediction_id: prediction_id
                .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string),
            timestamp,
            application_date: application_date.unwrap_or(timestamp),
            model_version: model_version.to_string(),
            prediction,
            probability,
            features,
        };
        self.append(&record)?;
        Ok(record)
    }

    /// Append a fully-formed record under the exclusive lock
    pub fn append(&self, record: &PredictionRecord) -> Result<()> {
        record.validate()?;
        check_csv_safe("prediction_id", &record.prediction_id)?;
        check_csv_safe("model_version", &record.model_version)?;

        let line = render_row(record);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_at(&self.path))?;

        file.lock().map_err(io_at(&self.path))?;
        let written = (|| -> std::io::Result<()> {
            // The file may have been truncated or removed since open
            if file.metadata()?.len() == 0 {
                file.write_all(header_line().as_bytes())?;
            }
            file.write_all(line.as_bytes())?;
            file.flush()
        })();
        let unlocked = file.unlock();
        written.map_err(io_at(&self.path))?;
        unlocked.map_err(io_at(&self.path))?;

        debug!(prediction_id = %record.prediction_id, "prediction logged");
        Ok(())
    }

    /// All readable records, in append order
    pub fn read_all(&self) -> Result<Vec<PredictionRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_at(&self.path)(e)),
        };

        let mut lines: Vec<&str> = content.split('\n').collect();
        // Trailing segment is either "" (clean end) or an in-flight append
        if let Some(last) = lines.pop() {
            if !last.is_empty() {
                debug!(path = %self.path.display(), "skipping partial trailing row");
            }
        }

        let mut records = Vec::with_capacity(lines.len().saturating_sub(1));
        let mut skipped = 0usize;
        for (idx, line) in lines.iter().enumerate().skip(1) {
            match parse_row(line) {
                Ok(r) => records.push(r),
                Err(reason) => {
                    skipped += 1;
                    warn!(line = idx + 1, %reason, "skipping malformed prediction row");
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, path = %self.path.display(), "prediction log contained unreadable rows");
        }
        Ok(records)
    }

    /// Records for the given ids (all records when `ids` is `None`)
    pub fn get_predictions_with_features(
        &self,
        ids: Option<&[String]>,
    ) -> Result<Vec<PredictionRecord>> {
        let all = self.read_all()?;
        Ok(match ids {
            None => all,
            Some(ids) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                all.into_iter().filter(|r| wanted.contains(r.prediction_id.as_str())).collect()
            }
        })
    }

    /// Records whose `column` falls in `[now - days, now]`
    pub fn get_recent_predictions(
        &self,
        days: i64,
        column: DateColumn,
        now: DateTime<Utc>,
    ) -> Result<Vec<PredictionRecord>> {
        let start = now - Duration::days(days);
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| {
                let t = r.time_of(column);
                t >= start && t <= now
            })
            .collect())
    }
}

fn header_line() -> String {
    let mut h = PREDICTION_COLUMNS.join(",");
    h.push('\n');
    h
}

fn check_csv_safe(field: &str, value: &str) -> std::result::Result<(), SchemaError> {
    if value.contains([',', '\n', '\r']) {
        return Err(SchemaError::invalid(field, "must not contain ',' or line breaks"));
    }
    Ok(())
}

fn render_row(r: &PredictionRecord) -> String {
    let mut fields = vec![
        r.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        r.prediction_id.clone(),
        r.application_date.to_rfc3339_opts(SecondsFormat::Micros, true),
        r.model_version.clone(),
        r.prediction.to_string(),
        r.probability.to_string(),
    ];
    fields.extend(r.features.to_array().iter().map(f64::to_string));
    let mut line = fields.join(",");
    line.push('\n');
    line
}

fn parse_row(line: &str) -> std::result::Result<PredictionRecord, String> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if fields.len() != PREDICTION_COLUMNS.len() {
        return Err(format!(
            "expected {} fields, found {}",
            PREDICTION_COLUMNS.len(),
            fields.len()
        ));
    }

    let time = |s: &str, name: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("{name}: {e}"))
    };
    let number = |s: &str, name: &str| s.parse::<f64>().map_err(|e| format!("{name}: {e}"));

    let mut values = [0.0; 10];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = number(fields[6 + i], PREDICTION_COLUMNS[6 + i])?;
    }

    let record = PredictionRecord {
        timestamp: time(fields[0], "timestamp")?,
        prediction_id: fields[1].to_string(),
        application_date: time(fields[2], "application_date")?,
        model_version: fields[3].to_string(),
        prediction: fields[4].parse::<u8>().map_err(|e| format!("prediction: {e}"))?,
        probability: number(fields[5], "probability")?,
        features: FeatureVector::from_array(values),
    };
    record.validate().map_err(|e| e.to_string())?;
    Ok(record)
}

fn ensure_header(path: &Path) -> Result<HeaderCheck> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return reinitialize(path, "file is not valid UTF-8");
        }
        Err(e) => return Err(io_at(path)(e)),
    };

    if content.is_empty() {
        fs::write(path, header_line()).map_err(io_at(path))?;
        info!(path = %path.display(), "initialized prediction log");
        return Ok(HeaderCheck::Created);
    }

    let header = content.lines().next().unwrap_or_default().trim_end_matches('\r');
    let found: Vec<&str> = header.split(',').map(str::trim).collect();
    if found == PREDICTION_COLUMNS {
        if !content.contains('\n') {
            fs::write(path, header_line()).map_err(io_at(path))?;
        }
        return Ok(HeaderCheck::Valid);
    }

    let canonical: HashSet<&str> = PREDICTION_COLUMNS.iter().copied().collect();
    let is_permutation = found.len() == PREDICTION_COLUMNS.len()
        && found.iter().copied().collect::<HashSet<_>>() == canonical;
    if !is_permutation {
        return reinitialize(path, &format!("unrecognized header: {header}"));
    }

    warn!(path = %path.display(), "prediction log header out of order; rewriting in canonical order");
    // position in persisted header of each canonical column
    let index: Vec<usize> = PREDICTION_COLUMNS
        .iter()
        .filter_map(|c| found.iter().position(|f| f == c))
        .collect();

    let mut out = header_line();
    let mut rows = 0usize;
    let body: Vec<&str> = content.split('\n').skip(1).collect();
    let complete = body.len().saturating_sub(1);
    for line in body.iter().take(complete) {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
        if fields.len() != found.len() {
            warn!("dropping malformed row during header repair");
            continue;
        }
        let reordered: Vec<&str> = index.iter().map(|i| fields[*i]).collect();
        out.push_str(&reordered.join(","));
        out.push('\n');
        rows += 1;
    }
    write_atomic(path, out.as_bytes())?;
    Ok(HeaderCheck::Reordered { rows })
}

fn reinitialize(path: &Path, reason: &str) -> Result<HeaderCheck> {
    let mut backup_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    backup_name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
    let backup = path.with_file_name(backup_name);

    fs::rename(path, &backup).map_err(io_at(path))?;
    fs::write(path, header_line()).map_err(io_at(path))?;
    warn!(
        path = %path.display(),
        backup = %backup.display(),
        reason,
        "prediction log schema mismatch; moved aside and reinitialized"
    );
    Ok(HeaderCheck::Reinitialized { backup })
}
