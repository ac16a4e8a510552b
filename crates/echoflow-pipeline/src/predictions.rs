//! Predictions table written by the classification tool.
//!
//! The table is headerless CSV, one row per test clip:
//! `filename,clip,prediction`. It is regenerated wholesale on every run, so
//! it is re-read and scanned linearly each time.

use std::path::Path;

use crate::error::{PipelineError, PipelineResult};

/// Zero-based column holding the predicted ejection fraction.
pub const PREDICTION_COLUMN: usize = 2;

/// Read the table at `path` and extract the prediction for `file_name`.
pub async fn read_ejection_fraction(path: &Path, file_name: &str) -> PipelineResult<f64> {
    let table = tokio::fs::read(path)
        .await
        .map_err(|source| PipelineError::PredictionsRead {
            path: path.to_path_buf(),
            source,
        })?;

    find_ejection_fraction(&table, file_name)
}

/// Find the first row whose first field is exactly `file_name` and parse its
/// prediction column.
///
/// Rows are compared as raw bytes, so a row that is not valid UTF-8 is
/// skipped like any other non-matching row. Only the first matching row is
/// considered; a short or non-numeric first match is an error even if a
/// later row would have been usable.
pub fn find_ejection_fraction(table: &[u8], file_name: &str) -> PipelineResult<f64> {
    let not_found = |reason: String| PipelineError::PredictionNotFound {
        file_name: file_name.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(table);

    for record in reader.byte_records() {
        let record = record.map_err(|e| not_found(format!("malformed table: {e}")))?;

        if record.get(0) != Some(file_name.as_bytes()) {
            continue;
        }

        let value = record.get(PREDICTION_COLUMN).ok_or_else(|| {
            not_found(format!(
                "row has {} columns, expected at least {}",
                record.len(),
                PREDICTION_COLUMN + 1
            ))
        })?;
        let value = String::from_utf8_lossy(value);

        return value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| not_found(format!("prediction {value:?} is not a number")));
    }

    Err(not_found("no matching row".to_string()))
}
