//! CSV ingest.
//!
//! Turns a CSV table into a `Frame`:
//!
//! - header names are trimmed, stripped of a UTF-8 BOM, and upper-cased
//! - a column is numeric when every non-empty cell parses as `f64`; empty cells
//!   become `NaN`
//! - any other column is categorical; empty cells become `None`
//! - rows with the wrong number of fields are skipped and reported

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{Column, Frame};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the frame plus what happened on the way.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub frame: Frame,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a CSV file into a `Frame`.
pub fn load_csv(path: &Path) -> Result<IngestedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let table = read_csv(file)?;
    debug!(
        path = %path.display(),
        rows = table.frame.n_rows(),
        columns = table.frame.n_cols(),
        "loaded table"
    );
    Ok(table)
}

/// Parse CSV from any reader.
pub fn read_csv<R: Read>(reader: R) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let names: Vec<String> = headers.iter().map(canonical_column_name).collect();
    if names.iter().any(|n| n.is_empty()) {
        return Err(AppError::config("CSV header contains an empty column name."));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record: StringRecord = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        if record.len() != names.len() {
            row_errors.push(RowError {
                line,
                message: format!("Expected {} fields, found {}.", names.len(), record.len()),
            });
            continue;
        }
        for (col, value) in cells.iter_mut().zip(record.iter()) {
            col.push(value.to_string());
        }
    }

    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), "skipped malformed CSV rows");
    }

    let mut frame = Frame::new();
    for (name, values) in names.into_iter().zip(cells) {
        frame.push_column(name, infer_column(values))?;
    }

    Ok(IngestedTable {
        frame,
        row_errors,
        rows_read,
    })
}

/// Canonical column name: trimmed, BOM-stripped, upper-case.
pub fn canonical_column_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM; without
    // stripping it, column validation reports a confusing missing column.
    name.trim().trim_start_matches('\u{feff}').to_uppercase()
}

fn infer_column(values: Vec<String>) -> Column {
    let numeric: Option<Vec<f64>> = values
        .iter()
        .map(|s| {
            if is_missing(s) {
                Some(f64::NAN)
            } else {
                s.parse::<f64>().ok()
            }
        })
        .collect();

    match numeric {
        Some(v) => Column::Numeric(v),
        None => Column::Categorical(
            values
                .into_iter()
                .map(|s| if is_missing(&s) { None } else { Some(s) })
                .collect(),
        ),
    }
}

fn is_missing(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_upper_cased_and_bom_stripped() {
        let csv = "\u{feff}account_id,Region ,claim_count\nA1,north,0\nA2,south,2\n";
        let table = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            table.frame.names(),
            &["ACCOUNT_ID".to_string(), "REGION".to_string(), "CLAIM_COUNT".to_string()]
        );
        assert_eq!(table.rows_read, 2);
    }

    #[test]
    fn numeric_inference_treats_blank_as_nan() {
        let csv = "x,y\n1.5,a\n,b\n3,\n";
        let table = read_csv(csv.as_bytes()).unwrap();
        let x = table.frame.numeric("X").unwrap();
        assert_eq!(x[0], 1.5);
        assert!(x[1].is_nan());
        assert_eq!(
            table.frame.column("Y"),
            Some(&Column::Categorical(vec![Some("a".into()), Some("b".into()), None]))
        );
    }

    #[test]
    fn short_rows_are_reported_not_fatal() {
        let csv = "a,b\n1,2\n3\n4,5\n";
        let table = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.frame.n_rows(), 2);
        assert_eq!(table.row_errors.len(), 1);
        assert_eq!(table.row_errors[0].line, 3);
    }
}
