//! CSV/JSON exports.
//!
//! Prediction files carry the row keys present in the input (account id and
//! year) followed by one prediction per row, so they can be joined back onto
//! the scored table in a spreadsheet.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::domain::{Column, DataConfig, Frame, format_number};
use crate::error::AppError;

pub const PREDICTION_COLUMN: &str = "PREDICTION";
pub const AMOUNT_COLUMN: &str = "PREDICTED_AMOUNT";

fn create(path: &Path) -> Result<File, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create directory '{}': {e}", parent.display())))?;
    }
    File::create(path).map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::io(format!("Failed to write CSV '{}': {e}", path.display()))
}

fn cell(column: &Column, row: usize) -> String {
    match column {
        Column::Numeric(v) if v[row].is_nan() => String::new(),
        Column::Numeric(v) => format_number(v[row]),
        Column::Categorical(v) => v[row].clone().unwrap_or_default(),
    }
}

/// Write a whole frame; missing values become empty cells.
pub fn write_frame_csv(path: &Path, frame: &Frame) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(create(path)?));
    writer.write_record(frame.names()).map_err(|e| csv_error(path, e))?;

    let columns: Vec<&Column> = frame.names().iter().filter_map(|n| frame.column(n)).collect();
    for row in 0..frame.n_rows() {
        writer
            .write_record(columns.iter().map(|c| cell(c, row)))
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| csv_error(path, e))
}

/// Write one prediction per row of `frame`, keyed by whichever of the id and
/// year columns the frame has. `amounts` adds a `PREDICTED_AMOUNT` column.
pub fn write_predictions_csv(
    path: &Path,
    frame: &Frame,
    data: &DataConfig,
    predictions: &[f64],
    amounts: Option<&[f64]>,
) -> Result<(), AppError> {
    if predictions.len() != frame.n_rows() || amounts.is_some_and(|a| a.len() != predictions.len()) {
        return Err(AppError::data(format!(
            "Got {} predictions for {} rows.",
            predictions.len(),
            frame.n_rows()
        )));
    }

    let keys: Vec<(&str, &Column)> = [data.id_column.as_str(), data.year_column.as_str()]
        .into_iter()
        .filter_map(|name| frame.column(name).map(|c| (name, c)))
        .collect();

    let mut header: Vec<&str> = keys.iter().map(|(name, _)| *name).collect();
    header.push(PREDICTION_COLUMN);
    if amounts.is_some() {
        header.push(AMOUNT_COLUMN);
    }

    let mut writer = csv::Writer::from_writer(BufWriter::new(create(path)?));
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;
    for (row, pred) in predictions.iter().enumerate() {
        let mut record: Vec<String> = keys.iter().map(|(_, c)| cell(c, row)).collect();
        record.push(format!("{pred:.6}"));
        if let Some(a) = amounts {
            record.push(format!("{:.2}", a[row]));
        }
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| csv_error(path, e))
}

/// Pretty JSON for reports and configs meant to be read by people.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| AppError::io(format!("Failed to serialize '{}': {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::load_csv;

    fn frame() -> Frame {
        let mut f = Frame::new();
        f.push_column(
            "ACCOUNT_ID",
            Column::Categorical(vec![Some("a".to_string()), None]),
        )
        .unwrap();
        f.push_column("YEAR", Column::Numeric(vec![2020.0, 2021.0])).unwrap();
        f.push_column("AGE", Column::Numeric(vec![1.5, f64::NAN])).unwrap();
        f
    }

    #[test]
    fn frame_survives_a_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/frame.csv");
        write_frame_csv(&path, &frame()).unwrap();

        let back = load_csv(&path).unwrap().frame;
        assert_eq!(back.names(), frame().names());
        assert_eq!(back.numeric("YEAR").unwrap(), &[2020.0, 2021.0]);
        assert!(back.numeric("AGE").unwrap()[1].is_nan());
    }

    #[test]
    fn predictions_carry_keys_and_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pred.csv");
        write_predictions_csv(&path, &frame(), &DataConfig::default(), &[7.0, 8.0], Some(&[1096.63, 2980.96]))
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("ACCOUNT_ID,YEAR,PREDICTION,PREDICTED_AMOUNT"));
        assert_eq!(lines.next(), Some("a,2020,7.000000,1096.63"));
        assert_eq!(lines.next(), Some(",2021,8.000000,2980.96"));
    }

    #[test]
    fn prediction_count_must_match_rows() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_predictions_csv(&dir.path().join("p.csv"), &frame(), &DataConfig::default(), &[1.0], None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }
}
