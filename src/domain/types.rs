//! Shared domain types.
//!
//! The pipeline works on a small columnar table (`Frame`) rather than a general
//! dataframe. It carries exactly what the pricing models need:
//!
//! - numeric columns (`f64`, `NaN` meaning missing)
//! - categorical columns (`Option<String>`, `None` meaning missing)
//! - canonical upper-case column names

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which target the model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Expected claim count per account-period.
    Frequency,
    /// Expected claim cost per claim, modelled on the log scale.
    Severity,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Frequency => "frequency",
            ModelKind::Severity => "severity",
        }
    }
}

/// A single column of a `Frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select rows by index (indices may repeat).
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => Column::Categorical(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Render row `i` as a category label.
    ///
    /// Numeric values use their shortest decimal rendering (`2.0` -> `"2"`), so a
    /// numeric code column can be one-hot encoded.
    pub fn label_at(&self, i: usize) -> Option<String> {
        match self {
            Column::Numeric(v) => {
                let x = v[i];
                if x.is_nan() {
                    None
                } else {
                    Some(format_number(x))
                }
            }
            Column::Categorical(v) => v[i].clone(),
        }
    }

    /// Render row `i` as a key for grouping (missing values render as empty).
    pub fn key_at(&self, i: usize) -> String {
        self.label_at(i).unwrap_or_default()
    }
}

/// Shortest decimal rendering of a number, without a trailing `.0` for integers.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// An ordered set of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    n_rows: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), AppError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(AppError::config(format!("Duplicate column name `{name}`.")));
        }
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(AppError::data(format!(
                "Column `{name}` has {} rows, expected {}.",
                column.len(),
                self.n_rows
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        }
        self.index.insert(name.clone(), self.columns.len());
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Replace an existing column or append a new one.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), AppError> {
        match self.index.get(name) {
            Some(&idx) => {
                if column.len() != self.n_rows {
                    return Err(AppError::data(format!(
                        "Column `{name}` has {} rows, expected {}.",
                        column.len(),
                        self.n_rows
                    )));
                }
                self.columns[idx] = column;
                Ok(())
            }
            None => self.push_column(name, column),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Borrow a numeric column, failing with a config error if it is absent or
    /// categorical.
    pub fn numeric(&self, name: &str) -> Result<&[f64], AppError> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Categorical(_)) => Err(AppError::config(format!(
                "Column `{name}` must be numeric but contains non-numeric values."
            ))),
            None => Err(AppError::config(format!(
                "Missing column `{name}`; available columns are [{}]",
                self.names.join(", ")
            ))),
        }
    }

    /// Names from `required` that this frame lacks, in the order given.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|name| !self.has(name)).cloned().collect()
    }

    /// Select rows by index, keeping every column.
    pub fn take(&self, rows: &[usize]) -> Frame {
        let mut out = Frame::new();
        out.n_rows = rows.len();
        for (name, col) in self.names.iter().zip(self.columns.iter()) {
            out.index.insert(name.clone(), out.columns.len());
            out.names.push(name.clone());
            out.columns.push(col.take(rows));
        }
        out
    }

    /// Keep only the named columns, in the order given.
    pub fn select(&self, names: &[String]) -> Result<Frame, AppError> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(crate::error::missing_columns_error("select", &missing, &self.names));
        }
        let mut out = Frame::new();
        for name in names {
            if let Some(col) = self.column(name) {
                out.push_column(name.clone(), col.clone())?;
            }
        }
        Ok(out)
    }

    /// Cap a numeric column at `max` (missing values stay missing).
    pub fn cap_column(&mut self, name: &str, max: f64) -> Result<usize, AppError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| AppError::config(format!("Cannot cap missing column `{name}`.")))?;
        match &mut self.columns[idx] {
            Column::Numeric(values) => {
                let mut capped = 0usize;
                for v in values.iter_mut() {
                    if *v > max {
                        *v = max;
                        capped += 1;
                    }
                }
                Ok(capped)
            }
            Column::Categorical(_) => Err(AppError::config(format!(
                "Cannot cap non-numeric column `{name}`."
            ))),
        }
    }
}
