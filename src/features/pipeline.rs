//! Preprocessing pipeline: numeric passthrough + one-hot encoding + sparse
//! column filter.
//!
//! Output column order is fixed:
//!
//! 1. numeric columns, in declaration order
//! 2. one-hot indicators, grouped by source column (declaration order), each
//!    group in the encoder's sorted category order
//!
//! The `FeatureFilter` is then fitted on (and applied to) that combined matrix.

use std::collections::BTreeSet;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{Column, Frame};
use crate::error::{AppError, missing_columns_error};
use crate::features::filter::FeatureFilter;

/// Category label used for missing categorical values.
pub const MISSING_CATEGORY: &str = "MISSING";

/// One-hot encoder with categories discovered at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<String>,
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit(frame: &Frame, columns: &[String]) -> Result<Self, AppError> {
        let mut categories = Vec::with_capacity(columns.len());
        for name in columns {
            let col = frame
                .column(name)
                .ok_or_else(|| missing_columns_error("one-hot fit", &[name.clone()], frame.names()))?;
            let seen: BTreeSet<String> = (0..col.len()).map(|i| category_label(col, i)).collect();
            categories.push(seen.into_iter().collect());
        }
        Ok(Self {
            columns: columns.to_vec(),
            categories,
        })
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    pub fn n_outputs(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Output names: `{COLUMN}_{category}`.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(self.categories.iter())
            .flat_map(|(col, cats)| cats.iter().map(move |cat| format!("{col}_{cat}")))
            .collect()
    }

    /// Write indicator columns into `out` starting at column `offset`.
    ///
    /// Categories not seen at fit time leave every indicator of their group at 0.
    fn encode_into(&self, frame: &Frame, out: &mut DMatrix<f64>, offset: usize) -> Result<(), AppError> {
        let mut start = offset;
        for (name, cats) in self.columns.iter().zip(self.categories.iter()) {
            let col = frame
                .column(name)
                .ok_or_else(|| missing_columns_error("one-hot transform", &[name.clone()], frame.names()))?;
            for row in 0..col.len() {
                let label = category_label(col, row);
                if let Ok(pos) = cats.binary_search(&label) {
                    out[(row, start + pos)] = 1.0;
                }
            }
            start += cats.len();
        }
        Ok(())
    }
}

fn category_label(col: &Column, row: usize) -> String {
    col.label_at(row).unwrap_or_else(|| MISSING_CATEGORY.to_string())
}

/// Fitted (or unfitted) preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    numeric: Vec<String>,
    one_hot: Vec<String>,
    encoder: Option<OneHotEncoder>,
    filter: FeatureFilter,
    /// Names of the combined (pre-filter) matrix columns.
    combined_names: Vec<String>,
}

impl Preprocessor {
    pub fn new(numeric: Vec<String>, one_hot: Vec<String>, filter: FeatureFilter) -> Self {
        Self {
            numeric,
            one_hot,
            encoder: None,
            filter,
            combined_names: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.encoder.is_some() && self.filter.is_fitted()
    }

    /// Every input column the pipeline reads.
    pub fn required_columns(&self) -> Vec<String> {
        self.numeric.iter().chain(self.one_hot.iter()).cloned().collect()
    }

    pub fn filter(&self) -> &FeatureFilter {
        &self.filter
    }

    /// Fit encoder and filter on `frame`; returns the transformed training matrix.
    pub fn fit_transform(&mut self, frame: &Frame) -> Result<DMatrix<f64>, AppError> {
        self.check_columns(frame, "preprocessing fit")?;
        let encoder = OneHotEncoder::fit(frame, &self.one_hot)?;

        let mut combined_names = self.numeric.clone();
        combined_names.extend(encoder.feature_names());
        self.combined_names = combined_names;
        self.encoder = Some(encoder);

        let combined = self.combine(frame)?;
        self.filter.fit(&combined);
        self.filter.transform(&combined)
    }

    /// Apply the fitted pipeline.
    pub fn transform(&self, frame: &Frame) -> Result<DMatrix<f64>, AppError> {
        if !self.is_fitted() {
            return Err(AppError::config("Preprocessor used before fit()."));
        }
        self.check_columns(frame, "preprocessing transform")?;
        let combined = self.combine(frame)?;
        self.filter.transform(&combined)
    }

    /// Output feature names after the filter.
    pub fn feature_names_out(&self) -> Result<Vec<String>, AppError> {
        if !self.is_fitted() {
            return Err(AppError::config("Preprocessor used before fit()."));
        }
        self.filter.feature_names_out(&self.combined_names)
    }

    /// Column names before filtering (numeric + one-hot).
    pub fn combined_names(&self) -> &[String] {
        &self.combined_names
    }

    fn check_columns(&self, frame: &Frame, context: &str) -> Result<(), AppError> {
        let missing = frame.missing_columns(&self.required_columns());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing_columns_error(context, &missing, frame.names()))
        }
    }

    fn combine(&self, frame: &Frame) -> Result<DMatrix<f64>, AppError> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| AppError::config("Preprocessor used before fit()."))?;
        let rows = frame.n_rows();
        let mut out = DMatrix::<f64>::zeros(rows, self.numeric.len() + encoder.n_outputs());

        for (j, name) in self.numeric.iter().enumerate() {
            let values = frame.numeric(name)?;
            for (i, &v) in values.iter().enumerate() {
                out[(i, j)] = v;
            }
        }
        encoder.encode_into(frame, &mut out, self.numeric.len())?;
        Ok(out)
    }
}
