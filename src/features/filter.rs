//! Sparse-column filter.
//!
//! One-hot encoding produces indicator columns for every observed category,
//! including categories seen only a handful of times. Such near-constant
//! columns give the booster's split search nothing useful to work with, so we
//! drop columns whose count of strictly-positive entries is below
//! `max(min_samples, ratio * rows)` in the reference (training) matrix.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Column filter learned from a reference matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFilter {
    pub min_samples: usize,
    pub ratio: f64,
    /// Retain/drop per input column; `None` until fitted.
    mask: Option<Vec<bool>>,
}

impl FeatureFilter {
    pub fn new(min_samples: usize, ratio: f64) -> Self {
        Self {
            min_samples,
            ratio,
            mask: None,
        }
    }

    /// Minimum count of strictly-positive entries for a matrix with `rows` rows.
    pub fn threshold(&self, rows: usize) -> f64 {
        (self.min_samples as f64).max(self.ratio * rows as f64)
    }

    /// Learn the retain mask from `reference`.
    pub fn fit(&mut self, reference: &DMatrix<f64>) -> &mut Self {
        let threshold = self.threshold(reference.nrows());
        let mask = reference
            .column_iter()
            .map(|col| col.iter().filter(|&&v| v > 0.0).count() as f64 >= threshold)
            .collect();
        self.mask = Some(mask);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.mask.is_some()
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    /// Number of retained columns (0 before fit).
    pub fn n_retained(&self) -> usize {
        self.mask.as_ref().map_or(0, |m| m.iter().filter(|&&keep| keep).count())
    }

    /// Keep the retained columns, in their original order.
    pub fn transform(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
        let mask = self.fitted_mask(matrix.ncols())?;
        let kept: Vec<usize> = retained_indices(mask);
        Ok(matrix.select_columns(kept.iter()))
    }

    /// Retained subset of `names`, order-preserving.
    pub fn feature_names_out(&self, names: &[String]) -> Result<Vec<String>, AppError> {
        let mask = self.fitted_mask(names.len())?;
        Ok(names
            .iter()
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn fitted_mask(&self, n_cols: usize) -> Result<&[bool], AppError> {
        let mask = self
            .mask
            .as_deref()
            .ok_or_else(|| AppError::config("FeatureFilter used before fit()."))?;
        if mask.len() != n_cols {
            return Err(AppError::config(format!(
                "FeatureFilter was fitted on {} columns but received {n_cols}.",
                mask.len()
            )));
        }
        Ok(mask)
    }
}

fn retained_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drops_columns_below_min_samples() {
        // 4 rows: col0 has 3 positives, col1 has 1, col2 has 2 (one negative).
        let m = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 0.0, 5.0, //
                1.0, 0.0, -1.0, //
                1.0, 1.0, 2.0, //
                0.0, 0.0, 0.0,
            ],
        );
        let mut filter = FeatureFilter::new(2, 0.0);
        filter.fit(&m);
        assert_eq!(filter.mask(), Some(&[true, false, true][..]));

        let out = filter.transform(&m).unwrap();
        assert_eq!(out.ncols(), 2);
        assert_eq!(out[(0, 1)], 5.0);

        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(filter.feature_names_out(&names).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn ratio_raises_threshold_on_large_inputs() {
        let filter = FeatureFilter::new(10, 0.01);
        assert_eq!(filter.threshold(100), 10.0);
        assert_eq!(filter.threshold(5000), 50.0);
    }

    #[test]
    fn nan_is_not_positive() {
        let m = DMatrix::from_row_slice(2, 1, &[f64::NAN, 1.0]);
        let mut filter = FeatureFilter::new(2, 0.0);
        filter.fit(&m);
        assert_eq!(filter.n_retained(), 0);
    }

    #[test]
    fn transform_before_fit_fails() {
        let filter = FeatureFilter::new(1, 0.0);
        let err = filter.transform(&DMatrix::zeros(2, 2)).unwrap_err();
        assert!(err.to_string().contains("before fit"));
    }

    #[test]
    fn transform_rejects_column_count_mismatch() {
        let mut filter = FeatureFilter::new(1, 0.0);
        filter.fit(&DMatrix::from_element(3, 2, 1.0));
        let err = filter.transform(&DMatrix::from_element(3, 3, 1.0)).unwrap_err();
        assert!(err.to_string().contains("fitted on 2 columns"));
    }

    proptest! {
        #[test]
        fn transform_keeps_a_stable_subset(
            rows in 1usize..30,
            cols in 1usize..8,
            seed in proptest::collection::vec(-2.0f64..3.0, 240),
            min_samples in 0usize..10,
        ) {
            let m = DMatrix::from_fn(rows, cols, |r, c| seed[(r * cols + c) % seed.len()]);
            let names: Vec<String> = (0..cols).map(|c| format!("F{c}")).collect();
            let mut filter = FeatureFilter::new(min_samples, 0.05);
            filter.fit(&m);

            let out_names = filter.feature_names_out(&names).unwrap();
            prop_assert!(out_names.iter().all(|n| names.contains(n)));
            prop_assert_eq!(out_names.len(), filter.n_retained());

            let first = filter.transform(&m).unwrap();
            let second = filter.transform(&m).unwrap();
            prop_assert_eq!(first.ncols(), out_names.len());
            prop_assert_eq!(first, second);
        }
    }
}
