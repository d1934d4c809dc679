//! Quantile binning of the feature matrix.
//!
//! Each feature gets at most `max_bins - 1` ascending cut points. A value
//! maps to the first cut `>= value`, or to the overflow bin past the last
//! cut, so "bin <= k" is exactly "value <= cuts[k]". Split thresholds are
//! stored as raw cut values and prediction never needs the bins.

use nalgebra::DMatrix;

/// Bin code for `NaN`.
pub const MISSING_BIN: u16 = u16::MAX;

#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    /// Per-feature cut points.
    cuts: Vec<Vec<f64>>,
    /// Column-major bin codes.
    codes: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    pub fn from_matrix(x: &DMatrix<f64>, max_bins: usize) -> Self {
        let max_cuts = max_bins.saturating_sub(1).max(1);
        let mut cuts = Vec::with_capacity(x.ncols());
        let mut codes = Vec::with_capacity(x.ncols());

        for col in x.column_iter() {
            let values: Vec<f64> = col.iter().copied().collect();
            let feature_cuts = quantile_cuts(&values, max_cuts);
            let feature_codes = values.iter().map(|&v| bin_of(&feature_cuts, v)).collect();
            cuts.push(feature_cuts);
            codes.push(feature_codes);
        }

        Self { cuts, codes }
    }

    /// Bins for feature `f`, including the overflow bin (missing excluded).
    pub fn n_bins(&self, f: usize) -> usize {
        self.cuts[f].len() + 1
    }

    pub fn cuts(&self, f: usize) -> &[f64] {
        &self.cuts[f]
    }

    #[inline]
    pub fn code(&self, f: usize, row: usize) -> u16 {
        self.codes[f][row]
    }
}

#[inline]
fn bin_of(cuts: &[f64], v: f64) -> u16 {
    if v.is_nan() {
        MISSING_BIN
    } else {
        cuts.partition_point(|&c| c < v) as u16
    }
}

/// Distinct values when few, otherwise evenly spaced order statistics.
fn quantile_cuts(values: &[f64], max_cuts: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.len() <= 1 {
        return sorted;
    }
    // The largest distinct value lands in the overflow bin.
    let candidates = &sorted[..sorted.len() - 1];
    if candidates.len() <= max_cuts {
        return candidates.to_vec();
    }

    let mut cuts: Vec<f64> = (1..=max_cuts)
        .map(|j| {
            let idx = (j * candidates.len()) / (max_cuts + 1);
            candidates[idx.min(candidates.len() - 1)]
        })
        .collect();
    cuts.dedup();
    cuts
}
