//! Evaluation metrics for fitted claim models.
//!
//! Pairs where either side is not finite are dropped before scoring; the
//! number dropped is reported. Severity models are scored on the log scale
//! they are fitted on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Discrete, Poisson};

use crate::domain::ModelKind;
use crate::error::AppError;
use crate::math::stats;

/// Quantiles reported for severity models.
pub const SEVERITY_QUANTILES: [f64; 6] = [0.10, 0.25, 0.50, 0.75, 0.90, 0.99];

/// Highest explicit claim-count bucket; the last bucket is `3+`.
const MAX_COUNT_BUCKET: u64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub n_pairs: usize,
    pub n_dropped: usize,
    /// Mean Poisson deviance (frequency) or mean squared error (severity).
    pub deviance: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: Option<f64>,
    pub nrmse_mean: Option<f64>,
    pub nrmse_range: Option<f64>,
    pub nrmse_std: Option<f64>,
    /// `mean(pred) - mean(actual)`.
    pub bias: f64,
    pub correlation: Option<f64>,
    /// `mean(pred) / mean(actual)`.
    pub mean_ratio: Option<f64>,
    pub mean_actual: f64,
    pub mean_predicted: f64,
}

/// One row of the actual-vs-predicted distribution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub label: String,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRow {
    pub year: i64,
    pub count: usize,
    pub actual_sum: f64,
    pub predicted_sum: f64,
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub kind: ModelKind,
    pub metrics: Metrics,
    pub distribution: Vec<DistributionRow>,
    pub by_year: Vec<YearRow>,
}

/// Score `predicted` against `actual`, optionally aggregating by `years`.
pub fn evaluate(
    kind: ModelKind,
    actual: &[f64],
    predicted: &[f64],
    years: Option<&[f64]>,
) -> Result<EvaluationReport, AppError> {
    if actual.len() != predicted.len() {
        return Err(AppError::data(format!(
            "Got {} actual values but {} predictions.",
            actual.len(),
            predicted.len()
        )));
    }
    if let Some(y) = years {
        if y.len() != actual.len() {
            return Err(AppError::data("Year column is not aligned with the predictions."));
        }
    }

    let keep: Vec<usize> = (0..actual.len())
        .filter(|&i| actual[i].is_finite() && predicted[i].is_finite())
        .collect();
    if keep.is_empty() {
        return Err(AppError::data(format!(
            "No valid (actual, predicted) pairs among {} rows.",
            actual.len()
        )));
    }
    let a: Vec<f64> = keep.iter().map(|&i| actual[i]).collect();
    let p: Vec<f64> = keep.iter().map(|&i| predicted[i]).collect();

    let metrics = compute_metrics(kind, &a, &p, actual.len() - keep.len());
    let distribution = match kind {
        ModelKind::Frequency => count_distribution(&a, &p),
        ModelKind::Severity => quantile_distribution(&a, &p),
    };
    let by_year = match years {
        Some(years) => {
            let y: Vec<f64> = keep.iter().map(|&i| years[i]).collect();
            aggregate_by_year(&y, &a, &p)
        }
        None => Vec::new(),
    };

    Ok(EvaluationReport {
        kind,
        metrics,
        distribution,
        by_year,
    })
}

fn compute_metrics(kind: ModelKind, a: &[f64], p: &[f64], n_dropped: usize) -> Metrics {
    let rmse = stats::rmse(a, p);
    let mean_actual = stats::mean(a);
    let mean_predicted = stats::mean(p);
    let (min, max) = a
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let std = stats::std_dev(a);

    let ratio = |num: f64, den: f64| (den != 0.0).then(|| num / den);

    Metrics {
        n_pairs: a.len(),
        n_dropped,
        deviance: match kind {
            ModelKind::Frequency => stats::mean_poisson_deviance(a, p),
            ModelKind::Severity => rmse * rmse,
        },
        rmse,
        mae: stats::mae(a, p),
        mape: stats::mape(a, p),
        nrmse_mean: ratio(rmse, mean_actual),
        nrmse_range: ratio(rmse, max - min),
        nrmse_std: ratio(rmse, std),
        bias: mean_predicted - mean_actual,
        correlation: stats::pearson(a, p),
        mean_ratio: ratio(mean_predicted, mean_actual),
        mean_actual,
        mean_predicted,
    }
}

/// Observed rows per claim count vs. expected rows from Poisson probabilities.
fn count_distribution(a: &[f64], p: &[f64]) -> Vec<DistributionRow> {
    let n_buckets = MAX_COUNT_BUCKET as usize + 1;
    let mut observed = vec![0.0; n_buckets];
    let mut expected = vec![0.0; n_buckets];

    for &y in a {
        let bucket = (y.max(0.0).round() as u64).min(MAX_COUNT_BUCKET) as usize;
        observed[bucket] += 1.0;
    }
    for &mu in p {
        let mut below = 0.0;
        for k in 0..MAX_COUNT_BUCKET {
            let pk = count_probability(k, mu);
            expected[k as usize] += pk;
            below += pk;
        }
        expected[MAX_COUNT_BUCKET as usize] += (1.0 - below).max(0.0);
    }

    (0..n_buckets)
        .map(|k| DistributionRow {
            label: if k as u64 == MAX_COUNT_BUCKET {
                format!("{k}+")
            } else {
                k.to_string()
            },
            actual: observed[k],
            predicted: expected[k],
        })
        .collect()
}

/// `P(K = k)` under a Poisson with mean `mu`; a non-positive mean is a point
/// mass at zero.
fn count_probability(k: u64, mu: f64) -> f64 {
    match Poisson::new(mu) {
        Ok(dist) if mu > 0.0 => dist.pmf(k),
        _ => {
            if k == 0 { 1.0 } else { 0.0 }
        }
    }
}

fn quantile_distribution(a: &[f64], p: &[f64]) -> Vec<DistributionRow> {
    let mut sa = a.to_vec();
    let mut sp = p.to_vec();
    sa.sort_by(f64::total_cmp);
    sp.sort_by(f64::total_cmp);
    SEVERITY_QUANTILES
        .iter()
        .map(|&q| DistributionRow {
            label: format!("p{}", (q * 100.0).round() as u32),
            actual: stats::quantile_sorted(&sa, q),
            predicted: stats::quantile_sorted(&sp, q),
        })
        .collect()
}

fn aggregate_by_year(years: &[f64], a: &[f64], p: &[f64]) -> Vec<YearRow> {
    let mut groups: BTreeMap<i64, (usize, f64, f64)> = BTreeMap::new();
    for ((&year, &actual), &pred) in years.iter().zip(a).zip(p) {
        if !year.is_finite() {
            continue;
        }
        let entry = groups.entry(year.round() as i64).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += actual;
        entry.2 += pred;
    }
    groups
        .into_iter()
        .map(|(year, (count, actual_sum, predicted_sum))| YearRow {
            year,
            count,
            actual_sum,
            predicted_sum,
            ratio: (actual_sum != 0.0).then(|| predicted_sum / actual_sum),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_error_and_unit_correlation() {
        let v = [0.0, 1.0, 2.0, 0.0];
        let r = evaluate(ModelKind::Frequency, &v, &v, None).unwrap();
        assert_eq!(r.metrics.rmse, 0.0);
        assert_eq!(r.metrics.mae, 0.0);
        assert!((r.metrics.correlation.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(r.metrics.bias, 0.0);
        assert_eq!(r.metrics.mean_ratio, Some(1.0));
    }

    #[test]
    fn non_finite_pairs_are_dropped_and_counted() {
        let actual = [1.0, f64::NAN, 2.0];
        let pred = [1.0, 1.0, f64::INFINITY];
        let r = evaluate(ModelKind::Frequency, &actual, &pred, None).unwrap();
        assert_eq!(r.metrics.n_pairs, 1);
        assert_eq!(r.metrics.n_dropped, 2);
    }

    #[test]
    fn no_valid_pairs_is_data_error() {
        let err = evaluate(ModelKind::Severity, &[f64::NAN], &[1.0], None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn constant_actuals_give_no_correlation_or_range() {
        let r = evaluate(ModelKind::Severity, &[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0], None).unwrap();
        assert_eq!(r.metrics.correlation, None);
        assert_eq!(r.metrics.nrmse_range, None);
        assert_eq!(r.metrics.nrmse_std, None);
        assert!(r.metrics.nrmse_mean.is_some());
    }

    #[test]
    fn count_buckets_compare_observed_and_expected() {
        let actual = [0.0, 0.0, 1.0, 4.0];
        let pred = [0.5, 0.5, 0.5, 0.5];
        let r = evaluate(ModelKind::Frequency, &actual, &pred, None).unwrap();
        let labels: Vec<&str> = r.distribution.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "1", "2", "3+"]);
        assert_eq!(r.distribution[0].actual, 2.0);
        assert_eq!(r.distribution[3].actual, 1.0);
        let expected_total: f64 = r.distribution.iter().map(|d| d.predicted).sum();
        assert!((expected_total - 4.0).abs() < 1e-9);
        assert!((r.distribution[0].predicted - 4.0 * (-0.5f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn count_probabilities_follow_poisson_and_zero_mean_is_point_mass() {
        let total: f64 = (0..60).map(|k| count_probability(k, 3.2)).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((count_probability(1, 0.5) - 0.5 * (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(count_probability(0, 0.0), 1.0);
        assert_eq!(count_probability(2, 0.0), 0.0);
    }

    #[test]
    fn zero_predictions_expect_every_row_in_the_zero_bucket() {
        let r = evaluate(ModelKind::Frequency, &[0.0, 1.0], &[0.0, 0.0], None).unwrap();
        assert_eq!(r.distribution[0].predicted, 2.0);
        assert!(r.distribution[1..].iter().all(|d| d.predicted == 0.0));
    }

    #[test]
    fn severity_reports_quantiles() {
        let actual: Vec<f64> = (1..=100).map(f64::from).collect();
        let r = evaluate(ModelKind::Severity, &actual, &actual, None).unwrap();
        assert_eq!(r.distribution.len(), 6);
        assert_eq!(r.distribution[2].label, "p50");
        assert_eq!(r.distribution[2].actual, r.distribution[2].predicted);
    }

    #[test]
    fn per_year_totals() {
        let years = [2020.0, 2020.0, 2021.0, f64::NAN];
        let r = evaluate(
            ModelKind::Frequency,
            &[1.0, 0.0, 2.0, 1.0],
            &[0.5, 0.5, 1.0, 1.0],
            Some(&years),
        )
        .unwrap();
        assert_eq!(r.by_year.len(), 2);
        assert_eq!(r.by_year[0].year, 2020);
        assert_eq!(r.by_year[0].count, 2);
        assert_eq!(r.by_year[0].ratio, Some(1.0));
        assert_eq!(r.by_year[1].ratio, Some(0.5));
    }
}
