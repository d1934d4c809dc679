//! Small statistics helpers shared by training and evaluation.
//!
//! All functions take already-cleaned slices; callers are responsible for
//! filtering `NaN` pairs first.

/// Floor for predicted means inside logarithms.
pub const MU_EPSILON: f64 = 1e-9;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Unit Poisson deviance of one observation.
///
/// `2 * (y ln(y/mu) - (y - mu))`, reducing to `2 mu` at `y = 0`.
#[inline]
pub fn poisson_unit_deviance(y: f64, mu: f64) -> f64 {
    let mu = mu.max(MU_EPSILON);
    if y > 0.0 {
        2.0 * (y * (y / mu).ln() - (y - mu))
    } else {
        2.0 * mu
    }
}

/// Mean Poisson deviance (lower is better).
pub fn mean_poisson_deviance(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(&y, &mu)| poisson_unit_deviance(y, mu))
        .sum::<f64>()
        / actual.len() as f64
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    (sse / actual.len() as f64).sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / actual.len() as f64
}

/// Mean absolute percentage error over pairs with a non-zero actual.
///
/// `None` when every actual is zero.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let (sum, n) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .fold((0.0, 0usize), |(s, n), (a, p)| (s + ((a - p) / a).abs(), n + 1));
    (n > 0).then(|| 100.0 * sum / n as f64)
}

/// Pearson correlation; `None` when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Linear-interpolated quantile (`q` in `[0, 1]`) of unsorted values.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviance_is_zero_for_perfect_predictions() {
        let y = [0.0, 1.0, 3.0];
        let mu = [1e-12, 1.0, 3.0];
        assert!(mean_poisson_deviance(&y, &mu) < 1e-6);
    }

    #[test]
    fn deviance_at_zero_count_is_two_mu() {
        assert!((poisson_unit_deviance(0.0, 0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn quantile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 1.0), 4.0);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn pearson_handles_constant_input() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mape_skips_zero_actuals() {
        assert_eq!(mape(&[0.0, 0.0], &[1.0, 2.0]), None);
        let m = mape(&[0.0, 2.0], &[5.0, 1.0]).unwrap();
        assert!((m - 50.0).abs() < 1e-12);
    }
}
