//! Gaussian-process surrogate for the hyperparameter search.
//!
//! - inputs live in the unit cube, targets are standardized before fitting
//! - kernel: Matérn 5/2 with unit signal variance plus a white-noise term
//! - the length scale and noise level are picked from a small grid by log
//!   marginal likelihood (no gradient-based kernel optimization)
//!
//! Solves go through nalgebra's Cholesky factorization. A grid point whose
//! kernel matrix is not positive definite is skipped; if none factorizes the
//! fit is a compute error and the caller falls back to random sampling.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

const LENGTH_SCALES: [f64; 6] = [0.05, 0.1, 0.2, 0.5, 1.0, 2.0];
const NOISE_LEVELS: [f64; 4] = [1e-6, 1e-4, 1e-2, 1e-1];

/// Matérn 5/2 correlation at distance `r` for length scale `l`.
#[inline]
pub fn matern52(r: f64, l: f64) -> f64 {
    let s = 5f64.sqrt() * r / l;
    (1.0 + s + s * s / 3.0) * (-s).exp()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    x: Vec<Vec<f64>>,
    l: DMatrix<f64>,
    alpha: DVector<f64>,
    length_scale: f64,
    noise: f64,
    y_mean: f64,
    y_std: f64,
    log_marginal_likelihood: f64,
}

impl GaussianProcess {
    /// Fit on points `x` (each of equal dimension) with observations `y`.
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, AppError> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(AppError::compute(format!(
                "Gaussian process needs matching non-empty inputs (got {n} points, {} targets).",
                y.len()
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::compute("Gaussian process targets must be finite."));
        }

        let y_mean = y.iter().sum::<f64>() / n as f64;
        let var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if var > 0.0 { var.sqrt() } else { 1.0 };
        let yn = DVector::from_iterator(n, y.iter().map(|v| (v - y_mean) / y_std));

        let dist = DMatrix::from_fn(n, n, |i, j| distance(&x[i], &x[j]));

        let mut best: Option<Self> = None;
        for &length_scale in &LENGTH_SCALES {
            for &noise in &NOISE_LEVELS {
                let k = DMatrix::from_fn(n, n, |i, j| {
                    matern52(dist[(i, j)], length_scale) + if i == j { noise } else { 0.0 }
                });
                let Some(chol) = k.cholesky() else {
                    continue;
                };
                let alpha = chol.solve(&yn);
                let l = chol.unpack();
                let log_det: f64 = (0..n).map(|i| l[(i, i)].ln()).sum();
                let lml = -0.5 * yn.dot(&alpha) - log_det - 0.5 * n as f64 * (2.0 * std::f64::consts::PI).ln();
                if !lml.is_finite() {
                    continue;
                }

                if best.as_ref().is_none_or(|b| lml > b.log_marginal_likelihood) {
                    best = Some(Self {
                        x: x.to_vec(),
                        l,
                        alpha,
                        length_scale,
                        noise,
                        y_mean,
                        y_std,
                        log_marginal_likelihood: lml,
                    });
                }
            }
        }

        best.ok_or_else(|| AppError::compute("Gaussian process kernel matrix is not positive definite."))
    }

    /// Posterior mean and standard deviation at `point`, in target units.
    pub fn predict(&self, point: &[f64]) -> (f64, f64) {
        let n = self.x.len();
        let k_star = DVector::from_iterator(
            n,
            self.x.iter().map(|xi| matern52(distance(xi, point), self.length_scale)),
        );
        let mean = k_star.dot(&self.alpha);
        let var = match self.l.solve_lower_triangular(&k_star) {
            Some(v) => (1.0 - v.dot(&v)).max(0.0),
            None => 1.0,
        };
        (self.y_mean + mean * self.y_std, var.sqrt() * self.y_std)
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn noise(&self) -> f64 {
        self.noise
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }
}
