//! Training objectives: gradients, base score, and output transform.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::stats;

/// Poisson hessians are inflated by `exp(MAX_DELTA_STEP)` to keep early
/// Newton steps from overshooting on sparse counts.
const POISSON_MAX_DELTA_STEP: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Log-link Poisson regression on counts.
    Poisson,
    /// Squared error on the (possibly log-transformed) target.
    SquaredError,
}

impl Objective {
    /// Conventional objective name stored in artifacts.
    pub fn name(self) -> &'static str {
        match self {
            Objective::Poisson => "count:poisson",
            Objective::SquaredError => "reg:squarederror",
        }
    }

    /// Name of the validation metric used for early stopping.
    pub fn eval_metric_name(self) -> &'static str {
        match self {
            Objective::Poisson => "poisson-deviance",
            Objective::SquaredError => "rmse",
        }
    }

    /// Check that `y` is admissible for this objective.
    pub fn check_targets(self, y: &[f64]) -> Result<(), AppError> {
        if let Some(i) = y.iter().position(|v| !v.is_finite()) {
            return Err(AppError::data(format!("Target value at row {i} is not finite.")));
        }
        if self == Objective::Poisson {
            if let Some(i) = y.iter().position(|&v| v < 0.0) {
                return Err(AppError::data(format!(
                    "Poisson target must be non-negative (row {i} is {}).",
                    y[i]
                )));
            }
        }
        Ok(())
    }

    /// Starting margin before any tree.
    pub fn base_score(self, y: &[f64]) -> Result<f64, AppError> {
        let m = stats::mean(y);
        match self {
            Objective::Poisson => {
                if !(m > 0.0) {
                    return Err(AppError::data(
                        "Poisson target has no positive counts; nothing to learn.",
                    ));
                }
                Ok(m.ln())
            }
            Objective::SquaredError => {
                if !m.is_finite() {
                    return Err(AppError::data("Target mean is not finite."));
                }
                Ok(m)
            }
        }
    }

    /// First and second derivatives of the loss w.r.t. each margin.
    pub fn gradients(self, y: &[f64], margin: &[f64], grad: &mut [f64], hess: &mut [f64]) {
        match self {
            Objective::Poisson => {
                for i in 0..y.len() {
                    let mu = margin[i].exp();
                    grad[i] = mu - y[i];
                    hess[i] = (margin[i] + POISSON_MAX_DELTA_STEP).exp();
                }
            }
            Objective::SquaredError => {
                for i in 0..y.len() {
                    grad[i] = margin[i] - y[i];
                    hess[i] = 1.0;
                }
            }
        }
    }

    /// Margin to response scale.
    #[inline]
    pub fn transform(self, margin: f64) -> f64 {
        match self {
            Objective::Poisson => margin.exp(),
            Objective::SquaredError => margin,
        }
    }

    /// Early-stopping metric on margins (lower is better).
    pub fn eval_metric(self, y: &[f64], margin: &[f64]) -> f64 {
        let response: Vec<f64> = margin.iter().map(|&m| self.transform(m)).collect();
        match self {
            Objective::Poisson => stats::mean_poisson_deviance(y, &response),
            Objective::SquaredError => stats::rmse(y, &response),
        }
    }
}
