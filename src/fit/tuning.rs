//! Booster tuning objective.
//!
//! A trial applies the decoded hyperparameters on top of the base booster
//! settings, fits on the training partition, and scores the validation
//! partition:
//!
//! - frequency: mean Poisson deviance of predicted counts
//! - severity: RMSE on the log scale the model is fitted on

use nalgebra::DMatrix;
use tracing::info;

use crate::domain::{ModelKind, SearchConfig};
use crate::error::AppError;
use crate::fit::optimizer::{SearchResult, gp_minimize};
use crate::fit::space::{ParamValue, Params, SearchSpace};
use crate::gbdt::{Booster, BoosterParams};
use crate::math::stats;

/// Hyperparameters the tuner may set.
pub const TUNABLE_PARAMS: [&str; 8] = [
    "max_depth",
    "learning_rate",
    "subsample",
    "colsample_bytree",
    "min_child_weight",
    "reg_alpha",
    "reg_lambda",
    "gamma",
];

/// Training and validation matrices for one tuning run.
#[derive(Debug, Clone, Copy)]
pub struct TuningData<'a> {
    pub x_train: &'a DMatrix<f64>,
    pub y_train: &'a [f64],
    pub x_val: &'a DMatrix<f64>,
    pub y_val: &'a [f64],
}

/// Validation score for `kind` (lower is better).
pub fn validation_score(kind: ModelKind, actual: &[f64], predicted: &[f64]) -> f64 {
    match kind {
        ModelKind::Frequency => stats::mean_poisson_deviance(actual, predicted),
        ModelKind::Severity => stats::rmse(actual, predicted),
    }
}

/// Overlay named hyperparameters on `base`.
pub fn apply_params(base: &BoosterParams, params: &Params) -> Result<BoosterParams, AppError> {
    let mut out = base.clone();
    for (name, value) in params {
        match name.as_str() {
            "max_depth" => {
                let depth = match value {
                    ParamValue::Int(v) => *v,
                    ParamValue::Real(v) => v.round() as i64,
                };
                out.max_depth = usize::try_from(depth)
                    .map_err(|_| AppError::config(format!("max_depth must be positive (got {depth}).")))?;
            }
            "learning_rate" => out.learning_rate = value.as_f64(),
            "subsample" => out.subsample = value.as_f64(),
            "colsample_bytree" => out.colsample_bytree = value.as_f64(),
            "min_child_weight" => out.min_child_weight = value.as_f64(),
            "reg_alpha" => out.reg_alpha = value.as_f64(),
            "reg_lambda" => out.reg_lambda = value.as_f64(),
            "gamma" => out.gamma = value.as_f64(),
            other => {
                return Err(AppError::config(format!(
                    "Unknown hyperparameter `{other}`; expected one of [{}].",
                    TUNABLE_PARAMS.join(", ")
                )));
            }
        }
    }
    Ok(out)
}

/// Fit with `params` and return the validation score.
pub fn score_params(
    kind: ModelKind,
    base: &BoosterParams,
    params: &Params,
    data: TuningData<'_>,
) -> Result<f64, AppError> {
    let booster_params = apply_params(base, params)?;
    let booster = Booster::fit(booster_params, data.x_train, data.y_train, Some((data.x_val, data.y_val)))?;
    let predicted = booster.predict(data.x_val)?;
    Ok(validation_score(kind, data.y_val, &predicted))
}

/// Search hyperparameters for a booster on `data`.
///
/// Unknown dimension names are rejected before any trial runs.
pub fn tune_booster(
    kind: ModelKind,
    base: &BoosterParams,
    data: TuningData<'_>,
    search: &SearchConfig,
) -> Result<SearchResult, AppError> {
    if let Some(dim) = search
        .dimensions
        .iter()
        .find(|d| !TUNABLE_PARAMS.contains(&d.name()))
    {
        return Err(AppError::config(format!(
            "Unknown search dimension `{}`; expected one of [{}].",
            dim.name(),
            TUNABLE_PARAMS.join(", ")
        )));
    }
    if data.y_val.is_empty() {
        return Err(AppError::data("Validation partition is empty; cannot tune."));
    }

    let space = SearchSpace::new(search.dimensions.clone())?;
    info!(
        kind = kind.display_name(),
        n_calls = search.n_calls,
        dims = space.len(),
        train_rows = data.y_train.len(),
        val_rows = data.y_val.len(),
        "starting hyperparameter search"
    );
    gp_minimize(&space, |params| score_params(kind, base, params, data), search)
}
