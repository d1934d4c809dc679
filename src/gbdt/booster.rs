//! Gradient-boosted tree ensemble.
//!
//! - margins start at the objective's base score
//! - every round grows one tree on a Bernoulli row sample and a per-tree
//!   feature sample, both drawn from `StdRng::seed_from_u64(seed + round)`
//! - with an evaluation set and `early_stopping_rounds`, training stops once
//!   the validation metric has not improved for that many rounds and the
//!   ensemble is truncated to the best round

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::gbdt::binning::BinnedMatrix;
use crate::gbdt::grower::{TreeGrower, TreeParams};
use crate::gbdt::monotone::MonotoneDirection;
use crate::gbdt::objective::Objective;
use crate::gbdt::tree::Tree;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub objective: Objective,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub max_bins: usize,
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
    /// One entry per feature, or empty for no constraints.
    pub monotone_constraints: Vec<MonotoneDirection>,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            objective: Objective::SquaredError,
            n_estimators: 100,
            max_depth: 4,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            max_bins: 64,
            early_stopping_rounds: None,
            seed: 0,
            monotone_constraints: Vec::new(),
        }
    }
}

impl BoosterParams {
    pub fn validate(&self, n_features: usize) -> Result<(), AppError> {
        if self.n_estimators == 0 {
            return Err(AppError::config("n_estimators must be > 0."));
        }
        if self.max_depth == 0 {
            return Err(AppError::config("max_depth must be > 0."));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(AppError::config(format!("Invalid learning_rate={}.", self.learning_rate)));
        }
        for (name, v) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(AppError::config(format!("{name} must be in (0, 1] (got {v}).")));
            }
        }
        for (name, v) in [
            ("min_child_weight", self.min_child_weight),
            ("reg_alpha", self.reg_alpha),
            ("reg_lambda", self.reg_lambda),
            ("gamma", self.gamma),
        ] {
            if !(v >= 0.0 && v.is_finite()) {
                return Err(AppError::config(format!("{name} must be finite and >= 0 (got {v}).")));
            }
        }
        if self.max_bins < 2 || self.max_bins >= usize::from(u16::MAX) {
            return Err(AppError::config("max_bins must be in 2..65535."));
        }
        if !self.monotone_constraints.is_empty() && self.monotone_constraints.len() != n_features {
            return Err(AppError::config(format!(
                "Got {} monotone constraints for {n_features} features.",
                self.monotone_constraints.len()
            )));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            min_child_weight: self.min_child_weight,
            reg_alpha: self.reg_alpha,
            reg_lambda: self.reg_lambda,
            gamma: self.gamma,
        }
    }
}

/// A fitted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    params: BoosterParams,
    base_score: f64,
    n_features: usize,
    trees: Vec<Tree>,
    /// Zero-based round with the best validation metric.
    best_iteration: Option<usize>,
    /// Validation metric after each round.
    eval_history: Vec<f64>,
}

impl Booster {
    /// Fit on `x`/`y`, optionally monitoring `eval` for early stopping.
    pub fn fit(
        params: BoosterParams,
        x: &DMatrix<f64>,
        y: &[f64],
        eval: Option<(&DMatrix<f64>, &[f64])>,
    ) -> Result<Self, AppError> {
        let n_rows = x.nrows();
        let n_features = x.ncols();
        if n_rows == 0 {
            return Err(AppError::data("Cannot fit a booster on zero rows."));
        }
        if y.len() != n_rows {
            return Err(AppError::data(format!(
                "Got {} targets for {n_rows} rows.",
                y.len()
            )));
        }
        params.validate(n_features)?;
        params.objective.check_targets(y)?;
        if let Some((ex, ey)) = eval {
            if ex.ncols() != n_features || ex.nrows() != ey.len() {
                return Err(AppError::data(format!(
                    "Evaluation set is {}x{} with {} targets; expected {n_features} columns.",
                    ex.nrows(),
                    ex.ncols(),
                    ey.len()
                )));
            }
            params.objective.check_targets(ey)?;
        }

        let base_score = params.objective.base_score(y)?;
        let binned = BinnedMatrix::from_matrix(x, params.max_bins);
        let tree_params = params.tree_params();

        let mut margin = vec![base_score; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        let mut eval_margin = eval.map(|(ex, _)| vec![base_score; ex.nrows()]);

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut eval_history = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        for round in 0..params.n_estimators {
            params.objective.gradients(y, &margin, &mut grad, &mut hess);

            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(round as u64));
            let rows = sample_rows(n_rows, params.subsample, &mut rng);
            let features = sample_features(n_features, params.colsample_bytree, &mut rng);

            let tree = TreeGrower::new(
                &binned,
                &grad,
                &hess,
                &features,
                &params.monotone_constraints,
                &tree_params,
            )
            .grow(rows);

            for (i, m) in margin.iter_mut().enumerate() {
                *m += tree.predict_row(x, i);
            }

            if let (Some((ex, ey)), Some(em)) = (eval, eval_margin.as_mut()) {
                for (i, m) in em.iter_mut().enumerate() {
                    *m += tree.predict_row(ex, i);
                }
                let score = params.objective.eval_metric(ey, em);
                eval_history.push(score);
                debug!(round, score, metric = params.objective.eval_metric_name(), "boosting round");

                if best.is_none_or(|(_, s)| score < s) {
                    best = Some((round, score));
                }
                trees.push(tree);

                if let (Some(patience), Some((best_round, _))) = (params.early_stopping_rounds, best) {
                    if round - best_round >= patience {
                        debug!(round, best_round, "early stopping");
                        break;
                    }
                }
            } else {
                trees.push(tree);
            }
        }

        let best_iteration = best.map(|(round, _)| round);
        if let (Some(round), Some(_)) = (best_iteration, params.early_stopping_rounds) {
            trees.truncate(round + 1);
        }

        Ok(Self {
            params,
            base_score,
            n_features,
            trees,
            best_iteration,
            eval_history,
        })
    }

    /// Raw margins (log scale for Poisson).
    pub fn predict_margin(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        if x.ncols() != self.n_features {
            return Err(AppError::config(format!(
                "Booster expects {} features but received {}.",
                self.n_features,
                x.ncols()
            )));
        }
        Ok((0..x.nrows())
            .map(|i| self.base_score + self.trees.iter().map(|t| t.predict_row(x, i)).sum::<f64>())
            .collect())
    }

    /// Predictions on the response scale.
    pub fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        let objective = self.params.objective;
        Ok(self
            .predict_margin(x)?
            .into_iter()
            .map(|m| objective.transform(m))
            .collect())
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn eval_history(&self) -> &[f64] {
        &self.eval_history
    }

    /// Total split gain per feature.
    pub fn feature_gain(&self) -> Vec<f64> {
        let mut gain = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.add_gain(&mut gain);
        }
        gain
    }
}

fn sample_rows(n_rows: usize, subsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if subsample >= 1.0 {
        return (0..n_rows).collect();
    }
    let rows: Vec<usize> = (0..n_rows).filter(|_| rng.gen_bool(subsample)).collect();
    if rows.is_empty() { (0..n_rows).collect() } else { rows }
}

fn sample_features(n_features: usize, colsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if colsample >= 1.0 || n_features == 0 {
        return (0..n_features).collect();
    }
    let k = ((n_features as f64) * colsample).round().max(1.0) as usize;
    let mut picked = rand::seq::index::sample(rng, n_features, k.min(n_features)).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Poisson};

    fn poisson_data(n: usize, seed: u64) -> (DMatrix<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = DMatrix::zeros(n, 2);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let a: f64 = rng.gen_range(0.0..1.0);
            let b = rng.gen_range(0.0..1.0);
            x[(i, 0)] = a;
            x[(i, 1)] = b;
            let mu = (0.2 + 1.5 * a).max(1e-6);
            let draw: f64 = Poisson::new(mu).map(|d| d.sample(&mut rng)).unwrap_or(0.0);
            y.push(draw);
        }
        (x, y)
    }

    fn poisson_params() -> BoosterParams {
        BoosterParams {
            objective: Objective::Poisson,
            n_estimators: 40,
            max_depth: 3,
            learning_rate: 0.2,
            ..BoosterParams::default()
        }
    }

    #[test]
    fn poisson_fit_beats_constant_model() {
        let (x, y) = poisson_data(600, 3);
        let booster = Booster::fit(poisson_params(), &x, &y, None).unwrap();
        let pred = booster.predict(&x).unwrap();
        assert!(pred.iter().all(|&p| p > 0.0));

        let mean = crate::math::stats::mean(&y);
        let constant = vec![mean; y.len()];
        let fitted = crate::math::stats::mean_poisson_deviance(&y, &pred);
        let baseline = crate::math::stats::mean_poisson_deviance(&y, &constant);
        assert!(fitted < baseline, "{fitted} vs {baseline}");
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = poisson_data(300, 5);
        let params = BoosterParams {
            subsample: 0.8,
            colsample_bytree: 0.5,
            seed: 11,
            ..poisson_params()
        };
        let a = Booster::fit(params.clone(), &x, &y, None).unwrap();
        let b = Booster::fit(params, &x, &y, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        let (x, y) = poisson_data(400, 8);
        let (vx, vy) = poisson_data(200, 9);
        let params = BoosterParams {
            n_estimators: 200,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 0.0,
            early_stopping_rounds: Some(5),
            ..poisson_params()
        };
        let booster = Booster::fit(params, &x, &y, Some((&vx, &vy))).unwrap();
        let best = booster.best_iteration().unwrap();
        assert_eq!(booster.n_trees(), best + 1);
        let best_score = booster.eval_history()[best];
        assert!(booster.eval_history().iter().all(|&s| s >= best_score));
    }

    #[test]
    fn increasing_constraint_gives_monotone_predictions() {
        // Target decreases in x0, but x0 is constrained to increase.
        let n = 400;
        let mut x = DMatrix::zeros(n, 2);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let a = (i % 20) as f64;
            let b = (i / 20) as f64;
            x[(i, 0)] = a;
            x[(i, 1)] = b;
            y.push(20.0 - a + 0.1 * b + if i % 3 == 0 { 2.0 } else { 0.0 });
        }
        let params = BoosterParams {
            n_estimators: 30,
            max_depth: 4,
            min_child_weight: 0.0,
            monotone_constraints: vec![MonotoneDirection::Increasing, MonotoneDirection::None],
            ..BoosterParams::default()
        };
        let booster = Booster::fit(params, &x, &y, None).unwrap();

        for b in [0.0, 7.0, 19.0] {
            let grid = DMatrix::from_fn(40, 2, |r, c| if c == 0 { r as f64 * 0.5 } else { b });
            let pred = booster.predict(&grid).unwrap();
            assert!(pred.windows(2).all(|w| w[0] <= w[1] + 1e-12), "not monotone at b={b}");
        }
    }

    #[test]
    fn rejects_wrong_feature_count_at_predict() {
        let (x, y) = poisson_data(100, 1);
        let booster = Booster::fit(poisson_params(), &x, &y, None).unwrap();
        let err = booster.predict(&DMatrix::zeros(3, 5)).unwrap_err();
        assert!(err.to_string().contains("expects 2 features"));
    }

    #[test]
    fn rejects_mismatched_constraints() {
        let (x, y) = poisson_data(50, 1);
        let params = BoosterParams {
            monotone_constraints: vec![MonotoneDirection::Increasing],
            ..poisson_params()
        };
        assert!(Booster::fit(params, &x, &y, None).is_err());
    }
}
