//! Sequential model-based minimization (`gp_minimize`).
//!
//! Trial loop:
//!
//! 1. the first `n_initial_points` trials sample the unit cube uniformly
//! 2. later trials fit a Gaussian process to every trial so far and pick,
//!    among `n_candidates` random points, the one with the highest Expected
//!    Improvement over the best score
//! 3. the objective runs; an `Err`, a non-finite score, or a panic records
//!    `failure_score` and the loop continues
//!
//! Candidate scoring runs in parallel and is reduced by highest EI with the
//! lowest candidate index on ties, so the trial sequence only depends on the
//! seed and the objective's results.

use std::panic::{AssertUnwindSafe, catch_unwind};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::{debug, info, warn};

use crate::domain::SearchConfig;
use crate::error::AppError;
use crate::fit::space::{Params, SearchSpace};
use crate::math::GaussianProcess;

/// Exploration margin in Expected Improvement.
pub const EI_XI: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialPhase {
    Random,
    Guided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub phase: TrialPhase,
    /// Unit-cube coordinates of the evaluated point.
    pub point: Vec<f64>,
    pub params: Params,
    pub score: f64,
    /// Failure reason when the objective did not produce a finite score.
    pub error: Option<String>,
}

impl Trial {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_index: usize,
    pub best_x: Params,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

impl SearchResult {
    pub fn n_failed(&self) -> usize {
        self.trials.iter().filter(|t| t.failed()).count()
    }
}

/// Minimize `objective` over `space`.
pub fn gp_minimize<F>(space: &SearchSpace, mut objective: F, settings: &SearchConfig) -> Result<SearchResult, AppError>
where
    F: FnMut(&Params) -> Result<f64, AppError>,
{
    if settings.n_calls == 0 {
        return Err(AppError::config("search.n_calls must be > 0."));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::compute(format!("Normal distribution: {e}")))?;
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut trials: Vec<Trial> = Vec::with_capacity(settings.n_calls);

    for index in 0..settings.n_calls {
        let (phase, raw) = if index < settings.n_initial_points {
            (TrialPhase::Random, space.sample_unit(&mut rng))
        } else {
            match propose(space, &trials, settings.n_candidates, &normal, &mut rng) {
                Ok(u) => (TrialPhase::Guided, u),
                Err(e) => {
                    warn!(trial = index, error = %e, "surrogate fit failed; sampling at random");
                    (TrialPhase::Random, space.sample_unit(&mut rng))
                }
            }
        };

        let point = space.snap(&raw);
        let params = space.decode(&point);

        let outcome = match catch_unwind(AssertUnwindSafe(|| objective(&params))) {
            Ok(Ok(score)) if score.is_finite() => Ok(score),
            Ok(Ok(score)) => Err(format!("non-finite score {score}")),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };

        let (score, error) = match outcome {
            Ok(score) => {
                debug!(trial = index, ?phase, score, "trial finished");
                (score, None)
            }
            Err(reason) => {
                warn!(trial = index, ?phase, %reason, "trial failed; recording failure score");
                (settings.failure_score, Some(reason))
            }
        };

        trials.push(Trial {
            index,
            phase,
            point,
            params,
            score,
            error,
        });
    }

    // Lowest score wins; earliest trial on ties.
    let best_index = trials
        .iter()
        .fold(0, |best, t| if t.score < trials[best].score { t.index } else { best });
    let result = SearchResult {
        best_index,
        best_x: trials[best_index].params.clone(),
        best_score: trials[best_index].score,
        trials,
    };

    info!(
        n_calls = settings.n_calls,
        failed = result.n_failed(),
        best_trial = result.best_index,
        best_score = result.best_score,
        "search finished"
    );
    Ok(result)
}

/// Pick the candidate with the highest Expected Improvement.
fn propose(
    space: &SearchSpace,
    trials: &[Trial],
    n_candidates: usize,
    normal: &Normal,
    rng: &mut StdRng,
) -> Result<Vec<f64>, AppError> {
    let x: Vec<Vec<f64>> = trials.iter().map(|t| t.point.clone()).collect();
    let y: Vec<f64> = trials.iter().map(|t| t.score).collect();
    let gp = GaussianProcess::fit(&x, &y)?;
    let best = y.iter().copied().fold(f64::INFINITY, f64::min);

    let mut candidates: Vec<Vec<f64>> = (0..n_candidates.max(1)).map(|_| space.sample_unit(rng)).collect();
    let scored: Vec<(usize, f64)> = candidates
        .par_iter()
        .enumerate()
        .map(|(i, c)| {
            let (mean, std) = gp.predict(&space.snap(c));
            (i, expected_improvement(mean, std, best, EI_XI, normal))
        })
        .collect();

    let (winner, _) = scored
        .into_iter()
        .fold((0usize, f64::NEG_INFINITY), |(bi, be), (i, ei)| if ei > be { (i, ei) } else { (bi, be) });
    Ok(candidates.swap_remove(winner))
}

/// EI for minimization: `E[max(best - f(x) - xi, 0)]`.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64, normal: &Normal) -> f64 {
    let improvement = best - mean - xi;
    if std <= 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    improvement * normal.cdf(z) + std * normal.pdf(z)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic in objective".to_string()
    }
}
