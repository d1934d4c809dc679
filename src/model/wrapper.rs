//! `ClaimModel`: the end-to-end training and scoring workflow.
//!
//! `train` walks the stages in order, each consuming the previous stage's
//! output:
//!
//! 1. split (after dropping rows with an unusable target)
//! 2. prepare (feature selection, ratio cap)
//! 3. preprocess (pipeline fitted on train only)
//! 4. constrain (monotone directions from output names)
//! 5. optimize (hyperparameter search on train/validation)
//! 6. fit (final booster at the best hyperparameters)
//! 7. evaluate (test partition, or validation when test is empty)
//!
//! A failure leaves `stage()` at the last completed stage.

use std::path::Path;

use chrono::Utc;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span};

use crate::domain::{Frame, ModelKind, TrainConfig};
use crate::error::{AppError, missing_columns_error};
use crate::features::{FeatureFilter, MonotoneConstraints, Preprocessor, build_constraints};
use crate::fit::{SearchResult, TuningData, apply_params, tune_booster};
use crate::gbdt::{Booster, BoosterParams, Objective};
use crate::model::artifact::{ARTIFACT_FORMAT_VERSION, PartitionSizes, TrainedArtifact, TrainingMetadata};
use crate::report::{EvaluationReport, evaluate};
use crate::split::{SplitData, split};

/// Training progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Untrained,
    Split,
    Prepared,
    Preprocessed,
    Constrained,
    Optimized,
    Fitted,
    Evaluated,
}

#[derive(Debug, Clone)]
pub struct ClaimModel {
    config: TrainConfig,
    stage: Stage,
    artifact: Option<TrainedArtifact>,
    holdout: Option<ScoredPairs>,
}

/// Actual and predicted values on the modelling scale, row-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPairs {
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub years: Option<Vec<f64>>,
}

impl ScoredPairs {
    pub fn report(&self, kind: ModelKind) -> Result<EvaluationReport, AppError> {
        evaluate(kind, &self.actual, &self.predicted, self.years.as_deref())
    }
}

struct Targets {
    frame: Frame,
    y: Vec<f64>,
    dropped: usize,
}

struct Matrices {
    train: DMatrix<f64>,
    val: DMatrix<f64>,
    test: DMatrix<f64>,
}

impl ClaimModel {
    pub fn new(kind: ModelKind, config: TrainConfig) -> Result<Self, AppError> {
        if config.kind != kind {
            return Err(AppError::config(format!(
                "Config is for a {} model but a {} model was requested.",
                config.kind.display_name(),
                kind.display_name()
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            stage: Stage::Untrained,
            artifact: None,
            holdout: None,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.config.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn artifact(&self) -> Option<&TrainedArtifact> {
        self.artifact.as_ref()
    }

    /// Pairs behind the stored evaluation; only set after `train`.
    pub fn holdout(&self) -> Option<&ScoredPairs> {
        self.holdout.as_ref()
    }

    /// Run every training stage on `frame`.
    pub fn train(&mut self, frame: &Frame) -> Result<&TrainedArtifact, AppError> {
        let kind = self.config.kind;
        let span = info_span!("train", kind = kind.display_name());
        let _guard = span.enter();

        self.stage = Stage::Untrained;
        self.artifact = None;
        self.holdout = None;

        let targets = self.prepare_targets(frame)?;
        let data = split(&targets.frame, &targets.y, &self.config.split, &self.config.data)?;
        info!(
            rows = targets.y.len(),
            dropped = targets.dropped,
            train = data.y_train.len(),
            val = data.y_val.len(),
            test = data.y_test.len(),
            "split: {}",
            data.description
        );
        self.stage = Stage::Split;

        let (x_train, x_val, x_test) = (
            self.prepare_features(&data.x_train)?,
            self.prepare_features(&data.x_val)?,
            self.prepare_features(&data.x_test)?,
        );
        info!(features = self.config.feature_columns().len(), "prepared feature columns");
        self.stage = Stage::Prepared;

        let mut preprocessor = Preprocessor::new(
            self.config.data.numeric_features.clone(),
            self.config.data.one_hot_features.clone(),
            FeatureFilter::new(self.config.filter.min_samples, self.config.filter.ratio),
        );
        let matrices = Matrices {
            train: preprocessor.fit_transform(&x_train)?,
            val: preprocessor.transform(&x_val)?,
            test: preprocessor.transform(&x_test)?,
        };
        let feature_names = preprocessor.feature_names_out()?;
        if feature_names.is_empty() {
            return Err(AppError::data(
                "The sparse-column filter removed every feature; nothing to train on.",
            ));
        }
        info!(
            encoded = preprocessor.combined_names().len(),
            retained = feature_names.len(),
            "preprocessing fitted"
        );
        self.stage = Stage::Preprocessed;

        let constraints = build_constraints(&feature_names, &self.config.constraints);
        info!(
            increasing = constraints.summary.increasing,
            decreasing = constraints.summary.decreasing,
            unconstrained = constraints.summary.unconstrained,
            "monotone constraints {}",
            constraints.to_constraint_string()
        );
        self.stage = Stage::Constrained;

        let base = self.base_params(&constraints);
        let tuning = TuningData {
            x_train: &matrices.train,
            y_train: &data.y_train,
            x_val: &matrices.val,
            y_val: &data.y_val,
        };
        let search = tune_booster(kind, &base, tuning, &self.config.search)?;
        info!(
            best_trial = search.best_index,
            best_score = search.best_score,
            failed = search.n_failed(),
            "hyperparameter search done"
        );
        self.stage = Stage::Optimized;

        let booster = self.fit_final(&base, &search, &matrices, &data)?;
        info!(
            trees = booster.n_trees(),
            best_iteration = ?booster.best_iteration(),
            "final booster fitted"
        );
        self.stage = Stage::Fitted;

        let holdout = self.score_holdout(&booster, &matrices, &data)?;
        let evaluation = holdout.report(kind)?;
        info!(
            deviance = evaluation.metrics.deviance,
            rmse = evaluation.metrics.rmse,
            pairs = evaluation.metrics.n_pairs,
            "holdout evaluation"
        );

        let objective = base.objective;
        let artifact = TrainedArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            kind,
            target_column: self.config.data.target_column.clone(),
            log_target: self.config.data.log_target,
            objective: objective.name().to_string(),
            eval_metric: objective.eval_metric_name().to_string(),
            monotone_constraints: constraints.to_constraint_string(),
            feature_names,
            best_params: search.best_x.clone(),
            best_score: search.best_score,
            preprocessor,
            booster,
            evaluation: Some(evaluation),
            metadata: TrainingMetadata {
                trained_at: Utc::now(),
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                split: data.description.clone(),
                partition_sizes: PartitionSizes {
                    train: data.y_train.len(),
                    val: data.y_val.len(),
                    test: data.y_test.len(),
                },
                rows_dropped: targets.dropped,
                constraint_summary: constraints.summary,
                search,
                config: self.config.clone(),
            },
        };
        self.stage = Stage::Evaluated;
        self.holdout = Some(holdout);
        Ok(self.artifact.insert(artifact))
    }

    /// One prediction per row: expected count (frequency) or log-severity.
    pub fn predict(&self, frame: &Frame) -> Result<Vec<f64>, AppError> {
        let artifact = self.fitted()?;
        let required = artifact.preprocessor.required_columns();
        let missing = frame.missing_columns(&required);
        if !missing.is_empty() {
            return Err(missing_columns_error("predict", &missing, frame.names()));
        }
        let prepared = self.prepare_features(frame)?;
        let x = artifact.preprocessor.transform(&prepared)?;
        artifact.booster.predict(&x)
    }

    /// Predictions in currency units (`exp` of log-severity); counts unchanged.
    pub fn predict_amount(&self, frame: &Frame) -> Result<Vec<f64>, AppError> {
        let pred = self.predict(frame)?;
        if self.config.data.log_target {
            Ok(pred.into_iter().map(f64::exp).collect())
        } else {
            Ok(pred)
        }
    }

    /// Score a labelled frame.
    pub fn evaluate(&self, frame: &Frame) -> Result<EvaluationReport, AppError> {
        self.score(frame)?.report(self.config.kind)
    }

    /// Targets (modelling scale) next to predictions for a labelled frame.
    pub fn score(&self, frame: &Frame) -> Result<ScoredPairs, AppError> {
        self.fitted()?;
        let target = &self.config.data.target_column;
        if !frame.has(target) {
            return Err(missing_columns_error("evaluate", std::slice::from_ref(target), frame.names()));
        }
        let raw = frame.numeric(target)?;
        let actual: Vec<f64> = raw.iter().map(|&v| self.transform_target(v)).collect();
        let predicted = self.predict(frame)?;
        let years = frame.numeric(&self.config.data.year_column).ok().map(<[f64]>::to_vec);
        Ok(ScoredPairs {
            actual,
            predicted,
            years,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let artifact = self.fitted()?;
        artifact.save(path)?;
        info!(path = %path.display(), "artifact saved");
        Ok(())
    }

    /// Restore a saved model; the result is ready to predict.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let artifact = TrainedArtifact::load(path)?;
        let config = artifact.metadata.config.clone();
        info!(path = %path.display(), kind = artifact.kind.display_name(), "artifact loaded");
        Ok(Self {
            config,
            stage: Stage::Fitted,
            artifact: Some(artifact),
            holdout: None,
        })
    }

    fn fitted(&self) -> Result<&TrainedArtifact, AppError> {
        match (&self.artifact, self.stage >= Stage::Fitted) {
            (Some(a), true) => Ok(a),
            _ => Err(AppError::config(format!(
                "The {} model is not trained yet.",
                self.config.kind.display_name()
            ))),
        }
    }

    /// Target on the modelling scale; `NaN` when unusable.
    fn transform_target(&self, v: f64) -> f64 {
        if !v.is_finite() {
            return f64::NAN;
        }
        if self.config.data.log_target {
            if v > 0.0 { v.ln() } else { f64::NAN }
        } else {
            v
        }
    }

    fn prepare_targets(&self, frame: &Frame) -> Result<Targets, AppError> {
        let target = &self.config.data.target_column;
        if !frame.has(target) {
            return Err(missing_columns_error("train", std::slice::from_ref(target), frame.names()));
        }
        let transformed: Vec<f64> = frame
            .numeric(target)?
            .iter()
            .map(|&v| self.transform_target(v))
            .collect();
        let keep: Vec<usize> = (0..transformed.len()).filter(|&i| transformed[i].is_finite()).collect();
        if keep.is_empty() {
            return Err(AppError::data(format!("No rows with a usable `{target}` value.")));
        }
        Ok(Targets {
            frame: frame.take(&keep),
            y: keep.iter().map(|&i| transformed[i]).collect(),
            dropped: transformed.len() - keep.len(),
        })
    }

    fn prepare_features(&self, frame: &Frame) -> Result<Frame, AppError> {
        let mut selected = frame.select(&self.config.feature_columns())?;
        if let Some(col) = &self.config.data.ratio_cap_column {
            if selected.has(col) {
                selected.cap_column(col, 1.0)?;
            }
        }
        Ok(selected)
    }

    fn base_params(&self, constraints: &MonotoneConstraints) -> BoosterParams {
        let booster = &self.config.booster;
        BoosterParams {
            objective: match self.config.kind {
                ModelKind::Frequency => Objective::Poisson,
                ModelKind::Severity => Objective::SquaredError,
            },
            n_estimators: booster.n_estimators,
            max_bins: booster.max_bins,
            early_stopping_rounds: booster.early_stopping_rounds,
            seed: booster.seed,
            monotone_constraints: constraints.directions.clone(),
            ..BoosterParams::default()
        }
    }

    fn fit_final(
        &self,
        base: &BoosterParams,
        search: &SearchResult,
        matrices: &Matrices,
        data: &SplitData,
    ) -> Result<Booster, AppError> {
        let params = apply_params(base, &search.best_x)?;
        let eval = (params.early_stopping_rounds.is_some() && !data.y_val.is_empty())
            .then_some((&matrices.val, data.y_val.as_slice()));
        Booster::fit(params, &matrices.train, &data.y_train, eval)
    }

    fn score_holdout(
        &self,
        booster: &Booster,
        matrices: &Matrices,
        data: &SplitData,
    ) -> Result<ScoredPairs, AppError> {
        let (x, y, frame) = if data.y_test.is_empty() {
            (&matrices.val, &data.y_val, &data.x_val)
        } else {
            (&matrices.test, &data.y_test, &data.x_test)
        };
        Ok(ScoredPairs {
            actual: y.clone(),
            predicted: booster.predict(x)?,
            years: frame.numeric(&self.config.data.year_column).ok().map(<[f64]>::to_vec),
        })
    }
}
