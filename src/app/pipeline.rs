//! Shared workflow steps used by the CLI handlers.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! config -> load tables -> assemble -> train/score
//!
//! The handlers in `app` then only deal with printing and writing files.

use std::path::Path;

use tracing::{info, warn};

use crate::data::{frequency_frame, severity_frame};
use crate::domain::{DataConfig, Frame, ModelKind, TrainConfig};
use crate::error::AppError;
use crate::io::{canonical_column_name, load_csv};
use crate::model::ClaimModel;

/// CLI overrides applied on top of a file or default config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub split: Option<crate::domain::SplitStrategy>,
    pub test_year: Option<i64>,
    pub n_calls: Option<usize>,
    pub n_initial_points: Option<usize>,
    pub n_estimators: Option<usize>,
    /// Replace the declared numeric features when non-empty.
    pub numeric_features: Vec<String>,
    /// Replace the declared one-hot features when non-empty.
    pub one_hot_features: Vec<String>,
}

/// Resolve the run config: file (or per-kind defaults), then overrides.
pub fn resolve_config(
    kind: ModelKind,
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<TrainConfig, AppError> {
    let mut config = match path {
        Some(p) => TrainConfig::read_toml_file(p)?,
        None => TrainConfig::for_kind(kind),
    };
    if config.kind != kind {
        return Err(AppError::config(format!(
            "Config declares kind `{}` but `--kind {}` was given.",
            config.kind.display_name(),
            kind.display_name()
        )));
    }

    if let Some(seed) = overrides.seed {
        config.split.seed = seed;
        config.search.seed = seed;
        config.booster.seed = seed;
    }
    if let Some(strategy) = overrides.split {
        config.split.strategy = strategy;
    }
    if let Some(year) = overrides.test_year {
        config.split.test_year = Some(year);
    }
    if let Some(n) = overrides.n_calls {
        config.search.n_calls = n;
        config.search.n_initial_points = config.search.n_initial_points.min(n);
    }
    if let Some(n) = overrides.n_initial_points {
        config.search.n_initial_points = n;
    }
    if let Some(n) = overrides.n_estimators {
        config.booster.n_estimators = n;
    }
    if !overrides.numeric_features.is_empty() {
        config.data.numeric_features = canonical(&overrides.numeric_features);
    }
    if !overrides.one_hot_features.is_empty() {
        config.data.one_hot_features = canonical(&overrides.one_hot_features);
    }

    config.validate()?;
    Ok(config)
}

fn canonical(names: &[String]) -> Vec<String> {
    names.iter().map(|n| canonical_column_name(n)).collect()
}

/// Load the account table and, when given, join the claims table onto it.
pub fn load_model_frame(
    kind: ModelKind,
    data: &DataConfig,
    accounts: &Path,
    claims: Option<&Path>,
) -> Result<Frame, AppError> {
    let table = load_csv(accounts)?;
    report_row_errors(accounts, &table.row_errors);
    let Some(claims_path) = claims else {
        return Ok(table.frame);
    };

    let claims_table = load_csv(claims_path)?;
    report_row_errors(claims_path, &claims_table.row_errors);
    let assembled = match kind {
        ModelKind::Frequency => frequency_frame(&table.frame, &claims_table.frame, data)?,
        ModelKind::Severity => severity_frame(&table.frame, &claims_table.frame, data)?,
    };
    Ok(assembled.frame)
}

fn report_row_errors(path: &Path, errors: &[crate::io::RowError]) {
    if errors.is_empty() {
        return;
    }
    warn!(path = %path.display(), skipped = errors.len(), "skipped malformed rows");
    for e in errors.iter().take(5) {
        warn!(line = e.line, "{}", e.message);
    }
}

/// Build and train a model for `config` on `frame`.
pub fn train_model(config: TrainConfig, frame: &Frame) -> Result<ClaimModel, AppError> {
    let mut model = ClaimModel::new(config.kind, config)?;
    model.train(frame)?;
    info!(stage = ?model.stage(), "training finished");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SplitStrategy;

    #[test]
    fn overrides_reach_every_seed_and_budget() {
        let overrides = Overrides {
            seed: Some(5),
            split: Some(SplitStrategy::GroupedByAccount),
            n_calls: Some(4),
            n_estimators: Some(12),
            ..Overrides::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freq.toml");
        std::fs::write(
            &path,
            "kind = \"frequency\"\n[data]\nnumeric_features = [\"AGE\"]\n",
        )
        .unwrap();

        let config = resolve_config(ModelKind::Frequency, Some(&path), &overrides).unwrap();
        assert_eq!(config.split.seed, 5);
        assert_eq!(config.search.seed, 5);
        assert_eq!(config.booster.seed, 5);
        assert_eq!(config.split.strategy, SplitStrategy::GroupedByAccount);
        assert_eq!(config.search.n_calls, 4);
        assert_eq!(config.search.n_initial_points, 4);
        assert_eq!(config.booster.n_estimators, 12);
    }

    #[test]
    fn kind_mismatch_with_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freq.toml");
        std::fs::write(&path, "kind = \"frequency\"\n[data]\nnumeric_features = [\"AGE\"]\n").unwrap();
        let err = resolve_config(ModelKind::Severity, Some(&path), &Overrides::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn severity_file_with_features_only_trains_on_log_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sev.toml");
        std::fs::write(&path, "kind = \"severity\"\n").unwrap();
        let overrides = Overrides {
            numeric_features: vec!["VEHICLE_AGE".to_string()],
            ..Overrides::default()
        };

        let config = resolve_config(ModelKind::Severity, Some(&path), &overrides).unwrap();
        assert_eq!(config.data.target_column, "CLAIM_AMOUNT");
        assert!(config.data.log_target);
        assert_eq!(config.split.strategy, SplitStrategy::Random);
        assert!(!config.split.stratify);
    }

    #[test]
    fn defaults_without_features_fail_validation() {
        assert!(resolve_config(ModelKind::Frequency, None, &Overrides::default()).is_err());
    }

    #[test]
    fn feature_flags_are_upper_cased() {
        let overrides = Overrides {
            numeric_features: vec!["vehicle_age".to_string()],
            one_hot_features: vec!["Region".to_string()],
            ..Overrides::default()
        };
        let config = resolve_config(ModelKind::Severity, None, &overrides).unwrap();
        assert_eq!(config.data.numeric_features, vec!["VEHICLE_AGE"]);
        assert_eq!(config.data.one_hot_features, vec!["REGION"]);
    }
}
