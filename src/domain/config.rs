//! Training configuration.
//!
//! A run is described by one `TrainConfig`. It can be loaded from a TOML file
//! and individual knobs are overridden from CLI flags. Frequency and severity
//! models start from different defaults; a file only needs `kind` and the
//! fields it changes, the rest comes from that kind's defaults.

use std::collections::BTreeMap;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::ModelKind;
use crate::error::AppError;

/// Which splitting policy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SplitStrategy {
    /// One seeded permutation, ratio cuts.
    Random,
    /// Ratio cuts preserving target-bucket proportions.
    Stratified,
    /// A configured year is the test set; the rest is split train/validation.
    YearHoldout,
    /// Unique account identifiers are partitioned; rows follow their account.
    GroupedByAccount,
}

impl SplitStrategy {
    pub fn display_name(self) -> &'static str {
        match self {
            SplitStrategy::Random => "random",
            SplitStrategy::Stratified => "stratified",
            SplitStrategy::YearHoldout => "year-holdout",
            SplitStrategy::GroupedByAccount => "grouped-by-account",
        }
    }
}

/// Sampling prior of a real-valued search dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Prior {
    Uniform,
    LogUniform,
}

/// One declared dimension of the hyperparameter search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DimensionSpec {
    Integer { name: String, low: i64, high: i64 },
    Real { name: String, low: f64, high: f64, prior: Prior },
}

impl DimensionSpec {
    pub fn name(&self) -> &str {
        match self {
            DimensionSpec::Integer { name, .. } | DimensionSpec::Real { name, .. } => name,
        }
    }

    fn integer(name: &str, low: i64, high: i64) -> Self {
        DimensionSpec::Integer { name: name.to_string(), low, high }
    }

    fn real(name: &str, low: f64, high: f64, prior: Prior) -> Self {
        DimensionSpec::Real { name: name.to_string(), low, high, prior }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub id_column: String,
    pub year_column: String,
    /// Observed target: claim count (frequency) or claim amount (severity).
    pub target_column: String,
    /// Severity models fit `ln(target)`; non-positive amounts are dropped.
    pub log_target: bool,
    pub numeric_features: Vec<String>,
    pub one_hot_features: Vec<String>,
    /// Ratio-like attribute capped at `1.0` during preparation.
    pub ratio_cap_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub strategy: SplitStrategy,
    pub seed: u64,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Used by `year-holdout`.
    pub test_year: Option<i64>,
    /// Stratify the train/validation split inside `year-holdout`.
    pub stratify: bool,
    /// Fixed target edges for stratification buckets.
    pub stratify_edges: Vec<f64>,
    /// Optional account allow-list for `grouped-by-account`.
    pub allowed_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_samples: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    pub decreasing_markers: Vec<String>,
    pub increasing_markers: Vec<String>,
    pub case_insensitive: bool,
    /// Explicit feature -> direction mapping; wins over marker rules.
    pub explicit: BTreeMap<String, i8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub n_calls: usize,
    pub n_initial_points: usize,
    /// Random candidates scored by the acquisition function per guided trial.
    pub n_candidates: usize,
    pub seed: u64,
    /// Score recorded for a failed trial.
    pub failure_score: f64,
    pub dimensions: Vec<DimensionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterConfig {
    pub n_estimators: usize,
    pub max_bins: usize,
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

/// Full configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub kind: ModelKind,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub booster: BoosterConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            id_column: "ACCOUNT_ID".to_string(),
            year_column: "YEAR".to_string(),
            target_column: "CLAIM_COUNT".to_string(),
            log_target: false,
            numeric_features: Vec::new(),
            one_hot_features: Vec::new(),
            ratio_cap_column: None,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Stratified,
            seed: 42,
            train_ratio: 0.7,
            val_ratio: 0.15,
            test_ratio: 0.15,
            test_year: None,
            stratify: true,
            stratify_edges: vec![1.0, 2.0],
            allowed_ids: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            ratio: 0.001,
        }
    }
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            decreasing_markers: vec!["Below".to_string()],
            increasing_markers: vec![
                "From".to_string(),
                "Unknown".to_string(),
                "HIST_LOSS_RATIO".to_string(),
            ],
            case_insensitive: false,
            explicit: BTreeMap::new(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_calls: 30,
            n_initial_points: 10,
            n_candidates: 2000,
            seed: 42,
            failure_score: 1e6,
            dimensions: default_dimensions(),
        }
    }
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_bins: 64,
            early_stopping_rounds: Some(30),
            seed: 42,
        }
    }
}

fn invalid_toml(e: &dyn std::fmt::Display) -> AppError {
    AppError::config(format!("Invalid config TOML: {e}"))
}

/// Overlay `user` onto `base`; nested tables merge key by key, everything
/// else (arrays included) is replaced.
fn merge_tables(mut base: toml::Table, user: toml::Table) -> toml::Table {
    for (key, value) in user {
        let merged = match (base.remove(&key), value) {
            (Some(toml::Value::Table(b)), toml::Value::Table(u)) => toml::Value::Table(merge_tables(b, u)),
            (_, v) => v,
        };
        base.insert(key, merged);
    }
    base
}

/// Booster search space used when a config does not declare one.
pub fn default_dimensions() -> Vec<DimensionSpec> {
    vec![
        DimensionSpec::integer("max_depth", 2, 8),
        DimensionSpec::real("learning_rate", 0.01, 0.3, Prior::LogUniform),
        DimensionSpec::real("subsample", 0.5, 1.0, Prior::Uniform),
        DimensionSpec::real("colsample_bytree", 0.5, 1.0, Prior::Uniform),
        DimensionSpec::real("min_child_weight", 1.0, 20.0, Prior::LogUniform),
        DimensionSpec::real("reg_alpha", 1e-3, 10.0, Prior::LogUniform),
        DimensionSpec::real("reg_lambda", 1e-3, 10.0, Prior::LogUniform),
        DimensionSpec::real("gamma", 0.0, 2.0, Prior::Uniform),
    ]
}

impl TrainConfig {
    /// Defaults for a claim-count model.
    pub fn frequency() -> Self {
        Self {
            kind: ModelKind::Frequency,
            data: DataConfig::default(),
            split: SplitConfig::default(),
            filter: FilterConfig::default(),
            constraints: ConstraintConfig::default(),
            search: SearchConfig::default(),
            booster: BoosterConfig::default(),
        }
    }

    /// Defaults for a log-severity model.
    pub fn severity() -> Self {
        let mut config = Self::frequency();
        config.kind = ModelKind::Severity;
        config.data.target_column = "CLAIM_AMOUNT".to_string();
        config.data.log_target = true;
        // Every severity row is a claim, so count buckets carry no information.
        config.split.strategy = SplitStrategy::Random;
        config.split.stratify = false;
        config
    }

    pub fn for_kind(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Frequency => Self::frequency(),
            ModelKind::Severity => Self::severity(),
        }
    }

    /// Load a TOML config file and validate it.
    pub fn from_toml_file(path: &Path) -> Result<Self, AppError> {
        let config = Self::read_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without validating it, so callers can apply
    /// overrides first.
    pub fn read_toml_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read config '{}': {e}", path.display())))?;
        Self::parse_toml(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        let config = Self::parse_toml(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fields absent from `text` take the defaults of the declared `kind`.
    fn parse_toml(text: &str) -> Result<Self, AppError> {
        let user: toml::Table = text.parse().map_err(|e| invalid_toml(&e))?;
        let kind: ModelKind = user
            .get("kind")
            .cloned()
            .ok_or_else(|| AppError::config("Config must declare `kind` (frequency or severity)."))?
            .try_into()
            .map_err(|e| invalid_toml(&e))?;

        let defaults = toml::Table::try_from(Self::for_kind(kind))
            .map_err(|e| AppError::io(format!("Failed to render default config: {e}")))?;
        let merged = merge_tables(defaults, user);
        toml::Value::Table(merged).try_into().map_err(|e| invalid_toml(&e))
    }

    pub fn to_toml_string(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::io(format!("Failed to render config TOML: {e}")))
    }

    /// Every declared feature column, numeric first.
    pub fn feature_columns(&self) -> Vec<String> {
        self.data
            .numeric_features
            .iter()
            .chain(self.data.one_hot_features.iter())
            .cloned()
            .collect()
    }

    /// Check settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<(), AppError> {
        let s = &self.split;
        for (name, v) in [
            ("train_ratio", s.train_ratio),
            ("val_ratio", s.val_ratio),
            ("test_ratio", s.test_ratio),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AppError::config(format!("Invalid split.{name}={v}.")));
            }
        }
        let total = s.train_ratio + s.val_ratio + s.test_ratio;
        if (total - 1.0).abs() > 1e-9 {
            return Err(AppError::config(format!(
                "Split ratios must sum to 1 (got {total})."
            )));
        }
        if s.train_ratio <= 0.0 || s.val_ratio <= 0.0 {
            return Err(AppError::config(
                "Split needs non-empty train and validation shares.",
            ));
        }
        if s.strategy == SplitStrategy::YearHoldout && s.test_year.is_none() {
            return Err(AppError::config("`year-holdout` split requires split.test_year."));
        }
        if s.stratify_edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(AppError::config("split.stratify_edges must be strictly increasing."));
        }

        if !(self.filter.ratio.is_finite() && self.filter.ratio >= 0.0) {
            return Err(AppError::config("filter.ratio must be finite and >= 0."));
        }

        if self.feature_columns().is_empty() {
            return Err(AppError::config(
                "No features declared (data.numeric_features / data.one_hot_features).",
            ));
        }

        for (name, dir) in &self.constraints.explicit {
            if !matches!(*dir, -1..=1) {
                return Err(AppError::config(format!(
                    "Constraint for `{name}` must be -1, 0 or 1 (got {dir})."
                )));
            }
        }

        let search = &self.search;
        if search.n_calls == 0 {
            return Err(AppError::config("search.n_calls must be > 0."));
        }
        if search.n_initial_points == 0 || search.n_initial_points > search.n_calls {
            return Err(AppError::config(
                "search.n_initial_points must be in 1..=search.n_calls.",
            ));
        }
        if search.n_candidates == 0 {
            return Err(AppError::config("search.n_candidates must be > 0."));
        }
        if search.dimensions.is_empty() {
            return Err(AppError::config("search.dimensions must not be empty."));
        }
        if !search.failure_score.is_finite() {
            return Err(AppError::config("search.failure_score must be finite."));
        }

        if self.booster.n_estimators == 0 {
            return Err(AppError::config("booster.n_estimators must be > 0."));
        }
        if self.booster.max_bins < 2 || self.booster.max_bins > u16::MAX as usize - 1 {
            return Err(AppError::config("booster.max_bins must be in 2..65535."));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_features(mut config: TrainConfig) -> TrainConfig {
        config.data.numeric_features = vec!["AGE".to_string()];
        config
    }

    #[test]
    fn defaults_validate() {
        with_features(TrainConfig::frequency()).validate().unwrap();
        with_features(TrainConfig::severity()).validate().unwrap();
    }

    #[test]
    fn ratios_must_sum_to_one() {
        let mut config = with_features(TrainConfig::frequency());
        config.split.test_ratio = 0.3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1"));
    }

    #[test]
    fn rendered_toml_parses_back() {
        let mut config = with_features(TrainConfig::severity());
        config.constraints.explicit.insert("AGE".to_string(), 1);
        let text = config.to_toml_string().unwrap();
        assert_eq!(TrainConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn severity_toml_keeps_severity_defaults() {
        let text = "kind = \"severity\"\n[data]\nnumeric_features = [\"DRIVER_AGE\"]\n";
        let config = TrainConfig::from_toml_str(text).unwrap();
        assert_eq!(config.data.target_column, "CLAIM_AMOUNT");
        assert!(config.data.log_target);
        assert_eq!(config.data.id_column, "ACCOUNT_ID");
        assert_eq!(config.split.strategy, SplitStrategy::Random);
        assert!(!config.split.stratify);
        assert_eq!(config.data.numeric_features, vec!["DRIVER_AGE"]);
    }

    #[test]
    fn severity_file_without_data_section_loads_severity_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("severity.toml");
        std::fs::write(&path, "kind = \"severity\"\n[split]\nseed = 3\n").unwrap();

        let config = TrainConfig::read_toml_file(&path).unwrap();
        assert_eq!(config.data.target_column, "CLAIM_AMOUNT");
        assert!(config.data.log_target);
        assert_eq!(config.split.strategy, SplitStrategy::Random);
        assert_eq!(config.split.seed, 3);
        assert_eq!(config.split.train_ratio, 0.7);
    }

    #[test]
    fn config_without_kind_is_rejected() {
        let err = TrainConfig::from_toml_str("[data]\nnumeric_features = [\"AGE\"]\n").unwrap_err();
        assert!(err.to_string().contains("kind"), "{err}");
    }

    #[test]
    fn nested_tables_merge_and_arrays_replace() {
        let base: toml::Table = "a = [1, 2]\n[t]\nx = 1\ny = 2\n".parse().unwrap();
        let user: toml::Table = "a = [3]\n[t]\ny = 5\n".parse().unwrap();
        let merged = merge_tables(base, user);
        assert_eq!(merged["a"].as_array().unwrap().len(), 1);
        assert_eq!(merged["t"]["x"].as_integer(), Some(1));
        assert_eq!(merged["t"]["y"].as_integer(), Some(5));
    }

    #[test]
    fn year_holdout_requires_year() {
        let mut config = with_features(TrainConfig::frequency());
        config.split.strategy = SplitStrategy::YearHoldout;
        assert!(config.validate().is_err());
        config.split.test_year = Some(2023);
        config.validate().unwrap();
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let text = r#"
            kind = "frequency"

            [data]
            numeric_features = ["VEHICLE_AGE"]
            one_hot_features = ["REGION"]

            [split]
            strategy = "grouped-by-account"
            seed = 7

            [search]
            n_calls = 5
            n_initial_points = 3

            [[search.dimensions]]
            type = "integer"
            name = "max_depth"
            low = 2
            high = 4

            [[search.dimensions]]
            type = "real"
            name = "learning_rate"
            low = 0.05
            high = 0.2
            prior = "log-uniform"
        "#;
        let config = TrainConfig::from_toml_str(text).unwrap();
        assert_eq!(config.split.strategy, SplitStrategy::GroupedByAccount);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.train_ratio, 0.7);
        assert_eq!(config.search.dimensions.len(), 2);
        assert_eq!(config.data.id_column, "ACCOUNT_ID");
        assert_eq!(config.booster.n_estimators, 300);
    }
}
