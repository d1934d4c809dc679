//! Command-line parsing for the claim-model trainer.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modelling code. Flags here only override fields of `TrainConfig`; the
//! config file (or the per-kind defaults) supplies everything else.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{ModelKind, SplitStrategy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "claims", version, about = "Claim frequency/severity models with monotone boosted trees")]
pub struct Cli {
    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split, tune, fit, and evaluate a model; save the artifact.
    Train(TrainArgs),
    /// Score a CSV with a saved model.
    Predict(PredictArgs),
    /// Evaluate a saved model on a labelled CSV.
    Evaluate(EvaluateArgs),
    /// Write a synthetic account/claims dataset with matching configs.
    Synth(SynthArgs),
}

/// Input tables shared by `train` and `evaluate`.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Account table (one row per account-year).
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Optional claims table joined on account id and year.
    ///
    /// Frequency: counts claims per account-year. Severity: one row per claim.
    #[arg(long, value_name = "CSV")]
    pub claims: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Which model to train.
    #[arg(short, long, value_enum, default_value_t = ModelKind::Frequency)]
    pub kind: ModelKind,

    /// TOML config; per-kind defaults when omitted.
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Where to write the trained artifact.
    #[arg(short, long, value_name = "JSON")]
    pub out: PathBuf,

    /// Override every seed (split, search, booster).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the split strategy.
    #[arg(long, value_enum)]
    pub split: Option<SplitStrategy>,

    /// Override the test year (`year-holdout`).
    #[arg(long)]
    pub test_year: Option<i64>,

    /// Override the number of search trials.
    #[arg(long)]
    pub n_calls: Option<usize>,

    /// Override the number of random trials before guided search.
    #[arg(long)]
    pub n_initial_points: Option<usize>,

    /// Override the number of boosting rounds.
    #[arg(long)]
    pub n_estimators: Option<usize>,

    /// Numeric feature columns (comma-separated); replaces the config list.
    #[arg(long, value_delimiter = ',', value_name = "COLS")]
    pub numeric: Vec<String>,

    /// One-hot feature columns (comma-separated); replaces the config list.
    #[arg(long, value_delimiter = ',', value_name = "COLS")]
    pub one_hot: Vec<String>,

    /// Write SVG diagnostics into this directory.
    #[arg(long, value_name = "DIR")]
    pub plots: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct PredictArgs {
    /// Saved model artifact.
    #[arg(short, long, value_name = "JSON")]
    pub model: PathBuf,

    /// Rows to score.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Prediction CSV to write.
    #[arg(short, long, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct EvaluateArgs {
    /// Saved model artifact.
    #[arg(short, long, value_name = "JSON")]
    pub model: PathBuf,

    #[command(flatten)]
    pub input: InputArgs,

    /// Write the evaluation as JSON.
    #[arg(long, value_name = "JSON")]
    pub report: Option<PathBuf>,

    /// Write SVG diagnostics into this directory.
    #[arg(long, value_name = "DIR")]
    pub plots: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Number of account-year rows.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub rows: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output directory for `accounts.csv`, `claims.csv`, and the configs.
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_with_overrides() {
        let cli = Cli::parse_from([
            "claims", "-v", "train", "--data", "a.csv", "--kind", "severity", "--out", "m.json", "--seed",
            "7", "--split", "grouped-by-account", "--numeric", "AGE,RATIO",
        ]);
        assert_eq!(cli.verbose, 1);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.kind, ModelKind::Severity);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.split, Some(SplitStrategy::GroupedByAccount));
        assert!(args.input.claims.is_none());
        assert_eq!(args.numeric, vec!["AGE", "RATIO"]);
        assert!(args.one_hot.is_empty());
    }

    #[test]
    fn synth_defaults() {
        let cli = Cli::parse_from(["claims", "synth", "--out-dir", "demo"]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.rows, 1000);
        assert_eq!(args.seed, 42);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
