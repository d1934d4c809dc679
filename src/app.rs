//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs the log subscriber
//! - resolves the run config
//! - loads and assembles the input tables
//! - trains, scores, or evaluates
//! - prints reports and writes artifacts, predictions, and plots

use std::fs;
use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Command, EvaluateArgs, PredictArgs, SynthArgs, TrainArgs};
use crate::data::{generate_portfolio, synthetic_config};
use crate::domain::ModelKind;
use crate::error::AppError;
use crate::io::{load_csv, write_frame_csv, write_json, write_predictions_csv};
use crate::model::{ClaimModel, ScoredPairs};
use crate::report::{format_evaluation, format_training_summary, write_diagnostic_plots};

pub mod pipeline;

use pipeline::Overrides;

/// Entry point for the `claims` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Predict(args) => handle_predict(args),
        Command::Evaluate(args) => handle_evaluate(args),
        Command::Synth(args) => handle_synth(args),
    }
}

/// Logs go to stderr so reports on stdout stay pipeable.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let overrides = Overrides {
        seed: args.seed,
        split: args.split,
        test_year: args.test_year,
        n_calls: args.n_calls,
        n_initial_points: args.n_initial_points,
        n_estimators: args.n_estimators,
        numeric_features: args.numeric,
        one_hot_features: args.one_hot,
    };
    let config = pipeline::resolve_config(args.kind, args.config.as_deref(), &overrides)?;
    let frame = pipeline::load_model_frame(
        args.kind,
        &config.data,
        &args.input.data,
        args.input.claims.as_deref(),
    )?;

    let model = pipeline::train_model(config, &frame)?;
    model.save(&args.out)?;

    if let Some(artifact) = model.artifact() {
        println!("{}", format_training_summary(artifact));
    }
    println!("Artifact written to {}", args.out.display());

    if let (Some(dir), Some(holdout)) = (&args.plots, model.holdout()) {
        write_plots(dir, model.kind(), holdout)?;
    }
    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let model = ClaimModel::load(&args.model)?;
    let table = load_csv(&args.data)?;

    let predictions = model.predict(&table.frame)?;
    let amounts = (model.kind() == ModelKind::Severity)
        .then(|| model.predict_amount(&table.frame))
        .transpose()?;
    write_predictions_csv(
        &args.out,
        &table.frame,
        &model.config().data,
        &predictions,
        amounts.as_deref(),
    )?;
    info!(rows = predictions.len(), out = %args.out.display(), "predictions written");
    println!("Wrote {} predictions to {}", predictions.len(), args.out.display());
    Ok(())
}

fn handle_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let model = ClaimModel::load(&args.model)?;
    let frame = pipeline::load_model_frame(
        model.kind(),
        &model.config().data,
        &args.input.data,
        args.input.claims.as_deref(),
    )?;

    let scored = model.score(&frame)?;
    let report = scored.report(model.kind())?;
    println!("{}", format_evaluation(&report));

    if let Some(path) = &args.report {
        write_json(path, &report)?;
        println!("Evaluation written to {}", path.display());
    }
    if let Some(dir) = &args.plots {
        write_plots(dir, model.kind(), &scored)?;
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let portfolio = generate_portfolio(args.rows, args.seed)?;
    let dir = &args.out_dir;
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", dir.display())))?;

    write_frame_csv(&dir.join("accounts.csv"), &portfolio.accounts)?;
    write_frame_csv(&dir.join("claims.csv"), &portfolio.claims)?;
    for kind in [ModelKind::Frequency, ModelKind::Severity] {
        let text = synthetic_config(kind).to_toml_string()?;
        let path = dir.join(format!("{}.toml", kind.display_name()));
        fs::write(&path, text)
            .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))?;
    }

    println!(
        "Wrote {} account-years and {} claims to {}",
        portfolio.accounts.n_rows(),
        portfolio.claims.n_rows(),
        dir.display()
    );
    Ok(())
}

fn write_plots(dir: &Path, kind: ModelKind, scored: &ScoredPairs) -> Result<(), AppError> {
    let report = scored.report(kind)?;
    let written = write_diagnostic_plots(dir, &scored.actual, &scored.predicted, &report)?;
    for path in &written {
        println!("Plot written to {}", path.display());
    }
    Ok(())
}
