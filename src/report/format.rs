//! Plain-text training and evaluation summaries.
//!
//! Formatting lives here so the model code only produces data and the CLI
//! only prints strings.

use crate::fit::SearchResult;
use crate::model::TrainedArtifact;
use crate::report::metrics::{EvaluationReport, Metrics};

const MAX_IMPORTANCE_ROWS: usize = 10;

/// Full summary printed after `claims train`.
pub fn format_training_summary(artifact: &TrainedArtifact) -> String {
    let meta = &artifact.metadata;
    let sizes = meta.partition_sizes;
    let mut out = String::new();

    out.push_str(&format!(
        "=== claims - {} model ===\n",
        artifact.kind.display_name()
    ));
    out.push_str(&format!("Trained: {}\n", meta.trained_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!(
        "Target: {}{}\n",
        artifact.target_column,
        if artifact.log_target { " (log)" } else { "" }
    ));
    out.push_str(&format!("Split: {}\n", meta.split));
    out.push_str(&format!(
        "Rows: train={} val={} test={} dropped={}\n",
        sizes.train, sizes.val, sizes.test, meta.rows_dropped
    ));
    out.push_str(&format!(
        "Features: {} retained of {} encoded\n",
        artifact.feature_names.len(),
        artifact.preprocessor.combined_names().len()
    ));
    out.push_str(&format!(
        "Constraints: {} increasing, {} decreasing, {} free\n",
        meta.constraint_summary.increasing, meta.constraint_summary.decreasing, meta.constraint_summary.unconstrained
    ));
    out.push_str(&format!(
        "Booster: {} | metric={} | trees={}\n",
        artifact.objective,
        artifact.eval_metric,
        artifact.booster.n_trees()
    ));

    out.push_str(&format_importance(&artifact.feature_names, &artifact.booster.feature_gain()));

    out.push('\n');
    out.push_str(&format_search(&meta.search));

    if let Some(evaluation) = &artifact.evaluation {
        out.push('\n');
        out.push_str(&format_evaluation(evaluation));
    }
    out
}

/// Features ranked by total split gain, as a share of all gain.
pub fn format_importance(names: &[String], gain: &[f64]) -> String {
    let total: f64 = gain.iter().sum();
    if !(total > 0.0) {
        return "Importance: no splits\n".to_string();
    }
    let mut ranked: Vec<(&String, f64)> = names.iter().zip(gain.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = String::from("Importance (gain share):\n");
    for (name, g) in ranked.into_iter().filter(|(_, g)| *g > 0.0).take(MAX_IMPORTANCE_ROWS) {
        out.push_str(&format!("- {name:<32} {:>6.1}%\n", 100.0 * g / total));
    }
    out
}

/// Trial table plus the chosen hyperparameters.
pub fn format_search(search: &SearchResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Search: {} trials, {} failed, best #{} score={:.6}\n",
        search.trials.len(),
        search.n_failed(),
        search.best_index,
        search.best_score
    ));
    for trial in &search.trials {
        let marker = if trial.index == search.best_index { "*" } else { " " };
        let status = trial.error.as_deref().map(|e| format!("  ({})", truncate(e, 48))).unwrap_or_default();
        out.push_str(&format!(
            "{marker} {:>3} {:<7} {:>14.6}{status}\n",
            trial.index,
            format!("{:?}", trial.phase).to_lowercase(),
            trial.score
        ));
    }
    out.push_str("Best hyperparameters:\n");
    for (name, value) in &search.best_x {
        out.push_str(&format!("- {name:<18} {value}\n"));
    }
    out
}

pub fn format_evaluation(report: &EvaluationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Evaluation ({}):\n", report.kind.display_name()));
    out.push_str(&format_metrics(&report.metrics));

    out.push_str("\nDistribution:\n");
    out.push_str(&format!("{:<8} {:>14} {:>14}\n", "bucket", "actual", "predicted"));
    for row in &report.distribution {
        out.push_str(&format!("{:<8} {:>14.3} {:>14.3}\n", row.label, row.actual, row.predicted));
    }

    if !report.by_year.is_empty() {
        out.push_str("\nBy year:\n");
        out.push_str(&format!(
            "{:<6} {:>8} {:>14} {:>14} {:>8}\n",
            "year", "rows", "actual", "predicted", "ratio"
        ));
        for row in &report.by_year {
            out.push_str(&format!(
                "{:<6} {:>8} {:>14.3} {:>14.3} {:>8}\n",
                row.year,
                row.count,
                row.actual_sum,
                row.predicted_sum,
                fmt_opt(row.ratio)
            ));
        }
    }
    out
}

fn format_metrics(m: &Metrics) -> String {
    let rows: [(&str, String); 11] = [
        ("pairs", format!("{} ({} dropped)", m.n_pairs, m.n_dropped)),
        ("deviance", format!("{:.6}", m.deviance)),
        ("rmse", format!("{:.6}", m.rmse)),
        ("mae", format!("{:.6}", m.mae)),
        ("mape %", fmt_opt(m.mape)),
        ("nrmse/mean", fmt_opt(m.nrmse_mean)),
        ("nrmse/range", fmt_opt(m.nrmse_range)),
        ("nrmse/std", fmt_opt(m.nrmse_std)),
        ("bias", format!("{:+.6}", m.bias)),
        ("correlation", fmt_opt(m.correlation)),
        ("mean ratio", fmt_opt(m.mean_ratio)),
    ];
    rows.iter()
        .map(|(name, value)| format!("  {name:<12} {value}\n"))
        .collect()
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "n/a".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
