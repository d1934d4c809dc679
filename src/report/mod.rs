//! Reporting: evaluation metrics, text summaries and SVG diagnostics.

pub mod format;
pub mod metrics;
pub mod plot;

pub use format::{format_evaluation, format_search, format_training_summary};
pub use metrics::{DistributionRow, EvaluationReport, Metrics, YearRow, evaluate};
pub use plot::write_diagnostic_plots;
