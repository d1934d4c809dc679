//! SVG diagnostic charts.
//!
//! Three files are written into the output directory:
//!
//! - `predicted_vs_actual.svg`: scatter against the identity line
//! - `distribution.svg`: the evaluation distribution table as paired bars
//! - `residuals.svg`: `actual - predicted` against predicted
//!
//! Rendering uses plotters' SVG backend only, so no native font or image
//! libraries are involved.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::error::AppError;
use crate::report::metrics::{DistributionRow, EvaluationReport};

pub const PREDICTED_VS_ACTUAL_FILE: &str = "predicted_vs_actual.svg";
pub const DISTRIBUTION_FILE: &str = "distribution.svg";
pub const RESIDUALS_FILE: &str = "residuals.svg";

const SIZE: (u32, u32) = (800, 600);
const ACTUAL_COLOR: RGBColor = RGBColor(31, 119, 180);
const PREDICTED_COLOR: RGBColor = RGBColor(255, 127, 14);

type DrawResult = Result<(), Box<dyn Error>>;

/// Render all diagnostics; returns the written paths.
pub fn write_diagnostic_plots(
    dir: &Path,
    actual: &[f64],
    predicted: &[f64],
    report: &EvaluationReport,
) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create plot directory '{}': {e}", dir.display())))?;

    let pairs: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a.is_finite() && p.is_finite())
        .map(|(&a, &p)| (a, p))
        .collect();
    if pairs.is_empty() {
        return Err(AppError::data("No finite (actual, predicted) pairs to plot."));
    }

    let scale = report.kind.display_name();
    let targets = [
        (PREDICTED_VS_ACTUAL_FILE, draw_predicted_vs_actual as fn(&Path, &[(f64, f64)], &str) -> DrawResult),
        (RESIDUALS_FILE, draw_residuals),
    ];

    let mut written = Vec::with_capacity(3);
    for (name, draw) in targets {
        let path = dir.join(name);
        draw(&path, &pairs, scale).map_err(|e| plot_error(&path, e.as_ref()))?;
        written.push(path);
    }

    let path = dir.join(DISTRIBUTION_FILE);
    draw_distribution(&path, &report.distribution, scale).map_err(|e| plot_error(&path, e.as_ref()))?;
    written.push(path);

    Ok(written)
}

fn plot_error(path: &Path, e: &dyn Error) -> AppError {
    AppError::io(format!("Failed to render '{}': {e}", path.display()))
}

/// Padded `[min, max]` of `values`.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    (lo - pad, hi + pad)
}

fn draw_predicted_vs_actual(path: &Path, pairs: &[(f64, f64)], scale: &str) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (lo, hi) = padded_range(pairs.iter().flat_map(|&(a, p)| [a, p]));
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Predicted vs actual ({scale})"), ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("actual")
        .y_desc("predicted")
        .draw()?;

    chart.draw_series(LineSeries::new([(lo, lo), (hi, hi)], &BLACK.mix(0.6)))?;
    chart.draw_series(
        pairs
            .iter()
            .map(|&(a, p)| Circle::new((a, p), 2, ACTUAL_COLOR.mix(0.5).filled())),
    )?;

    root.present()?;
    Ok(())
}

fn draw_residuals(path: &Path, pairs: &[(f64, f64)], scale: &str) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(f64, f64)> = pairs.iter().map(|&(a, p)| (p, a - p)).collect();
    let (x0, x1) = padded_range(points.iter().map(|&(x, _)| x));
    let (y0, y1) = padded_range(points.iter().map(|&(_, r)| r).chain([0.0]));

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Residuals ({scale})"), ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc("predicted")
        .y_desc("actual - predicted")
        .draw()?;

    chart.draw_series(LineSeries::new([(x0, 0.0), (x1, 0.0)], &BLACK.mix(0.6)))?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, r)| Circle::new((x, r), 2, PREDICTED_COLOR.mix(0.5).filled())),
    )?;

    root.present()?;
    Ok(())
}

fn draw_distribution(path: &Path, rows: &[DistributionRow], scale: &str) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = rows.len().max(1) as f64;
    let (_, top) = padded_range(rows.iter().flat_map(|r| [r.actual, r.predicted]).chain([0.0]));
    let (bottom, _) = padded_range(rows.iter().flat_map(|r| [r.actual, r.predicted]).chain([0.0]));

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Distribution ({scale})"), ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..n, bottom.min(0.0)..top)?;

    let labels: Vec<String> = rows.iter().map(|r| r.label.clone()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rows.len().max(1))
        .x_label_formatter(&|x| {
            let i = x.floor() as usize;
            labels.get(i).cloned().unwrap_or_default()
        })
        .y_desc("value")
        .draw()?;

    chart.draw_series(rows.iter().enumerate().map(|(i, r)| {
        let x = i as f64;
        Rectangle::new([(x + 0.1, 0.0), (x + 0.5, r.actual)], ACTUAL_COLOR.filled())
    }))?
    .label("actual")
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], ACTUAL_COLOR.filled()));

    chart.draw_series(rows.iter().enumerate().map(|(i, r)| {
        let x = i as f64;
        Rectangle::new([(x + 0.5, 0.0), (x + 0.9, r.predicted)], PREDICTED_COLOR.filled())
    }))?
    .label("predicted")
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], PREDICTED_COLOR.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelKind;
    use crate::report::metrics::evaluate;

    #[test]
    fn writes_three_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let actual = [0.0, 1.0, 2.0, 0.0, 3.0];
        let predicted = [0.3, 0.8, 1.5, 0.2, 2.2];
        let report = evaluate(ModelKind::Frequency, &actual, &predicted, None).unwrap();

        let written = write_diagnostic_plots(dir.path(), &actual, &predicted, &report).unwrap();
        assert_eq!(written.len(), 3);
        for path in &written {
            let text = fs::read_to_string(path).unwrap();
            assert!(text.contains("<svg"), "{}", path.display());
        }
    }

    #[test]
    fn padded_range_handles_constant_input() {
        let (lo, hi) = padded_range([2.0, 2.0].into_iter());
        assert!(lo < 2.0 && hi > 2.0);
    }
}
