//! SVG line charts of the CPU and memory histories.

use crate::history::{MetricPoint, MetricsSnapshot};
use anyhow::{Context, Result};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `cpu.svg` and `memory.svg` into `output_dir`. A metric with no
/// points produces no chart.
pub fn render_charts<P: AsRef<Path>>(snapshot: &MetricsSnapshot, output_dir: P) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create chart directory {}", output_dir.display()))?;

    let mut generated = Vec::new();
    let charts = [
        ("cpu.svg", "CPU Usage", &snapshot.cpu_usage, &BLUE),
        ("memory.svg", "Memory Usage", &snapshot.memory_usage, &MAGENTA),
    ];
    for (file, title, points, color) in charts {
        if points.is_empty() {
            continue;
        }
        let path = output_dir.join(file);
        plot_percent(points, title, color, &path)
            .with_context(|| format!("Failed to render {}", path.display()))?;
        generated.push(path);
    }

    info!(dir = %output_dir.display(), charts = generated.len(), "Rendered charts");
    Ok(generated)
}

/// Seconds elapsed since the first point
fn to_elapsed_secs(points: &[MetricPoint]) -> Vec<f64> {
    let Some(first) = points.first() else {
        return vec![];
    };
    points
        .iter()
        .map(|p| (p.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0)
        .collect()
}

fn plot_percent(points: &[MetricPoint], title: &str, color: &RGBColor, path: &Path) -> Result<()> {
    let times = to_elapsed_secs(points);
    let max_time = times.last().copied().filter(|t| *t > 0.0).unwrap_or(1.0);
    // Values are not clamped on input, so let outliers stretch the axis
    let max_value = points
        .iter()
        .map(|p| p.value)
        .filter(|v| v.is_finite())
        .fold(100.0_f64, f64::max);

    let root = SVGBackend::new(path, (800, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..max_time, 0f64..max_value)?;

    chart
        .configure_mesh()
        .x_desc("Time (seconds)")
        .y_desc("Percent (%)")
        .draw()?;

    chart.draw_series(LineSeries::new(
        times
            .iter()
            .zip(points)
            .filter(|(_, p)| p.value.is_finite())
            .map(|(t, p)| (*t, p.value)),
        color.stroke_width(2),
    ))?;

    root.present()?;
    Ok(())
}
