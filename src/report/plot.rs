use anyhow::{Context, Result, anyhow, bail};
use derive_builder::Builder;
use plotters::prelude::*;
use std::ops::Range;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::formats::table::Table;

/// Padding added on each side of the data range, as a fraction of the range
const RANGE_PADDING: f64 = 0.05;

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct PlotOptions {
    /// SVG file to write
    pub output: PathBuf,
    #[builder(default)]
    pub title: String,
    #[builder(default)]
    pub x_label: String,
    #[builder(default)]
    pub y_label: String,
    #[builder(default = "(1024, 768)")]
    pub size: (u32, u32),
    #[builder(default = "3")]
    pub point_size: u32,
}

/// Render `x` against `y` as an SVG scatter plot
pub fn scatter_plot(x: &[f64], y: &[f64], options: &PlotOptions) -> Result<PathBuf> {
    if x.len() != y.len() {
        bail!(
            "Scatter plot needs as many x values as y values ({} vs {})",
            x.len(),
            y.len()
        );
    }

    if let Some(parent) = options.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let x_range = padded_range(x);
    let y_range = padded_range(y);

    {
        let root = SVGBackend::new(&options.output, options.size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc(options.x_label.as_str())
            .y_desc(options.y_label.as_str())
            .draw()?;

        let size = options.point_size;
        chart.draw_series(
            x.iter()
                .zip(y)
                .map(|(&px, &py)| Circle::new((px, py), size, BLUE.filled())),
        )?;

        root.present()
            .with_context(|| format!("Failed to write plot {}", options.output.display()))?;
    }

    info!(
        "Scatter plot of {} points saved to {}",
        x.len(),
        options.output.display()
    );
    Ok(options.output.clone())
}

/// Numeric (x, y) pairs of two columns. Rows where either cell is null or
/// not numeric are skipped.
pub fn numeric_pairs(table: &Table, x: &str, y: &str) -> Result<Vec<(f64, f64)>> {
    let x_col = table
        .column(x)
        .ok_or_else(|| anyhow!("Unknown column '{}'", x))?;
    let y_col = table
        .column(y)
        .ok_or_else(|| anyhow!("Unknown column '{}'", y))?;

    for col in [x_col, y_col] {
        if !col.kind().is_numeric() {
            warn!(
                "Column '{}' is {}, only numeric cells are plotted",
                col.name(),
                col.kind().name()
            );
        }
    }

    Ok(x_col
        .values()
        .zip(y_col.values())
        .filter_map(|(vx, vy)| Some((vx.as_f64()?, vy.as_f64()?)))
        .collect())
}

/// Scatter plot of two columns of `table`
pub fn scatter_columns(table: &Table, x: &str, y: &str, options: &PlotOptions) -> Result<PathBuf> {
    let pairs = numeric_pairs(table, x, y)?;
    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    scatter_plot(&xs, &ys, options)
}

/// Data range with padding; degenerate ranges are widened around the value
fn padded_range(values: &[f64]) -> Range<f64> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if min > max {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = (max - min) * RANGE_PADDING;
    (min - pad)..(max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::table::TableBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(&[]), 0.0..1.0);
        assert_eq!(padded_range(&[2.0, 2.0]), 1.5..2.5);
        let r = padded_range(&[0.0, 10.0, f64::NAN]);
        assert!((r.start + 0.5).abs() < 1e-9);
        assert!((r.end - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_pairs_skip_null_and_text() {
        let mut builder = TableBuilder::new(vec!["ra".into(), "dec".into()]);
        builder.push_row(vec!["10.5".into(), "-30".into()]);
        builder.push_row(vec!["".into(), "-31".into()]);
        builder.push_row(vec!["11".into(), "-32.5".into()]);
        let table = builder.finish();

        let pairs = numeric_pairs(&table, "ra", "dec").unwrap();
        assert_eq!(pairs, vec![(10.5, -30.0), (11.0, -32.5)]);

        assert!(numeric_pairs(&table, "ra", "airmass").is_err());
    }

    #[test]
    fn test_scatter_plot_writes_svg() {
        let temp_dir = TempDir::new().unwrap();
        let options = PlotOptionsBuilder::default()
            .output(temp_dir.path().join("plots/ra_dec.svg"))
            .title("RA vs Dec")
            .x_label("ra")
            .y_label("dec")
            .build()
            .unwrap();

        let path = scatter_plot(&[1.0, 2.0, 3.0], &[3.0, 1.0, 2.0], &options).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let options = PlotOptionsBuilder::default()
            .output(temp_dir.path().join("bad.svg"))
            .build()
            .unwrap();
        assert!(scatter_plot(&[1.0], &[], &options).is_err());
    }
}
