//! Optional diagnostic plots and a short text report on how the evidence layers relate.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::models::{EvidenceLayer, EvidenceTable, GeneId};
use crate::output::run_manager::ManifestEntry;

const PLOT_WIDTH: u32 = 800;
const PLOT_HEIGHT: u32 = 600;
const PLOT_MARGIN: i32 = 25;
const FONT_SIZE_TITLE: u32 = 20;
const HISTOGRAM_BINS: usize = 30;
const REPORT_GENES: usize = 20;

/// Per-gene values the diagnostics work on, in ranked order.
#[derive(Debug, Clone, PartialEq)]
pub struct QcRow {
    pub go: f64,
    pub domain: f64,
    pub total: f64,
    pub has_domain: bool,
    pub has_keyword: bool,
}

pub fn qc_rows(table: &EvidenceTable, ranked: &[(GeneId, f64)]) -> Vec<QcRow> {
    ranked
        .iter()
        .filter_map(|(gene, total)| {
            let record = table.get(gene)?;
            Some(QcRow {
                go: record.scores.get(EvidenceLayer::Go).capped,
                domain: record.scores.get(EvidenceLayer::Domain).capped,
                total: *total,
                has_domain: !record.evidence.domain.matched.is_empty(),
                has_keyword: !record.evidence.keyword_hits.is_empty(),
            })
        })
        .collect()
}

/// Pearson correlation; NaN when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return f64::NAN;
    }
    let cov = x.iter().covariance(y.iter());
    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if sx == 0.0 || sy == 0.0 {
        return f64::NAN;
    }
    cov / (sx * sy)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Text report: evidence share in the top genes, bottom-gene means and layer correlations.
/// `rows` must be in ranked order (highest total first).
pub fn qc_summary(rows: &[QcRow]) -> String {
    let top = &rows[..rows.len().min(REPORT_GENES)];
    let bottom = &rows[rows.len().saturating_sub(REPORT_GENES)..];
    let top_domain = top.iter().filter(|r| r.has_domain).count();
    let top_keyword = top.iter().filter(|r| r.has_keyword).count();
    let mean_of = |values: Vec<f64>| if values.is_empty() { 0.0 } else { values.mean() };

    let go: Vec<f64> = rows.iter().map(|r| r.go).collect();
    let domain: Vec<f64> = rows.iter().map(|r| r.domain).collect();
    let total: Vec<f64> = rows.iter().map(|r| r.total).collect();

    let mut text = String::new();
    text.push_str("QC DIAGNOSTIC REPORT\n");
    text.push_str(&"=".repeat(80));
    text.push_str("\n\n");
    text.push_str(&format!("Top {} genes:\n", top.len()));
    text.push_str(&format!(
        "  With expected domains: {}/{} ({:.0}%)\n",
        top_domain,
        top.len(),
        percent(top_domain, top.len())
    ));
    text.push_str(&format!(
        "  With keyword hits: {}/{} ({:.0}%)\n\n",
        top_keyword,
        top.len(),
        percent(top_keyword, top.len())
    ));
    text.push_str(&format!("Bottom {} genes:\n", bottom.len()));
    text.push_str(&format!(
        "  Mean GO score: {:.1}\n",
        mean_of(bottom.iter().map(|r| r.go).collect())
    ));
    text.push_str(&format!(
        "  Mean total score: {:.1}\n\n",
        mean_of(bottom.iter().map(|r| r.total).collect())
    ));
    text.push_str("Correlation analysis:\n");
    text.push_str(&format!("  Total vs GO: r={:.3}\n", pearson(&total, &go)));
    text.push_str(&format!("  GO vs Domain: r={:.3}\n", pearson(&go, &domain)));
    text
}

fn axis_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad)..(hi + pad)
}

fn plot_scatter(
    output_path: &Path,
    points: &[(f64, f64)],
    caption: &str,
    x_desc: &str,
    y_desc: &str,
) -> Result<(), Box<dyn Error>> {
    let root_area = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .margin(PLOT_MARGIN)
        .caption(caption, ("sans-serif", FONT_SIZE_TITLE))
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(
            axis_range(points.iter().map(|p| p.0)),
            axis_range(points.iter().map(|p| p.1)),
        )?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 3, BLUE.mix(0.5).filled())),
    )?;

    root_area.present()?;
    Ok(())
}

fn plot_histogram(output_path: &Path, values: &[f64], caption: &str) -> Result<(), Box<dyn Error>> {
    let range = axis_range(values.iter().copied());
    let width = (range.end - range.start) / HISTOGRAM_BINS as f64;
    let mut counts = vec![0u32; HISTOGRAM_BINS];
    for v in values {
        let bin = (((v - range.start) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);

    let root_area =
        BitMapBackend::new(output_path, (PLOT_WIDTH + 200, PLOT_HEIGHT)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .margin(PLOT_MARGIN)
        .caption(caption, ("sans-serif", FONT_SIZE_TITLE))
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(range.clone(), 0u32..max_count + 1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Total Score")
        .y_desc("Gene Count")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
        let x0 = range.start + i as f64 * width;
        Rectangle::new([(x0, 0), (x0 + width, count)], BLUE.mix(0.6).filled())
    }))?;

    root_area.present()?;
    Ok(())
}

/// Writes the scatter plots, the score histogram and the text summary into `qc_dir`.
/// A plot that fails to render is logged and skipped.
pub fn write_qc(
    qc_dir: &Path,
    prefix: &str,
    table: &EvidenceTable,
    ranked: &[(GeneId, f64)],
) -> Result<Vec<ManifestEntry>> {
    fs::create_dir_all(qc_dir).with_context(|| format!("failed to create {}", qc_dir.display()))?;
    let rows = qc_rows(table, ranked);
    let path = |name: &str| -> PathBuf { qc_dir.join(format!("{prefix}_{name}")) };
    let mut entries = Vec::new();

    let go_vs_domain = path("go_vs_domain.png");
    let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.go, r.domain)).collect();
    match plot_scatter(
        &go_vs_domain,
        &points,
        "GO vs Domain Evidence",
        "GO Score (capped)",
        "Domain Score (capped)",
    ) {
        Ok(()) => entries.push(ManifestEntry::new(go_vs_domain, "QC: GO vs domain scores", None)),
        Err(e) => warn!("Skipping GO vs domain plot: {}", e),
    }

    let total_vs_go = path("total_vs_go.png");
    let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.total, r.go)).collect();
    match plot_scatter(
        &total_vs_go,
        &points,
        "Total Score vs GO Evidence",
        "Total Score",
        "GO Score (capped)",
    ) {
        Ok(()) => entries.push(ManifestEntry::new(total_vs_go, "QC: total vs GO scores", None)),
        Err(e) => warn!("Skipping total vs GO plot: {}", e),
    }

    let distribution = path("score_distribution.png");
    let totals: Vec<f64> = rows.iter().map(|r| r.total).collect();
    match plot_histogram(&distribution, &totals, "Total Score Distribution") {
        Ok(()) => entries.push(ManifestEntry::new(distribution, "QC: total score histogram", None)),
        Err(e) => warn!("Skipping score distribution plot: {}", e),
    }

    let summary = path("qc_summary.txt");
    fs::write(&summary, qc_summary(&rows))
        .with_context(|| format!("failed to write {}", summary.display()))?;
    entries.push(ManifestEntry::new(summary, "QC diagnostic report", None));

    info!("QC diagnostics written to {}", qc_dir.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn row(go: f64, domain: f64, total: f64, has_domain: bool) -> QcRow {
        QcRow { go, domain, total, has_domain, has_keyword: false }
    }

    #[test]
    fn pearson_of_linear_data() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(pearson(&x, &[2.0, 4.0, 6.0, 8.0]), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pearson(&x, &[8.0, 6.0, 4.0, 2.0]), -1.0, epsilon = 1e-12);
        assert!(pearson(&x, &[1.0, 1.0, 1.0, 1.0]).is_nan());
    }

    #[test]
    fn summary_uses_available_genes() {
        let rows = vec![
            row(6.0, 4.0, 12.0, true),
            row(6.0, 0.0, 8.0, false),
            row(2.0, 0.0, 2.0, false),
        ];
        let text = qc_summary(&rows);
        assert!(text.contains("Top 3 genes:"));
        assert!(text.contains("With expected domains: 1/3 (33%)"));
        assert!(text.contains("Mean total score: 7.3"));
        assert!(text.contains("Total vs GO: r="));
    }

    #[test]
    fn empty_ranking_still_reports() {
        let text = qc_summary(&[]);
        assert!(text.contains("Top 0 genes:"));
    }
}
