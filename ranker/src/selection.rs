//! High-confidence cutoff on the total score distribution.

use anyhow::Result;
use ndarray::{s, Array1};
use ndarray_stats::QuantileExt;
use statrs::statistics::{Data, Median};

use crate::config::{SelectionConfig, SelectionMode};
use crate::models::GeneId;

/// Below this many genes the knee is not searched and the median is used instead.
const MIN_GENES_FOR_KNEE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub threshold: f64,
    pub method: String,
    /// Selected genes, highest total first.
    pub genes: Vec<GeneId>,
}

fn median(values: &[f64]) -> f64 {
    Data::new(values.to_vec()).median()
}

/// Discrete gradient with one-sided differences at the edges and central differences inside.
fn gradient(y: &Array1<f64>) -> Array1<f64> {
    let n = y.len();
    let mut g = Array1::zeros(n);
    if n < 2 {
        return g;
    }
    g[0] = y[1] - y[0];
    g[n - 1] = y[n - 1] - y[n - 2];
    for i in 1..n - 1 {
        g[i] = (y[i + 1] - y[i - 1]) / 2.0;
    }
    g
}

/// Score at the point of maximum curvature of the descending score curve.
pub fn knee_threshold(scores: &[f64], window: (f64, f64)) -> Result<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let n = sorted.len();
    if n < MIN_GENES_FOR_KNEE {
        return Ok(median(&sorted));
    }

    let curve = Array1::from(sorted);
    let lo = *curve.min()?;
    let hi = *curve.max()?;
    let norm = curve.mapv(|s| (s - lo) / (hi - lo + 1e-10));
    let curvature = gradient(&gradient(&norm)).mapv(f64::abs);

    let start = ((n as f64 * window.0) as usize).min(n - 1);
    let end = ((n as f64 * window.1) as usize).max(start + 1).min(n);
    let knee = start + curvature.slice(s![start..end]).argmax()?;
    Ok(curve[knee])
}

/// Linear-interpolated quantile of `scores`, `q` in `[0, 1]`.
pub fn quantile_threshold(scores: &[f64], q: f64) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Selects genes with `total >= threshold` from `(gene, total)` pairs sorted by total descending.
pub fn select_high_confidence(ranked: &[(GeneId, f64)], config: &SelectionConfig) -> Result<Selection> {
    if ranked.is_empty() {
        return Ok(Selection {
            threshold: f64::NAN,
            method: "no genes".to_string(),
            genes: Vec::new(),
        });
    }
    let scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();
    let (threshold, method) = match config.mode {
        SelectionMode::Knee => {
            let t = knee_threshold(&scores, config.knee_window)?;
            (t, format!("knee detection (threshold: {t:.1})"))
        }
        SelectionMode::Quantile => {
            let t = quantile_threshold(&scores, config.quantile);
            (
                t,
                format!("{:.0}th percentile (threshold: {t:.1})", config.quantile * 100.0),
            )
        }
    };
    let genes = ranked
        .iter()
        .filter(|(_, s)| *s >= threshold)
        .map(|(g, _)| g.clone())
        .collect();
    Ok(Selection { threshold, method, genes })
}
