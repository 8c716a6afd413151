//! Numeric helpers shared by the analysis units.
//!
//! All functions treat their input as a population (variance divides by `n`).
//! Empty input yields `None` rather than `NaN`.

#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

/// Arithmetic mean.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population variance.
#[must_use]
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Median (mean of the two middle values for even counts).
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Linear-interpolated percentile, `p` in `[0, 100]`.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(percentile_sorted(&sorted(values), p))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let index = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    let weight = index - lower as f64;
    sorted[lower].mul_add(1.0 - weight, sorted[upper] * weight)
}

/// Pearson correlation coefficient. Zero denominator yields 0.
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return None;
    }
    let mx = mean(&xs[..n])?;
    let my = mean(&ys[..n])?;

    let (mut num, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mx;
        let dy = y - my;
        num += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denominator = (sxx * syy).sqrt();
    Some(if denominator == 0.0 {
        0.0
    } else {
        num / denominator
    })
}

/// OLS slope over `(index, value)` pairs. Fewer than 2 points or a zero
/// denominator yield 0.
#[must_use]
pub fn regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }
    let denominator = n.mul_add(sxx, -(sx * sx));
    if denominator == 0.0 {
        0.0
    } else {
        n.mul_add(sxy, -(sx * sy)) / denominator
    }
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Count per bin.
    pub bins: Vec<usize>,
    /// Width of each bin.
    pub bin_width: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

/// Build an equal-width histogram. A zero range puts everything in bin 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn histogram(values: &[f64], bins: usize) -> Option<Histogram> {
    if values.is_empty() || bins == 0 {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bin_width = (max - min) / bins as f64;

    let mut counts = vec![0; bins];
    for value in values {
        let index = if bin_width > 0.0 {
            (((value - min) / bin_width).floor() as usize).min(bins - 1)
        } else {
            0
        };
        counts[index] += 1;
    }

    Some(Histogram {
        bins: counts,
        bin_width,
        min,
        max,
    })
}

/// IQR outlier report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    /// Values outside the bounds, in input order.
    pub outliers: Vec<f64>,
    /// `Q1 - 1.5 IQR`.
    pub lower_bound: f64,
    /// `Q3 + 1.5 IQR`.
    pub upper_bound: f64,
    /// Interquartile range.
    pub iqr: f64,
}

/// Detect outliers with the 1.5 IQR rule.
#[must_use]
pub fn iqr_outliers(values: &[f64]) -> Option<OutlierReport> {
    let q1 = percentile(values, 25.0)?;
    let q3 = percentile(values, 75.0)?;
    let iqr = q3 - q1;
    let lower_bound = 1.5f64.mul_add(-iqr, q1);
    let upper_bound = 1.5f64.mul_add(iqr, q3);
    Some(OutlierReport {
        outliers: values
            .iter()
            .copied()
            .filter(|v| *v < lower_bound || *v > upper_bound)
            .collect(),
        lower_bound,
        upper_bound,
        iqr,
    })
}

/// Descriptive statistics for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptive {
    /// Sample count.
    pub count: usize,
    /// Mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Standard deviation.
    pub std_dev: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// 25th percentile.
    pub p25: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
}

impl Descriptive {
    /// Compute from raw values; `None` when empty.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted(values);
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            median: median(values)?,
            std_dev: std_dev(values)?,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p25: percentile_sorted(&sorted, 25.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
        })
    }
}
