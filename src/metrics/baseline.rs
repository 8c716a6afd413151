//! Calibrated baselines with EMA adaptation.
//!
//! Baselines are computed once as the per-metric arithmetic mean of the
//! first `calibration_target` snapshots, then drift with an exponential
//! moving average while adaptive mode is on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MetricSnapshot;

/// EMA smoothing factor for calibrated baselines.
pub const BASELINE_ALPHA: f64 = 0.1;

/// One metric's baseline, as exposed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    /// Metric id.
    pub metric: String,
    /// Baseline value.
    pub value: f64,
    /// Whether the value came from (or followed) calibration.
    pub calibrated: bool,
}

// ============================================================================
// Baselines
// ============================================================================

/// Per-metric baselines plus the one-shot calibration buffer.
#[derive(Debug, Clone)]
pub struct Baselines {
    values: BTreeMap<String, f64>,
    calibrated: bool,
    calibration_samples: Vec<MetricSnapshot>,
    calibration_target: usize,
}

impl Baselines {
    /// Create an uncalibrated set.
    #[must_use]
    pub fn new(calibration_target: usize) -> Self {
        Self {
            values: BTreeMap::new(),
            calibrated: false,
            calibration_samples: Vec::new(),
            calibration_target: calibration_target.max(1),
        }
    }

    /// Buffer a calibration sample; compute means once the target is reached.
    ///
    /// Returns `true` exactly once, on the sample that completes calibration.
    pub fn calibrate(&mut self, snapshot: &MetricSnapshot) -> bool {
        if self.calibrated {
            return false;
        }
        self.calibration_samples.push(snapshot.clone());
        if self.calibration_samples.len() < self.calibration_target {
            return false;
        }

        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for sample in &self.calibration_samples {
            for (metric, value) in sample.iter() {
                let entry = sums.entry(metric).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let means: BTreeMap<String, f64> = sums
            .into_iter()
            .map(|(metric, (sum, count))| (metric.to_string(), sum / count as f64))
            .collect();

        self.values = means;
        self.calibrated = true;
        self.calibration_samples = Vec::new();

        tracing::info!(
            metrics = self.values.len(),
            samples = self.calibration_target,
            "Performance baseline calibrated"
        );
        true
    }

    /// EMA update toward the snapshot. A metric seen for the first time
    /// starts at its own value.
    pub fn adapt(&mut self, snapshot: &MetricSnapshot) {
        if !self.calibrated {
            return;
        }
        for (metric, value) in snapshot.iter() {
            let baseline = self.values.get(metric).copied().unwrap_or(value);
            let next = BASELINE_ALPHA.mul_add(value, (1.0 - BASELINE_ALPHA) * baseline);
            self.values.insert(metric.to_string(), next);
        }
    }

    /// Baseline value for a metric.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    /// All baseline values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Baselines as entries.
    #[must_use]
    pub fn entries(&self) -> Vec<BaselineEntry> {
        self.values
            .iter()
            .map(|(metric, value)| BaselineEntry {
                metric: metric.clone(),
                value: *value,
                calibrated: self.calibrated,
            })
            .collect()
    }

    /// Whether calibration has completed.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Fraction of calibration samples collected.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn calibration_progress(&self) -> f64 {
        if self.calibrated {
            1.0
        } else {
            self.calibration_samples.len() as f64 / self.calibration_target as f64
        }
    }

    /// Forget everything, including calibration.
    pub fn reset(&mut self) {
        self.values.clear();
        self.calibrated = false;
        self.calibration_samples.clear();
    }

    /// Replace values with a persisted set.
    pub fn restore(&mut self, values: BTreeMap<String, f64>, calibrated: bool) {
        self.values = values;
        self.calibrated = calibrated;
        self.calibration_samples.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(pairs: &[(&str, f64)]) -> MetricSnapshot {
        pairs
            .iter()
            .fold(MetricSnapshot::new(0), |s, (k, v)| s.with(*k, *v))
    }

    #[test]
    fn test_calibration_uses_per_metric_counts() {
        let mut baselines = Baselines::new(3);
        baselines.calibrate(&snap(&[("fps", 60.0), ("memory_used", 100.0)]));
        baselines.calibrate(&snap(&[("fps", 30.0)]));
        assert!(baselines.calibrate(&snap(&[("fps", 90.0), ("memory_used", 200.0)])));

        assert_eq!(baselines.get("fps"), Some(60.0));
        assert_eq!(baselines.get("memory_used"), Some(150.0));
    }

    #[test]
    fn test_calibration_flips_once() {
        let mut baselines = Baselines::new(2);
        assert!(!baselines.calibrate(&snap(&[("x", 1.0)])));
        assert!(baselines.calibrate(&snap(&[("x", 3.0)])));
        assert!(!baselines.calibrate(&snap(&[("x", 100.0)])));
        assert_eq!(baselines.get("x"), Some(2.0));
    }

    #[test]
    fn test_progress() {
        let mut baselines = Baselines::new(4);
        assert_eq!(baselines.calibration_progress(), 0.0);
        baselines.calibrate(&snap(&[("x", 1.0)]));
        assert_eq!(baselines.calibration_progress(), 0.25);
    }

    #[test]
    fn test_adapt_before_calibration_is_noop() {
        let mut baselines = Baselines::new(2);
        baselines.adapt(&snap(&[("x", 1.0)]));
        assert!(baselines.values().is_empty());
    }

    #[test]
    fn test_adapt_new_metric_starts_at_value() {
        let mut baselines = Baselines::new(1);
        baselines.calibrate(&snap(&[("x", 10.0)]));
        baselines.adapt(&snap(&[("late", 42.0)]));
        assert_eq!(baselines.get("late"), Some(42.0));
    }

    #[test]
    fn test_entries_carry_flag() {
        let mut baselines = Baselines::new(1);
        baselines.calibrate(&snap(&[("x", 10.0)]));
        let entries = baselines.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].calibrated);
    }

    proptest! {
        #[test]
        fn calibrated_baseline_is_mean(values in prop::collection::vec(0.0f64..1e6, 1..50)) {
            let mut baselines = Baselines::new(values.len());
            for v in &values {
                baselines.calibrate(&snap(&[("m", *v)]));
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!(baselines.is_calibrated());
            prop_assert!((baselines.get("m").unwrap() - mean).abs() <= 1e-6 * mean.max(1.0));
        }
    }
}
