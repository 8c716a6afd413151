//! Metric snapshots and collection.
//!
//! This module provides:
//! - [`MetricSnapshot`]: a timestamped map of finite numeric metrics
//! - [`MetricsCollector`]: bounded analysis history plus calibrated baselines
//!
//! # Example
//!
//! ```
//! use perf_telemetry::metrics::{MetricSnapshot, MetricsCollector};
//!
//! let mut collector = MetricsCollector::new(1000, 2);
//! collector.ingest(&MetricSnapshot::new(1_000).with("fps", 58.0), true);
//! collector.ingest(&MetricSnapshot::new(2_000).with("fps", 62.0), true);
//!
//! assert!(collector.is_calibrated());
//! assert_eq!(collector.baseline("fps"), Some(60.0));
//! assert_eq!(collector.recent(2_500, 1_000).len(), 1);
//! ```

mod baseline;

pub use baseline::{BaselineEntry, Baselines, BASELINE_ALPHA};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::AnalysisError;

/// A timestamped set of named numeric metrics.
///
/// Only finite values are ever stored; anything else is dropped on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.insert(metric, value);
        self
    }

    /// Build a snapshot from a JSON object, dropping non-numeric entries.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidSnapshot`] if `value` is not an
    /// object, and [`AnalysisError::EmptySnapshot`] if it holds no finite
    /// number.
    pub fn from_json(timestamp: u64, value: &serde_json::Value) -> Result<Self, AnalysisError> {
        let object = value
            .as_object()
            .ok_or_else(|| AnalysisError::InvalidSnapshot {
                message: format!("expected an object, got {}", json_kind(value)),
            })?;

        let mut snapshot = Self::new(timestamp);
        for (metric, raw) in object {
            if let Some(number) = raw.as_f64() {
                snapshot.insert(metric.clone(), number);
            }
        }
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Insert a value. Returns `false` if the value was not finite.
    pub fn insert(&mut self, metric: impl Into<String>, value: f64) -> bool {
        if value.is_finite() {
            self.values.insert(metric.into(), value);
            true
        } else {
            false
        }
    }

    /// Look up a metric.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    /// Iterate over `(metric, value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Borrow the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Copy of this snapshot holding only finite values.
    ///
    /// Deserialized snapshots bypass [`insert`](Self::insert), so consumers
    /// run input through this before using it.
    #[must_use]
    pub fn finite(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            values: self
                .values
                .iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot has no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay `other` onto this snapshot; its keys win.
    pub fn merge(&mut self, other: &Self) {
        for (metric, value) in other.iter() {
            self.insert(metric, value);
        }
    }

    /// Keep only metrics accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.values.retain(|metric, _| keep(metric));
    }

    /// Reject snapshots without any usable metric.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::EmptySnapshot`] when no finite value is present.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.values.values().any(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(AnalysisError::EmptySnapshot)
        }
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ============================================================================
// MetricsCollector
// ============================================================================

/// Bounded analysis history plus baselines.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    history: VecDeque<MetricSnapshot>,
    history_cap: usize,
    baselines: Baselines,
}

impl MetricsCollector {
    /// Create a collector.
    #[must_use]
    pub fn new(history_cap: usize, calibration_target: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(history_cap.min(4096)),
            history_cap: history_cap.max(1),
            baselines: Baselines::new(calibration_target),
        }
    }

    /// Append a snapshot to the history, evicting the oldest past the cap.
    pub fn record(&mut self, snapshot: &MetricSnapshot) {
        self.history.push_back(snapshot.clone());
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// Feed a snapshot to calibration. Returns `true` when this sample
    /// completed calibration.
    pub fn calibrate(&mut self, snapshot: &MetricSnapshot) -> bool {
        self.baselines.calibrate(snapshot)
    }

    /// Smooth calibrated baselines toward the snapshot.
    pub fn adapt(&mut self, snapshot: &MetricSnapshot) {
        self.baselines.adapt(snapshot);
    }

    /// Record, then calibrate or adapt.
    ///
    /// Returns `true` when this call completed calibration.
    pub fn ingest(&mut self, snapshot: &MetricSnapshot, adaptive: bool) -> bool {
        self.record(snapshot);
        if !self.baselines.is_calibrated() {
            return self.calibrate(snapshot);
        }
        if adaptive {
            self.adapt(snapshot);
        }
        false
    }

    /// All history points with `now - timestamp < window`.
    #[must_use]
    pub fn recent(&self, now: u64, window: u64) -> Vec<&MetricSnapshot> {
        self.history
            .iter()
            .filter(|point| now.saturating_sub(point.timestamp) < window)
            .collect()
    }

    /// Full history, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<MetricSnapshot> {
        &self.history
    }

    /// Baselines.
    #[must_use]
    pub const fn baselines(&self) -> &Baselines {
        &self.baselines
    }

    /// Baseline for one metric.
    #[must_use]
    pub fn baseline(&self, metric: &str) -> Option<f64> {
        self.baselines.get(metric)
    }

    /// Whether calibration has completed.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.baselines.is_calibrated()
    }

    /// Calibration progress in `[0, 1]`.
    #[must_use]
    pub fn calibration_progress(&self) -> f64 {
        self.baselines.calibration_progress()
    }

    /// Change the history cap, trimming if needed.
    pub fn set_history_cap(&mut self, cap: usize) {
        self.history_cap = cap.max(1);
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// Drop all history and baselines.
    pub fn reset(&mut self) {
        self.history.clear();
        self.baselines.reset();
    }

    /// Restore persisted history and baselines.
    pub fn restore(
        &mut self,
        history: Vec<MetricSnapshot>,
        baselines: BTreeMap<String, f64>,
        calibrated: bool,
    ) {
        self.history = history.into();
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
        self.baselines.restore(baselines, calibrated);
    }
}
