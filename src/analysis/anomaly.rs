//! Baseline-deviation anomaly scoring.
//!
//! Independent of thresholds: a metric is anomalous when its weighted
//! relative deviation from the calibrated baseline exceeds the configured
//! sensitivity.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::Severity;
use crate::error::isolate;
use crate::metrics::{Baselines, MetricSnapshot};

/// Anomaly history cap.
pub const ANOMALY_HISTORY_CAP: usize = 100;

/// A recorded anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Metric id.
    pub metric: String,
    /// Observed value.
    pub value: f64,
    /// Baseline at detection.
    pub baseline: f64,
    /// Score in `[0, 1]`.
    pub score: f64,
    /// Severity from the score.
    pub severity: Severity,
}

/// Per-metric weight applied to the relative deviation.
#[must_use]
pub fn metric_weight(metric: &str) -> f64 {
    match metric {
        "fps" | "frame_time" => 2.0,
        "input_lag" => 1.8,
        "memory_used" => 1.5,
        "network_latency" => 1.2,
        _ => 1.0,
    }
}

/// `min(1, |value - baseline| / baseline * weight)`. Zero baseline scores 0.
#[must_use]
pub fn anomaly_score(metric: &str, value: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    let deviation = ((value - baseline) / baseline).abs();
    (deviation * metric_weight(metric)).min(1.0)
}

/// Scores snapshots against baselines and keeps the anomaly history.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    sensitivity: f64,
    anomalies: VecDeque<Anomaly>,
}

impl AnomalyDetector {
    /// Create a detector.
    #[must_use]
    pub const fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            anomalies: VecDeque::new(),
        }
    }

    /// Change the sensitivity.
    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sensitivity;
    }

    /// Score every metric with a known non-zero baseline. Does nothing
    /// until the baselines are calibrated. Returns the new anomalies.
    pub fn detect(&mut self, snapshot: &MetricSnapshot, baselines: &Baselines) -> Vec<Anomaly> {
        if !baselines.is_calibrated() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for (metric, value) in snapshot.iter() {
            let Some(baseline) = baselines.get(metric).filter(|b| *b != 0.0) else {
                continue;
            };
            let unit = format!("anomaly:{metric}");
            let Some(score) = isolate(&unit, || Ok(anomaly_score(metric, value, baseline))) else {
                continue;
            };
            if score <= self.sensitivity {
                continue;
            }

            let anomaly = Anomaly {
                timestamp: snapshot.timestamp,
                metric: metric.to_string(),
                value,
                baseline,
                score,
                severity: Severity::from_score(score),
            };
            tracing::info!(
                metric,
                score = format_args!("{score:.2}"),
                severity = %anomaly.severity,
                "Anomaly detected"
            );
            self.anomalies.push_back(anomaly.clone());
            while self.anomalies.len() > ANOMALY_HISTORY_CAP {
                self.anomalies.pop_front();
            }
            found.push(anomaly);
        }
        found
    }

    /// Anomaly history, oldest first.
    #[must_use]
    pub const fn anomalies(&self) -> &VecDeque<Anomaly> {
        &self.anomalies
    }

    /// The last `n` anomalies, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Anomaly> {
        let skip = self.anomalies.len().saturating_sub(n);
        self.anomalies.iter().skip(skip).cloned().collect()
    }

    /// Replace the history.
    pub fn restore(&mut self, anomalies: Vec<Anomaly>) {
        self.anomalies = anomalies.into();
        while self.anomalies.len() > ANOMALY_HISTORY_CAP {
            self.anomalies.pop_front();
        }
    }

    /// Drop the history.
    pub fn clear(&mut self) {
        self.anomalies.clear();
    }
}
