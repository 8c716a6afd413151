//! Per-metric trend classification.
//!
//! Each tracked metric is bound to exactly one [`TrendAlgorithm`]. On every
//! tick the metric's rolling window is updated and re-classified as
//! stable, increasing or decreasing, with a confidence derived from the
//! window's coefficient of variation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::stats;
use crate::error::{isolate, AnalysisError};
use crate::metrics::MetricSnapshot;

/// Minimum samples before a trend is classified.
pub const MIN_TREND_SAMPLES: usize = 3;

/// Trend direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// No significant change.
    #[default]
    Stable,
    /// Rising.
    Increasing,
    /// Falling.
    Decreasing,
}

impl TrendDirection {
    fn from_change(change: f64, sensitivity: f64) -> Self {
        if change.abs() < sensitivity {
            Self::Stable
        } else if change > 0.0 {
            Self::Increasing
        } else {
            Self::Decreasing
        }
    }
}

/// Trend classification algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrendAlgorithm {
    /// Recent-half mean vs older-half mean.
    MovingAverage,
    /// OLS slope over sample index.
    LinearRegression,
    /// Latest value vs exponentially smoothed value.
    ExponentialSmoothing {
        /// Smoothing factor.
        alpha: f64,
    },
}

impl TrendAlgorithm {
    /// Short name used in logs and results.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MovingAverage => "moving_average",
            Self::LinearRegression => "linear_regression",
            Self::ExponentialSmoothing { .. } => "exponential_smoothing",
        }
    }

    /// Classify a window of values (oldest first).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InsufficientSamples`] below
    /// [`MIN_TREND_SAMPLES`].
    pub fn classify(
        &self,
        values: &[f64],
        window: usize,
        sensitivity: f64,
    ) -> Result<TrendDirection, AnalysisError> {
        if values.len() < MIN_TREND_SAMPLES {
            return Err(AnalysisError::InsufficientSamples {
                unit: self.name().to_string(),
                required: MIN_TREND_SAMPLES,
                available: values.len(),
            });
        }

        let direction = match self {
            Self::MovingAverage => {
                let half = window / 2;
                let len = values.len();
                let recent = &values[len.saturating_sub(half)..];
                let older = &values[len.saturating_sub(window)..len.saturating_sub(half)];
                match (stats::mean(recent), stats::mean(older)) {
                    (Some(recent_avg), Some(older_avg)) if older_avg != 0.0 => {
                        TrendDirection::from_change((recent_avg - older_avg) / older_avg, sensitivity)
                    }
                    _ => TrendDirection::Stable,
                }
            }
            Self::LinearRegression => {
                TrendDirection::from_change(stats::regression_slope(values), sensitivity)
            }
            Self::ExponentialSmoothing { alpha } => {
                let smoothed = values[1..]
                    .iter()
                    .fold(values[0], |acc, v| alpha.mul_add(*v, (1.0 - alpha) * acc));
                let current = values[values.len() - 1];
                if smoothed == 0.0 {
                    TrendDirection::Stable
                } else {
                    TrendDirection::from_change((current - smoothed) / smoothed, sensitivity)
                }
            }
        };
        Ok(direction)
    }
}

/// Confidence in `[0, 1]`: `1 - stddev / mean` of the window.
///
/// Zero below [`MIN_TREND_SAMPLES`]. A zero-mean window is fully confident
/// only when it has no variance.
#[must_use]
pub fn confidence(values: &[f64]) -> f64 {
    if values.len() < MIN_TREND_SAMPLES {
        return 0.0;
    }
    let (Some(mean), Some(sd)) = (stats::mean(values), stats::std_dev(values)) else {
        return 0.0;
    };
    if mean == 0.0 {
        return if sd == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - sd / mean).clamp(0.0, 1.0)
}

/// Binding of one metric to an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBinding {
    /// Metric id.
    pub metric: String,
    /// Algorithm.
    pub algorithm: TrendAlgorithm,
    /// Window size in samples.
    pub window: usize,
    /// Change below which the trend is stable.
    pub sensitivity: f64,
}

impl TrendBinding {
    /// Create a binding.
    #[must_use]
    pub fn new(
        metric: impl Into<String>,
        algorithm: TrendAlgorithm,
        window: usize,
        sensitivity: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            algorithm,
            window: window.max(1),
            sensitivity,
        }
    }

    /// Default bindings for fps, `memory_used`, `frame_variance` and
    /// `network_latency`.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("fps", TrendAlgorithm::MovingAverage, 30, 0.1),
            Self::new("memory_used", TrendAlgorithm::LinearRegression, 50, 0.05),
            Self::new(
                "frame_variance",
                TrendAlgorithm::ExponentialSmoothing { alpha: 0.3 },
                20,
                0.1,
            ),
            Self::new("network_latency", TrendAlgorithm::MovingAverage, 15, 0.2),
        ]
    }
}

/// Latest trend for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendState {
    /// Metric id.
    pub metric: String,
    /// Algorithm name.
    pub algorithm: String,
    /// Window size in samples.
    pub window: usize,
    /// Direction.
    pub direction: TrendDirection,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Samples in the window.
    pub samples: usize,
    /// Tick timestamp of the classification.
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
struct Tracker {
    binding: TrendBinding,
    history: VecDeque<(u64, f64)>,
}

impl Tracker {
    fn push(&mut self, timestamp: u64, value: f64, max_age: u64) {
        self.history.push_back((timestamp, value));
        while self.history.len() > self.binding.window {
            self.history.pop_front();
        }
        while self
            .history
            .front()
            .is_some_and(|(ts, _)| timestamp.saturating_sub(*ts) >= max_age)
        {
            self.history.pop_front();
        }
    }

    fn values(&self) -> Vec<f64> {
        self.history.iter().map(|(_, v)| *v).collect()
    }

    fn evaluate(&self, timestamp: u64) -> Result<TrendState, AnalysisError> {
        let values = self.values();
        let direction = match self.binding.algorithm.classify(
            &values,
            self.binding.window,
            self.binding.sensitivity,
        ) {
            Ok(direction) => direction,
            Err(AnalysisError::InsufficientSamples { .. }) => TrendDirection::Stable,
            Err(e) => return Err(e),
        };
        Ok(TrendState {
            metric: self.binding.metric.clone(),
            algorithm: self.binding.algorithm.name().to_string(),
            window: self.binding.window,
            direction,
            confidence: confidence(&values),
            samples: values.len(),
            timestamp,
        })
    }
}

// ============================================================================
// TrendAnalyzer
// ============================================================================

/// Rolling trend classification for the bound metrics.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    trackers: BTreeMap<String, Tracker>,
    trends: BTreeMap<String, TrendState>,
    max_age_ms: u64,
}

impl TrendAnalyzer {
    /// Create an analyzer from bindings. Later bindings for the same metric
    /// replace earlier ones.
    #[must_use]
    pub fn new(bindings: Vec<TrendBinding>, max_age_ms: u64) -> Self {
        let trackers = bindings
            .into_iter()
            .map(|binding| {
                (
                    binding.metric.clone(),
                    Tracker {
                        binding,
                        history: VecDeque::new(),
                    },
                )
            })
            .collect();
        Self {
            trackers,
            trends: BTreeMap::new(),
            max_age_ms: max_age_ms.max(1),
        }
    }

    /// Analyzer with [`TrendBinding::defaults`].
    #[must_use]
    pub fn with_defaults(max_age_ms: u64) -> Self {
        Self::new(TrendBinding::defaults(), max_age_ms)
    }

    /// Bind (or rebind) a metric. Its rolling history is cleared.
    pub fn bind(&mut self, binding: TrendBinding) {
        self.trends.remove(&binding.metric);
        self.trackers.insert(
            binding.metric.clone(),
            Tracker {
                binding,
                history: VecDeque::new(),
            },
        );
    }

    /// Change the maximum sample age.
    pub fn set_max_age(&mut self, max_age_ms: u64) {
        self.max_age_ms = max_age_ms.max(1);
    }

    /// Feed a snapshot. Metrics missing from the snapshot keep their last
    /// trend. A fault in one metric is logged and does not affect others.
    pub fn update(&mut self, snapshot: &MetricSnapshot) {
        let timestamp = snapshot.timestamp;
        let max_age = self.max_age_ms;
        for (metric, tracker) in &mut self.trackers {
            let Some(value) = snapshot.get(metric) else {
                continue;
            };
            tracker.push(timestamp, value, max_age);
            let unit = format!("trend:{metric}");
            if let Some(state) = isolate(&unit, || tracker.evaluate(timestamp)) {
                self.trends.insert(metric.clone(), state);
            }
        }
    }

    /// Rebuild rolling windows from history without age pruning.
    pub fn rebuild<'a>(&mut self, history: impl IntoIterator<Item = &'a MetricSnapshot>) {
        self.clear();
        for snapshot in history {
            self.update(snapshot);
        }
    }

    /// Latest trend for a metric.
    #[must_use]
    pub fn trend(&self, metric: &str) -> Option<&TrendState> {
        self.trends.get(metric)
    }

    /// All latest trends.
    #[must_use]
    pub const fn trends(&self) -> &BTreeMap<String, TrendState> {
        &self.trends
    }

    /// Bindings in metric order.
    pub fn bindings(&self) -> impl Iterator<Item = &TrendBinding> {
        self.trackers.values().map(|t| &t.binding)
    }

    /// Drop all rolling state; bindings are kept.
    pub fn clear(&mut self) {
        self.trends.clear();
        for tracker in self.trackers.values_mut() {
            tracker.history.clear();
        }
    }
}
