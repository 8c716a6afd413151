//! Static and adaptive thresholds with violation tracking.
//!
//! Every metric with a threshold keeps a static set (seeded at init) and a
//! dynamic copy. While adaptive mode is on, the dynamic copy is smoothed
//! toward an ideal set computed from the metric's recent percentiles.
//! Violations are always checked against the dynamic set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::stats::Descriptive;
use super::Severity;
use crate::metrics::MetricSnapshot;

/// Per-metric value history cap.
pub const VALUE_HISTORY_CAP: usize = 1000;

/// Violation history cap.
pub const VIOLATION_HISTORY_CAP: usize = 1000;

/// Samples required before thresholds adapt.
pub const MIN_ADAPT_SAMPLES: usize = 10;

/// Window for the rolling violation rate.
pub const VIOLATION_RATE_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Deviation at which a warning is escalated to high severity.
pub const HIGH_DEVIATION: f64 = 0.5;

/// Which side of the target is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Lower values are worse (fps).
    LowerIsWorse,
    /// Higher values are worse (latency, memory, frame time).
    HigherIsWorse,
}

/// Threshold values for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Optional floor for the target.
    pub min: Option<f64>,
    /// Desired value.
    pub target: f64,
    /// Optional ceiling.
    pub max: Option<f64>,
    /// Warning boundary.
    pub warning: f64,
    /// Critical boundary.
    pub critical: f64,
    /// Directionality.
    pub direction: ThresholdDirection,
}

impl ThresholdSet {
    /// Lower-is-worse set.
    #[must_use]
    pub const fn lower_is_worse(target: f64, warning: f64, critical: f64) -> Self {
        Self {
            min: None,
            target,
            max: None,
            warning,
            critical,
            direction: ThresholdDirection::LowerIsWorse,
        }
    }

    /// Higher-is-worse set.
    #[must_use]
    pub const fn higher_is_worse(target: f64, warning: f64, critical: f64) -> Self {
        Self {
            min: None,
            target,
            max: None,
            warning,
            critical,
            direction: ThresholdDirection::HigherIsWorse,
        }
    }

    /// Builder for the bounds.
    #[must_use]
    pub const fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Whether target, warning and critical are strictly ordered for the
    /// direction.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        match self.direction {
            ThresholdDirection::LowerIsWorse => {
                self.critical < self.warning && self.warning < self.target
            }
            ThresholdDirection::HigherIsWorse => {
                self.critical > self.warning && self.warning > self.target
            }
        }
    }

    /// Push a warning or critical that collapsed onto its neighbour 10%
    /// past it.
    fn restore_order(&mut self) {
        match self.direction {
            ThresholdDirection::LowerIsWorse => {
                if self.warning >= self.target {
                    self.warning = push_past(self.target, false);
                }
                if self.critical >= self.warning {
                    self.critical = push_past(self.warning, false);
                }
            }
            ThresholdDirection::HigherIsWorse => {
                if self.warning <= self.target {
                    self.warning = push_past(self.target, true);
                }
                if self.critical <= self.warning {
                    self.critical = push_past(self.warning, true);
                }
            }
        }
    }

    /// Threshold moved toward the target by `sensitivity`.
    fn effective(&self, threshold: f64, sensitivity: f64) -> f64 {
        self.target + (threshold - self.target) / sensitivity
    }

    fn blend_toward(&mut self, ideal: &Self, rate: f64) {
        self.target = rate.mul_add(ideal.target, (1.0 - rate) * self.target);
        self.warning = rate.mul_add(ideal.warning, (1.0 - rate) * self.warning);
        self.critical = rate.mul_add(ideal.critical, (1.0 - rate) * self.critical);
    }
}

fn push_past(anchor: f64, upward: bool) -> f64 {
    let step = if anchor == 0.0 { 0.1 } else { anchor.abs() * 0.1 };
    if upward {
        anchor + step
    } else {
        anchor - step
    }
}

/// Default static thresholds.
#[must_use]
pub fn default_thresholds() -> BTreeMap<String, ThresholdSet> {
    BTreeMap::from([
        (
            "fps".to_string(),
            ThresholdSet::lower_is_worse(60.0, 45.0, 20.0).with_bounds(Some(30.0), None),
        ),
        (
            "frame_time".to_string(),
            ThresholdSet::higher_is_worse(16.67, 33.33, 50.0).with_bounds(None, Some(100.0)),
        ),
        (
            "memory_used".to_string(),
            ThresholdSet::higher_is_worse(512.0, 1024.0, 2048.0).with_bounds(None, Some(4096.0)),
        ),
        (
            "network_latency".to_string(),
            ThresholdSet::higher_is_worse(50.0, 150.0, 300.0),
        ),
        (
            "input_lag".to_string(),
            ThresholdSet::higher_is_worse(16.0, 50.0, 100.0),
        ),
    ])
}

/// Ideal set for a metric given its recent stats.
///
/// Metrics without an adaptation rule return `None` and keep their static
/// thresholds.
fn ideal_thresholds(
    metric: &str,
    current: &ThresholdSet,
    base: &ThresholdSet,
    stats: &Descriptive,
) -> Option<ThresholdSet> {
    let mut ideal = current.clone();
    match metric {
        "fps" => {
            ideal.target = base.min.map_or(stats.p75, |min| min.max(stats.p75));
            ideal.warning = base.critical.max(stats.p25);
        }
        "frame_time" => {
            ideal.warning = base.warning.min(stats.p90);
            ideal.critical = base.critical.min(stats.p95);
        }
        "memory_used" => {
            ideal.warning = base.warning.min(stats.p90 * 1.5);
            ideal.critical = base.critical.min(stats.p95 * 2.0);
        }
        "network_latency" => {
            ideal.warning = base.warning.min(2.0f64.mul_add(stats.std_dev, stats.p90));
            ideal.critical = base.critical.min(3.0f64.mul_add(stats.std_dev, stats.p95));
        }
        _ => return None,
    }
    Some(ideal)
}

/// Violation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Below the critical boundary.
    CriticalLow,
    /// Above the critical boundary.
    CriticalHigh,
    /// Below the warning boundary.
    WarningLow,
    /// Above the warning boundary.
    WarningHigh,
}

impl ViolationKind {
    /// Whether this is a critical kind.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::CriticalLow | Self::CriticalHigh)
    }
}

/// A recorded threshold violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Metric id.
    pub metric: String,
    /// Offending value.
    pub value: f64,
    /// Dynamic thresholds at the time.
    pub thresholds: ThresholdSet,
    /// Kind.
    pub kind: ViolationKind,
    /// Severity.
    pub severity: Severity,
    /// Normalized deviation from target.
    pub deviation: f64,
}

/// Violation summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationStats {
    /// Recorded violations.
    pub total: usize,
    /// Violations in the last five minutes.
    pub recent: usize,
    /// `recent / 5`, per minute.
    pub rate_per_minute: f64,
    /// Counts by severity name.
    pub by_severity: BTreeMap<String, usize>,
    /// Counts by metric.
    pub by_metric: BTreeMap<String, usize>,
}

/// Persistable threshold state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    /// Dynamic thresholds.
    pub dynamic: BTreeMap<String, ThresholdSet>,
    /// Violation history.
    pub violations: Vec<ViolationRecord>,
}

// ============================================================================
// ThresholdManager
// ============================================================================

/// Owns static and dynamic thresholds and the violation history.
#[derive(Debug, Clone)]
pub struct ThresholdManager {
    base: BTreeMap<String, ThresholdSet>,
    dynamic: BTreeMap<String, ThresholdSet>,
    values: BTreeMap<String, VecDeque<f64>>,
    stats: BTreeMap<String, Descriptive>,
    violations: VecDeque<ViolationRecord>,
    adaptation_rate: f64,
    violation_sensitivity: f64,
    adaptive: bool,
}

impl ThresholdManager {
    /// Create a manager seeded with `base` thresholds.
    #[must_use]
    pub fn new(
        base: BTreeMap<String, ThresholdSet>,
        adaptation_rate: f64,
        violation_sensitivity: f64,
        adaptive: bool,
    ) -> Self {
        Self {
            dynamic: base.clone(),
            base,
            values: BTreeMap::new(),
            stats: BTreeMap::new(),
            violations: VecDeque::new(),
            adaptation_rate,
            violation_sensitivity,
            adaptive,
        }
    }

    /// Manager with [`default_thresholds`], rate 0.1 and sensitivity 1.0.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(default_thresholds(), 0.1, 1.0, true)
    }

    /// Update tuning parameters.
    pub fn configure(&mut self, adaptation_rate: f64, violation_sensitivity: f64, adaptive: bool) {
        self.adaptation_rate = adaptation_rate;
        self.violation_sensitivity = violation_sensitivity;
        self.adaptive = adaptive;
    }

    /// Feed one value. Returns the violation, if any. Metrics without
    /// thresholds are ignored.
    pub fn update(&mut self, timestamp: u64, metric: &str, value: f64) -> Option<ViolationRecord> {
        if !value.is_finite() || !self.dynamic.contains_key(metric) {
            return None;
        }

        let history = self.values.entry(metric.to_string()).or_default();
        history.push_back(value);
        while history.len() > VALUE_HISTORY_CAP {
            history.pop_front();
        }
        let samples = history.len();
        let stats = Descriptive::from_values(history.make_contiguous())?;

        if self.adaptive && samples >= MIN_ADAPT_SAMPLES {
            self.adapt(metric, &stats);
        }
        self.stats.insert(metric.to_string(), stats);

        let record = self.check(timestamp, metric, value)?;
        self.violations.push_back(record.clone());
        while self.violations.len() > VIOLATION_HISTORY_CAP {
            self.violations.pop_front();
        }
        tracing::debug!(
            metric,
            value,
            kind = ?record.kind,
            severity = %record.severity,
            "Threshold violation"
        );
        Some(record)
    }

    /// Feed every metric of a snapshot.
    pub fn update_snapshot(&mut self, snapshot: &MetricSnapshot) -> Vec<ViolationRecord> {
        snapshot
            .iter()
            .filter_map(|(metric, value)| self.update(snapshot.timestamp, metric, value))
            .collect()
    }

    fn adapt(&mut self, metric: &str, stats: &Descriptive) {
        let (Some(base), Some(current)) = (self.base.get(metric), self.dynamic.get(metric)) else {
            return;
        };
        let Some(ideal) = ideal_thresholds(metric, current, base, stats) else {
            return;
        };
        let rate = self.adaptation_rate;
        if let Some(dynamic) = self.dynamic.get_mut(metric) {
            dynamic.blend_toward(&ideal, rate);
            dynamic.restore_order();
        }
    }

    /// Classify a value against the dynamic thresholds without recording.
    #[must_use]
    pub fn check(&self, timestamp: u64, metric: &str, value: f64) -> Option<ViolationRecord> {
        let set = self.dynamic.get(metric)?;
        let sensitivity = self.violation_sensitivity;
        let critical = set.effective(set.critical, sensitivity);
        let warning = set.effective(set.warning, sensitivity);

        let (kind, deviation) = match set.direction {
            ThresholdDirection::LowerIsWorse => {
                let kind = if value < critical {
                    ViolationKind::CriticalLow
                } else if value < warning {
                    ViolationKind::WarningLow
                } else {
                    return None;
                };
                (kind, relative(set.target - value, set.target))
            }
            ThresholdDirection::HigherIsWorse => {
                let kind = if value > critical {
                    ViolationKind::CriticalHigh
                } else if value > warning {
                    ViolationKind::WarningHigh
                } else {
                    return None;
                };
                (kind, relative(value - set.target, set.target))
            }
        };

        let severity = if kind.is_critical() {
            Severity::Critical
        } else if deviation >= HIGH_DEVIATION {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(ViolationRecord {
            timestamp,
            metric: metric.to_string(),
            value,
            thresholds: set.clone(),
            kind,
            severity,
            deviation,
        })
    }

    /// Violation summary as of `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn violation_stats(&self, now: u64) -> ViolationStats {
        let mut stats = ViolationStats {
            total: self.violations.len(),
            ..ViolationStats::default()
        };
        for violation in &self.violations {
            if now.saturating_sub(violation.timestamp) < VIOLATION_RATE_WINDOW_MS {
                stats.recent += 1;
            }
            *stats
                .by_severity
                .entry(violation.severity.as_str().to_string())
                .or_default() += 1;
            *stats.by_metric.entry(violation.metric.clone()).or_default() += 1;
        }
        stats.rate_per_minute = stats.recent as f64 / 5.0;
        stats
    }

    /// Static thresholds for a metric.
    #[must_use]
    pub fn base(&self, metric: &str) -> Option<&ThresholdSet> {
        self.base.get(metric)
    }

    /// Dynamic thresholds for a metric.
    #[must_use]
    pub fn dynamic(&self, metric: &str) -> Option<&ThresholdSet> {
        self.dynamic.get(metric)
    }

    /// All dynamic thresholds.
    #[must_use]
    pub const fn dynamic_all(&self) -> &BTreeMap<String, ThresholdSet> {
        &self.dynamic
    }

    /// Latest descriptive stats for a metric's threshold history.
    #[must_use]
    pub fn stats(&self, metric: &str) -> Option<&Descriptive> {
        self.stats.get(metric)
    }

    /// Violation history, oldest first.
    #[must_use]
    pub const fn violations(&self) -> &VecDeque<ViolationRecord> {
        &self.violations
    }

    /// Override the dynamic set for a metric, adding it if absent.
    pub fn set_dynamic(&mut self, metric: impl Into<String>, set: ThresholdSet) {
        let metric = metric.into();
        self.base.entry(metric.clone()).or_insert_with(|| set.clone());
        self.dynamic.insert(metric, set);
    }

    /// Reset dynamic thresholds to the static defaults.
    pub fn reset_dynamic(&mut self) {
        self.dynamic = self.base.clone();
    }

    /// Export dynamic thresholds and violations.
    #[must_use]
    pub fn state(&self) -> ThresholdState {
        ThresholdState {
            dynamic: self.dynamic.clone(),
            violations: self.violations.iter().cloned().collect(),
        }
    }

    /// Restore persisted dynamic thresholds and violations.
    pub fn restore(&mut self, state: ThresholdState) {
        for (metric, set) in state.dynamic {
            self.set_dynamic(metric, set);
        }
        self.violations = state.violations.into();
        while self.violations.len() > VIOLATION_HISTORY_CAP {
            self.violations.pop_front();
        }
    }

    /// Clear history, stats, violations and dynamic state.
    pub fn clear(&mut self) {
        self.values.clear();
        self.stats.clear();
        self.violations.clear();
        self.reset_dynamic();
    }
}

fn relative(delta: f64, target: f64) -> f64 {
    if target == 0.0 {
        0.0
    } else {
        delta / target
    }
}
