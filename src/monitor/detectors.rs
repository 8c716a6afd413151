//! Performance event detectors.
//!
//! Each detector is a two-state machine. It turns active when its condition
//! holds and inactive when the condition clears; the monitor turns those
//! transitions into `detected` and `resolved` events.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::analysis::Severity;
use crate::metrics::MetricSnapshot;

/// Event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// FPS held below threshold.
    FpsDrop,
    /// Memory growing faster than threshold MB/min.
    MemoryLeak,
    /// Frame time above threshold.
    FrameSpike,
    /// Network latency above threshold.
    NetworkSpike,
    /// Input lag above threshold.
    InputLag,
}

impl EventKind {
    /// All kinds in evaluation order.
    pub const ALL: [Self; 5] = [
        Self::FpsDrop,
        Self::MemoryLeak,
        Self::FrameSpike,
        Self::NetworkSpike,
        Self::InputLag,
    ];

    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FpsDrop => "fps_drop",
            Self::MemoryLeak => "memory_leak",
            Self::FrameSpike => "frame_spike",
            Self::NetworkSpike => "network_spike",
            Self::InputLag => "input_lag",
        }
    }

    /// Default detection strategy.
    #[must_use]
    pub const fn default_strategy(self) -> DetectionStrategy {
        match self {
            Self::FpsDrop => DetectionStrategy::Sustained {
                metric: "fps",
                threshold: 45.0,
                duration_ms: 3_000,
            },
            Self::MemoryLeak => DetectionStrategy::Trend {
                metric: "memory_used",
                threshold: 10.0,
                samples: 10,
            },
            Self::FrameSpike => DetectionStrategy::Instant {
                metric: "frame_time",
                threshold: 50.0,
            },
            Self::NetworkSpike => DetectionStrategy::Instant {
                metric: "network_latency",
                threshold: 500.0,
            },
            Self::InputLag => DetectionStrategy::Instant {
                metric: "input_lag",
                threshold: 100.0,
            },
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a detector decides its condition holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionStrategy {
    /// Value below `threshold` continuously for at least `duration_ms`.
    Sustained {
        /// Watched metric.
        metric: &'static str,
        /// Lower bound.
        threshold: f64,
        /// Required hold time.
        duration_ms: u64,
    },
    /// Growth rate over the last `samples` values above `threshold` per minute.
    Trend {
        /// Watched metric.
        metric: &'static str,
        /// Units per minute.
        threshold: f64,
        /// Window size.
        samples: usize,
    },
    /// Value above `threshold` on this tick.
    Instant {
        /// Watched metric.
        metric: &'static str,
        /// Upper bound.
        threshold: f64,
    },
}

impl DetectionStrategy {
    /// Watched metric.
    #[must_use]
    pub const fn metric(&self) -> &'static str {
        match self {
            Self::Sustained { metric, .. }
            | Self::Trend { metric, .. }
            | Self::Instant { metric, .. } => metric,
        }
    }

    /// Current threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        match self {
            Self::Sustained { threshold, .. }
            | Self::Trend { threshold, .. }
            | Self::Instant { threshold, .. } => *threshold,
        }
    }

    fn set_threshold(&mut self, value: f64) {
        match self {
            Self::Sustained { threshold, .. }
            | Self::Trend { threshold, .. }
            | Self::Instant { threshold, .. } => *threshold = value,
        }
    }
}

/// Growth per minute between the first and last sample. Needs at least 3
/// samples and a positive time span.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn growth_per_minute(samples: &VecDeque<(u64, f64)>) -> Option<f64> {
    if samples.len() < 3 {
        return None;
    }
    let (first_ts, first) = *samples.front()?;
    let (last_ts, last) = *samples.back()?;
    let minutes = last_ts.saturating_sub(first_ts) as f64 / 60_000.0;
    if minutes <= 0.0 {
        return None;
    }
    Some((last - first) / minutes)
}

/// Severity for an event of `kind` observed at `value`.
#[must_use]
pub fn event_severity(kind: EventKind, value: f64) -> Severity {
    let (critical, high, lower_is_worse) = match kind {
        EventKind::FpsDrop => (20.0, 30.0, true),
        EventKind::MemoryLeak => (20.0, 15.0, false),
        EventKind::FrameSpike => (100.0, 75.0, false),
        EventKind::NetworkSpike => (1000.0, 750.0, false),
        EventKind::InputLag => (200.0, 150.0, false),
    };
    let (is_critical, is_high) = if lower_is_worse {
        (value < critical, value < high)
    } else {
        (value > critical, value > high)
    };
    if is_critical {
        Severity::Critical
    } else if is_high {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// A detected (and possibly resolved) performance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    /// Unique id.
    pub id: Uuid,
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Detection timestamp.
    pub detected_at: u64,
    /// Resolution timestamp.
    pub resolved_at: Option<u64>,
    /// `resolved_at - detected_at`.
    pub duration_ms: Option<u64>,
    /// Severity at detection.
    pub severity: Severity,
    /// Metrics at detection.
    pub metrics: BTreeMap<String, f64>,
}

impl PerformanceEvent {
    /// Whether the event has been resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// State transition reported by [`EventDetector::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Inactive to active.
    Detected,
    /// Active to inactive.
    Resolved,
}

/// One detector and its rolling state.
#[derive(Debug, Clone)]
pub struct EventDetector {
    kind: EventKind,
    strategy: DetectionStrategy,
    active: bool,
    since: Option<u64>,
    samples: VecDeque<(u64, f64)>,
    last_rate: Option<f64>,
}

impl EventDetector {
    /// Detector with the kind's default strategy.
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self::with_strategy(kind, kind.default_strategy())
    }

    /// Detector with an explicit strategy.
    #[must_use]
    pub const fn with_strategy(kind: EventKind, strategy: DetectionStrategy) -> Self {
        Self {
            kind,
            strategy,
            active: false,
            since: None,
            samples: VecDeque::new(),
            last_rate: None,
        }
    }

    /// Event type.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Strategy.
    #[must_use]
    pub const fn strategy(&self) -> &DetectionStrategy {
        &self.strategy
    }

    /// Whether the event is currently active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Change the threshold. Rolling state is kept.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.strategy.set_threshold(threshold);
    }

    /// Severity for the current tick.
    #[must_use]
    pub fn severity(&self, metrics: &MetricSnapshot) -> Severity {
        let value = match self.strategy {
            DetectionStrategy::Trend { .. } => self.last_rate,
            _ => metrics.get(self.strategy.metric()),
        };
        value.map_or(Severity::Medium, |v| event_severity(self.kind, v))
    }

    /// Whether the condition holds at `timestamp`. Missing metrics count as
    /// "does not hold".
    fn condition(&mut self, metrics: &MetricSnapshot, timestamp: u64) -> bool {
        let Some(value) = metrics.get(self.strategy.metric()) else {
            self.since = None;
            return false;
        };
        match self.strategy {
            DetectionStrategy::Sustained {
                threshold,
                duration_ms,
                ..
            } => {
                if value < threshold {
                    let since = *self.since.get_or_insert(timestamp);
                    timestamp.saturating_sub(since) >= duration_ms
                } else {
                    self.since = None;
                    false
                }
            }
            DetectionStrategy::Trend {
                threshold, samples, ..
            } => {
                self.samples.push_back((timestamp, value));
                while self.samples.len() > samples {
                    self.samples.pop_front();
                }
                if self.samples.len() < samples {
                    return false;
                }
                self.last_rate = growth_per_minute(&self.samples);
                self.last_rate.is_some_and(|rate| rate > threshold)
            }
            DetectionStrategy::Instant { threshold, .. } => value > threshold,
        }
    }

    /// Evaluate one tick and report a state transition, if any.
    pub fn evaluate(&mut self, metrics: &MetricSnapshot, timestamp: u64) -> Option<Transition> {
        let holds = self.condition(metrics, timestamp);
        match (holds, self.active) {
            (true, false) => {
                self.active = true;
                Some(Transition::Detected)
            }
            (false, true) => {
                self.active = false;
                Some(Transition::Resolved)
            }
            _ => None,
        }
    }

    /// Forget rolling state and deactivate.
    pub fn reset(&mut self) {
        self.active = false;
        self.since = None;
        self.samples.clear();
        self.last_rate = None;
    }
}
