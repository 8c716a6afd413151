//! Real-time performance monitoring.
//!
//! This module provides:
//! - [`RealTimeMonitor`]: per-tick sampling, event detection and streaming
//! - [`MonitorTask`]: the cancellable ticker that drives a shared monitor
//! - [`StreamBuffer`]: bounded FIFO of streamed points with subscribers
//! - [`EventDetector`]: the sustained, trend and instant detectors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  tick(now)  ┌──────────────────────────────────────┐
//! │ MonitorTask  │────────────▶│ RealTimeMonitor                      │
//! │ (interval +  │             │  sources → sample → filter           │
//! │  watch stop) │             │  → detectors → stream → observer     │
//! └──────────────┘             └──────────────────────────────────────┘
//! ```

mod detectors;
mod realtime;
mod runner;
mod stream;

pub use detectors::{
    event_severity, growth_per_minute, DetectionStrategy, EventDetector, EventKind,
    PerformanceEvent, Transition,
};
pub use realtime::{
    DetectorStatus, MonitorStats, RealTimeMonitor, DEFAULT_EVENT_RANGE_MS, EVENT_HISTORY_CAP,
};
pub use runner::MonitorTask;
pub use stream::{StreamBuffer, StreamCallback, StreamPoint, Subscription};

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::panic_message;
use crate::metrics::MetricSnapshot;

/// Which edge of an event is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    /// Condition started holding.
    Detected,
    /// Condition cleared.
    Resolved,
}

/// Consumer callbacks, invoked synchronously from the tick.
#[cfg_attr(test, mockall::automock)]
pub trait MonitorObserver: Send + Sync {
    /// Called once per processed tick with the filtered metrics.
    fn on_realtime_data(&self, timestamp: u64, metrics: &MetricSnapshot) {
        let _ = (timestamp, metrics);
    }

    /// Called on every event transition.
    fn on_performance_event(&self, phase: EventPhase, event: &PerformanceEvent) {
        let _ = (phase, event);
    }
}

/// Run an observer callback, logging a panic instead of unwinding the tick.
fn notify(callback: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic_message(payload.as_ref());
        tracing::warn!(callback, panic = %message, "Monitor observer panicked");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    struct Silent;
    impl MonitorObserver for Silent {}

    #[test]
    fn test_default_observer_methods_are_noops() {
        let observer = Silent;
        observer.on_realtime_data(0, &MetricSnapshot::new(0));
    }

    #[test]
    fn test_notify_swallows_panics() {
        notify("test", || panic!("observer exploded"));
    }

    #[test]
    fn test_event_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&EventPhase::Resolved).unwrap(),
            "\"resolved\""
        );
    }

    static_assertions::assert_impl_all!(RealTimeMonitor: Send);
    static_assertions::assert_impl_all!(MonitorTask: Send, Sync);
}
