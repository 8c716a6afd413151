//! The real-time monitor: one synchronous [`RealTimeMonitor::tick`] per
//! sampling interval.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use super::detectors::{EventDetector, EventKind, PerformanceEvent, Transition};
use super::stream::{StreamBuffer, StreamCallback, StreamPoint, Subscription};
use super::{notify, EventPhase, MonitorObserver};
use crate::config::{validate_monitor, MonitorConfig};
use crate::analysis::Severity;
use crate::error::{isolate, ConfigError};
use crate::metrics::MetricSnapshot;
use crate::sources::collect_all;
use crate::traits::MetricSource;

/// Performance event history cap.
pub const EVENT_HISTORY_CAP: usize = 100;

/// Default range for [`RealTimeMonitor::events_history`].
pub const DEFAULT_EVENT_RANGE_MS: u64 = 3_600_000;

/// Detector status for [`MonitorStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatus {
    /// Whether the event is active.
    pub active: bool,
    /// Current threshold.
    pub threshold: f64,
}

/// Snapshot of monitor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Whether the ticker task is running.
    pub running: bool,
    /// Current configuration.
    pub config: MonitorConfig,
    /// Whether the stream accepts points.
    pub stream_active: bool,
    /// Buffered stream points.
    pub stream_buffer_size: usize,
    /// Active subscribers.
    pub subscribers: usize,
    /// Events currently active.
    pub active_events: usize,
    /// Events in history.
    pub total_events: usize,
    /// Ticks processed.
    pub ticks: u64,
    /// Ticks skipped by sampling or empty collection.
    pub skipped_ticks: u64,
    /// Source failures seen.
    pub source_failures: u64,
    /// Per-detector status.
    pub detectors: BTreeMap<EventKind, DetectorStatus>,
}

/// Samples sources, detects events and streams data.
pub struct RealTimeMonitor {
    config: MonitorConfig,
    sources: Vec<Box<dyn MetricSource>>,
    detectors: Vec<EventDetector>,
    open_events: BTreeMap<EventKind, PerformanceEvent>,
    events: VecDeque<PerformanceEvent>,
    stream: StreamBuffer,
    observer: Option<Arc<dyn MonitorObserver>>,
    rng: Box<dyn RngCore + Send>,
    running: bool,
    ticks: u64,
    skipped_ticks: u64,
    source_failures: u64,
}

impl std::fmt::Debug for RealTimeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeMonitor")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("detectors", &self.detectors)
            .field("events", &self.events.len())
            .field("stream", &self.stream)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl RealTimeMonitor {
    /// Create a monitor with the default detectors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        validate_monitor(&config)?;
        let mut stream = StreamBuffer::new(config.buffer_size);
        if config.enable_realtime_stream {
            stream.open();
        }
        Ok(Self {
            detectors: EventKind::ALL.iter().map(|k| EventDetector::new(*k)).collect(),
            stream,
            config,
            sources: Vec::new(),
            open_events: BTreeMap::new(),
            events: VecDeque::new(),
            observer: None,
            rng: Box::new(StdRng::from_entropy()),
            running: false,
            ticks: 0,
            skipped_ticks: 0,
            source_failures: 0,
        })
    }

    /// Replace the sampling RNG.
    #[must_use]
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Register a source. Sources are polled in registration order.
    pub fn add_source(&mut self, source: Box<dyn MetricSource>) {
        self.sources.push(source);
    }

    /// Set the observer.
    pub fn set_observer(&mut self, observer: Arc<dyn MonitorObserver>) {
        self.observer = Some(observer);
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and keeps the old configuration if the new one
    /// is invalid.
    pub fn configure(&mut self, config: MonitorConfig) -> Result<(), ConfigError> {
        validate_monitor(&config)?;
        self.stream.set_capacity(config.buffer_size);
        if self.running && config.enable_realtime_stream {
            self.stream.open();
        } else if !config.enable_realtime_stream {
            self.stream.close();
        }
        self.config = config;
        tracing::info!("Monitor configuration updated");
        Ok(())
    }

    /// Change one detector's threshold. Returns `false` for unknown kinds.
    pub fn configure_detector(&mut self, kind: EventKind, threshold: f64) -> bool {
        let Some(detector) = self.detectors.iter_mut().find(|d| d.kind() == kind) else {
            return false;
        };
        detector.set_threshold(threshold);
        tracing::info!(event = %kind, threshold, "Event detector configured");
        true
    }

    /// Run one sampling tick at `now`.
    ///
    /// Returns the processed metrics, or `None` when the tick was skipped.
    pub fn tick(&mut self, now: u64) -> Option<MetricSnapshot> {
        let collected = collect_all(&self.sources, now);
        self.source_failures += collected.failures as u64;

        if self.rng.gen::<f64>() >= self.config.sampling_rate {
            self.skipped_ticks += 1;
            return None;
        }

        let mut metrics = collected.snapshot;
        metrics.retain(|metric| self.config.allows(metric));
        if metrics.is_empty() {
            self.skipped_ticks += 1;
            tracing::debug!("No metrics collected this tick");
            // active events close once their metric goes quiet
            if !self.open_events.is_empty() {
                self.detect_events(&metrics, now);
            }
            return None;
        }
        self.ticks += 1;

        self.detect_events(&metrics, now);

        if self.config.enable_realtime_stream {
            self.stream.push(StreamPoint {
                timestamp: now,
                metrics: metrics.as_map().clone(),
                events: self.active_events(),
            });
        }

        if let Some(observer) = &self.observer {
            notify("on_realtime_data", || observer.on_realtime_data(now, &metrics));
        }
        Some(metrics)
    }

    fn detect_events(&mut self, metrics: &MetricSnapshot, now: u64) {
        for index in 0..self.detectors.len() {
            let detector = &mut self.detectors[index];
            let kind = detector.kind();
            let unit = format!("detector:{kind}");
            let Some(transition) =
                isolate(&unit, || Ok(detector.evaluate(metrics, now)))
            else {
                continue;
            };
            match transition {
                Some(Transition::Detected) => {
                    let severity = self.detectors[index].severity(metrics);
                    self.on_detected(kind, severity, metrics, now);
                }
                Some(Transition::Resolved) => self.on_resolved(kind, now),
                None => {}
            }
        }
        self.prune_events(now);
    }

    fn on_detected(
        &mut self,
        kind: EventKind,
        severity: Severity,
        metrics: &MetricSnapshot,
        now: u64,
    ) {
        let event = PerformanceEvent {
            id: Uuid::new_v4(),
            kind,
            detected_at: now,
            resolved_at: None,
            duration_ms: None,
            severity,
            metrics: metrics.as_map().clone(),
        };
        tracing::info!(event = %kind, severity = %severity, "Performance event detected");

        if self.config.enable_history {
            self.events.push_back(event.clone());
            while self.events.len() > EVENT_HISTORY_CAP {
                self.events.pop_front();
            }
        }
        self.open_events.insert(kind, event.clone());
        if self.config.enable_alerts {
            if let Some(observer) = &self.observer {
                notify("on_performance_event", || {
                    observer.on_performance_event(EventPhase::Detected, &event);
                });
            }
        }
    }

    fn on_resolved(&mut self, kind: EventKind, now: u64) {
        let Some(mut event) = self.open_events.remove(&kind) else {
            return;
        };
        event.resolved_at = Some(now);
        event.duration_ms = Some(now.saturating_sub(event.detected_at));
        if let Some(recorded) = self.events.iter_mut().rev().find(|e| e.id == event.id) {
            recorded.resolved_at = event.resolved_at;
            recorded.duration_ms = event.duration_ms;
        }
        tracing::info!(
            event = %kind,
            duration_ms = event.duration_ms.unwrap_or_default(),
            "Performance event resolved"
        );

        if self.config.enable_alerts {
            if let Some(observer) = &self.observer {
                notify("on_performance_event", || {
                    observer.on_performance_event(EventPhase::Resolved, &event);
                });
            }
        }
    }

    fn prune_events(&mut self, now: u64) {
        let retention = self.config.retention_ms;
        self.events
            .retain(|e| !e.is_resolved() || now.saturating_sub(e.detected_at) < retention);
    }

    /// Kinds of currently active events.
    #[must_use]
    pub fn active_events(&self) -> Vec<EventKind> {
        self.detectors
            .iter()
            .filter(|d| d.is_active())
            .map(EventDetector::kind)
            .collect()
    }

    /// Events detected within `range_ms` of `now` (default one hour).
    #[must_use]
    pub fn events_history(&self, now: u64, range_ms: Option<u64>) -> Vec<PerformanceEvent> {
        let range = range_ms.unwrap_or(DEFAULT_EVENT_RANGE_MS);
        self.events
            .iter()
            .filter(|e| now.saturating_sub(e.detected_at) < range)
            .cloned()
            .collect()
    }

    /// Copy of the stream buffer.
    #[must_use]
    pub fn stream_buffer(&self) -> Vec<StreamPoint> {
        self.stream.points()
    }

    /// Subscribe to streamed points.
    pub fn subscribe(&mut self, callback: StreamCallback) -> Subscription {
        self.stream.subscribe(callback)
    }

    /// Mark the monitor running and open the stream if enabled.
    pub fn mark_started(&mut self) {
        self.running = true;
        if self.config.enable_realtime_stream {
            self.stream.open();
        }
        tracing::info!(interval_ms = self.config.interval_ms, "Real-time monitoring started");
    }

    /// Mark the monitor stopped, close the stream and drop subscribers.
    /// Detector state and event history are kept.
    pub fn mark_stopped(&mut self) {
        self.running = false;
        self.stream.close();
        self.stream.clear_subscribers();
        tracing::info!("Real-time monitoring stopped");
    }

    /// Whether the ticker task is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Monitor statistics.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            running: self.running,
            config: self.config.clone(),
            stream_active: self.stream.is_open(),
            stream_buffer_size: self.stream.len(),
            subscribers: self.stream.subscriber_count(),
            active_events: self.detectors.iter().filter(|d| d.is_active()).count(),
            total_events: self.events.len(),
            ticks: self.ticks,
            skipped_ticks: self.skipped_ticks,
            source_failures: self.source_failures,
            detectors: self
                .detectors
                .iter()
                .map(|d| {
                    (
                        d.kind(),
                        DetectorStatus {
                            active: d.is_active(),
                            threshold: d.strategy().threshold(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Drop events and detector state.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.open_events.clear();
        for detector in &mut self.detectors {
            detector.reset();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::monitor::MockMonitorObserver;
    use crate::sources::FnSource;
    use pretty_assertions::assert_eq;
    use rand::rngs::mock::StepRng;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn shared_value(initial: f64) -> Arc<AtomicU64> {
        Arc::new(AtomicU64::new(initial.to_bits()))
    }

    fn fps_source(value: &Arc<AtomicU64>) -> Box<dyn MetricSource> {
        let value = Arc::clone(value);
        FnSource::boxed("fps", move || {
            Ok(MetricSnapshot::new(0).with("fps", f64::from_bits(value.load(Ordering::SeqCst))))
        })
    }

    fn monitor() -> RealTimeMonitor {
        RealTimeMonitor::new(MonitorConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MonitorConfig {
            sampling_rate: 1.5,
            ..MonitorConfig::default()
        };
        assert!(RealTimeMonitor::new(config).is_err());
    }

    #[test]
    fn test_fps_drop_lifecycle() {
        let fps = shared_value(20.0);
        let mut monitor = monitor();
        monitor.add_source(fps_source(&fps));

        let phases = Arc::new(Mutex::new(Vec::new()));
        let mut observer = MockMonitorObserver::new();
        observer.expect_on_realtime_data().return_const(());
        let recorded = Arc::clone(&phases);
        observer
            .expect_on_performance_event()
            .returning(move |phase, event| {
                recorded.lock().unwrap().push((phase, event.clone()));
            });
        monitor.set_observer(Arc::new(observer));

        for ts in (0..=3_000).step_by(1_000) {
            monitor.tick(ts);
        }
        assert_eq!(monitor.active_events(), vec![EventKind::FpsDrop]);

        fps.store(60.0f64.to_bits(), Ordering::SeqCst);
        monitor.tick(4_000);
        assert!(monitor.active_events().is_empty());

        let phases = phases.lock().unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].0, EventPhase::Detected);
        assert_eq!(phases[0].1.detected_at, 3_000);
        assert_eq!(phases[0].1.severity, Severity::High);
        assert_eq!(phases[1].0, EventPhase::Resolved);
        assert_eq!(phases[1].1.resolved_at, Some(4_000));
        assert_eq!(phases[1].1.duration_ms, Some(1_000));

        let history = monitor.events_history(4_000, None);
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved());
    }

    #[test]
    fn test_failing_source_skipped_and_later_sources_win() {
        let mut monitor = monitor();
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("fps", 10.0).with("input_lag", 5.0))
        }));
        monitor.add_source(FnSource::boxed("broken", || {
            Err(SourceError::Unavailable {
                source_name: "broken".into(),
                message: "gone".into(),
            })
        }));
        monitor.add_source(FnSource::boxed("b", || {
            Ok(MetricSnapshot::new(0).with("fps", 55.0))
        }));

        let metrics = monitor.tick(1_000).unwrap();
        assert_eq!(metrics.get("fps"), Some(55.0));
        assert_eq!(metrics.get("input_lag"), Some(5.0));
        assert_eq!(monitor.stats().source_failures, 1);
    }

    #[test]
    fn test_metrics_filter() {
        let config = MonitorConfig {
            metrics_filter: vec!["fps".into()],
            ..MonitorConfig::default()
        };
        let mut monitor = RealTimeMonitor::new(config).unwrap();
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("fps", 60.0).with("frame_time", 90.0))
        }));
        let metrics = monitor.tick(0).unwrap();
        assert_eq!(metrics.len(), 1);
        // frame_time was filtered before detection
        assert!(monitor.active_events().is_empty());
    }

    #[test]
    fn test_sampling_rate_skips_ticks() {
        let config = MonitorConfig {
            sampling_rate: 0.5,
            ..MonitorConfig::default()
        };
        // StepRng at u64::MAX yields values just below 1.0
        let mut monitor = RealTimeMonitor::new(config)
            .unwrap()
            .with_rng(StepRng::new(u64::MAX, 0));
        monitor.add_source(FnSource::boxed("a", || Ok(MetricSnapshot::new(0).with("fps", 60.0))));
        assert!(monitor.tick(0).is_none());
        assert_eq!(monitor.stats().skipped_ticks, 1);

        let mut monitor = RealTimeMonitor::new(MonitorConfig {
            sampling_rate: 0.5,
            ..MonitorConfig::default()
        })
        .unwrap()
        .with_rng(StepRng::new(0, 0));
        monitor.add_source(FnSource::boxed("a", || Ok(MetricSnapshot::new(0).with("fps", 60.0))));
        assert!(monitor.tick(0).is_some());
    }

    #[test]
    fn test_stream_carries_active_events() {
        let mut monitor = monitor();
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("frame_time", 80.0))
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.subscribe(Box::new(move |p: &StreamPoint| {
            sink.lock().unwrap().push(p.events.clone());
            Ok(())
        }));
        monitor.tick(0);
        assert_eq!(*seen.lock().unwrap(), vec![vec![EventKind::FrameSpike]]);
        assert_eq!(monitor.stream_buffer().len(), 1);
    }

    #[test]
    fn test_configure_detector() {
        let mut monitor = monitor();
        assert!(monitor.configure_detector(EventKind::InputLag, 20.0));
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("input_lag", 30.0))
        }));
        monitor.tick(0);
        assert_eq!(monitor.active_events(), vec![EventKind::InputLag]);
        assert_eq!(monitor.stats().detectors[&EventKind::InputLag].threshold, 20.0);
    }

    #[test]
    fn test_alerts_disabled_suppresses_event_callbacks() {
        let config = MonitorConfig {
            enable_alerts: false,
            ..MonitorConfig::default()
        };
        let mut monitor = RealTimeMonitor::new(config).unwrap();
        let mut observer = MockMonitorObserver::new();
        observer.expect_on_realtime_data().times(1).return_const(());
        observer.expect_on_performance_event().never();
        monitor.set_observer(Arc::new(observer));
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("frame_time", 80.0))
        }));
        monitor.tick(0);
        assert_eq!(monitor.events_history(0, None).len(), 1);
    }

    #[test]
    fn test_stop_clears_stream_keeps_history() {
        let mut monitor = monitor();
        monitor.add_source(FnSource::boxed("a", || {
            Ok(MetricSnapshot::new(0).with("frame_time", 80.0))
        }));
        let handle = monitor.subscribe(Box::new(|_: &StreamPoint| Ok(())));
        monitor.mark_started();
        monitor.tick(0);
        monitor.mark_stopped();

        assert!(monitor.stream_buffer().is_empty());
        assert!(!handle.is_active());
        assert_eq!(monitor.events_history(0, None).len(), 1);
        assert!(!monitor.stats().stream_active);
    }

    #[test]
    fn test_event_history_cap() {
        let mut monitor = monitor();
        let latency = shared_value(0.0);
        let source_value = Arc::clone(&latency);
        monitor.add_source(FnSource::boxed("net", move || {
            Ok(MetricSnapshot::new(0)
                .with("network_latency", f64::from_bits(source_value.load(Ordering::SeqCst))))
        }));
        for i in 0..(EVENT_HISTORY_CAP as u64 + 5) {
            latency.store(900.0f64.to_bits(), Ordering::SeqCst);
            monitor.tick(i * 10);
            latency.store(10.0f64.to_bits(), Ordering::SeqCst);
            monitor.tick(i * 10 + 5);
        }
        assert_eq!(monitor.stats().total_events, EVENT_HISTORY_CAP);
    }

    #[test]
    fn test_quiet_tick_resolves_active_events() {
        let fps = shared_value(10.0);
        let mut monitor = monitor();
        monitor.add_source(fps_source(&fps));
        for ts in (0..=3_000).step_by(1_000) {
            monitor.tick(ts);
        }
        assert_eq!(monitor.active_events(), vec![EventKind::FpsDrop]);

        // a non-finite reading leaves the tick with no metrics at all
        fps.store(f64::NAN.to_bits(), Ordering::SeqCst);
        assert!(monitor.tick(4_000).is_none());
        assert!(monitor.active_events().is_empty());
        assert_eq!(monitor.stats().skipped_ticks, 1);

        let history = monitor.events_history(4_000, None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].resolved_at, Some(4_000));
        assert_eq!(monitor.stream_buffer().len(), 4);
    }
}
