//! Real-time monitor lifecycle tests.
//!
//! start → sustained fps drop → detection → recovery → resolution → stop

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use perf_telemetry::analysis::Severity;
use perf_telemetry::config::MonitorConfig;
use perf_telemetry::metrics::MetricSnapshot;
use perf_telemetry::monitor::{
    EventKind, EventPhase, MonitorObserver, MonitorTask, PerformanceEvent, RealTimeMonitor,
    StreamPoint,
};
use perf_telemetry::sources::FnSource;
use perf_telemetry::traits::TimeProvider;

/// Clock that follows tokio's (paused) time.
struct TokioClock {
    start: tokio::time::Instant,
}

impl TimeProvider for TokioClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap()
    }
}

#[derive(Default)]
struct Recorder {
    transitions: Mutex<Vec<(EventPhase, PerformanceEvent)>>,
}

impl MonitorObserver for Recorder {
    fn on_performance_event(&self, phase: EventPhase, event: &PerformanceEvent) {
        self.transitions.lock().unwrap().push((phase, event.clone()));
    }
}

struct Rig {
    task: MonitorTask,
    fps: Arc<AtomicU64>,
    recorder: Arc<Recorder>,
    delivered: Arc<AtomicUsize>,
}

fn rig() -> Rig {
    let fps = Arc::new(AtomicU64::new(60.0f64.to_bits()));
    let source_fps = Arc::clone(&fps);

    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(FnSource::boxed("frames", move || {
        let value = f64::from_bits(source_fps.load(Ordering::SeqCst));
        Ok(MetricSnapshot::new(0).with("fps", value).with("frame_time", 16.0))
    }));

    let recorder = Arc::new(Recorder::default());
    monitor.set_observer(Arc::clone(&recorder) as Arc<dyn MonitorObserver>);

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let _subscription = monitor.subscribe(Box::new(move |_: &StreamPoint| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let clock = TokioClock {
        start: tokio::time::Instant::now(),
    };
    let task = MonitorTask::new(
        Arc::new(tokio::sync::Mutex::new(monitor)),
        Arc::new(clock),
    );
    Rig {
        task,
        fps,
        recorder,
        delivered,
    }
}

#[tokio::test(start_paused = true)]
async fn test_fps_drop_detected_and_resolved() {
    let Rig {
        mut task,
        fps,
        recorder,
        delivered,
    } = rig();
    task.start().await.unwrap();

    // ticks at 1s and 2s are healthy
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    fps.store(15.0f64.to_bits(), Ordering::SeqCst);

    // below 45 from 3s; held for 3s by the 6s tick
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    {
        let monitor = task.monitor();
        let monitor = monitor.lock().await;
        assert_eq!(monitor.active_events(), vec![EventKind::FpsDrop]);
        let stats = monitor.stats();
        assert_eq!(stats.active_events, 1);
        assert!(stats.running);
    }

    fps.store(60.0f64.to_bits(), Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let transitions = recorder.transitions.lock().unwrap().clone();
    assert_eq!(transitions.len(), 2);
    let (phase, detected) = &transitions[0];
    assert_eq!(*phase, EventPhase::Detected);
    assert_eq!(detected.kind, EventKind::FpsDrop);
    assert_eq!(detected.severity, Severity::Critical);
    let (phase, resolved) = &transitions[1];
    assert_eq!(*phase, EventPhase::Resolved);
    assert_eq!(resolved.id, detected.id);
    assert_eq!(
        resolved.duration_ms,
        resolved.resolved_at.map(|r| r - detected.detected_at)
    );

    {
        let monitor = task.monitor();
        let monitor = monitor.lock().await;
        assert!(monitor.active_events().is_empty());
        let history = monitor.events_history(7_000, None);
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved());
    }

    let ticks_before_stop = delivered.load(Ordering::SeqCst);
    assert_eq!(ticks_before_stop, 7);
    task.stop().await.unwrap();

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), ticks_before_stop);

    let monitor = task.monitor();
    let monitor = monitor.lock().await;
    assert!(monitor.stream_buffer().is_empty());
    assert_eq!(monitor.stats().subscribers, 0);
    // history survives stop
    assert_eq!(monitor.events_history(7_000, None).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_points_carry_active_events() {
    let Rig { mut task, fps, .. } = rig();
    fps.store(10.0f64.to_bits(), Ordering::SeqCst);
    task.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let monitor = task.monitor();
    let points = monitor.lock().await.stream_buffer();
    assert_eq!(points.len(), 4);
    assert!(points[0].events.is_empty());
    assert_eq!(points[3].events, vec![EventKind::FpsDrop]);

    task.stop().await.unwrap();
}
