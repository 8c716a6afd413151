//! Error recovery and edge case tests.
//!
//! Tests how the system handles error conditions and recovers gracefully.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use perf_telemetry::config::{AnalysisConfig, MonitorConfig};
use perf_telemetry::engine::{AnalysisHandle, AnalysisManager, PerformanceAnalyzer};
use perf_telemetry::error::{AnalysisError, AppError, MonitorError, SourceError, StorageError};
use perf_telemetry::metrics::MetricSnapshot;
use perf_telemetry::monitor::{MonitorObserver, RealTimeMonitor, StreamPoint};
use perf_telemetry::sources::FnSource;
use perf_telemetry::storage::SqliteSnapshotStore;
use perf_telemetry::traits::{ManualTimeProvider, MetricSource, SnapshotStore};
use tempfile::TempDir;
use tokio::sync::watch;

fn broken() -> Box<dyn MetricSource> {
    FnSource::boxed("broken", || {
        Err(SourceError::Unavailable {
            source_name: "broken".into(),
            message: "device lost".into(),
        })
    })
}

fn healthy() -> Box<dyn MetricSource> {
    FnSource::boxed("healthy", || Ok(MetricSnapshot::new(0).with("fps", 60.0)))
}

#[test]
fn test_failing_source_does_not_abort_monitor_tick() {
    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(broken());
    monitor.add_source(healthy());

    let metrics = monitor.tick(1_000).expect("healthy source still reports");
    assert_eq!(metrics.get("fps"), Some(60.0));
    let stats = monitor.stats();
    assert_eq!(stats.source_failures, 1);
    assert_eq!(stats.ticks, 1);
}

fn panicking() -> Box<dyn MetricSource> {
    FnSource::boxed("panicking", || -> Result<MetricSnapshot, SourceError> {
        panic!("driver crashed")
    })
}

fn non_finite() -> Box<dyn MetricSource> {
    FnSource::boxed("glitchy", || {
        Ok(MetricSnapshot::new(0)
            .with("fps", f64::NAN)
            .with("frame_time", f64::INFINITY)
            .with("memory_used", 256.0))
    })
}

#[test]
fn test_panicking_source_counts_as_failure_in_monitor() {
    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(panicking());
    monitor.add_source(healthy());

    let metrics = monitor.tick(1_000).expect("healthy source still reports");
    assert_eq!(metrics.get("fps"), Some(60.0));
    assert_eq!(monitor.stats().source_failures, 1);
}

#[test]
fn test_non_finite_source_values_never_reach_monitor_stream() {
    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(healthy());
    monitor.add_source(non_finite());

    let metrics = monitor.tick(1_000).unwrap();
    // the NaN from the later source does not overwrite the earlier reading
    assert_eq!(metrics.get("fps"), Some(60.0));
    assert_eq!(metrics.get("frame_time"), None);

    let points = monitor.stream_buffer();
    assert_eq!(points.len(), 1);
    assert!(points[0].metrics.values().all(|v| v.is_finite()));
    assert!(monitor.active_events().is_empty());
}

#[test]
fn test_all_sources_failing_skips_tick() {
    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(broken());
    assert!(monitor.tick(1_000).is_none());
    assert_eq!(monitor.stats().skipped_ticks, 1);
    assert!(monitor.stream_buffer().is_empty());
}

#[test]
fn test_panicking_observer_and_subscriber_are_contained() {
    struct Exploding;
    impl MonitorObserver for Exploding {
        fn on_realtime_data(&self, _timestamp: u64, _metrics: &MetricSnapshot) {
            panic!("observer exploded");
        }
    }

    let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
    monitor.add_source(healthy());
    monitor.set_observer(Arc::new(Exploding));

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let _bad = monitor.subscribe(Box::new(|_: &StreamPoint| -> Result<(), MonitorError> {
        panic!("subscriber exploded")
    }));
    let _good = monitor.subscribe(Box::new(move |_: &StreamPoint| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    assert!(monitor.tick(1_000).is_some());
    assert!(monitor.tick(2_000).is_some());
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert_eq!(monitor.stream_buffer().len(), 2);
}

#[test]
fn test_non_finite_values_are_dropped() {
    let mut analyzer = PerformanceAnalyzer::new(AnalysisConfig::default()).unwrap();
    let only_nan = MetricSnapshot::new(0).with("fps", f64::NAN);
    assert_eq!(
        analyzer.analyze(0, &only_nan).unwrap_err(),
        AnalysisError::EmptySnapshot
    );

    let mixed = MetricSnapshot::new(0)
        .with("fps", f64::INFINITY)
        .with("memory_used", 300.0);
    analyzer.analyze(1_000, &mixed).unwrap();
    let recorded = analyzer.collector().history().back().unwrap();
    assert_eq!(recorded.get("fps"), None);
    assert_eq!(recorded.get("memory_used"), Some(300.0));
}

#[test]
fn test_snapshot_from_json_rejects_non_objects() {
    let err = MetricSnapshot::from_json(0, &serde_json::json!([1, 2])).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidSnapshot { .. }));

    let err = MetricSnapshot::from_json(0, &serde_json::json!({"label": "x"})).unwrap_err();
    assert_eq!(err, AnalysisError::EmptySnapshot);
}

#[tokio::test]
async fn test_corrupt_state_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let sqlite = SqliteSnapshotStore::new(temp_dir.path().join("telemetry.db"))
        .await
        .unwrap();
    sqlite
        .put_payload("analyzer", "{not json", chrono::Utc::now())
        .await
        .unwrap();
    assert!(matches!(
        sqlite.load("analyzer").await,
        Err(StorageError::Serialization { .. })
    ));

    let (manager, handle) = AnalysisManager::new(
        AnalysisConfig::default(),
        60_000,
        vec![healthy()],
        Arc::new(ManualTimeProvider::new(0)),
    )
    .unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(sqlite);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(manager.with_store(store, "analyzer").run(shutdown_rx));

    let status = handle.status().await;
    assert!(status.running);
    assert_eq!(status.history_len, 0);
    handle.trigger_tick().await.unwrap();

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_panicking_source_does_not_stop_manager() {
    let (manager, handle) = AnalysisManager::new(
        AnalysisConfig::default(),
        60_000,
        vec![panicking(), healthy()],
        Arc::new(ManualTimeProvider::new(0)),
    )
    .unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(manager.run(shutdown_rx));

    handle.trigger_tick().await.unwrap();
    handle.trigger_tick().await.unwrap();

    let status = handle.status().await;
    assert!(status.running);
    assert_eq!(status.total_ticks, 2);
    assert_eq!(status.source_failures, 2);
    assert!(handle.results().await.is_ok());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_non_finite_source_values_persist_cleanly() {
    let sqlite = SqliteSnapshotStore::new_in_memory().await.unwrap();
    let config = AnalysisConfig {
        calibration_target: 1,
        ..AnalysisConfig::default()
    };
    let (manager, handle) = AnalysisManager::new(
        config,
        60_000,
        vec![non_finite()],
        Arc::new(ManualTimeProvider::new(0)),
    )
    .unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(sqlite.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(manager.with_store(store, "analyzer").run(shutdown_rx));

    handle.trigger_tick().await.unwrap();
    let results = handle.results().await.unwrap();
    assert!(results.calibrated);
    assert_eq!(results.baselines.get("memory_used"), Some(&256.0));
    assert!(!results.baselines.contains_key("fps"));
    assert!(!results.baselines.contains_key("frame_time"));
    assert!(handle.save().await.unwrap());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    let state = sqlite.load("analyzer").await.unwrap().expect("saved state");
    assert_eq!(state.baseline, results.baselines);
}

#[tokio::test]
async fn test_handle_after_shutdown_reports_unavailable() {
    let (manager, handle) = AnalysisManager::new(
        AnalysisConfig::default(),
        60_000,
        vec![healthy()],
        Arc::new(ManualTimeProvider::new(0)),
    )
    .unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(manager.run(shutdown_rx));
    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    assert!(matches!(
        handle.trigger_tick().await,
        Err(AppError::Monitor(MonitorError::TaskUnavailable { .. }))
    ));
    assert!(!handle.status().await.running);

    let detached = AnalysisHandle::for_testing();
    assert!(detached.reset().await.is_err());
}
