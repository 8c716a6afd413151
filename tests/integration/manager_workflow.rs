//! Analysis manager workflow tests.
//!
//! tick → save on shutdown → restart → load on start → continue

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use perf_telemetry::config::{AnalysisConfig, AnalysisConfigUpdate};
use perf_telemetry::engine::{AnalysisHandle, AnalysisManager};
use perf_telemetry::metrics::MetricSnapshot;
use perf_telemetry::sources::FnSource;
use perf_telemetry::storage::SqliteSnapshotStore;
use perf_telemetry::traits::{ManualTimeProvider, MetricSource, SnapshotStore};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn config() -> AnalysisConfig {
    AnalysisConfig {
        calibration_target: 4,
        ..AnalysisConfig::default()
    }
}

fn frames() -> Vec<Box<dyn MetricSource>> {
    vec![FnSource::boxed("frames", || {
        Ok(MetricSnapshot::new(0)
            .with("fps", 58.0)
            .with("frame_time", 17.0)
            .with("memory_used", 350.0))
    })]
}

struct Running {
    handle: AnalysisHandle,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        self.shutdown_tx.send(true).unwrap();
        self.task.await.unwrap();
    }
}

fn launch(store: Arc<dyn SnapshotStore>, clock: &ManualTimeProvider) -> Running {
    let (manager, handle) =
        AnalysisManager::new(config(), 60_000, frames(), Arc::new(clock.clone())).unwrap();
    let manager = manager.with_store(store, "session");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(manager.run(shutdown_rx));
    Running {
        handle,
        shutdown_tx,
        task,
    }
}

#[tokio::test]
async fn test_state_carries_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("telemetry.db");
    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteSnapshotStore::new(&db_path).await.unwrap());
    let clock = ManualTimeProvider::new(1_000);

    let first = launch(Arc::clone(&store), &clock);
    for _ in 0..6 {
        first.handle.trigger_tick().await.unwrap();
        clock.advance(1_000);
    }
    let before = first.handle.results().await.unwrap();
    assert!(before.calibrated);
    first.shutdown().await;

    let second = launch(Arc::clone(&store), &clock);
    let status = second.handle.status().await;
    assert!(status.calibrated);
    assert_eq!(status.history_len, 6);
    assert_eq!(status.last_tick_at, Some(6_000));

    let after = second.handle.results().await.unwrap();
    assert_eq!(before.baselines, after.baselines);
    assert_eq!(before.thresholds, after.thresholds);

    second.handle.trigger_tick().await.unwrap();
    assert_eq!(second.handle.status().await.history_len, 7);
    second.shutdown().await;
}

#[tokio::test]
async fn test_save_on_request_and_reset() {
    let temp_dir = TempDir::new().unwrap();
    let sqlite = SqliteSnapshotStore::new(temp_dir.path().join("telemetry.db"))
        .await
        .unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(sqlite.clone());
    let clock = ManualTimeProvider::new(0);

    let running = launch(store, &clock);
    running.handle.trigger_tick().await.unwrap();
    assert!(running.handle.save().await.unwrap());
    assert!(running.handle.status().await.last_saved_at.is_some());
    assert_eq!(sqlite.list_keys().await.unwrap(), vec!["session".to_string()]);

    running.handle.reset().await.unwrap();
    assert_eq!(running.handle.status().await.history_len, 0);

    // the stored copy is untouched by reset
    assert!(running.handle.load().await.unwrap());
    assert_eq!(running.handle.status().await.history_len, 1);

    running
        .handle
        .configure(AnalysisConfigUpdate {
            anomaly_detection_sensitivity: Some(0.5),
            ..AnalysisConfigUpdate::default()
        })
        .await
        .unwrap();
    running.shutdown().await;
}
