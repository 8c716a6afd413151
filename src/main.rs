//! Performance telemetry binary entry point.
//!
//! Runs the analysis manager and the real-time monitor against the
//! simulated sources until Ctrl-C, then saves the analyzer state.
//! All logs go to stderr.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use perf_telemetry::config::Config;
use perf_telemetry::engine::{AnalysisManager, DEFAULT_STATE_KEY};
use perf_telemetry::metrics::MetricSnapshot;
use perf_telemetry::monitor::{
    EventPhase, MonitorObserver, MonitorTask, PerformanceEvent, RealTimeMonitor,
};
use perf_telemetry::sources::SimulatedSource;
use perf_telemetry::storage::SqliteSnapshotStore;
use perf_telemetry::traits::{RealTimeProvider, SnapshotStore, TimeProvider};
use tokio::sync::{watch, Mutex};

/// Logs every event transition.
struct LoggingObserver;

impl MonitorObserver for LoggingObserver {
    fn on_realtime_data(&self, timestamp: u64, metrics: &MetricSnapshot) {
        tracing::trace!(timestamp, metrics = metrics.len(), "Realtime data");
    }

    fn on_performance_event(&self, phase: EventPhase, event: &PerformanceEvent) {
        tracing::info!(
            phase = ?phase,
            event = %event.kind,
            severity = %event.severity,
            duration_ms = ?event.duration_ms,
            "Performance event"
        );
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let filter = config
        .log_level
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }

    tracing::info!(
        database = %config.database_path,
        analysis_interval_ms = config.analysis_interval_ms,
        monitor_interval_ms = config.monitor.interval_ms,
        dashboard = config.monitor.enable_dashboard,
        "perf-telemetry starting..."
    );

    let store: Option<Arc<dyn SnapshotStore>> =
        match SqliteSnapshotStore::new(&config.database_path).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Persistence disabled");
                None
            }
        };

    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);

    let (manager, handle) = match AnalysisManager::new(
        config.analysis.clone(),
        config.analysis_interval_ms,
        SimulatedSource::standard_set(None),
        Arc::clone(&clock),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("Analysis configuration error: {e}");
            std::process::exit(1);
        }
    };
    let manager = match store {
        Some(store) => manager.with_store(store, DEFAULT_STATE_KEY),
        None => manager,
    };

    let mut monitor = match RealTimeMonitor::new(config.monitor.clone()) {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!("Monitor configuration error: {e}");
            std::process::exit(1);
        }
    };
    for source in SimulatedSource::standard_set(None) {
        monitor.add_source(source);
    }
    monitor.set_observer(Arc::new(LoggingObserver));
    let mut monitor_task = MonitorTask::new(Arc::new(Mutex::new(monitor)), clock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let manager_task = tokio::spawn(manager.run(shutdown_rx));

    if let Err(e) = monitor_task.start().await {
        tracing::error!("Failed to start monitor: {e}");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown requested");

    if let Err(e) = monitor_task.stop().await {
        tracing::warn!("Monitor stop: {e}");
    }

    let status = handle.status().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = manager_task.await {
        tracing::error!("Analysis manager task failed: {e}");
    }

    tracing::info!(
        ticks = status.total_ticks,
        calibrated = status.calibrated,
        "perf-telemetry shutdown complete"
    );
}
