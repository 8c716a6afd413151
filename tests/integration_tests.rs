//! Integration tests for the performance telemetry engine.
//!
//! These tests verify end-to-end behaviour including:
//! - The analysis pipeline from calibration to insights
//! - Persistence through the `SQLite` store
//! - Configuration handling

#![allow(clippy::unwrap_used, clippy::expect_used)]

use perf_telemetry::config::{AnalysisConfig, Config};
use perf_telemetry::engine::PerformanceAnalyzer;
use perf_telemetry::error::ConfigError;
use perf_telemetry::metrics::MetricSnapshot;
use perf_telemetry::sources::{collect_all, SimulatedSource};
use perf_telemetry::storage::SqliteSnapshotStore;
use perf_telemetry::traits::SnapshotStore;
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

fn analyzer(calibration_target: usize) -> PerformanceAnalyzer {
    PerformanceAnalyzer::new(AnalysisConfig {
        calibration_target,
        ..AnalysisConfig::default()
    })
    .expect("valid config")
}

fn steady() -> MetricSnapshot {
    MetricSnapshot::new(0)
        .with("fps", 60.0)
        .with("frame_time", 16.0)
        .with("memory_used", 400.0)
        .with("network_latency", 40.0)
        .with("input_lag", 10.0)
}

/// Create a store in a temporary directory.
async fn create_test_store() -> (SqliteSnapshotStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("telemetry.db");
    let store = SqliteSnapshotStore::new(&db_path)
        .await
        .expect("Failed to create store");
    (store, temp_dir)
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[test]
fn test_frame_regression_after_calibration() {
    let mut analyzer = analyzer(10);
    for i in 0..10u64 {
        analyzer.analyze(i * 1_000, &steady()).expect("tick");
    }
    assert!(analyzer.analysis_results().calibrated);

    let degraded = steady().with("fps", 25.0).with("frame_time", 40.0);
    let summary = analyzer.analyze(10_000, &degraded).expect("tick");
    assert_eq!(summary.anomalies, 2);
    assert!(summary.violations >= 2);

    let results = analyzer.analysis_results();
    let anomalous: Vec<_> = results.anomalies.iter().map(|a| a.metric.as_str()).collect();
    assert_eq!(anomalous, vec!["fps", "frame_time"]);
    assert!(results.violation_stats.by_metric.contains_key("fps"));
    assert!(results.violation_stats.by_metric.contains_key("frame_time"));

    let titles: Vec<_> = analyzer
        .recent_insights(Some("rendering"))
        .into_iter()
        .map(|i| i.title)
        .collect();
    assert!(titles.contains(&"FPS Performance Bottleneck".to_string()));
    assert!(titles.contains(&"Frame Time Bottleneck".to_string()));

    let report = analyzer.insight_report(10_000);
    assert!(report.critical_issues + report.high_priority_issues >= 1);
    assert!(!report.recommendations.is_empty());
}

#[test]
fn test_results_stable_without_new_ticks() {
    let sources = SimulatedSource::standard_set(Some(7));
    let mut analyzer = analyzer(20);
    for i in 0..60u64 {
        let collected = collect_all(&sources, i * 1_000);
        analyzer
            .analyze(i * 1_000, &collected.snapshot)
            .expect("simulated sources always produce metrics");
    }

    let first = analyzer.analysis_results();
    let second = analyzer.analysis_results();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("encode"),
        serde_json::to_string(&second).expect("encode")
    );
    assert!(first.calibrated);
    assert!(first.statistics.descriptive.is_some());
}

#[test]
fn test_history_is_bounded() {
    let mut analyzer = PerformanceAnalyzer::new(AnalysisConfig {
        history_cap: 25,
        calibration_target: 5,
        ..AnalysisConfig::default()
    })
    .expect("valid config");
    for i in 0..100u64 {
        analyzer.analyze(i * 100, &steady()).expect("tick");
    }
    assert_eq!(analyzer.collector().history().len(), 25);
    assert_eq!(
        analyzer.collector().history().front().map(|s| s.timestamp),
        Some(7_500)
    );
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("telemetry.db");

    let mut original = analyzer(5);
    for i in 0..12u64 {
        original.analyze(i * 1_000, &steady()).expect("tick");
    }
    original
        .analyze(12_000, &steady().with("fps", 12.0))
        .expect("tick");

    {
        let store = SqliteSnapshotStore::new(&db_path).await.expect("open");
        store.save("analyzer", &original.save()).await.expect("save");
    }

    let store = SqliteSnapshotStore::new(&db_path).await.expect("reopen");
    let state = store.load("analyzer").await.expect("load").expect("stored");
    let mut restored = analyzer(5);
    restored.load(state);

    let (a, b) = (original.analysis_results(), restored.analysis_results());
    assert_eq!(a.baselines, b.baselines);
    assert_eq!(a.calibrated, b.calibrated);
    assert_eq!(a.anomalies, b.anomalies);
    assert_eq!(a.insights, b.insights);
    assert_eq!(a.thresholds, b.thresholds);
    assert_eq!(a.statistics, b.statistics);
    assert_eq!(a.violation_stats, b.violation_stats);

    // both continue identically on the next tick
    let next = steady().with("memory_used", 900.0);
    let sa = original.analyze(13_000, &next).expect("tick");
    let sb = restored.analyze(13_000, &next).expect("tick");
    assert_eq!(sa.anomalies, sb.anomalies);
    assert_eq!(
        original.analysis_results().baselines,
        restored.analysis_results().baselines
    );
}

#[tokio::test]
async fn test_missing_state_loads_nothing() {
    let (store, _temp_dir) = create_test_store().await;
    assert!(store.load("analyzer").await.expect("load").is_none());
}

// ============================================================================
// Configuration Tests
// ============================================================================

const ENV_VARS: [&str; 5] = [
    "PERF_CALIBRATION_TARGET",
    "PERF_METRICS_FILTER",
    "PERF_SAMPLING_RATE",
    "PERF_ANALYSIS_INTERVAL_MS",
    "PERF_ADAPTIVE_THRESHOLDS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_from_env() {
    clear_env();
    std::env::set_var("PERF_CALIBRATION_TARGET", "5");
    std::env::set_var("PERF_METRICS_FILTER", "fps, memory_used,");
    std::env::set_var("PERF_ADAPTIVE_THRESHOLDS", "false");

    let config = Config::from_env().expect("valid config");
    assert_eq!(config.analysis.calibration_target, 5);
    assert!(!config.analysis.adaptive_thresholds);
    assert_eq!(
        config.monitor.metrics_filter,
        vec!["fps".to_string(), "memory_used".to_string()]
    );
    assert!(config.monitor.allows("fps"));
    assert!(!config.monitor.allows("bandwidth"));
    clear_env();
}

#[test]
#[serial]
fn test_config_rejects_invalid_sampling_rate() {
    clear_env();
    std::env::set_var("PERF_SAMPLING_RATE", "1.5");
    let result = Config::from_env();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    clear_env();
}

#[test]
#[serial]
fn test_config_rejects_unparseable_interval() {
    clear_env();
    std::env::set_var("PERF_ANALYSIS_INTERVAL_MS", "soon");
    let result = Config::from_env();
    assert!(matches!(result, Err(ConfigError::InvalidValue { ref var, .. }) if var == "PERF_ANALYSIS_INTERVAL_MS"));
    clear_env();
}
