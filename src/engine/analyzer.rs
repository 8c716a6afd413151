//! The analysis orchestrator.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::PersistedState;
use crate::analysis::{
    Anomaly, AnomalyDetector, Insight, InsightContext, InsightGenerator, InsightReport,
    StatisticalProcessor, StatisticsSnapshot, ThresholdManager, ThresholdSet, TrendAnalyzer,
    TrendState, ViolationStats,
};
use crate::config::{validate_analysis, AnalysisConfig, AnalysisConfigUpdate};
use crate::error::{isolate, AnalysisError, ConfigError};
use crate::metrics::{MetricSnapshot, MetricsCollector};

/// Anomalies included in [`AnalysisResults`].
pub const RESULT_ANOMALIES: usize = 20;

/// Insights included in [`AnalysisResults`].
pub const RESULT_INSIGHTS: usize = 50;

/// What one tick produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Whether this tick completed calibration.
    pub calibrated_now: bool,
    /// New anomalies.
    pub anomalies: usize,
    /// New threshold violations.
    pub violations: usize,
    /// New insights.
    pub insights: usize,
}

/// Read-only view of the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// Latest trend per metric.
    pub trends: BTreeMap<String, TrendState>,
    /// Most recent anomalies.
    pub anomalies: Vec<Anomaly>,
    /// Most recent insights.
    pub insights: Vec<Insight>,
    /// Latest statistics.
    pub statistics: StatisticsSnapshot,
    /// Baselines by metric.
    pub baselines: BTreeMap<String, f64>,
    /// Whether calibration finished.
    pub calibrated: bool,
    /// Calibration progress in `[0, 1]`.
    pub calibration_progress: f64,
    /// Dynamic thresholds.
    pub thresholds: BTreeMap<String, ThresholdSet>,
    /// Violation summary as of the last tick.
    pub violation_stats: ViolationStats,
}

/// Owns every analysis unit and drives them once per tick.
#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    config: AnalysisConfig,
    collector: MetricsCollector,
    trends: TrendAnalyzer,
    statistics: StatisticalProcessor,
    thresholds: ThresholdManager,
    anomalies: AnomalyDetector,
    insights: InsightGenerator,
    last_tick: Option<u64>,
}

impl PerformanceAnalyzer {
    /// Create an analyzer with default units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        validate_analysis(&config)?;
        let mut insights = InsightGenerator::default();
        insights.cap_intervals(config.insight_generation_interval_ms);
        let mut thresholds = ThresholdManager::with_defaults();
        thresholds.configure(
            config.adaptation_rate,
            config.violation_sensitivity,
            config.adaptive_thresholds,
        );

        Ok(Self {
            collector: MetricsCollector::new(config.history_cap, config.calibration_target),
            trends: TrendAnalyzer::with_defaults(config.trend_analysis_window_ms),
            statistics: StatisticalProcessor::default(),
            thresholds,
            anomalies: AnomalyDetector::new(config.anomaly_detection_sensitivity),
            insights,
            last_tick: None,
            config,
        })
    }

    /// Run one analysis tick.
    ///
    /// Order: record, calibrate or adapt, trends, anomalies, thresholds,
    /// statistics, insights. A fault inside one unit is logged and the
    /// remaining units still run.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::EmptySnapshot`] if the snapshot has no
    /// metrics. Nothing is recorded in that case.
    pub fn analyze(
        &mut self,
        timestamp: u64,
        snapshot: &MetricSnapshot,
    ) -> Result<TickSummary, AnalysisError> {
        let mut snapshot = snapshot.finite();
        snapshot.validate()?;
        snapshot.timestamp = timestamp;

        let mut summary = TickSummary {
            timestamp,
            ..TickSummary::default()
        };

        summary.calibrated_now = self
            .collector
            .ingest(&snapshot, self.config.adaptive_thresholds);
        if summary.calibrated_now {
            tracing::info!(
                metrics = self.collector.baselines().values().len(),
                "Baseline calibration complete"
            );
        }

        self.trends.update(&snapshot);

        summary.anomalies = self
            .anomalies
            .detect(&snapshot, self.collector.baselines())
            .len();

        let thresholds = &mut self.thresholds;
        summary.violations = isolate("thresholds", || Ok(thresholds.update_snapshot(&snapshot)))
            .map_or(0, |v| v.len());

        let window = self
            .collector
            .recent(timestamp, self.config.statistical_window_ms);
        self.statistics.process(timestamp, &window);

        let ctx = InsightContext {
            timestamp,
            metrics: &snapshot,
            trends: self.trends.trends(),
            anomalies: self.anomalies.anomalies(),
            baselines: self.collector.baselines().values(),
            statistics: self.statistics.snapshot(),
        };
        summary.insights = self.insights.generate(&ctx).len();

        self.last_tick = Some(timestamp);
        Ok(summary)
    }

    /// Current results. Equal across calls while no tick runs.
    #[must_use]
    pub fn analysis_results(&self) -> AnalysisResults {
        AnalysisResults {
            trends: self.trends.trends().clone(),
            anomalies: self.anomalies.recent(RESULT_ANOMALIES),
            insights: self.insights.last(RESULT_INSIGHTS),
            statistics: self.statistics.snapshot().clone(),
            baselines: self.collector.baselines().values().clone(),
            calibrated: self.collector.is_calibrated(),
            calibration_progress: self.collector.calibration_progress(),
            thresholds: self.thresholds.dynamic_all().clone(),
            violation_stats: self
                .thresholds
                .violation_stats(self.last_tick.unwrap_or_default()),
        }
    }

    /// Latest trend for a metric.
    #[must_use]
    pub fn trend(&self, metric: &str) -> Option<&TrendState> {
        self.trends.trend(metric)
    }

    /// Recent insights, optionally filtered by category.
    #[must_use]
    pub fn recent_insights(&self, category: Option<&str>) -> Vec<Insight> {
        self.insights.recent(category)
    }

    /// Insight report as of `now`.
    #[must_use]
    pub fn insight_report(&self, now: u64) -> InsightReport {
        self.insights.report(now)
    }

    /// Violation summary as of `now`.
    #[must_use]
    pub fn violation_stats(&self, now: u64) -> ViolationStats {
        self.thresholds.violation_stats(now)
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Timestamp of the last tick.
    #[must_use]
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// The collector, for history and baseline queries.
    #[must_use]
    pub const fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// Apply a partial configuration update.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and changes nothing if the result is invalid.
    pub fn configure(&mut self, update: &AnalysisConfigUpdate) -> Result<(), ConfigError> {
        self.config.apply(update)?;
        self.propagate_config();
        tracing::info!("Analysis configuration updated");
        Ok(())
    }

    fn propagate_config(&mut self) {
        let config = &self.config;
        self.anomalies
            .set_sensitivity(config.anomaly_detection_sensitivity);
        self.thresholds.configure(
            config.adaptation_rate,
            config.violation_sensitivity,
            config.adaptive_thresholds,
        );
        self.trends.set_max_age(config.trend_analysis_window_ms);
        self.collector.set_history_cap(config.history_cap);
        self.insights
            .cap_intervals(config.insight_generation_interval_ms);
    }

    /// Drop all analysis state, including calibration.
    pub fn reset(&mut self) {
        self.collector = MetricsCollector::new(self.config.history_cap, self.config.calibration_target);
        self.trends.clear();
        self.statistics.clear();
        self.thresholds.clear();
        self.anomalies.clear();
        self.insights.clear();
        self.last_tick = None;
        tracing::info!("Analysis state reset");
    }

    /// Capture state for persistence.
    #[must_use]
    pub fn save(&self) -> PersistedState {
        PersistedState {
            config: self.config.clone(),
            baseline: self.collector.baselines().values().clone(),
            calibrated: self.collector.is_calibrated(),
            anomalies: self.anomalies.anomalies().iter().cloned().collect(),
            metrics: self.collector.history().iter().cloned().collect(),
            statistics: self.statistics.snapshot().clone(),
            insights: self.insights.insights().iter().cloned().collect(),
            thresholds: self.thresholds.state(),
            saved_at: Utc::now(),
        }
    }

    /// Replace state with a persisted one. An invalid persisted config is
    /// ignored and the current config kept.
    pub fn load(&mut self, state: PersistedState) {
        match validate_analysis(&state.config) {
            Ok(()) => {
                self.config = state.config;
                self.propagate_config();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid persisted configuration");
            }
        }

        self.collector = MetricsCollector::new(self.config.history_cap, self.config.calibration_target);
        self.collector
            .restore(state.metrics, state.baseline, state.calibrated);
        self.trends.rebuild(self.collector.history());
        self.statistics.restore(state.statistics);
        self.thresholds.clear();
        self.thresholds.restore(state.thresholds);
        self.anomalies.restore(state.anomalies);
        self.insights.clear();
        self.insights.restore(state.insights);
        self.last_tick = self.collector.history().back().map(|s| s.timestamp);

        tracing::info!(
            history = self.collector.history().len(),
            calibrated = self.collector.is_calibrated(),
            saved_at = %state.saved_at,
            "Analysis state loaded"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::analysis::{TrendDirection, ViolationKind};
    use pretty_assertions::assert_eq;

    fn config(calibration_target: usize) -> AnalysisConfig {
        AnalysisConfig {
            calibration_target,
            ..AnalysisConfig::default()
        }
    }

    fn steady(ts: u64) -> MetricSnapshot {
        MetricSnapshot::new(ts)
            .with("fps", 60.0)
            .with("frame_time", 16.0)
            .with("memory_used", 400.0)
            .with("network_latency", 40.0)
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PerformanceAnalyzer::new(AnalysisConfig {
            adaptation_rate: 0.0,
            ..AnalysisConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_empty_snapshot_rejected_and_not_recorded() {
        let mut analyzer = PerformanceAnalyzer::new(config(5)).unwrap();
        let err = analyzer.analyze(0, &MetricSnapshot::new(0)).unwrap_err();
        assert_eq!(err, AnalysisError::EmptySnapshot);
        assert!(analyzer.collector().history().is_empty());
        assert_eq!(analyzer.last_tick(), None);
    }

    #[test]
    fn test_non_finite_metrics_never_reach_baselines() {
        let mut analyzer = PerformanceAnalyzer::new(config(1)).unwrap();
        let mut snapshot = MetricSnapshot::new(0).with("memory_used", 100.0);
        snapshot.merge(&MetricSnapshot::new(0).with("fps", f64::NAN));
        assert!(!snapshot.insert("frame_time", f64::INFINITY));

        let summary = analyzer.analyze(1_000, &snapshot).unwrap();
        assert!(summary.calibrated_now);
        let results = analyzer.analysis_results();
        assert_eq!(results.baselines.get("fps"), None);
        assert_eq!(results.baselines.get("memory_used"), Some(&100.0));

        let payload = analyzer.save().to_json().unwrap();
        let state = PersistedState::from_json(&payload).unwrap();
        let mut restored = PerformanceAnalyzer::new(config(1)).unwrap();
        restored.load(state);
        assert_eq!(restored.analysis_results().baselines, results.baselines);
    }

    #[test]
    fn test_calibration_then_anomaly() {
        let mut analyzer = PerformanceAnalyzer::new(config(5)).unwrap();
        let mut calibrated_at = None;
        for i in 0..5u64 {
            let summary = analyzer.analyze(i * 1_000, &steady(0)).unwrap();
            if summary.calibrated_now {
                calibrated_at = Some(i);
            }
        }
        assert_eq!(calibrated_at, Some(4));

        let results = analyzer.analysis_results();
        assert!(results.calibrated);
        assert_eq!(results.baselines["fps"], 60.0);

        let summary = analyzer
            .analyze(5_000, &steady(0).with("fps", 20.0))
            .unwrap();
        assert_eq!(summary.anomalies, 1);
        // 20 fps is below the warning floor
        assert_eq!(summary.violations, 1);
        let results = analyzer.analysis_results();
        assert_eq!(results.anomalies[0].metric, "fps");
        assert_eq!(results.violation_stats.total, 1);
    }

    #[test]
    fn test_results_are_idempotent() {
        let mut analyzer = PerformanceAnalyzer::new(config(3)).unwrap();
        for i in 0..10u64 {
            analyzer.analyze(i * 1_000, &steady(0)).unwrap();
        }
        assert_eq!(analyzer.analysis_results(), analyzer.analysis_results());
    }

    #[test]
    fn test_insights_flow_from_tick() {
        let mut analyzer = PerformanceAnalyzer::new(config(3)).unwrap();
        for i in 0..3u64 {
            analyzer.analyze(i * 1_000, &steady(0)).unwrap();
        }
        let summary = analyzer
            .analyze(3_000, &steady(0).with("cpu_usage", 95.0))
            .unwrap();
        assert!(summary.insights >= 1);
        let report = analyzer.insight_report(3_000);
        assert!(report.categories.contains_key("cpu"));
        assert_eq!(analyzer.recent_insights(Some("cpu")).len(), 1);
    }

    #[test]
    fn test_trend_reported() {
        let mut analyzer = PerformanceAnalyzer::new(config(100)).unwrap();
        for i in 0..30u32 {
            let snapshot = MetricSnapshot::new(0).with("memory_used", 100.0 + f64::from(i) * 5.0);
            analyzer.analyze(u64::from(i) * 1_000, &snapshot).unwrap();
        }
        let trend = analyzer.trend("memory_used").unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
    }

    #[test]
    fn test_configure_rejects_and_applies() {
        let mut analyzer = PerformanceAnalyzer::new(config(3)).unwrap();
        let bad = AnalysisConfigUpdate {
            anomaly_detection_sensitivity: Some(2.0),
            ..AnalysisConfigUpdate::default()
        };
        assert!(analyzer.configure(&bad).is_err());
        assert_eq!(analyzer.config().anomaly_detection_sensitivity, 0.8);

        let good = AnalysisConfigUpdate {
            violation_sensitivity: Some(2.0),
            ..AnalysisConfigUpdate::default()
        };
        analyzer.configure(&good).unwrap();
        assert_eq!(analyzer.config().violation_sensitivity, 2.0);

        // halved distance: fps warning floor moves from 45 to 52.5
        analyzer
            .analyze(0, &MetricSnapshot::new(0).with("fps", 50.0))
            .unwrap();
        let results = analyzer.analysis_results();
        assert_eq!(results.violation_stats.total, 1);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut analyzer = PerformanceAnalyzer::new(config(3)).unwrap();
        for i in 0..6u64 {
            analyzer.analyze(i * 1_000, &steady(0)).unwrap();
        }
        analyzer
            .analyze(6_000, &steady(0).with("fps", 10.0))
            .unwrap();
        let saved = analyzer.save();
        assert_eq!(saved.metrics.len(), 7);
        assert!(saved.calibrated);

        let mut restored = PerformanceAnalyzer::new(config(3)).unwrap();
        restored.load(saved.clone());
        let (a, b) = (analyzer.analysis_results(), restored.analysis_results());
        assert_eq!(a.baselines, b.baselines);
        assert_eq!(a.anomalies, b.anomalies);
        assert_eq!(a.insights, b.insights);
        assert_eq!(a.thresholds, b.thresholds);
        assert_eq!(a.violation_stats, b.violation_stats);
        assert_eq!(a.trends.keys().collect::<Vec<_>>(), b.trends.keys().collect::<Vec<_>>());
        assert_eq!(restored.last_tick(), Some(6_000));
        assert_eq!(
            restored.thresholds.violations().back().unwrap().kind,
            ViolationKind::CriticalLow
        );
    }

    #[test]
    fn test_load_ignores_invalid_config() {
        let mut analyzer = PerformanceAnalyzer::new(config(3)).unwrap();
        let state = PersistedState {
            config: AnalysisConfig {
                history_cap: 0,
                ..AnalysisConfig::default()
            },
            ..PersistedState::default()
        };
        analyzer.load(state);
        assert_eq!(analyzer.config().history_cap, AnalysisConfig::default().history_cap);
        assert_eq!(analyzer.config().calibration_target, 3);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut analyzer = PerformanceAnalyzer::new(config(2)).unwrap();
        for i in 0..4u64 {
            analyzer.analyze(i * 1_000, &steady(0)).unwrap();
        }
        analyzer.reset();
        let results = analyzer.analysis_results();
        assert!(!results.calibrated);
        assert!(results.baselines.is_empty());
        assert!(results.trends.is_empty());
        assert!(analyzer.collector().history().is_empty());
    }
}
