//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use perf_telemetry::config::{AnalysisConfig, Config, MonitorConfig};
//!
//! // Use Config::from_env() in production
//! let config = Config {
//!     database_path: "./data/telemetry.db".to_string(),
//!     log_level: "info".to_string(),
//!     log_json: false,
//!     analysis_interval_ms: 1000,
//!     monitor: MonitorConfig::default(),
//!     analysis: AnalysisConfig::default(),
//! };
//!
//! assert!(perf_telemetry::config::validate_config(&config).is_ok());
//! ```

mod validation;

pub use validation::{
    validate_analysis, validate_config, validate_monitor, MAX_BUFFER_SIZE, MAX_INTERVAL_MS,
    MIN_INTERVAL_MS,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default database path.
pub const DEFAULT_DATABASE_PATH: &str = "./data/telemetry.db";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default analysis tick interval in milliseconds.
pub const DEFAULT_ANALYSIS_INTERVAL_MS: u64 = 1000;

/// Default real-time monitor interval in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;

/// Default stream buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default event retention (24 hours).
pub const DEFAULT_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;

/// Default anomaly score above which an anomaly is recorded.
pub const DEFAULT_ANOMALY_SENSITIVITY: f64 = 0.8;

/// Default smoothing rate for dynamic thresholds.
pub const DEFAULT_ADAPTATION_RATE: f64 = 0.1;

/// Default calibration sample count.
pub const DEFAULT_CALIBRATION_TARGET: usize = 100;

/// Default analysis history cap.
pub const DEFAULT_HISTORY_CAP: usize = 1000;

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Database path for persisted analysis state.
    pub database_path: String,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    /// Interval between analysis ticks in milliseconds.
    pub analysis_interval_ms: u64,
    /// Real-time monitor settings.
    pub monitor: MonitorConfig,
    /// Analysis engine settings.
    pub analysis: AnalysisConfig,
}

/// Real-time monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,
    /// Advertised to dashboard consumers. The engine renders nothing itself
    /// and only reports the flag at startup.
    pub enable_dashboard: bool,
    /// Keep performance event history.
    pub enable_history: bool,
    /// Emit performance events through the observer.
    pub enable_alerts: bool,
    /// Push every tick into the stream buffer.
    pub enable_realtime_stream: bool,
    /// Metric allow-list. Empty means every metric passes.
    pub metrics_filter: Vec<String>,
    /// Retention for event history in milliseconds.
    pub retention_ms: u64,
    /// Stream buffer capacity.
    pub buffer_size: usize,
    /// Probability that a tick is processed, in `[0, 1]`.
    pub sampling_rate: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            enable_dashboard: true,
            enable_history: true,
            enable_alerts: true,
            enable_realtime_stream: true,
            metrics_filter: Vec::new(),
            retention_ms: DEFAULT_RETENTION_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            sampling_rate: 1.0,
        }
    }
}

impl MonitorConfig {
    /// Whether a metric passes the allow-list.
    #[must_use]
    pub fn allows(&self, metric: &str) -> bool {
        self.metrics_filter.is_empty() || self.metrics_filter.iter().any(|m| m == metric)
    }
}

/// Analysis engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Anomaly score above which an anomaly is recorded.
    pub anomaly_detection_sensitivity: f64,
    /// Exponential smoothing rate for dynamic thresholds.
    pub adaptation_rate: f64,
    /// Scales each threshold's distance from target.
    pub violation_sensitivity: f64,
    /// Window for statistical processing in milliseconds.
    pub statistical_window_ms: u64,
    /// Maximum age of samples kept by trend analyzers in milliseconds.
    pub trend_analysis_window_ms: u64,
    /// Upper bound on every insight rule's cooldown in milliseconds.
    pub insight_generation_interval_ms: u64,
    /// Samples needed before the baseline is calibrated.
    pub calibration_target: usize,
    /// Analysis history cap.
    pub history_cap: usize,
    /// Adapt baselines and thresholds after calibration.
    pub adaptive_thresholds: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anomaly_detection_sensitivity: DEFAULT_ANOMALY_SENSITIVITY,
            adaptation_rate: DEFAULT_ADAPTATION_RATE,
            violation_sensitivity: 1.0,
            statistical_window_ms: 60_000,
            trend_analysis_window_ms: 300_000,
            insight_generation_interval_ms: 60_000,
            calibration_target: DEFAULT_CALIBRATION_TARGET,
            history_cap: DEFAULT_HISTORY_CAP,
            adaptive_thresholds: true,
        }
    }
}

/// Partial update for [`AnalysisConfig`].
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfigUpdate {
    /// New anomaly sensitivity.
    pub anomaly_detection_sensitivity: Option<f64>,
    /// New adaptation rate.
    pub adaptation_rate: Option<f64>,
    /// New violation sensitivity.
    pub violation_sensitivity: Option<f64>,
    /// New statistical window.
    pub statistical_window_ms: Option<u64>,
    /// New trend window.
    pub trend_analysis_window_ms: Option<u64>,
    /// New insight interval.
    pub insight_generation_interval_ms: Option<u64>,
    /// Toggle adaptive mode.
    pub adaptive_thresholds: Option<bool>,
}

impl AnalysisConfig {
    /// Apply a partial update and validate the result.
    ///
    /// The receiver is left untouched when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the merged config is invalid.
    pub fn apply(&mut self, update: &AnalysisConfigUpdate) -> Result<(), ConfigError> {
        let mut next = self.clone();
        if let Some(v) = update.anomaly_detection_sensitivity {
            next.anomaly_detection_sensitivity = v;
        }
        if let Some(v) = update.adaptation_rate {
            next.adaptation_rate = v;
        }
        if let Some(v) = update.violation_sensitivity {
            next.violation_sensitivity = v;
        }
        if let Some(v) = update.statistical_window_ms {
            next.statistical_window_ms = v;
        }
        if let Some(v) = update.trend_analysis_window_ms {
            next.trend_analysis_window_ms = v;
        }
        if let Some(v) = update.insight_generation_interval_ms {
            next.insight_generation_interval_ms = v;
        }
        if let Some(v) = update.adaptive_thresholds {
            next.adaptive_thresholds = v;
        }
        validate_analysis(&next)?;
        *self = next;
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables (with defaults):
    /// - `PERF_DATABASE_PATH`: Path to `SQLite` database (default: `./data/telemetry.db`)
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `LOG_JSON`: Emit JSON log lines (default: `false`)
    /// - `PERF_ANALYSIS_INTERVAL_MS`: Analysis tick interval (default: `1000`)
    /// - `PERF_MONITOR_INTERVAL_MS`: Monitor tick interval (default: `1000`)
    /// - `PERF_BUFFER_SIZE`: Stream buffer capacity (default: `1000`)
    /// - `PERF_SAMPLING_RATE`: Monitor sampling probability (default: `1.0`)
    /// - `PERF_METRICS_FILTER`: Comma separated metric allow-list (default: empty)
    /// - `PERF_RETENTION_MS`: Event retention (default: 24h)
    /// - `PERF_ANOMALY_SENSITIVITY`: Anomaly score cut-off (default: `0.8`)
    /// - `PERF_ADAPTATION_RATE`: Threshold smoothing rate (default: `0.1`)
    /// - `PERF_VIOLATION_SENSITIVITY`: Threshold distance scale (default: `1.0`)
    /// - `PERF_CALIBRATION_TARGET`: Calibration sample count (default: `100`)
    /// - `PERF_ENABLE_STREAM`: Enable the real-time stream (default: `true`)
    /// - `PERF_ENABLE_HISTORY`: Keep performance event history (default: `true`)
    /// - `PERF_ENABLE_ALERTS`: Emit performance events to the observer (default: `true`)
    /// - `PERF_ENABLE_DASHBOARD`: Advertise the dashboard feed (default: `true`)
    /// - `PERF_ADAPTIVE_THRESHOLDS`: Enable adaptive baselines and thresholds (default: `true`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed or fails
    /// validation (see [`validate_config`]).
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let database_path =
            std::env::var("PERF_DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.into());
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());
        let log_json = parse_env_bool("LOG_JSON", false)?;
        let analysis_interval_ms =
            parse_env_u64("PERF_ANALYSIS_INTERVAL_MS", DEFAULT_ANALYSIS_INTERVAL_MS)?;

        let monitor_defaults = MonitorConfig::default();
        let metrics_filter = std::env::var("PERF_METRICS_FILTER")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let monitor = MonitorConfig {
            interval_ms: parse_env_u64("PERF_MONITOR_INTERVAL_MS", DEFAULT_MONITOR_INTERVAL_MS)?,
            enable_realtime_stream: parse_env_bool(
                "PERF_ENABLE_STREAM",
                monitor_defaults.enable_realtime_stream,
            )?,
            enable_history: parse_env_bool("PERF_ENABLE_HISTORY", monitor_defaults.enable_history)?,
            enable_alerts: parse_env_bool("PERF_ENABLE_ALERTS", monitor_defaults.enable_alerts)?,
            enable_dashboard: parse_env_bool(
                "PERF_ENABLE_DASHBOARD",
                monitor_defaults.enable_dashboard,
            )?,
            metrics_filter,
            retention_ms: parse_env_u64("PERF_RETENTION_MS", DEFAULT_RETENTION_MS)?,
            buffer_size: parse_env_usize("PERF_BUFFER_SIZE", DEFAULT_BUFFER_SIZE)?,
            sampling_rate: parse_env_f64("PERF_SAMPLING_RATE", monitor_defaults.sampling_rate)?,
            ..monitor_defaults
        };

        let analysis_defaults = AnalysisConfig::default();
        let analysis = AnalysisConfig {
            anomaly_detection_sensitivity: parse_env_f64(
                "PERF_ANOMALY_SENSITIVITY",
                DEFAULT_ANOMALY_SENSITIVITY,
            )?,
            adaptation_rate: parse_env_f64("PERF_ADAPTATION_RATE", DEFAULT_ADAPTATION_RATE)?,
            violation_sensitivity: parse_env_f64(
                "PERF_VIOLATION_SENSITIVITY",
                analysis_defaults.violation_sensitivity,
            )?,
            calibration_target: parse_env_usize(
                "PERF_CALIBRATION_TARGET",
                DEFAULT_CALIBRATION_TARGET,
            )?,
            adaptive_thresholds: parse_env_bool(
                "PERF_ADAPTIVE_THRESHOLDS",
                analysis_defaults.adaptive_thresholds,
            )?,
            ..analysis_defaults
        };

        let config = Self {
            database_path,
            log_level,
            log_json,
            analysis_interval_ms,
            monitor,
            analysis,
        };

        validate_config(&config)?;
        Ok(config)
    }
}

/// Parse an environment variable as u64, using a default if not set.
fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as usize, using a default if not set.
fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as a finite f64, using a default if not set.
fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be a finite number".into(),
            })
    })
}

/// Parse an environment variable as a boolean, using a default if not set.
fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be a boolean".into(),
            }),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "PERF_DATABASE_PATH",
        "LOG_LEVEL",
        "LOG_JSON",
        "PERF_ANALYSIS_INTERVAL_MS",
        "PERF_MONITOR_INTERVAL_MS",
        "PERF_BUFFER_SIZE",
        "PERF_SAMPLING_RATE",
        "PERF_METRICS_FILTER",
        "PERF_RETENTION_MS",
        "PERF_ANOMALY_SENSITIVITY",
        "PERF_ADAPTATION_RATE",
        "PERF_VIOLATION_SENSITIVITY",
        "PERF_CALIBRATION_TARGET",
        "PERF_ENABLE_STREAM",
        "PERF_ENABLE_HISTORY",
        "PERF_ENABLE_ALERTS",
        "PERF_ENABLE_DASHBOARD",
        "PERF_ADAPTIVE_THRESHOLDS",
    ];

    /// Helper to set up a clean test environment.
    fn setup_test_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        setup_test_env();

        let config = Config::from_env().expect("should load config");

        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(!config.log_json);
        assert_eq!(config.analysis_interval_ms, DEFAULT_ANALYSIS_INTERVAL_MS);
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_all_vars() {
        setup_test_env();

        env::set_var("PERF_DATABASE_PATH", "/custom/path.db");
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_JSON", "true");
        env::set_var("PERF_ANALYSIS_INTERVAL_MS", "2000");
        env::set_var("PERF_MONITOR_INTERVAL_MS", "500");
        env::set_var("PERF_BUFFER_SIZE", "64");
        env::set_var("PERF_SAMPLING_RATE", "0.5");
        env::set_var("PERF_METRICS_FILTER", "fps, memory_used,,frame_time");
        env::set_var("PERF_RETENTION_MS", "3600000");
        env::set_var("PERF_ANOMALY_SENSITIVITY", "0.6");
        env::set_var("PERF_ADAPTATION_RATE", "0.2");
        env::set_var("PERF_VIOLATION_SENSITIVITY", "2.0");
        env::set_var("PERF_CALIBRATION_TARGET", "10");
        env::set_var("PERF_ENABLE_STREAM", "false");
        env::set_var("PERF_ENABLE_HISTORY", "false");
        env::set_var("PERF_ENABLE_ALERTS", "false");
        env::set_var("PERF_ENABLE_DASHBOARD", "false");
        env::set_var("PERF_ADAPTIVE_THRESHOLDS", "0");

        let config = Config::from_env().expect("should load config");
        setup_test_env();

        assert_eq!(config.database_path, "/custom/path.db");
        assert_eq!(config.log_level, "debug");
        assert!(config.log_json);
        assert_eq!(config.analysis_interval_ms, 2000);
        assert_eq!(config.monitor.interval_ms, 500);
        assert_eq!(config.monitor.buffer_size, 64);
        assert_eq!(config.monitor.sampling_rate, 0.5);
        assert_eq!(
            config.monitor.metrics_filter,
            vec!["fps", "memory_used", "frame_time"]
        );
        assert_eq!(config.monitor.retention_ms, 3_600_000);
        assert!(!config.monitor.enable_realtime_stream);
        assert!(!config.monitor.enable_history);
        assert!(!config.monitor.enable_alerts);
        assert!(!config.monitor.enable_dashboard);
        assert_eq!(config.analysis.anomaly_detection_sensitivity, 0.6);
        assert_eq!(config.analysis.adaptation_rate, 0.2);
        assert_eq!(config.analysis.violation_sensitivity, 2.0);
        assert_eq!(config.analysis.calibration_target, 10);
        assert!(!config.analysis.adaptive_thresholds);
    }

    #[test]
    #[serial]
    fn test_config_invalid_interval_format() {
        setup_test_env();
        env::set_var("PERF_MONITOR_INTERVAL_MS", "not-a-number");

        let err = Config::from_env().unwrap_err();
        setup_test_env();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "PERF_MONITOR_INTERVAL_MS"
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bool() {
        setup_test_env();
        env::set_var("PERF_ENABLE_STREAM", "maybe");

        let err = Config::from_env().unwrap_err();
        setup_test_env();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "PERF_ENABLE_STREAM"
        ));
    }

    #[test]
    #[serial]
    fn test_config_sampling_rate_validation_failure() {
        setup_test_env();
        env::set_var("PERF_SAMPLING_RATE", "1.5");

        let err = Config::from_env().unwrap_err();
        setup_test_env();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "PERF_SAMPLING_RATE"
        ));
    }

    #[test]
    #[serial]
    fn test_config_non_finite_float() {
        setup_test_env();
        env::set_var("PERF_ADAPTATION_RATE", "NaN");

        let err = Config::from_env().unwrap_err();
        setup_test_env();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "PERF_ADAPTATION_RATE"
        ));
    }

    #[test]
    fn test_monitor_config_allows() {
        let mut config = MonitorConfig::default();
        assert!(config.allows("anything"));

        config.metrics_filter = vec!["fps".into()];
        assert!(config.allows("fps"));
        assert!(!config.allows("memory_used"));
    }

    #[test]
    fn test_analysis_config_apply_partial() {
        let mut config = AnalysisConfig::default();
        config
            .apply(&AnalysisConfigUpdate {
                anomaly_detection_sensitivity: Some(0.5),
                adaptive_thresholds: Some(false),
                ..AnalysisConfigUpdate::default()
            })
            .unwrap();

        assert_eq!(config.anomaly_detection_sensitivity, 0.5);
        assert!(!config.adaptive_thresholds);
        assert_eq!(config.adaptation_rate, DEFAULT_ADAPTATION_RATE);
    }

    #[test]
    fn test_analysis_config_apply_rejects_invalid() {
        let mut config = AnalysisConfig::default();
        let result = config.apply(&AnalysisConfigUpdate {
            adaptation_rate: Some(3.0),
            anomaly_detection_sensitivity: Some(0.2),
            ..AnalysisConfigUpdate::default()
        });

        assert!(result.is_err());
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"calibration_target": 5}"#).unwrap();
        assert_eq!(config.calibration_target, 5);
        assert_eq!(config.history_cap, DEFAULT_HISTORY_CAP);
    }

    #[test]
    fn test_parse_env_u64_default() {
        env::remove_var("TEST_PERF_U64_MISSING");
        assert_eq!(parse_env_u64("TEST_PERF_U64_MISSING", 999).unwrap(), 999);
    }

    #[test]
    fn test_parse_env_usize_invalid() {
        env::set_var("TEST_PERF_USIZE_INVALID", "-4");
        assert!(parse_env_usize("TEST_PERF_USIZE_INVALID", 0).is_err());
        env::remove_var("TEST_PERF_USIZE_INVALID");
    }

    #[test]
    fn test_parse_env_bool_variants() {
        env::set_var("TEST_PERF_BOOL", "YES");
        assert!(parse_env_bool("TEST_PERF_BOOL", false).unwrap());
        env::set_var("TEST_PERF_BOOL", "off");
        assert!(!parse_env_bool("TEST_PERF_BOOL", true).unwrap());
        env::remove_var("TEST_PERF_BOOL");
    }
}
