//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::{AnalysisConfig, Config, MonitorConfig};
use crate::error::ConfigError;

/// Minimum allowed tick interval in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 10;

/// Maximum allowed tick interval in milliseconds (1 hour).
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

/// Maximum allowed stream buffer size.
pub const MAX_BUFFER_SIZE: usize = 1_000_000;

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}

fn check_interval(var: &str, value: u64) -> Result<(), ConfigError> {
    if (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            var,
            format!("must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS} ms"),
        ))
    }
}

fn check_unit_range(var: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let low_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && low_ok && value <= 1.0 {
        Ok(())
    } else if allow_zero {
        Err(invalid(var, "must be between 0 and 1"))
    } else {
        Err(invalid(var, "must be greater than 0 and at most 1"))
    }
}

/// Validate the full configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range.
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(invalid("PERF_DATABASE_PATH", "must not be empty"));
    }
    check_interval("PERF_ANALYSIS_INTERVAL_MS", config.analysis_interval_ms)?;
    validate_monitor(&config.monitor)?;
    validate_analysis(&config.analysis)
}

/// Validate monitor settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if:
/// - the interval is outside `[MIN_INTERVAL_MS, MAX_INTERVAL_MS]`
/// - the buffer size is zero or above [`MAX_BUFFER_SIZE`]
/// - the sampling rate is outside `[0, 1]`
/// - the retention is zero
#[must_use = "validation result should be checked"]
pub fn validate_monitor(config: &MonitorConfig) -> Result<(), ConfigError> {
    check_interval("PERF_MONITOR_INTERVAL_MS", config.interval_ms)?;

    if config.buffer_size == 0 || config.buffer_size > MAX_BUFFER_SIZE {
        return Err(invalid(
            "PERF_BUFFER_SIZE",
            format!("must be between 1 and {MAX_BUFFER_SIZE}"),
        ));
    }

    check_unit_range("PERF_SAMPLING_RATE", config.sampling_rate, true)?;

    if config.retention_ms == 0 {
        return Err(invalid("PERF_RETENTION_MS", "must be greater than 0"));
    }

    Ok(())
}

/// Validate analysis settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if a sensitivity, rate, window or
/// cap is out of range.
#[must_use = "validation result should be checked"]
pub fn validate_analysis(config: &AnalysisConfig) -> Result<(), ConfigError> {
    check_unit_range(
        "PERF_ANOMALY_SENSITIVITY",
        config.anomaly_detection_sensitivity,
        true,
    )?;
    check_unit_range("PERF_ADAPTATION_RATE", config.adaptation_rate, false)?;

    if !config.violation_sensitivity.is_finite() || config.violation_sensitivity <= 0.0 {
        return Err(invalid(
            "PERF_VIOLATION_SENSITIVITY",
            "must be greater than 0",
        ));
    }

    if config.statistical_window_ms == 0 {
        return Err(invalid("statistical_window_ms", "must be greater than 0"));
    }
    if config.trend_analysis_window_ms == 0 {
        return Err(invalid("trend_analysis_window_ms", "must be greater than 0"));
    }
    if config.calibration_target == 0 {
        return Err(invalid("PERF_CALIBRATION_TARGET", "must be at least 1"));
    }
    if config.history_cap == 0 {
        return Err(invalid("history_cap", "must be at least 1"));
    }

    Ok(())
}
