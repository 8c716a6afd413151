//! Persisted analyzer state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::thresholds::ThresholdState;
use crate::analysis::{Anomaly, Insight, StatisticsSnapshot};
use crate::config::AnalysisConfig;
use crate::metrics::MetricSnapshot;

/// Everything needed to resume analysis after a restart.
///
/// Stored as JSON by [`crate::traits::SnapshotStore`] implementations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// Analysis configuration at save time.
    pub config: AnalysisConfig,
    /// Baseline values by metric.
    pub baseline: BTreeMap<String, f64>,
    /// Whether the baseline finished calibrating.
    pub calibrated: bool,
    /// Anomaly history.
    pub anomalies: Vec<Anomaly>,
    /// Analysis history.
    pub metrics: Vec<MetricSnapshot>,
    /// Latest statistics.
    pub statistics: StatisticsSnapshot,
    /// Insight history.
    pub insights: Vec<Insight>,
    /// Dynamic thresholds and violations.
    pub thresholds: ThresholdState,
    /// When the state was captured.
    pub saved_at: DateTime<Utc>,
}

impl PersistedState {
    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if encoding fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload is malformed.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
