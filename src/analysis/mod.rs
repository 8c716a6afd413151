//! Analysis units.
//!
//! Each unit owns its own rolling state and is driven once per analysis
//! tick by [`crate::engine::PerformanceAnalyzer`]:
//! - [`trend`]: per-metric trend direction and confidence
//! - [`statistics`]: descriptive stats, correlation, distribution and outliers
//! - [`thresholds`]: static and adaptive thresholds with violation tracking
//! - [`anomaly`]: baseline-deviation scoring
//! - [`insights`]: cooldown-gated insight rules and recommendation ranking
//!
//! [`stats`] holds the shared numeric helpers.

pub mod anomaly;
pub mod insights;
pub mod stats;
pub mod statistics;
pub mod thresholds;
pub mod trend;

pub use anomaly::{Anomaly, AnomalyDetector};
pub use insights::{
    Insight, InsightContext, InsightGenerator, InsightKind, InsightReport, InsightRule,
    Recommendation,
};
pub use statistics::{ProcessorKind, StatisticalProcessor, StatisticsSnapshot};
pub use thresholds::{
    ThresholdDirection, ThresholdManager, ThresholdSet, ViolationKind, ViolationRecord,
    ViolationStats,
};
pub use trend::{TrendAlgorithm, TrendAnalyzer, TrendBinding, TrendDirection, TrendState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity shared by anomalies, violations, insights and events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    #[default]
    Low,
    /// Worth a look.
    Medium,
    /// Needs attention.
    High,
    /// Needs attention now.
    Critical,
}

impl Severity {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Map a `[0, 1]` score onto a severity
    /// (`>= 0.9` critical, `>= 0.7` high, `>= 0.5` medium).
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Critical
        } else if score >= 0.7 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of insight generators and recommendations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    #[default]
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}
