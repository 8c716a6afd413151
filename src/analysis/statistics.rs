//! Statistical processing over a sliding time window.
//!
//! Four independent processors run every tick. Each one that fails keeps
//! its previous result while the others still update.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stats::{self, Descriptive, Histogram, OutlierReport};
use crate::error::{isolate, AnalysisError};
use crate::metrics::MetricSnapshot;

/// Histogram bin count.
pub const DISTRIBUTION_BINS: usize = 10;

/// A distribution needs more than this many samples.
pub const DISTRIBUTION_MIN_SAMPLES: usize = 10;

/// Outlier detection needs more than this many samples.
pub const OUTLIER_MIN_SAMPLES: usize = 4;

/// A statistical processor and its metric selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Count, mean, median, std dev, min, max and percentiles.
    Descriptive {
        /// Metrics to describe.
        metrics: Vec<String>,
    },
    /// Pearson correlation between metric pairs.
    Correlation {
        /// Metric pairs.
        pairs: Vec<(String, String)>,
    },
    /// Equal-width histograms.
    Distribution {
        /// Metrics to bin.
        metrics: Vec<String>,
    },
    /// IQR outliers.
    Outliers {
        /// Metrics to scan.
        metrics: Vec<String>,
    },
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

impl ProcessorKind {
    /// Unit name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Descriptive { .. } => "descriptive",
            Self::Correlation { .. } => "correlation",
            Self::Distribution { .. } => "distribution",
            Self::Outliers { .. } => "outliers",
        }
    }

    /// The default processor set.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Descriptive {
                metrics: owned(&["fps", "memory_used", "frame_time", "network_latency"]),
            },
            Self::Correlation {
                pairs: vec![
                    ("fps".into(), "frame_time".into()),
                    ("memory_used".into(), "frame_variance".into()),
                    ("network_latency".into(), "response_time".into()),
                ],
            },
            Self::Distribution {
                metrics: owned(&["fps", "frame_time"]),
            },
            Self::Outliers {
                metrics: owned(&["fps", "memory_used", "frame_time"]),
            },
        ]
    }

    fn run(&self, data: &[&MetricSnapshot]) -> Result<ProcessorOutput, AnalysisError> {
        if data.is_empty() {
            return Err(AnalysisError::InsufficientSamples {
                unit: self.name().to_string(),
                required: 1,
                available: 0,
            });
        }

        let output = match self {
            Self::Descriptive { metrics } => ProcessorOutput::Descriptive(
                metrics
                    .iter()
                    .filter_map(|m| {
                        Descriptive::from_values(&series(data, m)).map(|d| (m.clone(), d))
                    })
                    .collect(),
            ),
            Self::Correlation { pairs } => ProcessorOutput::Correlation(
                pairs
                    .iter()
                    .filter_map(|(a, b)| {
                        let (xs, ys): (Vec<f64>, Vec<f64>) = data
                            .iter()
                            .filter_map(|point| Some((point.get(a)?, point.get(b)?)))
                            .unzip();
                        if xs.len() < 2 {
                            return None;
                        }
                        stats::pearson(&xs, &ys).map(|r| (format!("{a}_{b}"), r))
                    })
                    .collect(),
            ),
            Self::Distribution { metrics } => ProcessorOutput::Distribution(
                metrics
                    .iter()
                    .filter_map(|m| {
                        let values = series(data, m);
                        if values.len() <= DISTRIBUTION_MIN_SAMPLES {
                            return None;
                        }
                        stats::histogram(&values, DISTRIBUTION_BINS).map(|h| (m.clone(), h))
                    })
                    .collect(),
            ),
            Self::Outliers { metrics } => ProcessorOutput::Outliers(
                metrics
                    .iter()
                    .filter_map(|m| {
                        let values = series(data, m);
                        if values.len() <= OUTLIER_MIN_SAMPLES {
                            return None;
                        }
                        stats::iqr_outliers(&values).map(|o| (m.clone(), o))
                    })
                    .collect(),
            ),
        };
        Ok(output)
    }
}

fn series(data: &[&MetricSnapshot], metric: &str) -> Vec<f64> {
    data.iter().filter_map(|point| point.get(metric)).collect()
}

enum ProcessorOutput {
    Descriptive(BTreeMap<String, Descriptive>),
    Correlation(BTreeMap<String, f64>),
    Distribution(BTreeMap<String, Histogram>),
    Outliers(BTreeMap<String, OutlierReport>),
}

/// One processor's latest result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatEntry<T> {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Points in the window.
    pub data_points: usize,
    /// Processor output.
    pub stats: T,
}

/// Latest result of every processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Descriptive stats by metric.
    pub descriptive: Option<StatEntry<BTreeMap<String, Descriptive>>>,
    /// Correlation by `"a_b"` pair key.
    pub correlation: Option<StatEntry<BTreeMap<String, f64>>>,
    /// Histograms by metric.
    pub distribution: Option<StatEntry<BTreeMap<String, Histogram>>>,
    /// Outlier reports by metric.
    pub outliers: Option<StatEntry<BTreeMap<String, OutlierReport>>>,
}

impl StatisticsSnapshot {
    /// Descriptive stats for one metric, if computed.
    #[must_use]
    pub fn descriptive_for(&self, metric: &str) -> Option<&Descriptive> {
        self.descriptive.as_ref()?.stats.get(metric)
    }
}

// ============================================================================
// StatisticalProcessor
// ============================================================================

/// Runs the processor set and holds the latest results.
#[derive(Debug, Clone)]
pub struct StatisticalProcessor {
    processors: Vec<ProcessorKind>,
    snapshot: StatisticsSnapshot,
}

impl Default for StatisticalProcessor {
    fn default() -> Self {
        Self::new(ProcessorKind::defaults())
    }
}

impl StatisticalProcessor {
    /// Create a processor set.
    #[must_use]
    pub fn new(processors: Vec<ProcessorKind>) -> Self {
        Self {
            processors,
            snapshot: StatisticsSnapshot::default(),
        }
    }

    /// Run every processor over `data`.
    pub fn process(&mut self, timestamp: u64, data: &[&MetricSnapshot]) {
        let data_points = data.len();
        for processor in &self.processors {
            let unit = format!("statistics:{}", processor.name());
            let Some(output) = isolate(&unit, || processor.run(data)) else {
                continue;
            };
            match output {
                ProcessorOutput::Descriptive(stats) => {
                    self.snapshot.descriptive = Some(StatEntry {
                        timestamp,
                        data_points,
                        stats,
                    });
                }
                ProcessorOutput::Correlation(stats) => {
                    self.snapshot.correlation = Some(StatEntry {
                        timestamp,
                        data_points,
                        stats,
                    });
                }
                ProcessorOutput::Distribution(stats) => {
                    self.snapshot.distribution = Some(StatEntry {
                        timestamp,
                        data_points,
                        stats,
                    });
                }
                ProcessorOutput::Outliers(stats) => {
                    self.snapshot.outliers = Some(StatEntry {
                        timestamp,
                        data_points,
                        stats,
                    });
                }
            }
        }
    }

    /// Latest results.
    #[must_use]
    pub const fn snapshot(&self) -> &StatisticsSnapshot {
        &self.snapshot
    }

    /// Replace results with a persisted snapshot.
    pub fn restore(&mut self, snapshot: StatisticsSnapshot) {
        self.snapshot = snapshot;
    }

    /// Drop all results.
    pub fn clear(&mut self) {
        self.snapshot = StatisticsSnapshot::default();
    }
}
