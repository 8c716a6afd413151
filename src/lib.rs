//! Performance Telemetry Engine
//!
//! A Rust engine that turns a stream of metric snapshots (fps, frame time,
//! memory, network latency, input lag, ...) into baselines, trends,
//! statistics, threshold violations, anomalies, insights and real-time
//! performance events.
//!
//! # Features
//!
//! - One-shot baseline calibration followed by adaptive baselines
//! - Per-metric trend detection (moving average, regression, smoothing)
//! - Descriptive statistics, correlation, distribution and outliers
//! - Static and adaptively smoothed thresholds with violation tracking
//! - Weighted anomaly scoring against the baseline
//! - Cooldown-gated insight rules with ranked recommendations
//! - Real-time event detection with a bounded subscriber stream
//! - `SQLite` persistence of analyzer state
//!
//! # Quick Start
//!
//! ```bash
//! LOG_LEVEL=debug PERF_DATABASE_PATH=./data/telemetry.db ./perf-telemetry
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  snapshots  ┌──────────────────┐  save/load  ┌────────┐
//! │ MetricSource │────────────▶│ AnalysisManager  │◀───────────▶│ SQLite │
//! │  (1..n)      │             │ (PerformanceAna- │             └────────┘
//! └──────┬───────┘             │  lyzer actor)    │
//!        │                     └──────────────────┘
//!        │                     ┌──────────────────┐
//!        └────────────────────▶│ RealTimeMonitor  │──▶ events, stream
//!                              │ (MonitorTask)    │
//!                              └──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod sources;
pub mod storage;
pub mod traits;
