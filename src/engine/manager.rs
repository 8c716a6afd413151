//! Background analysis manager.
//!
//! This module provides the [`AnalysisManager`] which owns a
//! [`PerformanceAnalyzer`] and runs as a background task, and the
//! [`AnalysisHandle`] through which other tasks query and drive it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AnalysisManager                           │
//! │  (Background Tokio Task)                                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │  PerformanceAnalyzer                                  │   │
//! │  │  ├─MetricsCollector (history + baselines)             │   │
//! │  │  ├─Trends / Statistics / Thresholds / Anomalies       │   │
//! │  │  └─InsightGenerator                                   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                          ▲                                   │
//! │  ┌─────────────┐    ┌────────────┐    ┌─────────────────┐   │
//! │  │ Interval    │    │ Command RX │    │ Shutdown Signal │   │
//! │  │ Ticker      │    │ (mpsc)     │    │ (watch)         │   │
//! │  └─────────────┘    └────────────┘    └─────────────────┘   │
//! └──────────────────────────┼───────────────────────────────────┘
//!                            │
//! ┌──────────────────────────┼───────────────────────────────────┐
//! │                  AnalysisHandle                              │
//! │  (Clone-able, Send+Sync)                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  command_tx: mpsc::Sender<ManagerCommand>                    │
//! │  status_rx: watch::Receiver<ManagerStatus>                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::{AnalysisResults, PerformanceAnalyzer, TickSummary};
use crate::analysis::{InsightReport, ViolationStats};
use crate::config::{AnalysisConfig, AnalysisConfigUpdate};
use crate::error::{AnalysisError, AppError, ConfigError, MonitorError, StorageError};
use crate::sources::collect_all;
use crate::traits::{MetricSource, SnapshotStore, TimeProvider};

/// Key the analyzer state is stored under by default.
pub const DEFAULT_STATE_KEY: &str = "analyzer";

/// Commands that can be sent to the manager.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Get the current analysis results.
    GetResults {
        /// Response channel.
        response_tx: oneshot::Sender<AnalysisResults>,
    },
    /// Get the insight report.
    GetReport {
        /// Response channel.
        response_tx: oneshot::Sender<InsightReport>,
    },
    /// Get the violation summary.
    GetViolationStats {
        /// Response channel.
        response_tx: oneshot::Sender<ViolationStats>,
    },
    /// Run a tick now.
    TriggerTick {
        /// Response channel.
        response_tx: oneshot::Sender<Result<TickSummary, AnalysisError>>,
    },
    /// Persist the analyzer state.
    Save {
        /// Response channel. `false` when no store is configured.
        response_tx: oneshot::Sender<Result<bool, StorageError>>,
    },
    /// Reload the analyzer state from the store.
    Load {
        /// Response channel. `false` when nothing was stored.
        response_tx: oneshot::Sender<Result<bool, StorageError>>,
    },
    /// Drop all analysis state.
    Reset {
        /// Response channel.
        response_tx: oneshot::Sender<()>,
    },
    /// Apply a configuration update.
    Configure {
        /// Fields to change.
        update: AnalysisConfigUpdate,
        /// Response channel.
        response_tx: oneshot::Sender<Result<(), ConfigError>>,
    },
    /// Get current status.
    GetStatus {
        /// Response channel.
        response_tx: oneshot::Sender<ManagerStatus>,
    },
}

/// Current manager status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Whether the manager is running.
    pub running: bool,
    /// Ticks that ran the analyzer.
    pub total_ticks: u64,
    /// Ticks skipped because no source produced data.
    pub skipped_ticks: u64,
    /// Source failures across all ticks.
    pub source_failures: u64,
    /// Timestamp of the last analyzed tick.
    pub last_tick_at: Option<u64>,
    /// Whether baseline calibration finished.
    pub calibrated: bool,
    /// Calibration progress in `[0, 1]`.
    pub calibration_progress: f64,
    /// Snapshots in the analysis history.
    pub history_len: usize,
    /// Clock time of the last successful save.
    pub last_saved_at: Option<u64>,
}

/// Handle for interacting with the manager.
///
/// This handle is cheap to clone and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct AnalysisHandle {
    command_tx: mpsc::Sender<ManagerCommand>,
    status_rx: watch::Receiver<ManagerStatus>,
}

fn not_running() -> AppError {
    MonitorError::TaskUnavailable {
        message: "Manager not running".into(),
    }
    .into()
}

fn disconnected() -> AppError {
    MonitorError::TaskUnavailable {
        message: "Manager disconnected".into(),
    }
    .into()
}

impl AnalysisHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T, AppError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|_| not_running())?;
        response_rx.await.map_err(|_| disconnected())
    }

    /// Current analysis results.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Monitor`] if the manager is not running.
    pub async fn results(&self) -> Result<AnalysisResults, AppError> {
        self.request(|response_tx| ManagerCommand::GetResults { response_tx })
            .await
    }

    /// Insight report as of the manager's clock.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Monitor`] if the manager is not running.
    pub async fn insight_report(&self) -> Result<InsightReport, AppError> {
        self.request(|response_tx| ManagerCommand::GetReport { response_tx })
            .await
    }

    /// Violation summary as of the manager's clock.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Monitor`] if the manager is not running.
    pub async fn violation_stats(&self) -> Result<ViolationStats, AppError> {
        self.request(|response_tx| ManagerCommand::GetViolationStats { response_tx })
            .await
    }

    /// Run a tick immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Analysis`] if no source produced data, or
    /// [`AppError::Monitor`] if the manager is not running.
    pub async fn trigger_tick(&self) -> Result<TickSummary, AppError> {
        Ok(self
            .request(|response_tx| ManagerCommand::TriggerTick { response_tx })
            .await??)
    }

    /// Persist the analyzer state. Returns `false` if no store is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the write fails.
    pub async fn save(&self) -> Result<bool, AppError> {
        Ok(self
            .request(|response_tx| ManagerCommand::Save { response_tx })
            .await??)
    }

    /// Reload the analyzer state. Returns `false` if nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the read fails.
    pub async fn load(&self) -> Result<bool, AppError> {
        Ok(self
            .request(|response_tx| ManagerCommand::Load { response_tx })
            .await??)
    }

    /// Drop all analysis state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Monitor`] if the manager is not running.
    pub async fn reset(&self) -> Result<(), AppError> {
        self.request(|response_tx| ManagerCommand::Reset { response_tx })
            .await
    }

    /// Apply a partial configuration update.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the result is invalid.
    pub async fn configure(&self, update: AnalysisConfigUpdate) -> Result<(), AppError> {
        Ok(self
            .request(|response_tx| ManagerCommand::Configure {
                update,
                response_tx,
            })
            .await??)
    }

    /// Get current status. Falls back to the last published status if the
    /// manager is gone.
    pub async fn status(&self) -> ManagerStatus {
        match self
            .request(|response_tx| ManagerCommand::GetStatus { response_tx })
            .await
        {
            Ok(status) => status,
            Err(_) => self.status_rx.borrow().clone(),
        }
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ManagerStatus> {
        self.status_rx.clone()
    }

    /// Create a handle that is not connected to any manager.
    ///
    /// All commands fail with [`MonitorError::TaskUnavailable`].
    #[must_use]
    pub fn for_testing() -> Self {
        let (command_tx, _command_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(ManagerStatus::default());
        // Drop the sender so status never changes
        drop(status_tx);
        Self {
            command_tx,
            status_rx,
        }
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    total_ticks: u64,
    skipped_ticks: u64,
    source_failures: u64,
    last_saved_at: Option<u64>,
}

/// The analysis manager.
///
/// Runs as a background task; see [`AnalysisManager::run`].
pub struct AnalysisManager {
    analyzer: PerformanceAnalyzer,
    interval_ms: u64,
    sources: Vec<Box<dyn MetricSource>>,
    clock: Arc<dyn TimeProvider>,
    store: Option<Arc<dyn SnapshotStore>>,
    state_key: String,
    command_rx: mpsc::Receiver<ManagerCommand>,
    status_tx: watch::Sender<ManagerStatus>,
    state: ManagerState,
}

impl std::fmt::Debug for AnalysisManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisManager")
            .field("interval_ms", &self.interval_ms)
            .field("sources", &self.sources.len())
            .field("state_key", &self.state_key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AnalysisManager {
    /// Create a manager and its handle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration or interval is invalid.
    pub fn new(
        config: AnalysisConfig,
        interval_ms: u64,
        sources: Vec<Box<dyn MetricSource>>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<(Self, AnalysisHandle), ConfigError> {
        if interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "ANALYSIS_INTERVAL_MS".into(),
                reason: "must be greater than 0".into(),
            });
        }
        let analyzer = PerformanceAnalyzer::new(config)?;

        let (command_tx, command_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(ManagerStatus {
            running: true,
            ..ManagerStatus::default()
        });

        let manager = Self {
            analyzer,
            interval_ms,
            sources,
            clock,
            store: None,
            state_key: DEFAULT_STATE_KEY.to_string(),
            command_rx,
            status_tx,
            state: ManagerState::default(),
        };
        let handle = AnalysisHandle {
            command_tx,
            status_rx,
        };
        Ok((manager, handle))
    }

    /// Persist state to `store` under `key`: loaded on start, saved on
    /// shutdown and on request.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>, key: impl Into<String>) -> Self {
        self.store = Some(store);
        self.state_key = key.into();
        self
    }

    /// Run the manager background loop until the shutdown signal is received.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        if let Err(e) = self.load_state().await {
            tracing::warn!(error = %e, "Failed to load analysis state, starting fresh");
        }

        let mut interval = tokio::time::interval(Duration::from_millis(self.interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first immediate tick
        interval.tick().await;

        tracing::info!(
            interval_ms = self.interval_ms,
            sources = self.sources.len(),
            persistent = self.store.is_some(),
            "Analysis manager started"
        );
        self.update_status(true);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_tick() {
                        tracing::debug!(error = %e, "Analysis tick skipped");
                    }
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Analysis manager shutting down");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.save_state().await {
            tracing::error!(error = %e, "Failed to save analysis state on shutdown");
        }
        self.update_status(false);
    }

    fn run_tick(&mut self) -> Result<TickSummary, AnalysisError> {
        let now = self.clock.now_millis();
        let collected = collect_all(&self.sources, now);
        self.state.source_failures += collected.failures as u64;

        let result = self.analyzer.analyze(now, &collected.snapshot);
        match &result {
            Ok(summary) => {
                self.state.total_ticks += 1;
                if summary.anomalies > 0 || summary.violations > 0 || summary.insights > 0 {
                    tracing::debug!(
                        anomalies = summary.anomalies,
                        violations = summary.violations,
                        insights = summary.insights,
                        "Analysis tick completed"
                    );
                }
            }
            Err(_) => self.state.skipped_ticks += 1,
        }
        self.update_status(true);
        result
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::GetResults { response_tx } => {
                let _ = response_tx.send(self.analyzer.analysis_results());
            }
            ManagerCommand::GetReport { response_tx } => {
                let _ = response_tx.send(self.analyzer.insight_report(self.clock.now_millis()));
            }
            ManagerCommand::GetViolationStats { response_tx } => {
                let _ = response_tx.send(self.analyzer.violation_stats(self.clock.now_millis()));
            }
            ManagerCommand::TriggerTick { response_tx } => {
                let _ = response_tx.send(self.run_tick());
            }
            ManagerCommand::Save { response_tx } => {
                let result = self.save_state().await;
                let _ = response_tx.send(result);
            }
            ManagerCommand::Load { response_tx } => {
                let result = self.load_state().await;
                let _ = response_tx.send(result);
            }
            ManagerCommand::Reset { response_tx } => {
                self.analyzer.reset();
                self.update_status(true);
                let _ = response_tx.send(());
            }
            ManagerCommand::Configure {
                update,
                response_tx,
            } => {
                let result = self.analyzer.configure(&update);
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Rejected analysis configuration update");
                }
                let _ = response_tx.send(result);
            }
            ManagerCommand::GetStatus { response_tx } => {
                let _ = response_tx.send(self.build_status(true));
            }
        }
    }

    async fn save_state(&mut self) -> Result<bool, StorageError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        store.save(&self.state_key, &self.analyzer.save()).await?;
        self.state.last_saved_at = Some(self.clock.now_millis());
        tracing::info!(key = %self.state_key, "Analysis state saved");
        Ok(true)
    }

    async fn load_state(&mut self) -> Result<bool, StorageError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let Some(state) = store.load(&self.state_key).await? else {
            return Ok(false);
        };
        self.analyzer.load(state);
        self.update_status(true);
        Ok(true)
    }

    fn build_status(&self, running: bool) -> ManagerStatus {
        let collector = self.analyzer.collector();
        ManagerStatus {
            running,
            total_ticks: self.state.total_ticks,
            skipped_ticks: self.state.skipped_ticks,
            source_failures: self.state.source_failures,
            last_tick_at: self.analyzer.last_tick(),
            calibrated: collector.is_calibrated(),
            calibration_progress: collector.calibration_progress(),
            history_len: collector.history().len(),
            last_saved_at: self.state.last_saved_at,
        }
    }

    fn update_status(&self, running: bool) {
        let _ = self.status_tx.send(self.build_status(running));
    }
}
