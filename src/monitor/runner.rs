//! Ticker task driving a shared [`RealTimeMonitor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::RealTimeMonitor;
use crate::error::MonitorError;
use crate::traits::TimeProvider;

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Starts and stops the sampling loop.
///
/// The loop holds the monitor lock only for the duration of one tick.
pub struct MonitorTask {
    monitor: Arc<Mutex<RealTimeMonitor>>,
    clock: Arc<dyn TimeProvider>,
    worker: Option<Worker>,
}

impl std::fmt::Debug for MonitorTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTask")
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl MonitorTask {
    /// Create a stopped task.
    #[must_use]
    pub fn new(monitor: Arc<Mutex<RealTimeMonitor>>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            monitor,
            clock,
            worker: None,
        }
    }

    /// The shared monitor.
    #[must_use]
    pub fn monitor(&self) -> Arc<Mutex<RealTimeMonitor>> {
        Arc::clone(&self.monitor)
    }

    /// Whether the loop is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the sampling loop. The first tick fires one interval after start.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::AlreadyRunning`] (and changes nothing) if the
    /// loop is already running.
    pub async fn start(&mut self) -> Result<(), MonitorError> {
        if self.worker.is_some() {
            tracing::warn!("Monitoring is already active");
            return Err(MonitorError::AlreadyRunning);
        }

        let interval_ms = {
            let mut monitor = self.monitor.lock().await;
            monitor.mark_started();
            monitor.config().interval_ms
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(&self.monitor);
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let now = clock.now_millis();
                        monitor.lock().await.tick(now);
                    }
                }
            }
        });

        self.worker = Some(Worker {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the loop and wait for it to exit, then close the stream and
    /// drop subscribers. No tick runs after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::NotRunning`] if the loop is not running, or
    /// [`MonitorError::TaskUnavailable`] if the task panicked.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(worker) = self.worker.take() else {
            tracing::warn!("Monitoring is not active");
            return Err(MonitorError::NotRunning);
        };

        let _ = worker.shutdown_tx.send(true);
        let joined = worker.handle.await;
        self.monitor.lock().await.mark_stopped();

        joined.map_err(|e| MonitorError::TaskUnavailable {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::metrics::MetricSnapshot;
    use crate::sources::FnSource;
    use crate::traits::ManualTimeProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counted_monitor(calls: &Arc<AtomicU64>) -> Arc<Mutex<RealTimeMonitor>> {
        let mut monitor = RealTimeMonitor::new(MonitorConfig::default()).unwrap();
        let calls = Arc::clone(calls);
        monitor.add_source(FnSource::boxed("counter", move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(MetricSnapshot::new(0).with("fps", 60.0))
        }));
        Arc::new(Mutex::new(monitor))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut task = MonitorTask::new(
            counted_monitor(&calls),
            Arc::new(ManualTimeProvider::new(0)),
        );
        task.start().await.unwrap();
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let monitor = task.monitor();
        assert_eq!(monitor.lock().await.stream_buffer().len(), 3);
        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let calls = Arc::new(AtomicU64::new(0));
        let monitor = counted_monitor(&calls);
        let mut task = MonitorTask::new(Arc::clone(&monitor), Arc::new(ManualTimeProvider::new(0)));
        task.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        task.stop().await.unwrap();

        let after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);

        let monitor = monitor.lock().await;
        assert!(!monitor.is_running());
        assert!(monitor.stream_buffer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_and_stop() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut task = MonitorTask::new(
            counted_monitor(&calls),
            Arc::new(ManualTimeProvider::new(0)),
        );
        assert_eq!(task.stop().await, Err(MonitorError::NotRunning));
        task.start().await.unwrap();
        assert_eq!(task.start().await, Err(MonitorError::AlreadyRunning));
        task.stop().await.unwrap();
        assert!(!task.is_running());

        // restart after stop
        task.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_come_from_clock() {
        let calls = Arc::new(AtomicU64::new(0));
        let clock = ManualTimeProvider::new(42_000);
        let mut task = MonitorTask::new(counted_monitor(&calls), Arc::new(clock));
        task.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let monitor = task.monitor();
        let points = monitor.lock().await.stream_buffer();
        assert_eq!(points[0].timestamp, 42_000);
        task.stop().await.unwrap();
    }
}
