//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`MetricSource`]: Anything that can produce a metric snapshot on demand
//! - [`SnapshotStore`]: Persistence of analysis state
//! - [`TimeProvider`]: Time abstraction for testing
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.
//!
//! # Example
//!
//! ```
//! use perf_telemetry::traits::{ManualTimeProvider, TimeProvider};
//!
//! let clock = ManualTimeProvider::new(1_000);
//! clock.advance(500);
//! assert_eq!(clock.now_millis(), 1_500);
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::PersistedState;
use crate::error::{SourceError, StorageError};
use crate::metrics::MetricSnapshot;

/// A producer of metric snapshots.
///
/// Sources are polled once per tick. A failing source is logged and
/// skipped; it never aborts the tick.
#[cfg_attr(test, mockall::automock)]
pub trait MetricSource: Send + Sync {
    /// Source name used in logs.
    fn name(&self) -> &str;

    /// Produce the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the source cannot produce data.
    fn collect(&self) -> Result<MetricSnapshot, SourceError>;
}

/// Persistence contract for analysis state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Save state under a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails.
    async fn save(&self, key: &str, state: &PersistedState) -> Result<(), StorageError>;

    /// Load state saved under a key.
    ///
    /// Returns `None` if nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read or decode fails.
    async fn load(&self, key: &str) -> Result<Option<PersistedState>, StorageError>;
}

/// Time provider trait for deterministic testing.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Real time provider using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually driven clock shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeProvider {
    now: Arc<AtomicU64>,
}

impl ManualTimeProvider {
    /// Create a clock at `start` ms.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
