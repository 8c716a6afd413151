//! Error types for the performance telemetry engine.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`AnalysisError`]: Snapshot validation and analysis unit errors
//! - [`SourceError`]: Metric source collection errors
//! - [`StorageError`]: Persistence errors
//! - [`MonitorError`]: Real-time monitor lifecycle errors
//! - [`ConfigError`]: Configuration errors
//!
//! All errors implement `Send + Sync`. Analysis units never propagate their
//! faults past a tick; see [`isolate`].

mod isolate;

pub use isolate::isolate;
pub(crate) use isolate::panic_message;

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by public API functions.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AppError {
    /// Analysis error.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Metric source error.
    #[error("Metric source error: {0}")]
    Source(#[from] SourceError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Monitor error.
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Analysis errors.
///
/// Raised by snapshot validation and by individual analysis units (trend
/// algorithms, statistical processors, insight rules, event detectors).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The snapshot input was not a key/value map.
    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of what's invalid.
        message: String,
    },

    /// The snapshot contained no finite numeric metric.
    #[error("Snapshot contains no valid numeric metrics")]
    EmptySnapshot,

    /// Not enough samples to compute a result.
    #[error("Insufficient samples for {unit}: need {required}, have {available}")]
    InsufficientSamples {
        /// The analysis unit that was starved.
        unit: String,
        /// Samples required.
        required: usize,
        /// Samples available.
        available: usize,
    },

    /// An analysis unit failed or panicked.
    #[error("Analysis unit {unit} failed: {message}")]
    UnitFault {
        /// The analysis unit name.
        unit: String,
        /// Description of the fault.
        message: String,
    },
}

/// Metric source errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not produce a snapshot.
    #[error("Source {source_name} unavailable: {message}")]
    Unavailable {
        /// The source name.
        source_name: String,
        /// Description of the failure.
        message: String,
    },
}

/// Storage errors.
///
/// These errors represent failures in snapshot persistence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failed to connect to the database.
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Description of the connection failure.
        message: String,
    },

    /// A database query failed.
    #[error("Query failed: {query} - {message}")]
    QueryFailed {
        /// The query that failed (may be truncated).
        query: String,
        /// Description of the failure.
        message: String,
    },

    /// Database migration failed.
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed {
        /// The migration version that failed.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// Persisted payload could not be encoded or decoded.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

/// Real-time monitor errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Monitoring is already running.
    #[error("Monitoring is already active")]
    AlreadyRunning,

    /// Monitoring is not running.
    #[error("Monitoring is not active")]
    NotRunning,

    /// A stream subscriber rejected a data point.
    #[error("Stream subscriber failed: {message}")]
    Subscriber {
        /// Description of the failure.
        message: String,
    },

    /// The background task is gone.
    #[error("Background task unavailable: {message}")]
    TaskUnavailable {
        /// Description of why the task is unavailable.
        message: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}
