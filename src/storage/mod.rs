//! Storage backend.
//!
//! This module provides the `SQLite` implementation of
//! [`SnapshotStore`](crate::traits::SnapshotStore): one row per key holding
//! the JSON-encoded [`PersistedState`](crate::engine::PersistedState).
//!
//! The implementation is split across submodules:
//! - `core`: Pool management, migrations, and helper functions
//! - `snapshots`: Row operations on the snapshot table
//! - `trait_impl`: `SnapshotStore` implementation
//!
//! # Example
//!
//! ```ignore
//! use perf_telemetry::storage::SqliteSnapshotStore;
//! use perf_telemetry::traits::SnapshotStore;
//!
//! let store = SqliteSnapshotStore::new("./data/telemetry.db").await?;
//! let state = store.load("analyzer").await?;
//! ```

mod core;
mod snapshots;
mod trait_impl;

pub use self::core::SqliteSnapshotStore;
pub use snapshots::StoredSnapshot;
