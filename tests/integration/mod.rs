//! Workflow tests for the performance telemetry engine.
//!
//! These tests drive the background tasks end to end:
//! - Real-time monitor lifecycle and event transitions
//! - Analysis manager persistence across restarts
//! - Error recovery paths

mod error_recovery;
mod manager_workflow;
mod monitor_workflow;
