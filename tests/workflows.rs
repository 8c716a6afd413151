//! Workflow integration tests entry point.
//!
//! This module includes the multi-step workflow tests:
//! - Monitor: start → detect → resolve → stop
//! - Manager: tick → save → restart → load
//! - Error recovery: failing sources, panicking callbacks, corrupt state

mod integration;
