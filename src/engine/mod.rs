//! Analysis orchestration.
//!
//! - [`PerformanceAnalyzer`]: owns every analysis unit and runs them per tick
//! - [`AnalysisManager`] / [`AnalysisHandle`]: the analyzer as a background
//!   actor with a cloneable command handle
//! - [`PersistedState`]: the serializable state used for save and load

mod analyzer;
mod manager;
mod state;

pub use analyzer::{
    AnalysisResults, PerformanceAnalyzer, TickSummary, RESULT_ANOMALIES, RESULT_INSIGHTS,
};
pub use manager::{
    AnalysisHandle, AnalysisManager, ManagerCommand, ManagerStatus, DEFAULT_STATE_KEY,
};
pub use state::PersistedState;
