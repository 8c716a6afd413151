//! Metric source adapters.
//!
//! - [`FnSource`]: wraps a closure as a [`MetricSource`]
//! - [`SimulatedSource`]: randomized sources used by the binary when no
//!   real instrumentation is wired in
//! - [`collect_all`]: polls a source set and merges the results

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crate::error::{panic_message, SourceError};
use crate::metrics::MetricSnapshot;
use crate::traits::MetricSource;

// ============================================================================
// Polling
// ============================================================================

/// Result of polling every source once.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    /// Merged snapshot stamped with the tick timestamp.
    pub snapshot: MetricSnapshot,
    /// Sources that failed this round.
    pub failures: usize,
}

/// Poll every source in order and merge their snapshots. Later sources
/// overwrite earlier keys. A failing or panicking source is logged,
/// counted in [`Collected::failures`] and skipped.
#[must_use]
pub fn collect_all(sources: &[Box<dyn MetricSource>], timestamp: u64) -> Collected {
    let mut snapshot = MetricSnapshot::new(timestamp);
    let mut failures = 0;
    for source in sources {
        match catch_unwind(AssertUnwindSafe(|| source.collect())) {
            Ok(Ok(part)) => snapshot.merge(&part),
            Ok(Err(error)) => {
                failures += 1;
                tracing::warn!(source = source.name(), error = %error, "Metric source failed");
            }
            Err(payload) => {
                failures += 1;
                let message = panic_message(payload.as_ref());
                tracing::warn!(source = source.name(), panic = %message, "Metric source panicked");
            }
        }
    }
    snapshot.timestamp = timestamp;
    Collected { snapshot, failures }
}

// ============================================================================
// FnSource
// ============================================================================

/// A [`MetricSource`] backed by a closure.
pub struct FnSource<F> {
    name: String,
    collect: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<MetricSnapshot, SourceError> + Send + Sync,
{
    /// Wrap a closure.
    #[must_use]
    pub fn new(name: impl Into<String>, collect: F) -> Self {
        Self {
            name: name.into(),
            collect,
        }
    }

    /// Wrap and box a closure.
    #[must_use]
    pub fn boxed(name: impl Into<String>, collect: F) -> Box<dyn MetricSource>
    where
        F: 'static,
    {
        Box::new(Self::new(name, collect))
    }
}

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").field("name", &self.name).finish()
    }
}

impl<F> MetricSource for FnSource<F>
where
    F: Fn() -> Result<MetricSnapshot, SourceError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> Result<MetricSnapshot, SourceError> {
        (self.collect)()
    }
}

// ============================================================================
// Simulated sources
// ============================================================================

/// Which metric family a simulated source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedKind {
    /// `fps`, `frame_time`, `frame_variance`.
    Frame,
    /// `memory_used`, `memory_growth`.
    Memory,
    /// `render_time`, `draw_calls`.
    Render,
    /// `network_latency`, `bandwidth`, `error_rate`.
    Network,
    /// `input_lag`, `response_time`.
    Interaction,
    /// `cpu_usage`, `power_consumption`, `thermal_state`.
    Power,
}

impl SimulatedKind {
    /// All kinds.
    pub const ALL: [Self; 6] = [
        Self::Frame,
        Self::Memory,
        Self::Render,
        Self::Network,
        Self::Interaction,
        Self::Power,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Memory => "memory",
            Self::Render => "render",
            Self::Network => "network",
            Self::Interaction => "interaction",
            Self::Power => "power",
        }
    }
}

struct SimState {
    rng: StdRng,
    memory_mb: f64,
}

/// Randomized metric source.
pub struct SimulatedSource {
    kind: SimulatedKind,
    state: Mutex<SimState>,
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SimulatedSource {
    /// Create a source. A seed makes the output reproducible.
    #[must_use]
    pub fn new(kind: SimulatedKind, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            kind,
            state: Mutex::new(SimState {
                rng,
                memory_mb: 256.0,
            }),
        }
    }

    /// One source of every kind, seeded from `seed` when given.
    #[must_use]
    pub fn standard_set(seed: Option<u64>) -> Vec<Box<dyn MetricSource>> {
        SimulatedKind::ALL
            .iter()
            .zip(0u64..)
            .map(|(kind, offset)| {
                Box::new(Self::new(*kind, seed.map(|s| s.wrapping_add(offset))))
                    as Box<dyn MetricSource>
            })
            .collect()
    }
}

impl MetricSource for SimulatedSource {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn collect(&self) -> Result<MetricSnapshot, SourceError> {
        let mut state = self.state.lock().map_err(|_| SourceError::Unavailable {
            source_name: self.kind.name().to_string(),
            message: "state lock poisoned".into(),
        })?;
        let SimState { rng, memory_mb } = &mut *state;

        let snapshot = MetricSnapshot::new(0);
        Ok(match self.kind {
            SimulatedKind::Frame => {
                let frame_time: f64 = rng.gen_range(14.0..22.0);
                snapshot
                    .with("fps", (1000.0 / frame_time).min(60.0))
                    .with("frame_time", frame_time)
                    .with("frame_variance", rng.gen_range(0.0..4.0))
            }
            SimulatedKind::Memory => {
                let delta: f64 = rng.gen_range(-2.0..2.5);
                *memory_mb = (*memory_mb + delta).max(64.0);
                snapshot
                    .with("memory_used", *memory_mb)
                    .with("memory_growth", delta)
            }
            SimulatedKind::Render => snapshot
                .with("render_time", rng.gen_range(2.0..12.0))
                .with("draw_calls", f64::from(rng.gen_range(10u32..60))),
            SimulatedKind::Network => snapshot
                .with("network_latency", rng.gen_range(20.0..120.0))
                .with("bandwidth", rng.gen_range(500.0..1500.0))
                .with("error_rate", rng.gen_range(0.0..2.0)),
            SimulatedKind::Interaction => snapshot
                .with("input_lag", rng.gen_range(5.0..35.0))
                .with("response_time", rng.gen_range(10.0..60.0)),
            SimulatedKind::Power => snapshot
                .with("cpu_usage", rng.gen_range(10.0..70.0))
                .with("power_consumption", rng.gen_range(200.0..600.0))
                .with("thermal_state", f64::from(rng.gen_range(0u8..3))),
        })
    }
}
