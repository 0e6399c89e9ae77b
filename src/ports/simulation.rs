//! Simulation port - the external game being driven
//!
//! The simulation can only be stepped forward. It is never rewound and never
//! queried outside of `reset`/`step`, and it is not reentrant: one controller
//! owns one simulation and steps it sequentially.

use serde::{Deserialize, Serialize};

use crate::{
    error::SimulationFault,
    game::{Action, RawFrame},
};

/// Diagnostic flags attached to a simulation step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimInfo {
    pub flags: Vec<String>,
}

impl SimInfo {
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn has(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Result of advancing the simulation by one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SimStep {
    pub frame: RawFrame,
    /// Reward reported by the simulation itself, kept for diagnostics only.
    pub reward: f64,
    pub done: bool,
    pub info: SimInfo,
}

impl SimStep {
    pub fn new(frame: RawFrame) -> Self {
        Self {
            frame,
            reward: 0.0,
            done: false,
            info: SimInfo::default(),
        }
    }
}

/// A real-time side-scrolling simulation.
///
/// # Contract
///
/// - `reset()` returns the simulation to its menu and yields the first frame.
/// - `step(action)` blocks until exactly one frame has advanced.
/// - `close()` releases resources and must be idempotent. Any call after
///   `close()` should fail with [`SimulationFault::Closed`].
pub trait Simulation: Send {
    fn reset(&mut self) -> Result<RawFrame, SimulationFault>;

    fn step(&mut self, action: Action) -> Result<SimStep, SimulationFault>;

    fn close(&mut self);

    /// Human-readable adapter name for logs.
    fn name(&self) -> &str {
        "simulation"
    }
}
