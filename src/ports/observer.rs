//! Observer port - typed telemetry for training runs
//!
//! The training loop emits structured events (action chosen, reward
//! components, update magnitude, episode summaries) to any number of
//! observers. Observers never influence control flow; an observer error only
//! aborts the run after persisted state has been flushed.

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    episode::EpisodeSummary,
    game::{Action, GameState},
    ports::learner::{AgentKind, DecisionSource, UpdateReport},
    reward::RewardBreakdown,
};

/// Emitted after an action has been chosen, before it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionTelemetry {
    pub episode: usize,
    pub step: usize,
    pub game_state: GameState,
    pub action: Action,
    pub source: DecisionSource,
    pub epsilon: f64,
}

/// Emitted after the controller has shaped the step's reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTelemetry {
    pub episode: usize,
    pub step: usize,
    pub game_state: GameState,
    pub breakdown: RewardBreakdown,
    pub total: f64,
    pub stagnation_steps: u32,
    /// Set when the step was forced to terminate, with the cause.
    pub termination: Option<String>,
}

/// Emitted when a learning step changed the agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateTelemetry {
    pub episode: usize,
    pub step: usize,
    pub report: UpdateReport,
}

/// Observer trait for monitoring training
///
/// # Event Sequence
///
/// 1. `on_training_start(agent, budget)` - once
/// 2. For each episode:
///    - `on_episode_start(episode)`
///    - per step: `on_action`, `on_reward`, and `on_update` when learning
///      changed something
///    - `on_episode_end(summary)`
/// 3. `on_training_end()` - once, also on interrupt
///
/// Every method defaults to a no-op.
pub trait Observer: Send {
    /// `budget` is `None` when training runs until interrupted.
    fn on_training_start(&mut self, _agent: AgentKind, _budget: Option<usize>) -> Result<()> {
        Ok(())
    }

    fn on_episode_start(&mut self, _episode: usize) -> Result<()> {
        Ok(())
    }

    fn on_action(&mut self, _event: &ActionTelemetry) -> Result<()> {
        Ok(())
    }

    fn on_reward(&mut self, _event: &RewardTelemetry) -> Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _event: &UpdateTelemetry) -> Result<()> {
        Ok(())
    }

    fn on_episode_end(&mut self, _summary: &EpisodeSummary) -> Result<()> {
        Ok(())
    }

    /// Use this to finalize outputs, flush files, or display summaries.
    fn on_training_end(&mut self) -> Result<()> {
        Ok(())
    }
}
