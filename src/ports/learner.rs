//! Learner port - abstraction over the two agent variants
//!
//! Both the tabular agent and the replay-based network agent implement this
//! trait, so the training pipeline drives either one without knowing which.

use std::{any::Any, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    episode::{EpisodeSummary, Transition},
    game::{Action, Observation},
    persistence::SavedAgent,
};

/// Which agent variant a learner (or a saved blob) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Tabular,
    Network,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Tabular => "tabular",
            AgentKind::Network => "network",
        }
    }

    /// File name of the persisted blob for this variant.
    pub fn file_name(self) -> String {
        format!("{}.msgpack", self.as_str())
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tabular" | "q" | "q_table" => Ok(AgentKind::Tabular),
            "network" | "dqn" => Ok(AgentKind::Network),
            other => Err(Error::config(format!("unknown agent kind '{other}'"))),
        }
    }
}

/// Which stage of the selection pipeline produced an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Menu script or terminal default.
    Scripted,
    /// Known death zone overrode the normal pipeline.
    DeathZone,
    /// Stuck detector's escape sequence.
    Escape,
    Explore,
    Greedy,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::Scripted => "scripted",
            DecisionSource::DeathZone => "death_zone",
            DecisionSource::Escape => "escape",
            DecisionSource::Explore => "explore",
            DecisionSource::Greedy => "greedy",
        }
    }
}

/// An action together with the reason it was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub source: DecisionSource,
}

impl Decision {
    pub fn new(action: Action, source: DecisionSource) -> Self {
        Self { action, source }
    }
}

/// What a single learning step changed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    /// |ΔQ| of the updated entry, or the minibatch loss for the network agent.
    pub magnitude: f64,
    /// Effective learning rate used.
    pub learning_rate: f64,
    /// Neighboring keys that received a propagated value.
    pub neighbors: usize,
    /// Minibatch size used, zero for tabular updates.
    pub batch_size: usize,
    pub target_synced: bool,
}

/// Learner trait - unified interface for both agent variants
///
/// # Call sequence
///
/// For every controller step the pipeline calls `select_action` with the
/// current observation and then `learn` with the resulting transition. When
/// the episode ends it calls `end_episode`, then persists `snapshot()` if the
/// episode reached a terminal state.
pub trait Learner: Send {
    /// Choose the next action for the given observation.
    ///
    /// Outside of play (menu, level start, terminal) learners fall back to
    /// scripted actions.
    fn select_action(&mut self, observation: &Observation) -> Result<Decision>;

    /// Learn from one transition.
    ///
    /// Returns `None` when the transition carried no learning signal (for
    /// example menu navigation) or when the network agent is still filling
    /// its replay buffer.
    fn learn(&mut self, transition: &Transition) -> Result<Option<UpdateReport>>;

    /// Called once per finished episode.
    ///
    /// # Default Implementation
    ///
    /// Does nothing.
    fn end_episode(&mut self, _summary: &EpisodeSummary) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    /// Current exploration rate.
    fn epsilon(&self) -> f64;

    /// Episodes completed over the learner's lifetime, including those
    /// restored from a snapshot.
    fn episodes(&self) -> u64;

    /// Serializable snapshot of everything that survives a restart.
    fn snapshot(&self) -> Result<SavedAgent>;

    /// Seed the learner's internal random number generator.
    ///
    /// # Default Implementation
    ///
    /// Does nothing and returns `Ok(())`.
    fn set_rng_seed(&mut self, _seed: u64) -> Result<()> {
        Ok(())
    }

    /// Enable downcasting to concrete types.
    fn as_any(&self) -> &dyn Any;
}
