//! Configuration types for agent creation.

use std::path::{Path, PathBuf};

use crate::{config::RunConfig, ports::AgentKind};

/// Configuration for creating an agent.
///
/// This type provides a type-safe, builder-style API for configuring agents
/// before creation through the dependency injection container.
///
/// # Examples
///
/// ```
/// use scroller::app::AgentConfig;
/// use scroller::ports::AgentKind;
///
/// let config = AgentConfig::new(AgentKind::Tabular)
///     .with_seed(42)
///     .with_state_dir("runs/state");
/// assert!(config.state_path().ends_with("tabular.msgpack"));
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Which agent variant to build
    pub kind: AgentKind,
    /// Hyperparameters for the controller, heuristic and both agents
    pub run: RunConfig,
    /// Directory holding one persisted blob per agent variant
    pub state_dir: PathBuf,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl AgentConfig {
    /// Create a new agent configuration for the given variant.
    ///
    /// Uses default hyperparameters, the `state` directory and no seed.
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            run: RunConfig::default(),
            state_dir: PathBuf::from("state"),
            seed: None,
        }
    }

    pub fn with_run_config(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn with_state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.state_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the random seed for deterministic behavior.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// File the agent is loaded from and saved to.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(self.kind.file_name())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(AgentKind::Tabular)
    }
}
