//! Shared configuration for CLI commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::{app::AgentConfig, config::RunConfig, ports::AgentKind};

/// Agent variant as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentType {
    /// Tabular Q-learning with death-zone memory
    Tabular,
    /// Replay-based value network
    Network,
}

impl From<AgentType> for AgentKind {
    fn from(agent: AgentType) -> Self {
        match agent {
            AgentType::Tabular => AgentKind::Tabular,
            AgentType::Network => AgentKind::Network,
        }
    }
}

/// Options shared by every command that touches persisted state
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory holding `<agent>.msgpack` state files
    #[arg(long, default_value = "state")]
    pub state_dir: PathBuf,

    /// JSON file with run parameters; missing keys keep their defaults
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long, short = 's')]
    pub seed: Option<u64>,
}

impl CommonArgs {
    /// Resolve the run parameters, reading `--config` when given.
    pub fn run_config(&self) -> Result<RunConfig> {
        match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => Ok(RunConfig::default()),
        }
    }

    /// Build the application-level agent configuration.
    pub fn agent_config(&self, agent: AgentType) -> Result<AgentConfig> {
        let mut config = AgentConfig::new(agent.into())
            .with_run_config(self.run_config()?)
            .with_state_dir(&self.state_dir);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(config: Option<PathBuf>) -> CommonArgs {
        CommonArgs {
            state_dir: PathBuf::from("runs/state"),
            config,
            seed: Some(3),
        }
    }

    #[test]
    fn test_agent_config_uses_state_dir_and_seed() {
        let config = common(None).agent_config(AgentType::Network).unwrap();
        assert_eq!(config.kind, AgentKind::Network);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.state_path(), PathBuf::from("runs/state/network.msgpack"));
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"tabular": {"epsilon": 0.5}}"#).unwrap();

        let run = common(Some(path)).run_config().unwrap();
        assert_eq!(run.tabular.epsilon, 0.5);
        assert_eq!(run.reward, RunConfig::default().reward);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = common(Some(PathBuf::from("/nonexistent/run.json")))
            .run_config()
            .unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
