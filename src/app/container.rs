//! Dependency injection container for the training application.
//!
//! This module provides centralized dependency management following hexagonal
//! architecture principles. The container owns infrastructure dependencies and
//! provides factory methods for creating domain objects.

use std::{io::ErrorKind, path::Path, sync::Arc};

use tracing::{info, warn};

use super::config::AgentConfig;
use crate::{
    Error, Result,
    adapters::MsgPackRepository,
    config::RunConfig,
    controller::EpisodeController,
    dqn::NetworkAgent,
    persistence::{AgentState, SavedAgent},
    ports::{AgentKind, AgentRepository, Learner, Simulation},
    q_learning::TabularAgent,
};

/// Application with dependency injection.
///
/// Centralizes creation and wiring of dependencies following hexagonal architecture.
/// All infrastructure dependencies are owned by the app and injected into
/// domain objects and use cases.
///
/// # Examples
///
/// ## Production usage
///
/// ```no_run
/// use scroller::app::{App, AgentConfig};
/// use scroller::ports::AgentKind;
///
/// let app = App::new();
/// let config = AgentConfig::new(AgentKind::Tabular).with_seed(42);
/// let agent = app.load_or_create(&config)?;
/// # Ok::<(), scroller::Error>(())
/// ```
///
/// ## Testing with dependency injection
///
/// ```
/// use scroller::app::App;
/// use scroller::adapters::InMemoryRepository;
///
/// let app = App::for_testing()
///     .with_repository(InMemoryRepository::new())
///     .with_default_seed(42)
///     .build();
/// ```
pub struct App {
    /// Repository for agent persistence
    repository: Arc<dyn AgentRepository + Send + Sync>,
    /// Default random seed (None = non-deterministic)
    default_seed: Option<u64>,
}

impl App {
    /// Create a new app with production defaults.
    ///
    /// Uses:
    /// - `MsgPackRepository` for agent persistence
    /// - No default seed (non-deterministic RNG)
    pub fn new() -> Self {
        Self {
            repository: Arc::new(MsgPackRepository::new()),
            default_seed: None,
        }
    }

    /// Create a builder for constructing app with custom dependencies.
    ///
    /// Primarily used for testing with in-memory dependencies.
    pub fn for_testing() -> AppBuilder {
        AppBuilder::new()
    }

    /// Get the agent repository.
    ///
    /// Returns an Arc-wrapped repository that can be shared with the pipeline.
    pub fn repository(&self) -> Arc<dyn AgentRepository + Send + Sync> {
        Arc::clone(&self.repository)
    }

    /// Create a fresh agent, ignoring any persisted state.
    pub fn create_agent(&self, config: &AgentConfig) -> Result<Box<dyn Learner>> {
        self.build_agent(config, None)
    }

    /// Create an agent and restore its persisted state when there is one.
    ///
    /// A missing state file starts the agent fresh. An unreadable, corrupt,
    /// or incompatible file is logged and also starts the agent fresh; it
    /// never fails startup.
    pub fn load_or_create(&self, config: &AgentConfig) -> Result<Box<dyn Learner>> {
        let path = config.state_path();
        let state = match self.load_snapshot(&path, config.kind) {
            Ok(saved) => {
                info!(
                    path = %path.display(),
                    episodes = saved.metadata.episodes,
                    saved_at = saved.metadata.saved_at.as_deref(),
                    "restoring agent state"
                );
                Some(saved.state)
            }
            Err(Error::Io { ref source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no saved state, starting fresh");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unusable saved state");
                None
            }
        };
        self.build_agent(config, state)
    }

    /// Load a snapshot and check that it belongs to `kind`.
    ///
    /// Unlike [`App::load_or_create`] this reports every failure.
    pub fn load_snapshot(&self, path: &Path, kind: AgentKind) -> Result<SavedAgent> {
        let saved = self.repository.load(path)?;
        saved.check(kind)?;
        Ok(saved)
    }

    /// Save an agent to persistent storage.
    pub fn save_agent(&self, agent: &dyn Learner, path: &Path) -> Result<()> {
        self.repository.save(&agent.snapshot()?, path)
    }

    /// Wire a simulation into an episode controller.
    pub fn create_controller(
        &self,
        run: &RunConfig,
        simulation: Box<dyn Simulation>,
    ) -> Result<EpisodeController> {
        EpisodeController::new(simulation, run.controller.clone(), run.reward.clone())
    }

    fn build_agent(
        &self,
        config: &AgentConfig,
        state: Option<AgentState>,
    ) -> Result<Box<dyn Learner>> {
        let run = &config.run;
        run.validate()?;
        let seed = config.seed.or(self.default_seed);

        match config.kind {
            AgentKind::Tabular => {
                let mut agent = TabularAgent::new(
                    run.tabular.clone(),
                    run.memory.clone(),
                    run.heuristic.clone(),
                )?;
                if let Some(seed) = seed {
                    agent = agent.with_seed(seed);
                }
                if let Some(AgentState::Tabular(state)) = state {
                    agent.restore(state);
                }
                Ok(Box::new(agent))
            }
            AgentKind::Network => {
                let mut agent = NetworkAgent::new(
                    run.network.clone(),
                    run.heuristic.clone(),
                    run.controller.object_radius,
                    seed,
                )?;
                if let Some(AgentState::Network(state)) = state
                    && let Err(err) = agent.restore(state)
                {
                    warn!(
                        error = %err,
                        "saved network does not fit the configuration, starting fresh"
                    );
                }
                Ok(Box::new(agent))
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing app with custom dependencies.
///
/// Primarily used for testing to inject in-memory repositories and control
/// randomness.
pub struct AppBuilder {
    repository: Option<Arc<dyn AgentRepository + Send + Sync>>,
    default_seed: Option<u64>,
}

impl AppBuilder {
    /// Create a new app builder.
    pub fn new() -> Self {
        Self {
            repository: None,
            default_seed: None,
        }
    }

    /// Set a custom agent repository.
    pub fn with_repository<R: AgentRepository + Send + Sync + 'static>(
        mut self,
        repo: R,
    ) -> Self {
        self.repository = Some(Arc::new(repo));
        self
    }

    /// Set a default random seed for all agents created by this container.
    ///
    /// Useful for creating deterministic tests.
    pub fn with_default_seed(mut self, seed: u64) -> Self {
        self.default_seed = Some(seed);
        self
    }

    /// Build the app with the configured dependencies.
    ///
    /// If no repository was specified, uses `MsgPackRepository` by default.
    pub fn build(self) -> App {
        App {
            repository: self
                .repository
                .unwrap_or_else(|| Arc::new(MsgPackRepository::new())),
            default_seed: self.default_seed,
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
