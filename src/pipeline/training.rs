//! Training pipeline: the episode loop driving one controller and one learner

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Result,
    controller::EpisodeController,
    episode::{EpisodeOutcome, EpisodeSummary, Transition},
    game::TerminalKind,
    ports::{
        ActionTelemetry, AgentRepository, Learner, Observer, RewardTelemetry, UpdateTelemetry,
    },
};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of episodes; `None` trains until stopped.
    pub episodes: Option<usize>,

    /// Step budget per episode. Exhausting it truncates the episode.
    pub max_steps_per_episode: Option<usize>,

    /// Delay after every step, for real-time playback.
    pub pace_ms: u64,

    /// Random seed for the learner
    pub seed: Option<u64>,

    /// Persist the learner after every N finished episodes.
    pub save_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: None,
            max_steps_per_episode: Some(5000),
            pace_ms: 0,
            seed: None,
            save_every: 1,
        }
    }
}

/// Cooperative stop request shared with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a training run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Episodes that ran to a terminal state or were truncated
    pub episodes: usize,

    /// Episodes that reached the checkpoint
    pub checkpoints: usize,

    /// Episodes that ended in a game over
    pub game_overs: usize,

    /// Episodes cut off by the step budget
    pub truncated: usize,

    /// Whether the run was stopped early
    pub interrupted: bool,

    /// Controller steps across all episodes
    pub total_steps: usize,

    /// Mean cumulative reward per finished episode
    pub mean_reward: f64,

    /// Furthest x reached in an episode that did not reach the checkpoint
    pub best_distance: f64,

    /// Fastest checkpoint run, in simulation seconds
    pub best_time: Option<f64>,
}

impl TrainingResult {
    fn record(&mut self, summary: &EpisodeSummary) {
        self.total_steps += summary.steps;
        if summary.outcome == EpisodeOutcome::Interrupted {
            self.interrupted = true;
            return;
        }
        let n = self.episodes as f64;
        self.mean_reward = (self.mean_reward * n + summary.cumulative_reward) / (n + 1.0);
        self.episodes += 1;
        match summary.outcome {
            EpisodeOutcome::Terminal(TerminalKind::CheckpointReached) => {
                self.checkpoints += 1;
                let time = summary.elapsed_time;
                self.best_time = Some(self.best_time.map_or(time, |best| best.min(time)));
            }
            EpisodeOutcome::Terminal(TerminalKind::GameOver) => self.game_overs += 1,
            EpisodeOutcome::Truncated => self.truncated += 1,
            EpisodeOutcome::Interrupted => {}
        }
        if !summary.outcome.is_success() {
            self.best_distance = self.best_distance.max(summary.terminal_score());
        }
    }

    /// Fraction of finished episodes that reached the checkpoint
    pub fn success_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.checkpoints as f64 / self.episodes as f64
        }
    }

    /// Save result to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

struct Persistence {
    repository: Arc<dyn AgentRepository + Send + Sync>,
    path: PathBuf,
}

/// Training pipeline for a single learner
pub struct TrainingPipeline {
    config: TrainingConfig,
    observers: Vec<Box<dyn Observer>>,
    persistence: Option<Persistence>,
    stop: StopSignal,
}

impl TrainingPipeline {
    /// Create a new training pipeline
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            persistence: None,
            stop: StopSignal::new(),
        }
    }

    /// Add an observer to the pipeline
    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Save the learner to `path` after episodes and when the run ends.
    pub fn with_persistence(
        mut self,
        repository: Arc<dyn AgentRepository + Send + Sync>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.persistence = Some(Persistence {
            repository,
            path: path.into(),
        });
        self
    }

    /// Stop cooperatively when `stop` is raised.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run episodes until the budget is spent or a stop is requested.
    ///
    /// Whatever ends the run (budget, stop request, or an error from the
    /// learner or an observer), the learner is persisted and the controller
    /// is closed before this returns.
    pub fn run(
        &mut self,
        controller: &mut EpisodeController,
        agent: &mut dyn Learner,
    ) -> Result<TrainingResult> {
        if let Some(seed) = self.config.seed {
            agent.set_rng_seed(seed)?;
        }

        let mut result = TrainingResult::default();
        let outcome = self.run_episodes(controller, agent, &mut result);

        let saved = self.persist(agent);
        controller.close();

        let mut ended = Ok(());
        for observer in &mut self.observers {
            if let Err(err) = observer.on_training_end() {
                warn!(error = %err, "observer failed to finish");
                ended = Err(err);
            }
        }

        outcome?;
        saved?;
        ended?;

        info!(
            agent = agent.name(),
            episodes = result.episodes,
            checkpoints = result.checkpoints,
            interrupted = result.interrupted,
            "training finished"
        );
        Ok(result)
    }

    fn run_episodes(
        &mut self,
        controller: &mut EpisodeController,
        agent: &mut dyn Learner,
        result: &mut TrainingResult,
    ) -> Result<()> {
        for observer in &mut self.observers {
            observer.on_training_start(agent.kind(), self.config.episodes)?;
        }

        let first_index = usize::try_from(agent.episodes()).unwrap_or(usize::MAX);
        let mut played = 0;
        while self.config.episodes.is_none_or(|budget| played < budget) {
            if self.stop.is_stopped() {
                result.interrupted = true;
                break;
            }

            let index = first_index.saturating_add(played);
            let summary = self.run_episode(index, controller, agent)?;
            played += 1;
            result.record(&summary);

            if summary.outcome == EpisodeOutcome::Interrupted {
                debug!(episode = summary.index, "episode interrupted");
                break;
            }

            agent.end_episode(&summary)?;
            for observer in &mut self.observers {
                observer.on_episode_end(&summary)?;
            }

            let save_every = self.config.save_every.max(1);
            if played.is_multiple_of(save_every) {
                self.persist(agent)?;
            }
        }
        Ok(())
    }

    fn run_episode(
        &mut self,
        index: usize,
        controller: &mut EpisodeController,
        agent: &mut dyn Learner,
    ) -> Result<EpisodeSummary> {
        for observer in &mut self.observers {
            observer.on_episode_start(index)?;
        }

        let mut observation = controller.reset()?;
        let mut step = 0;
        let outcome = loop {
            if self.stop.is_stopped() {
                break EpisodeOutcome::Interrupted;
            }
            if self
                .config
                .max_steps_per_episode
                .is_some_and(|max| step >= max)
            {
                break EpisodeOutcome::Truncated;
            }

            let decision = agent.select_action(&observation)?;
            let action_event = ActionTelemetry {
                episode: index,
                step,
                game_state: observation.game_state(),
                action: decision.action,
                source: decision.source,
                epsilon: agent.epsilon(),
            };
            for observer in &mut self.observers {
                observer.on_action(&action_event)?;
            }

            let outcome = controller.step(decision.action)?;
            let reward_event = RewardTelemetry {
                episode: index,
                step,
                game_state: outcome.info.game_state,
                breakdown: outcome.breakdown,
                total: outcome.reward,
                stagnation_steps: outcome.info.stagnation_steps,
                termination: outcome.info.cause.map(|cause| cause.to_string()),
            };
            for observer in &mut self.observers {
                observer.on_reward(&reward_event)?;
            }

            let transition = Transition {
                state: observation,
                action: decision.action,
                reward: outcome.reward,
                next_state: outcome.observation,
                done: outcome.done,
            };
            if let Some(report) = agent.learn(&transition)? {
                let update_event = UpdateTelemetry {
                    episode: index,
                    step,
                    report,
                };
                for observer in &mut self.observers {
                    observer.on_update(&update_event)?;
                }
            }

            step += 1;
            observation = transition.next_state;
            if let Some(kind) = observation.terminal_kind() {
                break EpisodeOutcome::Terminal(kind);
            }
            if self.config.pace_ms > 0 {
                thread::sleep(Duration::from_millis(self.config.pace_ms));
            }
        };

        Ok(EpisodeSummary {
            index,
            steps: controller.steps(),
            cumulative_reward: controller.cumulative_reward(),
            outcome,
            last_position: controller.last_position(),
            elapsed_time: controller.elapsed_time(),
        })
    }

    fn persist(&self, agent: &dyn Learner) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        persistence
            .repository
            .save(&agent.snapshot()?, &persistence.path)?;
        debug!(path = ?persistence.path, episodes = agent.episodes(), "agent saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{InMemoryRepository, ScriptedSimulation},
        config::{
            ControllerConfig, HeuristicConfig, RewardConfig, SpatialMemoryConfig, TabularConfig,
        },
        game::{Action, RawFrame},
        ports::AgentKind,
        q_learning::TabularAgent,
    };

    fn level(frames: Vec<RawFrame>) -> EpisodeController {
        let mut script = vec![RawFrame::menu(0).selected()];
        script.extend(frames);
        EpisodeController::new(
            Box::new(ScriptedSimulation::new(RawFrame::menu(0), script)),
            ControllerConfig {
                checkpoint_x: 1000.0,
                ..ControllerConfig::default()
            },
            RewardConfig::default(),
        )
        .unwrap()
    }

    fn agent() -> TabularAgent {
        TabularAgent::new(
            TabularConfig::default(),
            SpatialMemoryConfig::default(),
            HeuristicConfig {
                menu_sequence: vec![Action::Select],
                ..HeuristicConfig::default()
            },
        )
        .unwrap()
        .with_seed(3)
    }

    #[derive(Default)]
    struct Counter {
        starts: usize,
        ends: Vec<EpisodeOutcome>,
        finished: bool,
    }

    struct Shared(Arc<std::sync::Mutex<Counter>>);

    impl Observer for Shared {
        fn on_episode_start(&mut self, _episode: usize) -> Result<()> {
            self.0.lock().unwrap().starts += 1;
            Ok(())
        }

        fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
            self.0.lock().unwrap().ends.push(summary.outcome);
            Ok(())
        }

        fn on_training_end(&mut self) -> Result<()> {
            self.0.lock().unwrap().finished = true;
            Ok(())
        }
    }

    #[test]
    fn test_runs_budget_and_counts_deaths() {
        let mut controller = level(vec![
            RawFrame::at(80.0, 400.0),
            RawFrame::at(82.0, 400.0),
            RawFrame::at(84.0, 460.0),
        ]);
        let counter = Arc::new(std::sync::Mutex::new(Counter::default()));
        let mut pipeline = TrainingPipeline::new(TrainingConfig {
            episodes: Some(3),
            ..TrainingConfig::default()
        })
        .with_observer(Box::new(Shared(counter.clone())));

        let mut agent = agent();
        let result = pipeline.run(&mut controller, &mut agent).unwrap();

        assert_eq!(result.episodes, 3);
        assert_eq!(result.game_overs, 3);
        assert!(!result.interrupted);
        assert_eq!(agent.episodes(), 3);
        assert!(controller.is_closed());

        let counter = counter.lock().unwrap();
        assert_eq!(counter.starts, 3);
        assert_eq!(
            counter.ends,
            vec![EpisodeOutcome::Terminal(TerminalKind::GameOver); 3]
        );
        assert!(counter.finished);
    }

    #[test]
    fn test_step_budget_truncates() {
        let mut controller = level(vec![RawFrame::at(80.0, 400.0)]);
        let mut pipeline = TrainingPipeline::new(TrainingConfig {
            episodes: Some(1),
            max_steps_per_episode: Some(10),
            ..TrainingConfig::default()
        });
        let mut agent = agent();
        let result = pipeline.run(&mut controller, &mut agent).unwrap();
        assert_eq!(result.truncated, 1);
        assert_eq!(result.total_steps, 10);
        assert!(agent.memory().is_empty());
    }

    #[test]
    fn test_stop_before_start_saves_and_closes() {
        let repository = InMemoryRepository::new();
        let path = PathBuf::from("tabular.msgpack");
        let mut controller = level(vec![RawFrame::at(80.0, 400.0)]);
        let stop = StopSignal::new();
        stop.stop();
        let mut pipeline = TrainingPipeline::new(TrainingConfig::default())
            .with_stop_signal(stop)
            .with_persistence(Arc::new(repository.clone()), &path);

        let mut agent = agent();
        let result = pipeline.run(&mut controller, &mut agent).unwrap();

        assert!(result.interrupted);
        assert_eq!(result.episodes, 0);
        assert!(controller.is_closed());
        let saved = repository.load(&path).unwrap();
        assert_eq!(saved.kind(), AgentKind::Tabular);
    }

    #[test]
    fn test_success_rate() {
        let mut result = TrainingResult::default();
        assert_eq!(result.success_rate(), 0.0);
        result.episodes = 4;
        result.checkpoints = 1;
        assert_eq!(result.success_rate(), 0.25);
    }
}
