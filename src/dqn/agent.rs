//! Replay-based function-approximation agent
//!
//! Online and target networks share one architecture. Every gameplay
//! transition goes into the replay buffer; once it holds a full batch, each
//! step trains the online network on a uniform minibatch against targets
//! `r + γ · max_a' Q_target(s', a') · (1 − done)`. The target network is
//! hard-synced from the online one every `target_sync_interval` transitions.

use std::any::Any;

use candle_nn::AdamW;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Error, Result,
    config::{HeuristicConfig, NetworkConfig},
    dqn::{
        network::{NetworkWeights, QNetwork, TrainingSample},
        replay::{Experience, ReplayBuffer},
    },
    episode::{EpisodeSummary, Transition},
    game::{Action, FEATURE_DIM, Observation, ObservationEncoder},
    heuristic::HeuristicScorer,
    persistence::{AgentState, SavedAgent},
    ports::{AgentKind, Decision, DecisionSource, Learner, UpdateReport},
    q_learning::agent::build_rng,
};

/// Everything the network agent persists. The target network is rebuilt
/// from `online`, the optimizer restarts and the replay buffer starts empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub online: NetworkWeights,
    pub epsilon: f64,
    pub transitions: u64,
    pub learn_steps: u64,
    pub episodes: u64,
}

pub struct NetworkAgent {
    config: NetworkConfig,
    encoder: ObservationEncoder,
    heuristic: HeuristicScorer,
    online: QNetwork,
    target: QNetwork,
    optimizer: AdamW,
    replay: ReplayBuffer,
    epsilon: f64,
    transitions: u64,
    learn_steps: u64,
    episodes: u64,
    rng: StdRng,
}

impl NetworkAgent {
    /// `object_radius` must match the controller's so features are scaled
    /// the same way they were observed.
    pub fn new(
        config: NetworkConfig,
        heuristic: HeuristicConfig,
        object_radius: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;
        let mut rng = build_rng(seed);
        let online = QNetwork::new(FEATURE_DIM, config.hidden_units, &mut rng)?;
        Ok(Self {
            encoder: ObservationEncoder::new(object_radius),
            heuristic: HeuristicScorer::new(heuristic)?,
            target: online.duplicate()?,
            optimizer: online.optimizer(config.learning_rate)?,
            online,
            replay: ReplayBuffer::new(config.replay_capacity)?,
            epsilon: config.epsilon,
            transitions: 0,
            learn_steps: 0,
            episodes: 0,
            rng,
            config,
        })
    }

    pub fn export_state(&self) -> Result<NetworkState> {
        Ok(NetworkState {
            online: self.online.weights()?,
            epsilon: self.epsilon,
            transitions: self.transitions,
            learn_steps: self.learn_steps,
            episodes: self.episodes,
        })
    }

    /// Load persisted weights.
    ///
    /// Fails with [`Error::InvalidConfiguration`], leaving the agent
    /// untouched, when the saved architecture does not match the configured
    /// one or any weight buffer does not fit its declared shape.
    pub fn restore(&mut self, state: NetworkState) -> Result<()> {
        if state.online.input_dim != FEATURE_DIM
            || state.online.hidden_dim != self.config.hidden_units
        {
            return Err(Error::config(format!(
                "saved network is {}x{}, configured {}x{}",
                state.online.input_dim,
                state.online.hidden_dim,
                FEATURE_DIM,
                self.config.hidden_units
            )));
        }
        let online = QNetwork::from_weights(&state.online)?;
        self.target = online.duplicate()?;
        self.optimizer = online.optimizer(self.config.learning_rate)?;
        self.online = online;
        self.epsilon = state.epsilon.clamp(self.config.min_epsilon, 1.0);
        self.transitions = state.transitions;
        self.learn_steps = state.learn_steps;
        self.episodes = state.episodes;
        self.replay.clear();
        Ok(())
    }

    pub fn online(&self) -> &QNetwork {
        &self.online
    }

    pub fn target(&self) -> &QNetwork {
        &self.target
    }

    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    fn train_minibatch(&mut self) -> Result<f64> {
        let gamma = self.config.discount_factor;
        let batch = self.replay.sample(self.config.batch_size, &mut self.rng);
        let next: Vec<&[f64]> = batch.iter().map(|e| e.next_features.as_slice()).collect();
        let next_values = self.target.predict_batch(&next)?;
        let targets: Vec<f64> = batch
            .iter()
            .zip(&next_values)
            .map(|(e, values)| {
                let bootstrap = if e.done { 0.0 } else { values.max() };
                e.reward + gamma * bootstrap
            })
            .collect();
        let samples: Vec<TrainingSample<'_>> = batch
            .iter()
            .zip(&targets)
            .map(|(e, &target)| TrainingSample {
                features: &e.features,
                action: e.action,
                target,
            })
            .collect();
        self.online
            .train(&mut self.optimizer, &samples, self.config.gradient_clip)
    }
}

impl Learner for NetworkAgent {
    fn select_action(&mut self, observation: &Observation) -> Result<Decision> {
        if observation.player().is_none() {
            let action = self.heuristic.fallback(observation);
            return Ok(Decision::new(action, DecisionSource::Scripted));
        }
        if self.rng.random::<f64>() < self.epsilon {
            let action = Action::GAMEPLAY
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(Action::Right);
            return Ok(Decision::new(action, DecisionSource::Explore));
        }
        let features = self.encoder.features(observation);
        let action = self.online.predict(&features)?.best();
        Ok(Decision::new(action, DecisionSource::Greedy))
    }

    fn learn(&mut self, transition: &Transition) -> Result<Option<UpdateReport>> {
        if !transition.is_gameplay() {
            return Ok(None);
        }
        let Some(action) = transition.action.index() else {
            return Ok(None);
        };
        self.replay.push(Experience {
            features: self.encoder.features(&transition.state),
            action,
            reward: transition.reward,
            next_features: self.encoder.features(&transition.next_state),
            done: transition.done,
        });
        self.transitions += 1;

        let target_synced = self
            .transitions
            .is_multiple_of(self.config.target_sync_interval);
        if target_synced {
            self.target.copy_from(&self.online)?;
            debug!(transitions = self.transitions, "target network synced");
        }

        if self.replay.len() < self.config.batch_size {
            return Ok(None);
        }

        let loss = self.train_minibatch()?;
        self.learn_steps += 1;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);

        Ok(Some(UpdateReport {
            magnitude: loss,
            learning_rate: self.config.learning_rate,
            neighbors: 0,
            batch_size: self.config.batch_size,
            target_synced,
        }))
    }

    fn end_episode(&mut self, _summary: &EpisodeSummary) -> Result<()> {
        self.episodes += 1;
        self.heuristic.reset();
        Ok(())
    }

    fn name(&self) -> &str {
        "Replay Q-network"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Network
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn episodes(&self) -> u64 {
        self.episodes
    }

    fn snapshot(&self) -> Result<SavedAgent> {
        Ok(SavedAgent::new(
            AgentState::Network(self.export_state()?),
            self.episodes,
        ))
    }

    fn set_rng_seed(&mut self, seed: u64) -> Result<()> {
        self.rng = StdRng::seed_from_u64(seed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MenuView, PlayerView, TerminalView, Vec2};

    fn config() -> NetworkConfig {
        NetworkConfig {
            hidden_units: 16,
            replay_capacity: 64,
            batch_size: 4,
            target_sync_interval: 5,
            epsilon: 0.5,
            epsilon_decay: 0.9,
            min_epsilon: 0.1,
            ..NetworkConfig::default()
        }
    }

    fn agent() -> NetworkAgent {
        NetworkAgent::new(config(), HeuristicConfig::default(), 200.0, Some(7)).unwrap()
    }

    fn playing(x: f64) -> Observation {
        Observation::Playing(PlayerView {
            position: Vec2::new(x, 400.0),
            velocity: Vec2::new(2.0, 0.0),
            power_state: 0,
            nearby_objects: Vec::new(),
            coins: 0,
            score: 0,
            elapsed_time: 0.0,
        })
    }

    fn step(x: f64) -> Transition {
        Transition {
            state: playing(x),
            action: Action::Right,
            reward: 0.2,
            next_state: playing(x + 2.0),
            done: false,
        }
    }

    #[test]
    fn test_invalid_capacity_fails_fast() {
        let config = NetworkConfig {
            replay_capacity: 0,
            ..config()
        };
        assert!(NetworkAgent::new(config, HeuristicConfig::default(), 200.0, None).is_err());
    }

    #[test]
    fn test_no_training_until_batch_available() {
        let mut agent = agent();
        for i in 0..3 {
            assert_eq!(agent.learn(&step(f64::from(i))).unwrap(), None);
        }
        let report = agent.learn(&step(3.0)).unwrap().unwrap();
        assert_eq!(report.batch_size, 4);
        assert_eq!(agent.learn_steps(), 1);
        assert!((agent.epsilon() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_target_syncs_every_interval() {
        let mut agent = agent();
        for i in 0..4 {
            agent.learn(&step(f64::from(i))).unwrap();
        }
        assert_ne!(
            agent.online().weights().unwrap(),
            agent.target().weights().unwrap()
        );
        let report = agent.learn(&step(4.0)).unwrap().unwrap();
        assert!(report.target_synced);
        // Synced before this step's gradient update.
        assert_eq!(agent.transitions(), 5);
    }

    #[test]
    fn test_epsilon_floor() {
        let mut agent = agent();
        for i in 0..100 {
            agent.learn(&step(f64::from(i))).unwrap();
        }
        assert_eq!(agent.epsilon(), 0.1);
        assert_eq!(agent.replay().len(), 64);
    }

    #[test]
    fn test_menu_transitions_are_not_stored() {
        let mut agent = agent();
        let menu = Observation::Menu(MenuView { cursor: 0 });
        let transition = Transition {
            state: menu.clone(),
            action: Action::Select,
            reward: 0.0,
            next_state: menu,
            done: false,
        };
        agent.learn(&transition).unwrap();
        assert!(agent.replay().is_empty());
    }

    #[test]
    fn test_outside_play_uses_scripted_actions() {
        let mut agent = agent();
        let over = Observation::GameOver(TerminalView {
            last_position: Vec2::default(),
            coins: 0,
            score: 0,
            elapsed_time: 0.0,
        });
        let decision = agent.select_action(&over).unwrap();
        assert_eq!(decision, Decision::new(Action::Idle, DecisionSource::Scripted));
    }

    #[test]
    fn test_restore_resyncs_target() {
        let mut trained = agent();
        for i in 0..20 {
            trained.learn(&step(f64::from(i))).unwrap();
        }
        let mut fresh = agent();
        fresh.restore(trained.export_state().unwrap()).unwrap();
        let weights = fresh.online().weights().unwrap();
        assert_eq!(weights, trained.online().weights().unwrap());
        assert_eq!(fresh.target().weights().unwrap(), weights);
        assert!(fresh.replay().is_empty());
    }

    #[test]
    fn test_restore_rejects_mismatched_weight_buffers() {
        let mut trained = agent();
        for i in 0..6 {
            trained.learn(&step(f64::from(i))).unwrap();
        }
        let mut fresh = agent();
        let before = fresh.export_state().unwrap();

        let mut state = trained.export_state().unwrap();
        state.online.output_weight.pop();
        assert!(matches!(
            fresh.restore(state),
            Err(Error::InvalidConfiguration { .. })
        ));

        let mut state = trained.export_state().unwrap();
        state.online.hidden_bias = Vec::new();
        state.episodes = 50;
        assert!(fresh.restore(state).is_err());

        assert_eq!(fresh.export_state().unwrap(), before);
        assert!(fresh.select_action(&playing(10.0)).is_ok());
    }

    #[test]
    fn test_greedy_choice_follows_online_values() {
        let mut agent = NetworkAgent::new(
            NetworkConfig {
                epsilon: 0.0,
                min_epsilon: 0.0,
                ..config()
            },
            HeuristicConfig::default(),
            200.0,
            Some(3),
        )
        .unwrap();
        let observation = playing(120.0);
        let features = agent.encoder.features(&observation);
        let expected = agent.online().predict(&features).unwrap().best();
        let decision = agent.select_action(&observation).unwrap();
        assert_eq!(decision, Decision::new(expected, DecisionSource::Greedy));
    }
}
