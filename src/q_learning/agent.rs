//! Tabular agent with spatial death-zone memory
//!
//! Action selection while playing follows a fixed precedence:
//!
//! 1. a known death zone at the current position overrides everything with
//!    its configured probability;
//! 2. the heuristic's escape sequence, once the stuck detector has fired;
//! 3. uniform exploration with probability ε;
//! 4. greedy over `Q(s, a) + heuristic_weight · h(a)`, ties by enumeration order.
//!
//! Outside of play the heuristic's scripted fallbacks are used.

use std::{any::Any, collections::VecDeque};

use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Result,
    config::{HeuristicConfig, SpatialMemoryConfig, TabularConfig},
    episode::{EpisodeSummary, Transition},
    game::{Action, Observation, PlayerView, Vec2},
    heuristic::HeuristicScorer,
    memory::SpatialMemory,
    persistence::{AgentState, SavedAgent},
    ports::{AgentKind, Decision, DecisionSource, Learner, UpdateReport},
    q_learning::q_table::{StateKey, ValueTable, bellman_update},
};

/// Everything the tabular agent persists across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularState {
    pub table: ValueTable,
    pub memory: SpatialMemory,
    pub epsilon: f64,
    pub reward_history: VecDeque<f64>,
    pub episodes: u64,
}

pub(crate) fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_rng(&mut rand::rng())
    }
}

/// Q-learning agent over quantized positions
///
/// Owns its value table, death-zone memory and heuristic scorer. Instances
/// are not meant to be shared between trainers.
#[derive(Debug, Clone)]
pub struct TabularAgent {
    config: TabularConfig,
    table: ValueTable,
    memory: SpatialMemory,
    heuristic: HeuristicScorer,
    epsilon: f64,
    reward_history: VecDeque<f64>,
    episodes: u64,
    rng: StdRng,
}

impl TabularAgent {
    pub fn new(
        config: TabularConfig,
        memory: SpatialMemoryConfig,
        heuristic: HeuristicConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table: ValueTable::new(config.q_init),
            memory: SpatialMemory::new(memory)?,
            heuristic: HeuristicScorer::new(heuristic)?,
            epsilon: config.epsilon,
            reward_history: VecDeque::with_capacity(config.trend_window * 2),
            episodes: 0,
            rng: build_rng(None),
            config,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn export_state(&self) -> TabularState {
        TabularState {
            table: self.table.clone(),
            memory: self.memory.clone(),
            epsilon: self.epsilon,
            reward_history: self.reward_history.clone(),
            episodes: self.episodes,
        }
    }

    /// Replace learned state with a persisted snapshot. The configured
    /// override probability wins over the persisted one.
    pub fn restore(&mut self, state: TabularState) {
        let config = self.memory.config().clone();
        self.table = state.table;
        self.memory = state.memory.with_config(config);
        self.epsilon = state
            .epsilon
            .clamp(self.config.min_epsilon, self.config.max_epsilon);
        self.reward_history = state.reward_history;
        self.episodes = state.episodes;
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn memory(&self) -> &SpatialMemory {
        &self.memory
    }

    pub fn state_key(&self, position: Vec2) -> StateKey {
        StateKey::from_position(position, self.config.cell_size)
    }

    /// α, boosted for rewards whose magnitude exceeds the significance threshold.
    pub fn effective_learning_rate(&self, reward: f64) -> f64 {
        let base = self.config.learning_rate;
        if reward.abs() > self.config.significant_reward {
            (base * self.config.learning_rate_boost)
                .min(self.config.max_learning_rate)
                .max(base)
        } else {
            base
        }
    }

    fn select_playing(&mut self, view: &PlayerView) -> Decision {
        let evaluation = self.heuristic.evaluate(view);

        let decision = if let Some(action) =
            self.memory.override_action(view.position, &mut self.rng)
        {
            Decision::new(action, DecisionSource::DeathZone)
        } else if let Some(action) = evaluation.escape {
            Decision::new(action, DecisionSource::Escape)
        } else if self.rng.random::<f64>() < self.epsilon {
            let action = Action::GAMEPLAY
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(Action::Right);
            Decision::new(action, DecisionSource::Explore)
        } else {
            let q = self.table.get(&self.state_key(view.position));
            let blended = q.blend(&evaluation.scores, self.config.heuristic_weight);
            Decision::new(blended.best(), DecisionSource::Greedy)
        };

        self.heuristic.record_action(decision.action);
        decision
    }

    // Pull same-row neighbors toward the new value with an attenuated rate.
    fn propagate(&mut self, key: StateKey, action: Action, value: f64, rate: f64) -> usize {
        let mut touched = 0;
        for distance in 1..=i64::from(self.config.neighbor_radius) {
            let attenuated = rate * self.config.neighbor_attenuation.powi(distance as i32);
            for neighbor in [key.shifted(-distance), key.shifted(distance)] {
                let current = self.table.value(&neighbor, action);
                let updated = (1.0 - attenuated) * current + attenuated * value;
                self.table.set(neighbor, action, updated);
                touched += 1;
            }
        }
        touched
    }

    fn adjust_for_trend(&mut self) {
        let window = self.config.trend_window;
        if self.reward_history.len() < window * 2 {
            return;
        }
        let older = self.reward_history.iter().take(window).sum::<f64>() / window as f64;
        let recent = self.reward_history.iter().skip(window).sum::<f64>() / window as f64;
        let delta = recent - older;

        if delta < -self.config.trend_tolerance {
            self.epsilon =
                (self.epsilon * self.config.trend_adjustment).min(self.config.max_epsilon);
            debug!(delta, epsilon = self.epsilon, "reward trend worsening, exploring more");
        } else if delta > self.config.trend_tolerance {
            self.epsilon =
                (self.epsilon / self.config.trend_adjustment).max(self.config.min_epsilon);
            debug!(delta, epsilon = self.epsilon, "reward trend improving, exploring less");
        }
    }
}

impl Learner for TabularAgent {
    fn select_action(&mut self, observation: &Observation) -> Result<Decision> {
        Ok(match observation {
            Observation::Playing(view) => self.select_playing(view),
            other => Decision::new(self.heuristic.fallback(other), DecisionSource::Scripted),
        })
    }

    fn learn(&mut self, transition: &Transition) -> Result<Option<UpdateReport>> {
        if !transition.is_gameplay() {
            return Ok(None);
        }
        let Some(position) = transition.state.position() else {
            return Ok(None);
        };
        let action = transition.action;

        if transition.is_death() {
            let zone = self.memory.record_death(position, action);
            debug!(?zone, %action, "death recorded");
        }

        let key = self.state_key(position);
        let next_max = match transition.next_state.position() {
            Some(next) if !transition.done => self.table.max_value(&self.state_key(next)),
            _ => 0.0,
        };
        let rate = self.effective_learning_rate(transition.reward);
        let current = self.table.value(&key, action);
        let updated = bellman_update(
            current,
            transition.reward,
            next_max,
            transition.done,
            rate,
            self.config.discount_factor,
        );
        self.table.set(key, action, updated);

        let neighbors = if transition.reward.abs() > self.config.significant_reward {
            self.propagate(key, action, updated, rate)
        } else {
            0
        };

        Ok(Some(UpdateReport {
            magnitude: (updated - current).abs(),
            learning_rate: rate,
            neighbors,
            batch_size: 0,
            target_synced: false,
        }))
    }

    fn end_episode(&mut self, summary: &EpisodeSummary) -> Result<()> {
        self.episodes += 1;
        if self.reward_history.len() == self.config.trend_window * 2 {
            self.reward_history.pop_front();
        }
        self.reward_history.push_back(summary.cumulative_reward);
        self.adjust_for_trend();
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);
        self.heuristic.reset();
        Ok(())
    }

    fn name(&self) -> &str {
        "Tabular Q-learning"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Tabular
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn episodes(&self) -> u64 {
        self.episodes
    }

    fn snapshot(&self) -> Result<SavedAgent> {
        Ok(SavedAgent::new(
            AgentState::Tabular(self.export_state()),
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
