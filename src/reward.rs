//! Reward shaping
//!
//! A pure function of the position and coin deltas of one step, the terminal
//! kind (if any) and the stagnation counter. The controller owns the counter;
//! [`RewardShaper::next_stagnation`] computes its successor.

use serde::{Deserialize, Serialize};

use crate::{Result, config::RewardConfig, game::TerminalKind};

/// Everything the shaper looks at for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardInput {
    pub prev_x: f64,
    pub curr_x: f64,
    pub coins_before: u32,
    pub coins_after: u32,
    pub terminal: Option<TerminalKind>,
    /// Stagnation counter after this step.
    pub stagnation_steps: u32,
}

/// Shaped reward split by component. [`RewardBreakdown::total`] is the scalar
/// handed to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub progress: f64,
    pub backward: f64,
    pub coins: f64,
    pub stagnation: f64,
    pub terminal: f64,
    /// Fixed reward of the level-start setup frame.
    pub setup: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.progress + self.backward + self.coins + self.stagnation + self.terminal + self.setup
    }
}

#[derive(Debug, Clone)]
pub struct RewardShaper {
    config: RewardConfig,
}

impl RewardShaper {
    pub fn new(config: RewardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn shape(&self, input: &RewardInput) -> RewardBreakdown {
        let config = &self.config;
        let dx = input.curr_x - input.prev_x;
        let mut breakdown = RewardBreakdown::default();

        if dx > config.progress_threshold {
            breakdown.progress = dx * config.progress_weight;
        } else if dx < 0.0 {
            breakdown.backward = -config.backward_penalty;
        }

        let collected = input.coins_after.saturating_sub(input.coins_before);
        breakdown.coins = f64::from(collected) * config.coin_weight;

        if input.stagnation_steps > config.soft_stagnation_steps {
            breakdown.stagnation = -config.stagnation_penalty;
        }

        breakdown.terminal = match input.terminal {
            Some(TerminalKind::GameOver) => -config.death_penalty,
            Some(TerminalKind::CheckpointReached) => config.checkpoint_bonus,
            None => 0.0,
        };
        breakdown
    }

    /// Reward of the single level-start frame.
    pub fn level_start(&self) -> RewardBreakdown {
        RewardBreakdown {
            setup: self.config.level_start_reward,
            ..RewardBreakdown::default()
        }
    }

    /// Death penalty alone, used when a step is aborted by a fault.
    pub fn forced_termination(&self) -> RewardBreakdown {
        RewardBreakdown {
            terminal: -self.config.death_penalty,
            ..RewardBreakdown::default()
        }
    }

    /// Counter after a step with horizontal delta `dx`: forward progress above
    /// the threshold resets it, anything else counts as a stagnant step.
    pub fn next_stagnation(&self, count: u32, dx: f64) -> u32 {
        if dx > self.config.progress_threshold {
            0
        } else {
            count.saturating_add(1)
        }
    }

    /// Whether the counter has reached the forced-termination limit.
    pub fn stagnation_exceeded(&self, count: u32) -> bool {
        count >= self.config.hard_stagnation_steps
    }
}
