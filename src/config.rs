//! Tunable parameters for the controller, reward shaping and both agents
//!
//! Every struct has documented defaults and a `validate()` that rejects
//! nonsensical values. Constructors that take a config call `validate()` and
//! fail fast with [`Error::InvalidConfiguration`].

use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::config(message()))
    }
}

fn ensure_probability(name: &str, value: f64) -> Result<()> {
    ensure((0.0..=1.0).contains(&value), || {
        format!("{name} must be within [0, 1], got {value}")
    })
}

pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<()> {
    ensure(value.is_finite() && value > 0.0, || {
        format!("{name} must be positive and finite, got {value}")
    })
}

pub(crate) fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    ensure(value.is_finite() && value >= 0.0, || {
        format!("{name} must be non-negative and finite, got {value}")
    })
}

/// Reward shaping weights and stagnation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward per unit of forward movement.
    pub progress_weight: f64,
    /// Forward movement at or below this is not rewarded.
    pub progress_threshold: f64,
    /// Fixed penalty for moving backwards.
    pub backward_penalty: f64,
    /// Reward per collected coin.
    pub coin_weight: f64,
    /// Penalty per step once the stagnation counter exceeds `soft_stagnation_steps`.
    pub stagnation_penalty: f64,
    pub soft_stagnation_steps: u32,
    /// Counter value that forces a game over.
    pub hard_stagnation_steps: u32,
    pub death_penalty: f64,
    pub checkpoint_bonus: f64,
    /// Reward for the single level-start setup frame.
    pub level_start_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            progress_weight: 0.1,
            progress_threshold: 1.0,
            backward_penalty: 0.1,
            coin_weight: 5.0,
            stagnation_penalty: 1.0,
            soft_stagnation_steps: 60,
            hard_stagnation_steps: 240,
            death_penalty: 100.0,
            checkpoint_bonus: 1000.0,
            level_start_reward: 0.1,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("progress_weight", self.progress_weight)?;
        ensure_non_negative("progress_threshold", self.progress_threshold)?;
        ensure_non_negative("backward_penalty", self.backward_penalty)?;
        ensure_non_negative("coin_weight", self.coin_weight)?;
        ensure_non_negative("stagnation_penalty", self.stagnation_penalty)?;
        ensure_non_negative("death_penalty", self.death_penalty)?;
        ensure_non_negative("checkpoint_bonus", self.checkpoint_bonus)?;
        ensure(self.level_start_reward.is_finite(), || {
            "level_start_reward must be finite".to_string()
        })?;
        ensure(
            self.hard_stagnation_steps > self.soft_stagnation_steps,
            || {
                format!(
                    "hard_stagnation_steps ({}) must exceed soft_stagnation_steps ({})",
                    self.hard_stagnation_steps, self.soft_stagnation_steps
                )
            },
        )
    }
}

/// Episode controller parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Horizontal position that counts as reaching the checkpoint.
    pub checkpoint_x: f64,
    /// Falling below this line (screen y greater than it) is a death.
    pub fall_y: f64,
    /// Half-width of the window in which nearby objects are reported.
    pub object_radius: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            checkpoint_x: 3000.0,
            fall_y: 450.0,
            object_radius: 200.0,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.checkpoint_x.is_finite(), || {
            "checkpoint_x must be finite".to_string()
        })?;
        ensure(self.fall_y.is_finite(), || "fall_y must be finite".to_string())?;
        ensure_positive("object_radius", self.object_radius)
    }
}

/// Axis-aligned window of relative positions, bounds exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Window {
    pub const fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn contains(&self, rel_x: f64, rel_y: f64) -> bool {
        rel_x > self.min_x && rel_x < self.max_x && rel_y > self.min_y && rel_y < self.max_y
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure(self.min_x < self.max_x && self.min_y < self.max_y, || {
            format!("{name} window is empty: {self:?}")
        })
    }
}

/// Rule-based action scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub forward_bias: f64,
    pub enemy_jump_bonus: f64,
    /// Multiplier applied when the enemy is inside `enemy_close_window`.
    pub enemy_close_multiplier: f64,
    pub obstacle_jump_bonus: f64,
    pub gap_jump_bonus: f64,
    pub collectible_jump_bonus: f64,
    pub enemy_window: Window,
    pub enemy_close_window: Window,
    pub obstacle_window: Window,
    /// Where ground tiles must be for the path ahead to count as solid.
    pub ground_ahead_window: Window,
    pub ground_below_window: Window,
    pub collectible_above_window: Window,
    /// Steps during which another jump is penalized.
    pub jump_cooldown_steps: u32,
    pub jump_cooldown_penalty: f64,
    /// Extra forward score for a few steps after a jump.
    pub post_jump_forward_bias: f64,
    pub post_jump_bias_steps: u32,
    /// Observations used by the stuck detector.
    pub stuck_window: usize,
    /// Variance of x below this marks the observation as stuck.
    pub stuck_variance_threshold: f64,
    /// Consecutive stuck observations before the escape sequence starts.
    pub stuck_patience: u32,
    pub escape_sequence: Vec<crate::game::Action>,
    pub menu_sequence: Vec<crate::game::Action>,
    /// Action used when no structured features are available.
    pub default_action: crate::game::Action,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        use crate::game::Action;
        Self {
            forward_bias: 4.0,
            enemy_jump_bonus: 3.0,
            enemy_close_multiplier: 1.5,
            obstacle_jump_bonus: 3.5,
            gap_jump_bonus: 5.0,
            collectible_jump_bonus: 1.0,
            enemy_window: Window::new(0.0, 80.0, -50.0, 50.0),
            enemy_close_window: Window::new(0.0, 40.0, -50.0, 50.0),
            obstacle_window: Window::new(0.0, 48.0, -64.0, 8.0),
            ground_ahead_window: Window::new(16.0, 96.0, -10.0, 40.0),
            ground_below_window: Window::new(-16.0, 16.0, 0.0, 32.0),
            collectible_above_window: Window::new(-16.0, 16.0, -150.0, -20.0),
            jump_cooldown_steps: 8,
            jump_cooldown_penalty: 2.0,
            post_jump_forward_bias: 1.0,
            post_jump_bias_steps: 5,
            stuck_window: 20,
            stuck_variance_threshold: 10.0,
            stuck_patience: 15,
            escape_sequence: vec![Action::Right, Action::Jump, Action::Right, Action::Right],
            menu_sequence: vec![Action::Right, Action::Right, Action::Select],
            default_action: Action::Idle,
        }
    }
}

impl HeuristicConfig {
    pub fn validate(&self) -> Result<()> {
        self.enemy_window.validate("enemy")?;
        self.enemy_close_window.validate("enemy_close")?;
        self.obstacle_window.validate("obstacle")?;
        self.ground_ahead_window.validate("ground_ahead")?;
        self.ground_below_window.validate("ground_below")?;
        self.collectible_above_window.validate("collectible_above")?;
        ensure(self.stuck_window >= 2, || {
            format!("stuck_window must be at least 2, got {}", self.stuck_window)
        })?;
        ensure_non_negative("stuck_variance_threshold", self.stuck_variance_threshold)?;
        ensure(
            !self.escape_sequence.is_empty()
                && self.escape_sequence.iter().all(|a| a.is_gameplay()),
            || "escape_sequence must be non-empty gameplay actions".to_string(),
        )?;
        ensure(!self.menu_sequence.is_empty(), || {
            "menu_sequence must not be empty".to_string()
        })
    }
}

/// Death-zone memory parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialMemoryConfig {
    /// Zone grid cell size.
    pub cell_size: f64,
    /// Probability of letting a known zone's strategy pick the action.
    pub override_probability: f64,
}

impl Default for SpatialMemoryConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            override_probability: 0.7,
        }
    }
}

impl SpatialMemoryConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("cell_size", self.cell_size)?;
        ensure_probability("override_probability", self.override_probability)
    }
}

/// Tabular value-function parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    /// State-key grid cell size.
    pub cell_size: f64,
    pub learning_rate: f64,
    /// Cap for the boosted learning rate.
    pub max_learning_rate: f64,
    /// Multiplier applied to α for significant rewards.
    pub learning_rate_boost: f64,
    /// |reward| above this is significant.
    pub significant_reward: f64,
    pub discount_factor: f64,
    pub q_init: f64,
    /// Cells on each side that receive propagated values.
    pub neighbor_radius: u32,
    /// Learning-rate attenuation per cell of distance.
    pub neighbor_attenuation: f64,
    /// Weight of the heuristic scores in greedy selection.
    pub heuristic_weight: f64,
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    pub max_epsilon: f64,
    /// Episodes per half of the trailing reward window.
    pub trend_window: usize,
    /// Mean-reward change that counts as a trend.
    pub trend_tolerance: f64,
    /// Multiplicative ε change applied on a trend.
    pub trend_adjustment: f64,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            cell_size: 10.0,
            learning_rate: 0.1,
            max_learning_rate: 0.5,
            learning_rate_boost: 2.0,
            significant_reward: 10.0,
            discount_factor: 0.99,
            q_init: 0.0,
            neighbor_radius: 3,
            neighbor_attenuation: 0.5,
            heuristic_weight: 1.0,
            epsilon: 0.3,
            epsilon_decay: 0.995,
            min_epsilon: 0.05,
            max_epsilon: 0.5,
            trend_window: 10,
            trend_tolerance: 5.0,
            trend_adjustment: 1.1,
        }
    }
}

impl TabularConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("cell_size", self.cell_size)?;
        ensure_probability("learning_rate", self.learning_rate)?;
        ensure_probability("max_learning_rate", self.max_learning_rate)?;
        ensure(self.learning_rate_boost >= 1.0, || {
            format!(
                "learning_rate_boost must be at least 1, got {}",
                self.learning_rate_boost
            )
        })?;
        ensure_non_negative("significant_reward", self.significant_reward)?;
        ensure_probability("discount_factor", self.discount_factor)?;
        ensure(self.q_init.is_finite(), || "q_init must be finite".to_string())?;
        ensure_probability("neighbor_attenuation", self.neighbor_attenuation)?;
        ensure_non_negative("heuristic_weight", self.heuristic_weight)?;
        ensure_epsilon_schedule(
            self.epsilon,
            self.epsilon_decay,
            self.min_epsilon,
            self.max_epsilon,
        )?;
        ensure(self.trend_window > 0, || {
            "trend_window must be positive".to_string()
        })?;
        ensure_non_negative("trend_tolerance", self.trend_tolerance)?;
        ensure(self.trend_adjustment >= 1.0, || {
            format!(
                "trend_adjustment must be at least 1, got {}",
                self.trend_adjustment
            )
        })
    }
}

fn ensure_epsilon_schedule(epsilon: f64, decay: f64, min: f64, max: f64) -> Result<()> {
    ensure_probability("epsilon", epsilon)?;
    ensure_probability("epsilon_decay", decay)?;
    ensure_probability("min_epsilon", min)?;
    ensure_probability("max_epsilon", max)?;
    ensure(min <= max, || {
        format!("min_epsilon ({min}) must not exceed max_epsilon ({max})")
    })?;
    ensure(epsilon <= max, || {
        format!("epsilon ({epsilon}) must not exceed max_epsilon ({max})")
    })
}

/// Replay-based function-approximation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub replay_capacity: usize,
    pub batch_size: usize,
    /// Transitions between hard target syncs.
    pub target_sync_interval: u64,
    /// Gradient components are clipped to this magnitude.
    pub gradient_clip: f64,
    pub epsilon: f64,
    /// Per learning step.
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_units: 64,
            learning_rate: 0.001,
            discount_factor: 0.99,
            replay_capacity: 10_000,
            batch_size: 32,
            target_sync_interval: 200,
            gradient_clip: 1.0,
            epsilon: 1.0,
            epsilon_decay: 0.9995,
            min_epsilon: 0.05,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        ensure(self.hidden_units > 0, || {
            "hidden_units must be positive".to_string()
        })?;
        ensure_positive("learning_rate", self.learning_rate)?;
        ensure_probability("discount_factor", self.discount_factor)?;
        ensure(self.replay_capacity > 0, || {
            "replay_capacity must be positive".to_string()
        })?;
        ensure(self.batch_size > 0, || "batch_size must be positive".to_string())?;
        ensure(self.batch_size <= self.replay_capacity, || {
            format!(
                "batch_size ({}) must not exceed replay_capacity ({})",
                self.batch_size, self.replay_capacity
            )
        })?;
        ensure(self.target_sync_interval > 0, || {
            "target_sync_interval must be positive".to_string()
        })?;
        ensure_positive("gradient_clip", self.gradient_clip)?;
        ensure_epsilon_schedule(self.epsilon, self.epsilon_decay, self.min_epsilon, 1.0)
    }
}

/// All tunables of one run, loadable from JSON. Missing sections use defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub reward: RewardConfig,
    pub controller: ControllerConfig,
    pub heuristic: HeuristicConfig,
    pub memory: SpatialMemoryConfig,
    pub tabular: TabularConfig,
    pub network: NetworkConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.reward.validate()?;
        self.controller.validate()?;
        self.heuristic.validate()?;
        self.memory.validate()?;
        self.tabular.validate()?;
        self.network.validate()
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open config {}", path.display()),
            source,
        })?;
        let config: RunConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}
