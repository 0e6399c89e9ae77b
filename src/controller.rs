//! Episode controller
//!
//! State machine driving one simulation through
//! `Menu → LevelStart → Playing → {GameOver, CheckpointReached}`.
//!
//! Every call to [`EpisodeController::step`] advances the simulation by exactly
//! one frame and reports the arrived-at state in `info.game_state`. Terminal
//! states never auto-reset: stepping again without [`EpisodeController::reset`]
//! is an error. Faults raised while building an observation do not escape
//! `step`; they become a forced game over carrying the standard death penalty.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Error, Result,
    config::{ControllerConfig, RewardConfig},
    error::SimulationFault,
    game::{
        Action, GameState, Observation, ObservationEncoder, PlayerView, TerminalKind,
        TerminalView, Vec2,
    },
    ports::{SimStep, Simulation},
    reward::{RewardBreakdown, RewardInput, RewardShaper},
};

/// Why an episode ended on a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// Fell below the configured y line.
    Fell,
    /// The simulation raised its restart flag.
    Restart,
    /// The simulation reported `done` on its own.
    SimulationDone,
    /// No forward progress for the hard stagnation limit.
    Stagnation,
    /// The observation could not be built.
    Fault,
    Checkpoint,
}

impl TerminationCause {
    pub fn terminal_kind(self) -> TerminalKind {
        match self {
            TerminationCause::Checkpoint => TerminalKind::CheckpointReached,
            _ => TerminalKind::GameOver,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TerminationCause::Fell => "fell",
            TerminationCause::Restart => "restart",
            TerminationCause::SimulationDone => "simulation_done",
            TerminationCause::Stagnation => "stagnation",
            TerminationCause::Fault => "fault",
            TerminationCause::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics attached to every step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    pub game_state: GameState,
    /// Reward reported by the simulation, not used for learning.
    pub raw_reward: f64,
    pub stagnation_steps: u32,
    pub cause: Option<TerminationCause>,
    pub fault: Option<SimulationFault>,
    pub flags: Vec<String>,
}

/// (observation, reward, done, info) for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub breakdown: RewardBreakdown,
    pub done: bool,
    pub info: StepInfo,
}

/// In-level bookkeeping carried between steps.
#[derive(Debug, Clone, Copy, Default)]
struct Tracking {
    prev_x: f64,
    coins: u32,
    score: u64,
    elapsed_time: f64,
    last_position: Option<Vec2>,
    stagnation_steps: u32,
}

impl Tracking {
    fn observe(&mut self, view: &PlayerView) {
        self.prev_x = view.position.x;
        self.coins = view.coins;
        self.score = view.score;
        self.elapsed_time = view.elapsed_time;
        self.last_position = Some(view.position);
    }

    fn terminal_view(&self) -> TerminalView {
        TerminalView {
            last_position: self.last_position.unwrap_or_default(),
            coins: self.coins,
            score: self.score,
            elapsed_time: self.elapsed_time,
        }
    }
}

pub struct EpisodeController {
    simulation: Box<dyn Simulation>,
    encoder: ObservationEncoder,
    shaper: RewardShaper,
    config: ControllerConfig,
    state: Option<GameState>,
    tracking: Tracking,
    steps: usize,
    cumulative_reward: f64,
    closed: bool,
}

impl EpisodeController {
    pub fn new(
        simulation: Box<dyn Simulation>,
        config: ControllerConfig,
        reward: RewardConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            simulation,
            encoder: ObservationEncoder::new(config.object_radius),
            shaper: RewardShaper::new(reward)?,
            config,
            state: None,
            tracking: Tracking::default(),
            steps: 0,
            cumulative_reward: 0.0,
            closed: false,
        })
    }

    /// Start a new episode at the menu.
    pub fn reset(&mut self) -> Result<Observation> {
        if self.closed {
            return Err(SimulationFault::Closed.into());
        }
        let frame = self.simulation.reset()?;
        self.state = Some(GameState::Menu);
        self.tracking = Tracking::default();
        self.steps = 0;
        self.cumulative_reward = 0.0;
        debug!(simulation = self.simulation.name(), "episode reset");
        Ok(self.encoder.menu(&frame))
    }

    /// Advance the simulation by one frame.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before the first `reset()`.
    /// - [`Error::ResetRequired`] once the episode has reached a terminal state.
    /// - [`Error::NotGameplayAction`] for `Select` while playing.
    /// - [`Error::Simulation`] with [`SimulationFault::Closed`] after `close()`.
    pub fn step(&mut self, action: Action) -> Result<StepOutcome> {
        let state = self.state.ok_or(Error::NotStarted)?;
        if self.closed {
            return Err(SimulationFault::Closed.into());
        }
        let attempt = match state {
            GameState::Menu => self.step_menu(action),
            GameState::LevelStart => self.step_level_start(action),
            GameState::Playing => {
                if !action.is_gameplay() {
                    return Err(Error::NotGameplayAction {
                        action: action.to_string(),
                    });
                }
                self.step_playing(action)
            }
            GameState::GameOver | GameState::CheckpointReached => {
                return Err(Error::ResetRequired { state });
            }
        };
        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(fault) => self.forced_game_over(state, fault),
        };
        self.state = Some(outcome.info.game_state);
        self.steps += 1;
        self.cumulative_reward += outcome.reward;
        Ok(outcome)
    }

    fn step_menu(&mut self, action: Action) -> std::result::Result<StepOutcome, SimulationFault> {
        let step = self.simulation.step(action)?;
        if step.frame.level_selected {
            let observation = self.encoder.level_start(&step.frame);
            self.tracking.last_position = observation.position();
            debug!(level = ?step.frame.level_name, "level selected");
            Ok(outcome(observation, RewardBreakdown::default(), &step, 0, None))
        } else {
            let observation = self.encoder.menu(&step.frame);
            Ok(outcome(observation, RewardBreakdown::default(), &step, 0, None))
        }
    }

    fn step_level_start(
        &mut self,
        action: Action,
    ) -> std::result::Result<StepOutcome, SimulationFault> {
        let step = self.simulation.step(action)?;
        let view = self.encoder.player_view(&step.frame)?;
        self.tracking.observe(&view);
        self.tracking.stagnation_steps = 0;
        Ok(outcome(
            Observation::Playing(view),
            self.shaper.level_start(),
            &step,
            0,
            None,
        ))
    }

    fn step_playing(&mut self, action: Action) -> std::result::Result<StepOutcome, SimulationFault> {
        let step = self.simulation.step(action)?;
        let view = self.encoder.player_view(&step.frame)?;

        let dx = view.position.x - self.tracking.prev_x;
        let stagnation = self
            .shaper
            .next_stagnation(self.tracking.stagnation_steps, dx);
        let cause = self.termination_cause(&view, &step, stagnation);
        let terminal = cause.map(TerminationCause::terminal_kind);

        let breakdown = self.shaper.shape(&RewardInput {
            prev_x: self.tracking.prev_x,
            curr_x: view.position.x,
            coins_before: self.tracking.coins,
            coins_after: view.coins,
            terminal,
            stagnation_steps: stagnation,
        });

        self.tracking.observe(&view);
        self.tracking.stagnation_steps = stagnation;

        let observation = match terminal {
            Some(TerminalKind::GameOver) => Observation::GameOver(self.tracking.terminal_view()),
            Some(TerminalKind::CheckpointReached) => {
                Observation::CheckpointReached(self.tracking.terminal_view())
            }
            None => Observation::Playing(view),
        };
        if let Some(cause) = cause {
            debug!(%cause, x = self.tracking.prev_x, steps = self.steps + 1, "episode terminated");
        }
        Ok(outcome(observation, breakdown, &step, stagnation, cause))
    }

    fn termination_cause(
        &self,
        view: &PlayerView,
        step: &SimStep,
        stagnation: u32,
    ) -> Option<TerminationCause> {
        if view.position.y > self.config.fall_y {
            Some(TerminationCause::Fell)
        } else if step.frame.restart {
            Some(TerminationCause::Restart)
        } else if view.position.x >= self.config.checkpoint_x {
            Some(TerminationCause::Checkpoint)
        } else if step.done {
            Some(TerminationCause::SimulationDone)
        } else if self.shaper.stagnation_exceeded(stagnation) {
            Some(TerminationCause::Stagnation)
        } else {
            None
        }
    }

    fn forced_game_over(&mut self, state: GameState, fault: SimulationFault) -> StepOutcome {
        warn!(%fault, from = %state, "simulation fault, forcing game over");
        let breakdown = self.shaper.forced_termination();
        StepOutcome {
            observation: Observation::GameOver(self.tracking.terminal_view()),
            reward: breakdown.total(),
            breakdown,
            done: true,
            info: StepInfo {
                game_state: GameState::GameOver,
                raw_reward: 0.0,
                stagnation_steps: self.tracking.stagnation_steps,
                cause: Some(TerminationCause::Fault),
                fault: Some(fault),
                flags: Vec::new(),
            },
        }
    }

    /// Release the simulation. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.simulation.close();
            self.closed = true;
            debug!(simulation = self.simulation.name(), "simulation closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `None` until the first reset.
    pub fn state(&self) -> Option<GameState> {
        self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn last_position(&self) -> Option<Vec2> {
        self.tracking.last_position
    }

    pub fn elapsed_time(&self) -> f64 {
        self.tracking.elapsed_time
    }

    pub fn stagnation_steps(&self) -> u32 {
        self.tracking.stagnation_steps
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

impl Drop for EpisodeController {
    fn drop(&mut self) {
        self.close();
    }
}

fn outcome(
    observation: Observation,
    breakdown: RewardBreakdown,
    step: &SimStep,
    stagnation_steps: u32,
    cause: Option<TerminationCause>,
) -> StepOutcome {
    let game_state = observation.game_state();
    StepOutcome {
        reward: breakdown.total(),
        breakdown,
        done: game_state.is_terminal(),
        info: StepInfo {
            game_state,
            raw_reward: step.reward,
            stagnation_steps,
            cause,
            fault: None,
            flags: step.info.flags.clone(),
        },
        observation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::ScriptedSimulation, game::RawFrame};

    fn controller(frames: Vec<RawFrame>) -> EpisodeController {
        let config = ControllerConfig {
            checkpoint_x: 1000.0,
            ..ControllerConfig::default()
        };
        EpisodeController::new(
            Box::new(ScriptedSimulation::new(RawFrame::menu(0), frames)),
            config,
            RewardConfig::default(),
        )
        .unwrap()
    }

    fn into_level(controller: &mut EpisodeController) {
        controller.reset().unwrap();
        let selected = controller.step(Action::Select).unwrap();
        assert_eq!(selected.info.game_state, GameState::LevelStart);
        let start = controller.step(Action::Idle).unwrap();
        assert_eq!(start.info.game_state, GameState::Playing);
        assert_eq!(start.reward, 0.1);
    }

    #[test]
    fn test_step_before_reset_is_rejected() {
        let mut controller = controller(vec![]);
        assert!(matches!(
            controller.step(Action::Right),
            Err(Error::NotStarted)
        ));
    }

    #[test]
    fn test_menu_stays_until_level_selected() {
        let mut controller = controller(vec![
            RawFrame::menu(1),
            RawFrame::menu(1).selected(),
            RawFrame::at(80.0, 300.0),
        ]);
        controller.reset().unwrap();
        let first = controller.step(Action::Right).unwrap();
        assert_eq!(first.info.game_state, GameState::Menu);
        assert_eq!(first.reward, 0.0);
        let second = controller.step(Action::Select).unwrap();
        assert_eq!(second.info.game_state, GameState::LevelStart);
        let third = controller.step(Action::Right).unwrap();
        assert_eq!(third.info.game_state, GameState::Playing);
    }

    #[test]
    fn test_fall_is_game_over_with_death_penalty() {
        let mut controller = controller(vec![
            RawFrame::menu(0).selected(),
            RawFrame::at(80.0, 300.0),
            RawFrame::at(80.0, 460.0),
        ]);
        into_level(&mut controller);
        let fell = controller.step(Action::Right).unwrap();
        assert!(fell.done);
        assert_eq!(fell.info.game_state, GameState::GameOver);
        assert_eq!(fell.info.cause, Some(TerminationCause::Fell));
        assert_eq!(fell.breakdown.terminal, -100.0);
    }

    #[test]
    fn test_restart_flag_is_game_over() {
        let mut controller = controller(vec![
            RawFrame::menu(0).selected(),
            RawFrame::at(80.0, 300.0),
            RawFrame::at(84.0, 300.0).with_restart(),
        ]);
        into_level(&mut controller);
        let died = controller.step(Action::Right).unwrap();
        assert_eq!(died.info.cause, Some(TerminationCause::Restart));
        assert!(matches!(
            controller.step(Action::Right),
            Err(Error::ResetRequired {
                state: GameState::GameOver
            })
        ));
    }

    #[test]
    fn test_missing_field_becomes_forced_termination() {
        let mut broken = RawFrame::at(90.0, 300.0);
        broken.velocity = None;
        let mut controller = controller(vec![
            RawFrame::menu(0).selected(),
            RawFrame::at(80.0, 300.0),
            broken,
        ]);
        into_level(&mut controller);
        let outcome = controller.step(Action::Right).unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.info.game_state, GameState::GameOver);
        assert_eq!(outcome.reward, -100.0);
        assert!(matches!(
            outcome.info.fault,
            Some(SimulationFault::MissingField {
                field: "velocity",
                ..
            })
        ));
        assert_eq!(
            outcome.observation.position(),
            Some(Vec2::new(80.0, 300.0))
        );
    }

    #[test]
    fn test_select_while_playing_is_rejected() {
        let mut controller = controller(vec![
            RawFrame::menu(0).selected(),
            RawFrame::at(80.0, 300.0),
        ]);
        into_level(&mut controller);
        assert!(matches!(
            controller.step(Action::Select),
            Err(Error::NotGameplayAction { .. })
        ));
        assert_eq!(controller.state(), Some(GameState::Playing));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_steps() {
        let mut controller = controller(vec![RawFrame::menu(0)]);
        controller.reset().unwrap();
        controller.close();
        controller.close();
        assert!(controller.is_closed());
        assert!(matches!(
            controller.step(Action::Right),
            Err(Error::Simulation(SimulationFault::Closed))
        ));
    }
}
