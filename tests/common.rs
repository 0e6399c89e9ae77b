//! Common test utilities for the scroller test suite.
//!
//! Builders for scripted controllers and the frames that walk them from the
//! menu into a level.

#![allow(dead_code)]

use scroller::{
    adapters::{ScriptHandle, ScriptedSimulation},
    config::{ControllerConfig, RewardConfig},
    controller::EpisodeController,
    game::{Action, GameState, Observation, RawFrame},
};

/// Level-selected frame followed by the level-start frame at `(x, y)`.
pub fn level_intro(x: f64, y: f64) -> Vec<RawFrame> {
    vec![RawFrame::menu(0).selected(), RawFrame::at(x, y)]
}

/// Controller over a scripted simulation with the checkpoint at `checkpoint_x`.
pub fn scripted_controller(
    frames: Vec<RawFrame>,
    checkpoint_x: f64,
) -> (EpisodeController, ScriptHandle) {
    let simulation = ScriptedSimulation::new(RawFrame::menu(0), frames);
    let handle = simulation.handle();
    let config = ControllerConfig {
        checkpoint_x,
        ..ControllerConfig::default()
    };
    let controller =
        EpisodeController::new(Box::new(simulation), config, RewardConfig::default()).unwrap();
    (controller, handle)
}

/// Reset and step through menu and level start; returns the first playing observation.
pub fn enter_level(controller: &mut EpisodeController) -> Observation {
    controller.reset().unwrap();
    let selected = controller.step(Action::Select).unwrap();
    assert_eq!(selected.info.game_state, GameState::LevelStart);
    let started = controller.step(Action::Idle).unwrap();
    assert_eq!(started.info.game_state, GameState::Playing);
    started.observation
}
