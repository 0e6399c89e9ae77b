//! Game-facing domain types: actions, observations and their encoding

pub mod action;
pub mod encoder;
pub mod observation;

pub use action::{Action, ActionValues, NUM_ACTIONS};
pub use encoder::{FEATURE_DIM, FeatureVector, ObservationEncoder};
pub use observation::{
    GameState, LevelView, MenuView, NearbyObject, ObjectKind, Observation, PlayerView, RawFrame,
    RawObject, TerminalKind, TerminalView, Vec2,
};
