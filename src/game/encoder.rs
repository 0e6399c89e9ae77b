//! Observation encoder
//!
//! Validates [`RawFrame`]s into the [`Observation`] union and flattens
//! observations into fixed-width feature vectors for function approximation.

use super::observation::{
    GameState, LevelView, MenuView, NearbyObject, ObjectKind, Observation, PlayerView, RawFrame,
    Vec2,
};
use crate::error::SimulationFault;

/// Nearest objects kept in the feature vector.
pub const OBJECT_SLOTS: usize = 6;
const STATE_FEATURES: usize = 5;
const PLAYER_FEATURES: usize = 7;
/// Width of every vector produced by [`ObservationEncoder::features`].
pub const FEATURE_DIM: usize = STATE_FEATURES + PLAYER_FEATURES + OBJECT_SLOTS * 3;

const POSITION_SCALE: f64 = 1000.0;
const HEIGHT_SCALE: f64 = 480.0;
const SPEED_SCALE: f64 = 10.0;
const COIN_SCALE: f64 = 100.0;
const TIME_SCALE: f64 = 400.0;

/// Fixed-width numeric encoding of an observation.
pub type FeatureVector = Vec<f64>;

#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    object_radius: f64,
}

impl Default for ObservationEncoder {
    fn default() -> Self {
        Self::new(200.0)
    }
}

impl ObservationEncoder {
    pub fn new(object_radius: f64) -> Self {
        Self { object_radius }
    }

    pub fn object_radius(&self) -> f64 {
        self.object_radius
    }

    pub fn menu(&self, frame: &RawFrame) -> Observation {
        Observation::Menu(MenuView {
            cursor: frame.menu_cursor.unwrap_or(0),
        })
    }

    pub fn level_start(&self, frame: &RawFrame) -> Observation {
        let spawn = frame
            .position
            .filter(|p| p.x.is_finite() && p.y.is_finite());
        Observation::LevelStart(LevelView {
            level_name: frame.level_name.clone(),
            spawn,
        })
    }

    /// Validate an in-level frame.
    ///
    /// Position and velocity are required; counters default to zero. Objects
    /// outside the radius are dropped, and objects with non-finite offsets are
    /// treated as a fault.
    pub fn player_view(&self, frame: &RawFrame) -> Result<PlayerView, SimulationFault> {
        let position = require(frame.position, "position")?;
        let velocity = require(frame.velocity, "velocity")?;
        finite("position.x", position.x)?;
        finite("position.y", position.y)?;
        finite("velocity.x", velocity.x)?;
        finite("velocity.y", velocity.y)?;
        let elapsed_time = frame.elapsed_time.unwrap_or(0.0);
        finite("elapsed_time", elapsed_time)?;

        let mut nearby_objects = Vec::with_capacity(frame.nearby_objects.len());
        for object in &frame.nearby_objects {
            finite("nearby_objects.rel_x", object.rel_x)?;
            finite("nearby_objects.rel_y", object.rel_y)?;
            if object.rel_x.abs() < self.object_radius && object.rel_y.abs() < self.object_radius {
                nearby_objects.push(NearbyObject {
                    rel_x: object.rel_x,
                    rel_y: object.rel_y,
                    kind: ObjectKind::classify(&object.kind),
                });
            }
        }

        Ok(PlayerView {
            position,
            velocity,
            power_state: frame.power_state.unwrap_or(0),
            nearby_objects,
            coins: frame.coins.unwrap_or(0),
            score: frame.score.unwrap_or(0),
            elapsed_time,
        })
    }

    /// Flatten an observation. Fields a state does not carry stay zero.
    pub fn features(&self, observation: &Observation) -> FeatureVector {
        let mut features = vec![0.0; FEATURE_DIM];
        let state_slot = match observation.game_state() {
            GameState::Menu => 0,
            GameState::LevelStart => 1,
            GameState::Playing => 2,
            GameState::GameOver => 3,
            GameState::CheckpointReached => 4,
        };
        features[state_slot] = 1.0;

        let base = STATE_FEATURES;
        match observation {
            Observation::Menu(_) => {}
            Observation::LevelStart(view) => {
                if let Some(spawn) = view.spawn {
                    features[base] = spawn.x / POSITION_SCALE;
                    features[base + 1] = spawn.y / HEIGHT_SCALE;
                }
            }
            Observation::Playing(view) => {
                features[base] = view.position.x / POSITION_SCALE;
                features[base + 1] = view.position.y / HEIGHT_SCALE;
                features[base + 2] = view.velocity.x / SPEED_SCALE;
                features[base + 3] = view.velocity.y / SPEED_SCALE;
                features[base + 4] = f64::from(view.power_state);
                features[base + 5] = f64::from(view.coins) / COIN_SCALE;
                features[base + 6] = view.elapsed_time / TIME_SCALE;

                let mut objects: Vec<&NearbyObject> = view.nearby_objects.iter().collect();
                objects.sort_by(|a, b| distance_sq(a).total_cmp(&distance_sq(b)));
                let slots = base + PLAYER_FEATURES;
                for (slot, object) in objects.into_iter().take(OBJECT_SLOTS).enumerate() {
                    let offset = slots + slot * 3;
                    features[offset] = object.rel_x / self.object_radius;
                    features[offset + 1] = object.rel_y / self.object_radius;
                    features[offset + 2] = object.kind.code();
                }
            }
            Observation::GameOver(view) | Observation::CheckpointReached(view) => {
                features[base] = view.last_position.x / POSITION_SCALE;
                features[base + 1] = view.last_position.y / HEIGHT_SCALE;
                features[base + 5] = f64::from(view.coins) / COIN_SCALE;
                features[base + 6] = view.elapsed_time / TIME_SCALE;
            }
        }
        features
    }
}

fn require(value: Option<Vec2>, field: &'static str) -> Result<Vec2, SimulationFault> {
    value.ok_or(SimulationFault::MissingField {
        field,
        state: GameState::Playing,
    })
}

fn finite(field: &'static str, value: f64) -> Result<(), SimulationFault> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimulationFault::NonFinite { field, value })
    }
}

fn distance_sq(object: &NearbyObject) -> f64 {
    object.rel_x * object.rel_x + object.rel_y * object.rel_y
}
