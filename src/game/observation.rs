//! Raw simulation frames and the validated observation union

use std::fmt;

use serde::{Deserialize, Serialize};

/// Episode state machine states; also reported in every step's info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Menu,
    LevelStart,
    Playing,
    GameOver,
    CheckpointReached,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::GameOver | GameState::CheckpointReached)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameState::Menu => "menu",
            GameState::LevelStart => "level_start",
            GameState::Playing => "playing",
            GameState::GameOver => "game_over",
            GameState::CheckpointReached => "checkpoint_reached",
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    GameOver,
    CheckpointReached,
}

impl TerminalKind {
    pub fn game_state(self) -> GameState {
        match self {
            TerminalKind::GameOver => GameState::GameOver,
            TerminalKind::CheckpointReached => GameState::CheckpointReached,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.game_state().as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Coarse classification of objects near the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Enemy,
    Obstacle,
    Ground,
    Collectible,
    Checkpoint,
    Other,
}

impl ObjectKind {
    /// Classify the free-form entity names simulations report.
    pub fn classify(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| name.contains(n));
        if any(&["goomba", "koopa", "enemy"]) {
            ObjectKind::Enemy
        } else if any(&["checkpoint", "flag"]) {
            ObjectKind::Checkpoint
        } else if any(&["coin", "randombox", "mushroom", "star"]) {
            ObjectKind::Collectible
        } else if any(&["pipe", "block", "brick", "wall"]) {
            ObjectKind::Obstacle
        } else if any(&["tile", "ground", "floor"]) {
            ObjectKind::Ground
        } else {
            ObjectKind::Other
        }
    }

    /// Small numeric code used by the feature encoder.
    pub fn code(self) -> f64 {
        match self {
            ObjectKind::Enemy => 1.0,
            ObjectKind::Obstacle => 0.8,
            ObjectKind::Ground => 0.6,
            ObjectKind::Collectible => 0.4,
            ObjectKind::Checkpoint => 0.2,
            ObjectKind::Other => 0.1,
        }
    }
}

/// Object position relative to the player (screen axes: y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearbyObject {
    pub rel_x: f64,
    pub rel_y: f64,
    pub kind: ObjectKind,
}

/// Entity as reported by a simulation adapter, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    pub rel_x: f64,
    pub rel_y: f64,
    pub kind: String,
}

impl RawObject {
    pub fn new(rel_x: f64, rel_y: f64, kind: impl Into<String>) -> Self {
        Self {
            rel_x,
            rel_y,
            kind: kind.into(),
        }
    }
}

/// Loosely-typed frame produced by a simulation adapter.
///
/// Every field is optional; [`crate::game::encoder::ObservationEncoder`]
/// decides which ones a given [`GameState`] requires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawFrame {
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub power_state: Option<u8>,
    pub nearby_objects: Vec<RawObject>,
    pub coins: Option<u32>,
    pub score: Option<u64>,
    pub elapsed_time: Option<f64>,
    pub menu_cursor: Option<u32>,
    pub level_name: Option<String>,
    /// The menu confirmed a level.
    pub level_selected: bool,
    /// The simulation asks for a restart (the player died).
    pub restart: bool,
}

impl RawFrame {
    /// Menu frame with the given cursor position.
    pub fn menu(cursor: u32) -> Self {
        Self {
            menu_cursor: Some(cursor),
            ..Self::default()
        }
    }

    /// In-level frame with the minimum fields a playing observation needs.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Some(Vec2::new(x, y)),
            velocity: Some(Vec2::default()),
            power_state: Some(0),
            coins: Some(0),
            score: Some(0),
            elapsed_time: Some(0.0),
            ..Self::default()
        }
    }

    pub fn with_velocity(mut self, vx: f64, vy: f64) -> Self {
        self.velocity = Some(Vec2::new(vx, vy));
        self
    }

    pub fn with_coins(mut self, coins: u32) -> Self {
        self.coins = Some(coins);
        self
    }

    pub fn with_object(mut self, object: RawObject) -> Self {
        self.nearby_objects.push(object);
        self
    }

    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    pub fn selected(mut self) -> Self {
        self.level_selected = true;
        self
    }
}

/// Menu-screen view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuView {
    pub cursor: u32,
}

/// Level-loading view, emitted for the single setup frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelView {
    pub level_name: Option<String>,
    pub spawn: Option<Vec2>,
}

/// Everything the agents may look at while the level is being played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub position: Vec2,
    pub velocity: Vec2,
    pub power_state: u8,
    pub nearby_objects: Vec<NearbyObject>,
    pub coins: u32,
    pub score: u64,
    pub elapsed_time: f64,
}

/// What is left to see once the episode is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalView {
    pub last_position: Vec2,
    pub coins: u32,
    pub score: u64,
    pub elapsed_time: f64,
}

/// Validated observation, one variant per [`GameState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game_state", rename_all = "snake_case")]
pub enum Observation {
    Menu(MenuView),
    LevelStart(LevelView),
    Playing(PlayerView),
    GameOver(TerminalView),
    CheckpointReached(TerminalView),
}

impl Observation {
    pub fn game_state(&self) -> GameState {
        match self {
            Observation::Menu(_) => GameState::Menu,
            Observation::LevelStart(_) => GameState::LevelStart,
            Observation::Playing(_) => GameState::Playing,
            Observation::GameOver(_) => GameState::GameOver,
            Observation::CheckpointReached(_) => GameState::CheckpointReached,
        }
    }

    /// Player position, when the state carries one.
    pub fn position(&self) -> Option<Vec2> {
        match self {
            Observation::Menu(_) => None,
            Observation::LevelStart(view) => view.spawn,
            Observation::Playing(view) => Some(view.position),
            Observation::GameOver(view) | Observation::CheckpointReached(view) => {
                Some(view.last_position)
            }
        }
    }

    pub fn player(&self) -> Option<&PlayerView> {
        match self {
            Observation::Playing(view) => Some(view),
            _ => None,
        }
    }

    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        match self {
            Observation::GameOver(_) => Some(TerminalKind::GameOver),
            Observation::CheckpointReached(_) => Some(TerminalKind::CheckpointReached),
            _ => None,
        }
    }
}
