//! Controller actions and per-action score vectors

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An input sent to the simulation for one frame.
///
/// The four gameplay actions are the only ones the learners score; `Select`
/// exists for menu navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Left,
    Right,
    Jump,
    Idle,
    Select,
}

/// Number of gameplay actions (width of every action-score vector).
pub const NUM_ACTIONS: usize = 4;

impl Action {
    /// Gameplay actions in enumeration order. Ties are always broken by this order.
    pub const GAMEPLAY: [Action; NUM_ACTIONS] =
        [Action::Left, Action::Right, Action::Jump, Action::Idle];

    /// Position of this action in [`Action::GAMEPLAY`], `None` for `Select`.
    pub fn index(self) -> Option<usize> {
        match self {
            Action::Left => Some(0),
            Action::Right => Some(1),
            Action::Jump => Some(2),
            Action::Idle => Some(3),
            Action::Select => None,
        }
    }

    /// Inverse of [`Action::index`].
    pub fn from_index(index: usize) -> Option<Action> {
        Self::GAMEPLAY.get(index).copied()
    }

    pub fn is_gameplay(self) -> bool {
        self.index().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Left => "left",
            Action::Right => "right",
            Action::Jump => "jump",
            Action::Idle => "idle",
            Action::Select => "select",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Action::Left),
            "right" => Ok(Action::Right),
            "jump" => Ok(Action::Jump),
            "idle" => Ok(Action::Idle),
            "select" => Ok(Action::Select),
            other => Err(Error::NotGameplayAction {
                action: other.to_string(),
            }),
        }
    }
}

/// One score per gameplay action, indexed by [`Action::index`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionValues(pub [f64; NUM_ACTIONS]);

impl ActionValues {
    pub fn splat(value: f64) -> Self {
        Self([value; NUM_ACTIONS])
    }

    /// Score of a gameplay action. `Select` scores zero.
    pub fn get(&self, action: Action) -> f64 {
        action.index().map_or(0.0, |i| self.0[i])
    }

    pub fn add(&mut self, action: Action, delta: f64) {
        if let Some(i) = action.index() {
            self.0[i] += delta;
        }
    }

    pub fn set(&mut self, action: Action, value: f64) {
        if let Some(i) = action.index() {
            self.0[i] = value;
        }
    }

    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Highest-scoring action; the earliest in enumeration order wins ties.
    pub fn best(&self) -> Action {
        let mut best = 0;
        for i in 1..NUM_ACTIONS {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        Action::GAMEPLAY[best]
    }

    /// Element-wise `self + weight * other`.
    pub fn blend(&self, other: &ActionValues, weight: f64) -> ActionValues {
        let mut out = *self;
        for (value, extra) in out.0.iter_mut().zip(other.0.iter()) {
            *value += weight * extra;
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        Action::GAMEPLAY.iter().copied().zip(self.0.iter().copied())
    }
}
