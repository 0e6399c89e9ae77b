//! Value table over quantized positions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::{Action, ActionValues, Vec2};

/// Coarse position bucket used as the table key.
///
/// Velocity and surroundings are deliberately dropped so the table stays
/// bounded by the level's area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub x: i64,
    pub y: i64,
}

impl StateKey {
    pub fn from_position(position: Vec2, cell_size: f64) -> Self {
        Self {
            x: (position.x / cell_size).floor() as i64,
            y: (position.y / cell_size).floor() as i64,
        }
    }

    /// Same row, `dx` cells over.
    pub fn shifted(self, dx: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y,
        }
    }
}

/// One-step Bellman backup.
///
/// `Q ← (1−α)·Q + α·(r + γ·max Q')`, with the bootstrap term dropped when the
/// transition is terminal. Pure: equal inputs always produce equal outputs.
pub fn bellman_update(
    current: f64,
    reward: f64,
    next_max: f64,
    done: bool,
    learning_rate: f64,
    discount_factor: f64,
) -> f64 {
    let bootstrap = if done { 0.0 } else { discount_factor * next_max };
    (1.0 - learning_rate) * current + learning_rate * (reward + bootstrap)
}

/// Q-table mapping state keys to full-width action-score vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTable {
    values: HashMap<StateKey, ActionValues>,
    /// Initial value for unseen keys
    q_init: f64,
}

impl ValueTable {
    pub fn new(q_init: f64) -> Self {
        Self {
            values: HashMap::new(),
            q_init,
        }
    }

    /// Scores for a key; unseen keys resolve to the initial vector.
    pub fn get(&self, key: &StateKey) -> ActionValues {
        self.values
            .get(key)
            .copied()
            .unwrap_or_else(|| ActionValues::splat(self.q_init))
    }

    pub fn value(&self, key: &StateKey, action: Action) -> f64 {
        self.get(key).get(action)
    }

    pub fn max_value(&self, key: &StateKey) -> f64 {
        self.get(key).max()
    }

    pub fn set(&mut self, key: StateKey, action: Action, value: f64) {
        let q_init = self.q_init;
        self.values
            .entry(key)
            .or_insert_with(|| ActionValues::splat(q_init))
            .set(action, value);
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.values.contains_key(key)
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &ActionValues)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_key_has_full_width_default() {
        let table = ValueTable::new(0.5);
        let key = StateKey { x: 8, y: 30 };
        assert_eq!(table.get(&key), ActionValues::splat(0.5));
        assert!(!table.contains(&key));
    }

    #[test]
    fn test_set_keeps_other_actions() {
        let mut table = ValueTable::new(0.0);
        let key = StateKey { x: 8, y: 30 };
        table.set(key, Action::Jump, 2.0);
        assert_eq!(table.get(&key), ActionValues([0.0, 0.0, 2.0, 0.0]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_quantization_is_lossy() {
        let a = StateKey::from_position(Vec2::new(81.0, 300.0), 10.0);
        let b = StateKey::from_position(Vec2::new(89.9, 305.0), 10.0);
        assert_eq!(a, b);
        assert_eq!(a.shifted(2), StateKey { x: 10, y: 30 });
    }

    #[test]
    fn test_bellman_update() {
        // 0.5 * 1.0 + 0.5 * (1.0 + 0.9 * 2.0) = 1.9
        let updated = bellman_update(1.0, 1.0, 2.0, false, 0.5, 0.9);
        assert!((updated - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_bellman_update_ignores_bootstrap_when_done() {
        let updated = bellman_update(0.0, -100.0, 50.0, true, 0.1, 0.99);
        assert!((updated + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_bellman_update_is_pure() {
        let a = bellman_update(0.3, 4.0, 1.2, false, 0.2, 0.99);
        let b = bellman_update(0.3, 4.0, 1.2, false, 0.2, 0.99);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
