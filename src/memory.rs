//! Spatial death-zone memory
//!
//! Deaths are bucketed by the quantized position at which the fatal action was
//! taken. Each zone keeps per-action death counts and derives an ordered
//! strategy; when the player is back inside a known zone the agent may let the
//! zone pick the action round-robin over that strategy.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    config::SpatialMemoryConfig,
    game::{Action, NUM_ACTIONS, Vec2},
};

/// Grid cell of a death zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneKey {
    pub x: i64,
    pub y: i64,
}

impl ZoneKey {
    pub fn from_position(position: Vec2, cell_size: f64) -> Self {
        Self {
            x: (position.x / cell_size).floor() as i64,
            y: (position.y / cell_size).floor() as i64,
        }
    }
}

/// Failure record for one zone.
///
/// Only the counters are persisted; the strategy is derived from them
/// whenever a zone is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ZoneCounts")]
pub struct DeathZone {
    pub occurrences: u32,
    /// Deaths per gameplay action, indexed by [`Action::index`].
    pub deaths: [u32; NUM_ACTIONS],
    /// Times the zone override chose each action.
    pub attempts: [u32; NUM_ACTIONS],
    pub attempt_count: u64,
    #[serde(skip)]
    strategy: Vec<Action>,
}

#[derive(Deserialize)]
struct ZoneCounts {
    occurrences: u32,
    deaths: [u32; NUM_ACTIONS],
    attempts: [u32; NUM_ACTIONS],
    attempt_count: u64,
}

impl From<ZoneCounts> for DeathZone {
    fn from(counts: ZoneCounts) -> Self {
        let mut zone = Self {
            occurrences: counts.occurrences,
            deaths: counts.deaths,
            attempts: counts.attempts,
            attempt_count: counts.attempt_count,
            strategy: Vec::new(),
        };
        zone.rebuild_strategy();
        zone
    }
}

impl Default for DeathZone {
    fn default() -> Self {
        Self::from(ZoneCounts {
            occurrences: 0,
            deaths: [0; NUM_ACTIONS],
            attempts: [0; NUM_ACTIONS],
            attempt_count: 0,
        })
    }
}

impl DeathZone {
    /// Actions from safest to most dangerous. Always holds every gameplay action.
    pub fn strategy(&self) -> &[Action] {
        &self.strategy
    }

    fn record_death(&mut self, action: Action) {
        self.occurrences += 1;
        if let Some(i) = action.index() {
            self.deaths[i] += 1;
        }
        self.rebuild_strategy();
    }

    /// Next action of the round robin over the strategy.
    ///
    /// The order is rebuilt after every death and whenever a full cycle of
    /// attempts completes.
    pub fn next_attempt(&mut self) -> Action {
        let slot = (self.attempt_count % NUM_ACTIONS as u64) as usize;
        let action = self.strategy[slot];
        self.attempt_count += 1;
        if let Some(i) = action.index() {
            self.attempts[i] += 1;
        }
        if self.attempt_count.is_multiple_of(NUM_ACTIONS as u64) {
            self.rebuild_strategy();
        }
        action
    }

    fn tried(&self, index: usize) -> bool {
        self.deaths[index] > 0 || self.attempts[index] > 0
    }

    // Ascending deaths, then tried before untried, then enumeration order.
    fn rebuild_strategy(&mut self) {
        let mut order: Vec<usize> = (0..NUM_ACTIONS).collect();
        order.sort_by_key(|&i| (self.deaths[i], !self.tried(i)));
        self.strategy = order.into_iter().map(|i| Action::GAMEPLAY[i]).collect();
    }
}

/// Registry of death zones owned by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMemory {
    config: SpatialMemoryConfig,
    zones: HashMap<ZoneKey, DeathZone>,
}

impl SpatialMemory {
    pub fn new(config: SpatialMemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            zones: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SpatialMemoryConfig {
        &self.config
    }

    /// Keep the recorded zones but use a different configuration.
    pub fn with_config(mut self, config: SpatialMemoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn key_for(&self, position: Vec2) -> ZoneKey {
        ZoneKey::from_position(position, self.config.cell_size)
    }

    /// Record a death caused by `action` taken at `position`.
    pub fn record_death(&mut self, position: Vec2, action: Action) -> ZoneKey {
        let key = self.key_for(position);
        self.zones.entry(key).or_default().record_death(action);
        key
    }

    pub fn zone(&self, key: &ZoneKey) -> Option<&DeathZone> {
        self.zones.get(key)
    }

    pub fn zone_at(&self, position: Vec2) -> Option<&DeathZone> {
        self.zones.get(&self.key_for(position))
    }

    /// With the configured probability, let the zone containing `position`
    /// pick the action. `None` outside known zones.
    pub fn override_action<R: Rng>(&mut self, position: Vec2, rng: &mut R) -> Option<Action> {
        let key = self.key_for(position);
        let zone = self.zones.get_mut(&key)?;
        if rng.random::<f64>() < self.config.override_probability {
            Some(zone.next_attempt())
        } else {
            None
        }
    }

    /// Zones sorted by key, for reporting.
    pub fn zones(&self) -> Vec<(ZoneKey, &DeathZone)> {
        let mut zones: Vec<_> = self.zones.iter().map(|(k, z)| (*k, z)).collect();
        zones.sort_by_key(|(k, _)| *k);
        zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn total_deaths(&self) -> u64 {
        self.zones.values().map(|z| u64::from(z.occurrences)).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn memory(p: f64) -> SpatialMemory {
        SpatialMemory::new(SpatialMemoryConfig {
            cell_size: 50.0,
            override_probability: p,
        })
        .unwrap()
    }

    #[test]
    fn test_positions_share_zone_within_cell() {
        let memory = memory(1.0);
        assert_eq!(
            memory.key_for(Vec2::new(410.0, 310.0)),
            memory.key_for(Vec2::new(449.0, 349.0))
        );
        assert_ne!(
            memory.key_for(Vec2::new(449.0, 310.0)),
            memory.key_for(Vec2::new(451.0, 310.0))
        );
    }

    #[test]
    fn test_fresh_zone_has_full_strategy() {
        let zone = DeathZone::default();
        assert_eq!(zone.strategy(), &Action::GAMEPLAY);
    }

    #[test]
    fn test_repeated_jump_deaths_demote_jump() {
        let mut memory = memory(1.0);
        let spot = Vec2::new(420.0, 300.0);
        for _ in 0..3 {
            memory.record_death(spot, Action::Jump);
        }
        let zone = memory.zone_at(spot).unwrap();
        assert_eq!(zone.occurrences, 3);
        assert_ne!(zone.strategy()[0], Action::Jump);
        assert_eq!(zone.strategy().last(), Some(&Action::Jump));
        assert_eq!(zone.strategy().len(), NUM_ACTIONS);
    }

    #[test]
    fn test_tried_actions_precede_untried_on_equal_deaths() {
        let mut zone = DeathZone::default();
        zone.record_death(Action::Right);
        // Left was attempted by the override without dying.
        zone.attempts[0] = 1;
        zone.rebuild_strategy();
        assert_eq!(
            zone.strategy(),
            &[Action::Left, Action::Jump, Action::Idle, Action::Right]
        );
    }

    #[test]
    fn test_decoded_zone_derives_its_strategy() {
        let mut zone = DeathZone::default();
        zone.record_death(Action::Jump);
        let mut encoded = serde_json::to_value(&zone).unwrap();
        assert!(encoded.get("strategy").is_none());

        // A stale or truncated strategy in the input is ignored.
        encoded["strategy"] = serde_json::json!([]);
        let mut decoded: DeathZone = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, zone);
        assert_eq!(decoded.strategy().len(), NUM_ACTIONS);
        assert_eq!(decoded.strategy().last(), Some(&Action::Jump));
        assert_ne!(decoded.next_attempt(), Action::Jump);
    }

    #[test]
    fn test_memory_survives_msgpack_with_strategies_intact() {
        let mut original = memory(1.0);
        original.record_death(Vec2::new(420.0, 300.0), Action::Right);
        original.record_death(Vec2::new(420.0, 300.0), Action::Jump);
        let bytes = rmp_serde::to_vec(&original).unwrap();
        let decoded: SpatialMemory = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, original);
        let zone = decoded.zone_at(Vec2::new(420.0, 300.0)).unwrap();
        assert_eq!(zone.strategy(), &[Action::Left, Action::Idle, Action::Right, Action::Jump]);
    }

    #[test]
    fn test_completed_cycle_reorders_by_attempts() {
        let mut zone = DeathZone::default();
        zone.record_death(Action::Right);
        zone.record_death(Action::Jump);
        zone.attempts[3] = 1;
        zone.rebuild_strategy();
        let before = [Action::Idle, Action::Left, Action::Right, Action::Jump];
        assert_eq!(zone.strategy(), &before);

        let mut cycle = Vec::new();
        for _ in 0..NUM_ACTIONS - 1 {
            cycle.push(zone.next_attempt());
        }
        assert_eq!(zone.strategy(), &before);
        cycle.push(zone.next_attempt());
        assert_eq!(cycle, before);

        // Every action is tried now, so deaths and enumeration order decide.
        assert_eq!(
            zone.strategy(),
            &[Action::Left, Action::Idle, Action::Right, Action::Jump]
        );
    }

    #[test]
    fn test_round_robin_covers_every_action() {
        let mut memory = memory(1.0);
        let spot = Vec2::new(120.0, 300.0);
        for action in Action::GAMEPLAY {
            memory.record_death(spot, action);
        }
        memory.record_death(spot, Action::Jump);

        let mut rng = StdRng::seed_from_u64(3);
        let seen: HashSet<Action> = (0..NUM_ACTIONS)
            .filter_map(|_| memory.override_action(spot, &mut rng))
            .collect();
        assert_eq!(seen.len(), NUM_ACTIONS);
    }

    #[test]
    fn test_override_respects_probability_and_zone() {
        let mut rng = StdRng::seed_from_u64(9);
        let spot = Vec2::new(120.0, 300.0);

        let mut never = memory(0.0);
        never.record_death(spot, Action::Right);
        assert_eq!(never.override_action(spot, &mut rng), None);

        let mut always = memory(1.0);
        always.record_death(spot, Action::Right);
        assert!(always.override_action(spot, &mut rng).is_some());
        assert_eq!(always.override_action(Vec2::new(900.0, 300.0), &mut rng), None);
    }
}
