//! Rule-based action scoring
//!
//! Scores the four gameplay actions from the structured player view before any
//! learned adjustment. The scorer is stateful only in the small ways a human
//! player would be: it remembers a recent jump (cooldown and forward bias),
//! the recent x positions (stuck detection) and where it is in a scripted
//! sequence.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    Result,
    config::HeuristicConfig,
    game::{Action, ActionValues, ObjectKind, Observation, PlayerView},
};

/// Scores for one observation, plus the escape action when the stuck detector
/// has fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicEvaluation {
    pub scores: ActionValues,
    pub escape: Option<Action>,
}

impl HeuristicEvaluation {
    /// The heuristic's own choice: escape first, otherwise the best score.
    pub fn action(&self) -> Action {
        self.escape.unwrap_or_else(|| self.scores.best())
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
    positions: VecDeque<f64>,
    stuck_count: u32,
    escape_step: Option<usize>,
    jump_cooldown: u32,
    post_jump_steps: u32,
    menu_step: usize,
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            positions: VecDeque::with_capacity(config.stuck_window),
            config,
            stuck_count: 0,
            escape_step: None,
            jump_cooldown: 0,
            post_jump_steps: 0,
            menu_step: 0,
        })
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Score a playing observation and advance the stuck detector.
    pub fn evaluate(&mut self, view: &PlayerView) -> HeuristicEvaluation {
        self.track_position(view.position.x);
        let escape = self.next_escape();
        HeuristicEvaluation {
            scores: self.score(view),
            escape,
        }
    }

    /// Pure per-action scores for a view given the current cooldowns.
    pub fn score(&self, view: &PlayerView) -> ActionValues {
        let config = &self.config;
        let mut scores = ActionValues::default();
        scores.add(Action::Right, config.forward_bias);

        let mut enemy_bonus: f64 = 0.0;
        let mut obstacle_ahead = false;
        let mut collectible_above = false;
        let mut ground_seen = false;
        let mut ground_ahead = false;
        let mut ground_below = false;

        for object in &view.nearby_objects {
            let (x, y) = (object.rel_x, object.rel_y);
            match object.kind {
                ObjectKind::Enemy if config.enemy_window.contains(x, y) => {
                    let bonus = if config.enemy_close_window.contains(x, y) {
                        config.enemy_jump_bonus * config.enemy_close_multiplier
                    } else {
                        config.enemy_jump_bonus
                    };
                    enemy_bonus = enemy_bonus.max(bonus);
                }
                ObjectKind::Obstacle if config.obstacle_window.contains(x, y) => {
                    obstacle_ahead = true;
                }
                ObjectKind::Collectible if config.collectible_above_window.contains(x, y) => {
                    collectible_above = true;
                }
                ObjectKind::Ground => {
                    ground_seen = true;
                    ground_ahead |= config.ground_ahead_window.contains(x, y);
                    ground_below |= config.ground_below_window.contains(x, y);
                }
                _ => {}
            }
        }

        scores.add(Action::Jump, enemy_bonus);
        if obstacle_ahead {
            scores.add(Action::Jump, config.obstacle_jump_bonus);
        }
        if collectible_above {
            scores.add(Action::Jump, config.collectible_jump_bonus);
        }
        if ground_seen && ground_below && !ground_ahead && view.velocity.x >= 0.0 {
            scores.add(Action::Jump, config.gap_jump_bonus);
        }
        // Airborne: keep momentum, a second jump does nothing.
        if ground_seen && !ground_below && view.velocity.y != 0.0 {
            scores.add(Action::Right, config.post_jump_forward_bias);
            scores.add(Action::Jump, -config.jump_cooldown_penalty);
        }
        if self.jump_cooldown > 0 {
            scores.add(Action::Jump, -config.jump_cooldown_penalty);
        }
        if self.post_jump_steps > 0 {
            scores.add(Action::Right, config.post_jump_forward_bias);
        }
        scores
    }

    /// Tell the scorer which action was actually taken.
    pub fn record_action(&mut self, action: Action) {
        if action == Action::Jump {
            self.jump_cooldown = self.config.jump_cooldown_steps;
            self.post_jump_steps = self.config.post_jump_bias_steps;
        } else {
            self.jump_cooldown = self.jump_cooldown.saturating_sub(1);
            self.post_jump_steps = self.post_jump_steps.saturating_sub(1);
        }
    }

    /// Evaluate, pick the highest-scoring action and record it.
    pub fn choose(&mut self, view: &PlayerView) -> Action {
        let action = self.evaluate(view).action();
        self.record_action(action);
        action
    }

    /// Scripted action for states without structured features.
    pub fn fallback(&mut self, observation: &Observation) -> Action {
        match observation {
            Observation::Menu(_) => {
                let sequence = &self.config.menu_sequence;
                let action = sequence[self.menu_step % sequence.len()];
                self.menu_step += 1;
                action
            }
            _ => self.config.default_action,
        }
    }

    pub fn is_escaping(&self) -> bool {
        self.escape_step.is_some()
    }

    /// Forget per-episode state.
    pub fn reset(&mut self) {
        self.positions.clear();
        self.stuck_count = 0;
        self.escape_step = None;
        self.jump_cooldown = 0;
        self.post_jump_steps = 0;
        self.menu_step = 0;
    }

    fn track_position(&mut self, x: f64) {
        if self.positions.len() == self.config.stuck_window {
            self.positions.pop_front();
        }
        self.positions.push_back(x);

        if self.positions.len() < self.config.stuck_window {
            return;
        }
        if variance(&self.positions) < self.config.stuck_variance_threshold {
            self.stuck_count += 1;
        } else {
            self.stuck_count = 0;
        }
        if self.escape_step.is_none() && self.stuck_count > self.config.stuck_patience {
            debug!(x, stuck_for = self.stuck_count, "stuck, starting escape sequence");
            self.escape_step = Some(0);
        }
    }

    fn next_escape(&mut self) -> Option<Action> {
        let step = self.escape_step?;
        let sequence = &self.config.escape_sequence;
        let action = sequence[step];
        if step + 1 >= sequence.len() {
            self.escape_step = None;
            self.positions.clear();
            self.stuck_count = 0;
        } else {
            self.escape_step = Some(step + 1);
        }
        Some(action)
    }
}

fn variance(values: &VecDeque<f64>) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MenuView, NearbyObject, TerminalView, Vec2};

    fn scorer() -> HeuristicScorer {
        HeuristicScorer::new(HeuristicConfig::default()).unwrap()
    }

    fn view(x: f64, objects: Vec<NearbyObject>) -> PlayerView {
        PlayerView {
            position: Vec2::new(x, 400.0),
            velocity: Vec2::new(3.0, 0.0),
            power_state: 0,
            nearby_objects: objects,
            coins: 0,
            score: 0,
            elapsed_time: 0.0,
        }
    }

    fn object(rel_x: f64, rel_y: f64, kind: ObjectKind) -> NearbyObject {
        NearbyObject { rel_x, rel_y, kind }
    }

    fn flat_ground() -> Vec<NearbyObject> {
        (-2..4)
            .map(|i| object(f64::from(i) * 32.0, 16.0, ObjectKind::Ground))
            .collect()
    }

    #[test]
    fn test_open_ground_prefers_right() {
        let scorer = scorer();
        let scores = scorer.score(&view(100.0, flat_ground()));
        assert_eq!(scores.best(), Action::Right);
        assert_eq!(scores.get(Action::Right), 4.0);
    }

    #[test]
    fn test_close_enemy_prefers_jump() {
        let scorer = scorer();
        let mut objects = flat_ground();
        objects.push(object(30.0, 0.0, ObjectKind::Enemy));
        let scores = scorer.score(&view(100.0, objects));
        assert_eq!(scores.get(Action::Jump), 4.5);
        assert_eq!(scores.best(), Action::Jump);
    }

    #[test]
    fn test_gap_ahead_prefers_jump() {
        let scorer = scorer();
        let objects = vec![
            object(-16.0, 16.0, ObjectKind::Ground),
            object(0.0, 16.0, ObjectKind::Ground),
        ];
        let scores = scorer.score(&view(100.0, objects));
        assert_eq!(scores.best(), Action::Jump);
    }

    #[test]
    fn test_jump_cooldown_suppresses_repeat_jumps() {
        let mut scorer = scorer();
        let mut objects = flat_ground();
        objects.push(object(60.0, 0.0, ObjectKind::Enemy));
        let view = view(100.0, objects);

        let before = scorer.score(&view).get(Action::Jump);
        scorer.record_action(Action::Jump);
        let after = scorer.score(&view).get(Action::Jump);
        assert_eq!(before - after, 2.0);

        for _ in 0..8 {
            scorer.record_action(Action::Right);
        }
        assert_eq!(scorer.score(&view).get(Action::Jump), before);
    }

    #[test]
    fn test_choose_breaks_ties_by_enumeration_order() {
        let mut level = HeuristicScorer::new(HeuristicConfig {
            forward_bias: 0.0,
            ..HeuristicConfig::default()
        })
        .unwrap();
        assert_eq!(level.choose(&view(100.0, flat_ground())), Action::Left);

        // Right and Jump both score 3 with an enemy in range.
        let mut scorer = HeuristicScorer::new(HeuristicConfig {
            forward_bias: 3.0,
            ..HeuristicConfig::default()
        })
        .unwrap();
        let mut objects = flat_ground();
        objects.push(object(60.0, 0.0, ObjectKind::Enemy));
        let view = view(100.0, objects);
        assert_eq!(scorer.choose(&view), Action::Right);
    }

    #[test]
    fn test_choose_records_the_chosen_jump() {
        let mut scorer = scorer();
        let mut objects = flat_ground();
        objects.push(object(30.0, 0.0, ObjectKind::Enemy));
        let view = view(100.0, objects);
        let before = scorer.score(&view).get(Action::Jump);
        assert_eq!(scorer.choose(&view), Action::Jump);
        assert_eq!(scorer.score(&view).get(Action::Jump), before - 2.0);
        assert_eq!(scorer.choose(&view), Action::Right);
    }

    #[test]
    fn test_escape_overrides_scores() {
        let mut scores = ActionValues::default();
        scores.add(Action::Right, 4.0);
        let evaluation = HeuristicEvaluation {
            scores,
            escape: Some(Action::Jump),
        };
        assert_eq!(evaluation.action(), Action::Jump);
        assert_eq!(
            HeuristicEvaluation {
                escape: None,
                ..evaluation
            }
            .action(),
            Action::Right
        );
    }

    #[test]
    fn test_stuck_detector_runs_escape_sequence() {
        let mut scorer = scorer();
        let stuck = view(200.0, flat_ground());
        let mut escapes = Vec::new();
        for _ in 0..40 {
            if let Some(action) = scorer.evaluate(&stuck).escape {
                escapes.push(action);
            }
        }
        assert_eq!(
            &escapes[..4],
            &[Action::Right, Action::Jump, Action::Right, Action::Right]
        );
        assert_eq!(escapes.len(), 4);
        assert!(!scorer.is_escaping());
    }

    #[test]
    fn test_moving_player_never_escapes() {
        let mut scorer = scorer();
        for step in 0..60 {
            let evaluation = scorer.evaluate(&view(f64::from(step) * 3.0, flat_ground()));
            assert_eq!(evaluation.escape, None);
        }
    }

    #[test]
    fn test_fallbacks_outside_play() {
        let mut scorer = scorer();
        let menu = Observation::Menu(MenuView { cursor: 0 });
        let script: Vec<Action> = (0..4).map(|_| scorer.fallback(&menu)).collect();
        assert_eq!(
            script,
            vec![Action::Right, Action::Right, Action::Select, Action::Right]
        );

        let over = Observation::GameOver(TerminalView {
            last_position: Vec2::default(),
            coins: 0,
            score: 0,
            elapsed_time: 0.0,
        });
        assert_eq!(scorer.fallback(&over), Action::Idle);
    }
}
