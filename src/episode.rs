//! Per-step and per-episode records shared by the controller, agents and observers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::{Action, GameState, Observation, TerminalKind, Vec2};

/// One (state, action, reward, next_state, done) experience tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Observation,
    pub action: Action,
    pub reward: f64,
    pub next_state: Observation,
    pub done: bool,
}

impl Transition {
    /// Only in-level transitions carry learning signal.
    pub fn is_gameplay(&self) -> bool {
        self.state.game_state() == GameState::Playing && self.action.is_gameplay()
    }

    /// The transition ended the episode in a death.
    pub fn is_death(&self) -> bool {
        self.done && self.next_state.terminal_kind() == Some(TerminalKind::GameOver)
    }
}

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Terminal(TerminalKind),
    /// The per-episode step budget ran out.
    Truncated,
    /// A stop was requested mid-episode.
    Interrupted,
}

impl EpisodeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeOutcome::Terminal(kind) => kind.as_str(),
            EpisodeOutcome::Truncated => "truncated",
            EpisodeOutcome::Interrupted => "interrupted",
        }
    }

    pub fn is_success(self) -> bool {
        self == EpisodeOutcome::Terminal(TerminalKind::CheckpointReached)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EpisodeOutcome::Terminal(_))
    }
}

impl fmt::Display for EpisodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub index: usize,
    pub steps: usize,
    pub cumulative_reward: f64,
    pub outcome: EpisodeOutcome,
    pub last_position: Option<Vec2>,
    pub elapsed_time: f64,
}

impl EpisodeSummary {
    /// Distance reached for deaths, elapsed time for checkpoint runs.
    pub fn terminal_score(&self) -> f64 {
        if self.outcome.is_success() {
            self.elapsed_time
        } else {
            self.last_position.map_or(0.0, |p| p.x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MenuView, TerminalView};

    fn summary(outcome: EpisodeOutcome) -> EpisodeSummary {
        EpisodeSummary {
            index: 0,
            steps: 10,
            cumulative_reward: 1.0,
            outcome,
            last_position: Some(Vec2::new(640.0, 300.0)),
            elapsed_time: 12.5,
        }
    }

    #[test]
    fn test_terminal_score_depends_on_outcome() {
        let died = summary(EpisodeOutcome::Terminal(TerminalKind::GameOver));
        let won = summary(EpisodeOutcome::Terminal(TerminalKind::CheckpointReached));
        assert_eq!(died.terminal_score(), 640.0);
        assert_eq!(won.terminal_score(), 12.5);
        assert!(won.outcome.is_success());
        assert_eq!(EpisodeOutcome::Truncated.as_str(), "truncated");
    }

    #[test]
    fn test_menu_transitions_are_not_gameplay() {
        let menu = Observation::Menu(MenuView { cursor: 0 });
        let over = Observation::GameOver(TerminalView {
            last_position: Vec2::default(),
            coins: 0,
            score: 0,
            elapsed_time: 0.0,
        });
        let transition = Transition {
            state: menu,
            action: Action::Select,
            reward: 0.0,
            next_state: over,
            done: true,
        };
        assert!(!transition.is_gameplay());
        assert!(transition.is_death());
    }
}
