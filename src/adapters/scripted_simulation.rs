//! Simulation that replays a fixed list of frames.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    error::SimulationFault,
    game::{Action, RawFrame},
    ports::{SimInfo, SimStep, Simulation},
};

#[derive(Debug, Default)]
struct ScriptLog {
    actions: Vec<Action>,
    resets: usize,
    closes: usize,
}

/// Read-only view of what a [`ScriptedSimulation`] was asked to do.
///
/// Clones share the same log, so a test can keep a handle after moving the
/// simulation into a controller.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<ScriptLog>>);

impl ScriptHandle {
    fn log(&self) -> MutexGuard<'_, ScriptLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every action passed to `step`, across all episodes.
    pub fn actions(&self) -> Vec<Action> {
        self.log().actions.clone()
    }

    pub fn resets(&self) -> usize {
        self.log().resets
    }

    /// Number of times `close` actually released the simulation.
    pub fn closes(&self) -> usize {
        self.log().closes
    }
}

/// Replays `frames` after every reset, one per step.
///
/// Once the script runs out the last frame repeats. An empty script makes
/// every step fail with an adapter fault.
#[derive(Debug)]
pub struct ScriptedSimulation {
    reset_frame: RawFrame,
    frames: Vec<RawFrame>,
    cursor: usize,
    done_at_end: bool,
    closed: bool,
    handle: ScriptHandle,
}

impl ScriptedSimulation {
    pub fn new(reset_frame: RawFrame, frames: Vec<RawFrame>) -> Self {
        Self {
            reset_frame,
            frames,
            cursor: 0,
            done_at_end: false,
            closed: false,
            handle: ScriptHandle::default(),
        }
    }

    /// Report `done` once the last scripted frame has been played.
    pub fn finishing(mut self) -> Self {
        self.done_at_end = true;
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }
}

impl Simulation for ScriptedSimulation {
    fn reset(&mut self) -> Result<RawFrame, SimulationFault> {
        if self.closed {
            return Err(SimulationFault::Closed);
        }
        self.cursor = 0;
        self.handle.log().resets += 1;
        Ok(self.reset_frame.clone())
    }

    fn step(&mut self, action: Action) -> Result<SimStep, SimulationFault> {
        if self.closed {
            return Err(SimulationFault::Closed);
        }
        self.handle.log().actions.push(action);

        let last = self
            .frames
            .len()
            .checked_sub(1)
            .ok_or_else(|| SimulationFault::Adapter {
                message: "script has no frames".to_string(),
            })?;
        let index = self.cursor.min(last);
        self.cursor += 1;

        let mut step = SimStep::new(self.frames[index].clone());
        if index == last && self.cursor > last {
            step.info = SimInfo::default().flag("script_exhausted");
            step.done = self.done_at_end;
        }
        Ok(step)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.handle.log().closes += 1;
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_from_start_after_reset() {
        let mut sim = ScriptedSimulation::new(
            RawFrame::menu(0),
            vec![RawFrame::menu(1), RawFrame::menu(2)],
        );
        sim.reset().unwrap();
        assert_eq!(sim.step(Action::Right).unwrap().frame.menu_cursor, Some(1));
        sim.reset().unwrap();
        assert_eq!(sim.step(Action::Right).unwrap().frame.menu_cursor, Some(1));
        assert_eq!(sim.handle().resets(), 2);
    }

    #[test]
    fn test_last_frame_repeats() {
        let mut sim =
            ScriptedSimulation::new(RawFrame::menu(0), vec![RawFrame::menu(1)]).finishing();
        sim.reset().unwrap();
        let first = sim.step(Action::Idle).unwrap();
        let second = sim.step(Action::Idle).unwrap();
        assert_eq!(first.frame, second.frame);
        assert!(first.done);
        assert!(second.info.has("script_exhausted"));
    }

    #[test]
    fn test_empty_script_is_a_fault() {
        let mut sim = ScriptedSimulation::new(RawFrame::menu(0), Vec::new());
        sim.reset().unwrap();
        assert!(matches!(
            sim.step(Action::Right),
            Err(SimulationFault::Adapter { .. })
        ));
    }

    #[test]
    fn test_records_actions_and_close() {
        let mut sim = ScriptedSimulation::new(RawFrame::menu(0), vec![RawFrame::menu(0)]);
        let handle = sim.handle();
        sim.reset().unwrap();
        sim.step(Action::Jump).unwrap();
        sim.step(Action::Left).unwrap();
        sim.close();
        sim.close();
        assert_eq!(handle.actions(), vec![Action::Jump, Action::Left]);
        assert_eq!(handle.closes(), 1);
        assert_eq!(sim.step(Action::Idle), Err(SimulationFault::Closed));
    }
}
