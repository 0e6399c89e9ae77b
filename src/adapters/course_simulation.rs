//! Headless side-scrolling course.
//!
//! A small deterministic stand-in for the real game so the binary can train
//! without it: a two-entry level menu, flat ground broken by gaps, pipes that
//! block walking, patrolling enemies that can be stomped, coins, and a
//! checkpoint flag. Screen axes are used throughout (y grows downward) and
//! the player position is the point between their feet.

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    config::{ensure, ensure_non_negative, ensure_positive},
    error::SimulationFault,
    game::{Action, RawFrame, RawObject, Vec2},
    ports::{SimInfo, SimStep, Simulation},
};

const GRAVITY: f64 = 1.0;
const JUMP_VELOCITY: f64 = -12.0;
const MAX_FALL_SPEED: f64 = 12.0;
const RUN_SPEED: f64 = 3.0;
const HALF_WIDTH: f64 = 8.0;
const CONTACT_RANGE: f64 = 16.0;
const FRAME_TIME: f64 = 1.0 / 60.0;
const STOMP_SCORE: u64 = 100;
const COIN_SCORE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub x: f64,
    pub width: f64,
    pub height: f64,
}

/// Enemy walking back and forth between two x positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patrol {
    pub min_x: f64,
    pub max_x: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseLayout {
    /// Menu entries, selected with Left/Right and confirmed with Select.
    pub levels: Vec<String>,
    pub ground_y: f64,
    pub spawn_x: f64,
    /// Walking past this x ends the simulation.
    pub length: f64,
    pub checkpoint_x: f64,
    /// Open x ranges without ground.
    pub gaps: Vec<(f64, f64)>,
    pub pipes: Vec<Pipe>,
    pub enemies: Vec<Patrol>,
    pub coins: Vec<Vec2>,
    /// Objects further than this on either axis are not reported.
    pub report_radius: f64,
    pub tile_size: f64,
}

impl Default for CourseLayout {
    fn default() -> Self {
        let pipe = |x, height| Pipe {
            x,
            width: 32.0,
            height,
        };
        let patrol = |min_x, max_x, speed| Patrol {
            min_x,
            max_x,
            speed,
        };
        Self {
            levels: vec!["1-1".to_string(), "1-2".to_string()],
            ground_y: 400.0,
            spawn_x: 80.0,
            length: 3200.0,
            checkpoint_x: 3000.0,
            gaps: vec![(600.0, 664.0), (1500.0, 1564.0), (2300.0, 2364.0)],
            pipes: vec![pipe(400.0, 32.0), pipe(1100.0, 48.0), pipe(1900.0, 40.0)],
            enemies: vec![
                patrol(800.0, 1000.0, 1.0),
                patrol(1300.0, 1450.0, 1.0),
                patrol(2000.0, 2250.0, 1.5),
                patrol(2500.0, 2800.0, 1.0),
            ],
            coins: vec![
                Vec2::new(500.0, 340.0),
                Vec2::new(900.0, 340.0),
                Vec2::new(1200.0, 320.0),
                Vec2::new(1700.0, 340.0),
                Vec2::new(2600.0, 340.0),
            ],
            report_radius: 200.0,
            tile_size: 32.0,
        }
    }
}

impl CourseLayout {
    pub fn validate(&self) -> Result<()> {
        ensure(!self.levels.is_empty(), || {
            "course needs at least one level".to_string()
        })?;
        ensure_positive("tile_size", self.tile_size)?;
        ensure_positive("report_radius", self.report_radius)?;
        ensure_non_negative("ground_y", self.ground_y)?;
        ensure(self.gaps.iter().all(|&(start, end)| start < end), || {
            "course gaps must have start < end".to_string()
        })?;
        ensure(
            self.enemies
                .iter()
                .all(|p| p.min_x <= p.max_x && p.speed >= 0.0),
            || "enemy patrols need min_x <= max_x and speed >= 0".to_string(),
        )
    }

    fn in_gap(&self, x: f64) -> bool {
        self.gaps.iter().any(|&(start, end)| x > start && x < end)
    }

    fn pipe_at(&self, x: f64) -> Option<&Pipe> {
        self.pipes
            .iter()
            .find(|p| x > p.x - HALF_WIDTH && x < p.x + p.width + HALF_WIDTH)
    }

    /// Height the player stands on at `x`, if any.
    fn surface_at(&self, x: f64) -> Option<f64> {
        if let Some(pipe) = self.pipe_at(x) {
            Some(self.ground_y - pipe.height)
        } else if self.in_gap(x) {
            None
        } else {
            Some(self.ground_y)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Menu,
    Loading,
    Playing,
    Over,
}

#[derive(Debug, Clone)]
struct Enemy {
    x: f64,
    direction: f64,
    alive: bool,
}

#[derive(Debug, Clone)]
pub struct CourseSimulation {
    layout: CourseLayout,
    phase: Phase,
    cursor: u32,
    position: Vec2,
    velocity: Vec2,
    on_ground: bool,
    enemies: Vec<Enemy>,
    coins_left: Vec<Vec2>,
    coins: u32,
    score: u64,
    ticks: u64,
    restart: bool,
    closed: bool,
}

impl CourseSimulation {
    pub fn new(layout: CourseLayout) -> Result<Self> {
        layout.validate()?;
        let mut sim = Self {
            layout,
            phase: Phase::Menu,
            cursor: 0,
            position: Vec2::default(),
            velocity: Vec2::default(),
            on_ground: true,
            enemies: Vec::new(),
            coins_left: Vec::new(),
            coins: 0,
            score: 0,
            ticks: 0,
            restart: false,
            closed: false,
        };
        sim.restore_course();
        Ok(sim)
    }

    /// The built-in course.
    pub fn standard() -> Result<Self> {
        Self::new(CourseLayout::default())
    }

    pub fn layout(&self) -> &CourseLayout {
        &self.layout
    }

    fn restore_course(&mut self) {
        self.phase = Phase::Menu;
        self.cursor = 0;
        self.position = Vec2::new(self.layout.spawn_x, self.layout.ground_y);
        self.velocity = Vec2::default();
        self.on_ground = true;
        self.enemies = self
            .layout
            .enemies
            .iter()
            .map(|p| Enemy {
                x: p.min_x,
                direction: 1.0,
                alive: true,
            })
            .collect();
        self.coins_left = self.layout.coins.clone();
        self.coins = 0;
        self.score = 0;
        self.ticks = 0;
        self.restart = false;
    }

    fn level_count(&self) -> u32 {
        u32::try_from(self.layout.levels.len()).unwrap_or(u32::MAX)
    }

    fn step_menu(&mut self, action: Action) -> SimStep {
        let count = self.level_count();
        match action {
            Action::Right => self.cursor = (self.cursor + 1) % count,
            Action::Left => self.cursor = (self.cursor + count - 1) % count,
            Action::Select | Action::Jump => {
                self.phase = Phase::Loading;
                let mut frame = RawFrame::menu(self.cursor).selected();
                frame.level_name = self.layout.levels.get(self.cursor as usize).cloned();
                frame.position = Some(self.position);
                return SimStep::new(frame);
            }
            Action::Idle => {}
        }
        SimStep::new(RawFrame::menu(self.cursor))
    }

    fn step_playing(&mut self, action: Action) -> SimStep {
        self.ticks += 1;
        let start_x = self.position.x;
        let coins_before = self.coins;

        match action {
            Action::Right => self.velocity.x = RUN_SPEED,
            Action::Left => self.velocity.x = -RUN_SPEED,
            Action::Idle => self.velocity.x = 0.0,
            Action::Jump => {
                if self.on_ground {
                    self.velocity.y = JUMP_VELOCITY;
                }
            }
            Action::Select => {}
        }

        self.move_horizontally();
        let prev_y = self.position.y;
        let falling = self.move_vertically();
        self.move_enemies();
        self.resolve_enemy_contact(prev_y, falling);
        self.collect_coins();

        let mut info = SimInfo::default();
        let mut done = false;
        if self.restart {
            info = info.flag("killed");
            done = true;
        } else if self.position.y > self.layout.ground_y + self.layout.report_radius {
            self.restart = true;
            info = info.flag("fell");
            done = true;
        } else if self.position.x >= self.layout.length {
            info = info.flag("course_complete");
            done = true;
        }
        if done {
            self.phase = Phase::Over;
        }

        let mut step = SimStep::new(self.frame());
        step.reward = (self.position.x - start_x) + f64::from(self.coins - coins_before);
        step.done = done;
        step.info = info;
        step
    }

    fn move_horizontally(&mut self) {
        let next_x = (self.position.x + self.velocity.x).max(0.0);
        let blocked = self
            .layout
            .pipe_at(next_x)
            .is_some_and(|pipe| self.position.y > self.layout.ground_y - pipe.height);
        if blocked {
            self.velocity.x = 0.0;
        } else {
            self.position.x = next_x;
        }
    }

    /// Returns whether the player was moving down this frame.
    fn move_vertically(&mut self) -> bool {
        self.velocity.y = (self.velocity.y + GRAVITY).min(MAX_FALL_SPEED);
        let falling = self.velocity.y > 0.0;
        let next_y = self.position.y + self.velocity.y;
        self.on_ground = false;
        if falling
            && let Some(surface) = self.layout.surface_at(self.position.x)
            && self.position.y <= surface
            && next_y >= surface
        {
            self.position.y = surface;
            self.velocity.y = 0.0;
            self.on_ground = true;
        } else {
            self.position.y = next_y;
        }
        falling
    }

    fn move_enemies(&mut self) {
        for (enemy, patrol) in self.enemies.iter_mut().zip(&self.layout.enemies) {
            if !enemy.alive {
                continue;
            }
            enemy.x += enemy.direction * patrol.speed;
            if enemy.x >= patrol.max_x {
                enemy.x = patrol.max_x;
                enemy.direction = -1.0;
            } else if enemy.x <= patrol.min_x {
                enemy.x = patrol.min_x;
                enemy.direction = 1.0;
            }
        }
    }

    fn resolve_enemy_contact(&mut self, prev_y: f64, falling: bool) {
        let ground_y = self.layout.ground_y;
        let position = self.position;
        for enemy in self.enemies.iter_mut().filter(|e| e.alive) {
            let touching = (enemy.x - position.x).abs() < CONTACT_RANGE
                && (ground_y - position.y).abs() < CONTACT_RANGE;
            if !touching {
                continue;
            }
            if falling && prev_y < ground_y - CONTACT_RANGE / 4.0 {
                enemy.alive = false;
                self.score += STOMP_SCORE;
                self.velocity.y = JUMP_VELOCITY / 2.0;
                self.on_ground = false;
            } else {
                self.restart = true;
            }
        }
    }

    fn collect_coins(&mut self) {
        let position = self.position;
        let before = self.coins_left.len();
        self.coins_left.retain(|coin| {
            let dy = position.y - coin.y;
            !((coin.x - position.x).abs() < CONTACT_RANGE && dy > -4.0 && dy < 40.0)
        });
        let collected = u32::try_from(before - self.coins_left.len()).unwrap_or(u32::MAX);
        self.coins += collected;
        self.score += u64::from(collected) * COIN_SCORE;
    }

    fn frame(&self) -> RawFrame {
        let mut frame = RawFrame::at(self.position.x, self.position.y)
            .with_velocity(self.velocity.x, self.velocity.y)
            .with_coins(self.coins);
        frame.score = Some(self.score);
        frame.elapsed_time = Some(self.ticks as f64 * FRAME_TIME);
        frame.level_name = self.layout.levels.get(self.cursor as usize).cloned();
        frame.restart = self.restart;
        frame.nearby_objects = self.nearby_objects();
        frame
    }

    fn nearby_objects(&self) -> Vec<RawObject> {
        let layout = &self.layout;
        let origin = self.position;
        let radius = layout.report_radius;
        let mut objects = Vec::new();
        let mut report = |x: f64, y: f64, kind: &str| {
            let (rel_x, rel_y) = (x - origin.x, y - origin.y);
            if rel_x.abs() <= radius && rel_y.abs() <= radius {
                objects.push(RawObject::new(rel_x, rel_y, kind));
            }
        };

        let tile = layout.tile_size;
        let first = ((origin.x - radius) / tile).floor() as i64;
        let last = ((origin.x + radius) / tile).ceil() as i64;
        for index in first.max(0)..=last {
            let center = index as f64 * tile + tile / 2.0;
            if center < layout.length && !layout.in_gap(center) {
                report(center, layout.ground_y + tile / 2.0, "Tile");
            }
        }
        for pipe in &layout.pipes {
            report(pipe.x, layout.ground_y - pipe.height, "Pipe");
        }
        for enemy in self.enemies.iter().filter(|e| e.alive) {
            report(enemy.x, layout.ground_y, "Goomba");
        }
        for coin in &self.coins_left {
            report(coin.x, coin.y, "Coin");
        }
        report(layout.checkpoint_x, layout.ground_y, "Checkpoint");
        objects
    }
}

impl Simulation for CourseSimulation {
    fn reset(&mut self) -> std::result::Result<RawFrame, SimulationFault> {
        if self.closed {
            return Err(SimulationFault::Closed);
        }
        self.restore_course();
        Ok(RawFrame::menu(self.cursor))
    }

    fn step(&mut self, action: Action) -> std::result::Result<SimStep, SimulationFault> {
        if self.closed {
            return Err(SimulationFault::Closed);
        }
        Ok(match self.phase {
            Phase::Menu => self.step_menu(action),
            Phase::Loading => {
                self.phase = Phase::Playing;
                SimStep::new(self.frame())
            }
            Phase::Playing => self.step_playing(action),
            Phase::Over => {
                let mut step = SimStep::new(self.frame());
                step.done = true;
                step
            }
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        "course"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> CourseLayout {
        CourseLayout {
            gaps: Vec::new(),
            pipes: Vec::new(),
            enemies: Vec::new(),
            coins: Vec::new(),
            ..CourseLayout::default()
        }
    }

    fn playing(layout: CourseLayout) -> CourseSimulation {
        let mut sim = CourseSimulation::new(layout).unwrap();
        sim.reset().unwrap();
        sim.step(Action::Select).unwrap();
        sim.step(Action::Idle).unwrap();
        sim
    }

    fn position(step: &SimStep) -> Vec2 {
        step.frame.position.unwrap()
    }

    #[test]
    fn test_menu_cursor_and_selection() {
        let mut sim = CourseSimulation::standard().unwrap();
        assert_eq!(sim.reset().unwrap().menu_cursor, Some(0));
        assert_eq!(sim.step(Action::Right).unwrap().frame.menu_cursor, Some(1));
        assert_eq!(sim.step(Action::Right).unwrap().frame.menu_cursor, Some(0));
        assert_eq!(sim.step(Action::Left).unwrap().frame.menu_cursor, Some(1));

        let selected = sim.step(Action::Select).unwrap();
        assert!(selected.frame.level_selected);
        assert_eq!(selected.frame.level_name.as_deref(), Some("1-2"));

        let spawned = sim.step(Action::Idle).unwrap();
        assert_eq!(position(&spawned), Vec2::new(80.0, 400.0));
        assert!(spawned.frame.velocity.is_some());
    }

    #[test]
    fn test_walking_reports_ground_tiles() {
        let mut sim = playing(flat());
        let step = sim.step(Action::Right).unwrap();
        assert_eq!(position(&step), Vec2::new(83.0, 400.0));
        let tile_ahead = step
            .frame
            .nearby_objects
            .iter()
            .any(|o| o.kind == "Tile" && o.rel_x > 16.0 && o.rel_x < 96.0 && o.rel_y == 16.0);
        assert!(tile_ahead);
    }

    #[test]
    fn test_jump_rises_and_lands() {
        let mut sim = playing(flat());
        let mut highest = 400.0_f64;
        let mut last = sim.step(Action::Jump).unwrap();
        for _ in 0..30 {
            highest = highest.min(position(&last).y);
            last = sim.step(Action::Idle).unwrap();
        }
        assert!(highest < 340.0);
        assert_eq!(position(&last).y, 400.0);
    }

    #[test]
    fn test_pipe_blocks_walking() {
        let layout = CourseLayout {
            pipes: vec![Pipe {
                x: 120.0,
                width: 32.0,
                height: 32.0,
            }],
            ..flat()
        };
        let mut sim = playing(layout);
        let mut last = sim.step(Action::Right).unwrap();
        for _ in 0..40 {
            last = sim.step(Action::Right).unwrap();
        }
        let x = position(&last).x;
        assert!(x <= 120.0 - HALF_WIDTH && x > 100.0, "x = {x}");
        assert!(last.frame.nearby_objects.iter().any(|o| o.kind == "Pipe"));
    }

    #[test]
    fn test_gap_makes_player_fall() {
        let layout = CourseLayout {
            gaps: vec![(100.0, 200.0)],
            ..flat()
        };
        let mut sim = playing(layout);
        let mut deepest = 0.0_f64;
        for _ in 0..30 {
            let step = sim.step(Action::Right).unwrap();
            deepest = deepest.max(position(&step).y);
        }
        assert!(deepest > 450.0);
    }

    #[test]
    fn test_walking_into_enemy_restarts() {
        let layout = CourseLayout {
            enemies: vec![Patrol {
                min_x: 110.0,
                max_x: 110.0,
                speed: 0.0,
            }],
            ..flat()
        };
        let mut sim = playing(layout);
        let mut last = sim.step(Action::Right).unwrap();
        while !last.done {
            last = sim.step(Action::Right).unwrap();
        }
        assert!(last.frame.restart);
        assert!(last.info.has("killed"));
    }

    #[test]
    fn test_coin_pickup() {
        let layout = CourseLayout {
            coins: vec![Vec2::new(92.0, 390.0)],
            ..flat()
        };
        let mut sim = playing(layout);
        let step = sim.step(Action::Right).unwrap();
        assert_eq!(step.frame.coins, Some(1));
        assert_eq!(step.frame.score, Some(COIN_SCORE));
    }

    #[test]
    fn test_end_of_course_is_done() {
        let layout = CourseLayout {
            length: 90.0,
            ..flat()
        };
        let mut sim = playing(layout);
        let mut last = sim.step(Action::Right).unwrap();
        for _ in 0..5 {
            if last.done {
                break;
            }
            last = sim.step(Action::Right).unwrap();
        }
        assert!(last.done);
        assert!(!last.frame.restart);
    }

    #[test]
    fn test_same_actions_same_frames() {
        let actions = [Action::Right, Action::Jump, Action::Right, Action::Idle];
        let run = || {
            let mut sim = playing(CourseLayout::default());
            (0..40)
                .map(|i| sim.step(actions[i % actions.len()]).unwrap().frame)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_closed_simulation_fails() {
        let mut sim = CourseSimulation::standard().unwrap();
        sim.close();
        assert_eq!(sim.reset(), Err(SimulationFault::Closed));
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let layout = CourseLayout {
            levels: Vec::new(),
            ..CourseLayout::default()
        };
        assert!(CourseSimulation::new(layout).is_err());
    }
}
