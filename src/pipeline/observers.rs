//! Observer pattern for training pipelines
//!
//! Observers allow composable data collection during training without coupling
//! training logic to specific output formats.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};

use crate::{
    Error, Result,
    episode::{EpisodeOutcome, EpisodeSummary},
    game::TerminalKind,
    ports::{
        ActionTelemetry, AgentKind, DecisionSource, Observer, RewardTelemetry, UpdateTelemetry,
    },
};

/// Progress bar observer - Shows training progress
///
/// Shows a bar when the episode budget is known and a spinner otherwise.
pub struct ProgressObserver {
    progress_bar: Option<ProgressBar>,
    checkpoints: usize,
    game_overs: usize,
    best_distance: f64,
}

impl ProgressObserver {
    /// Create a new progress observer
    pub fn new() -> Self {
        Self {
            progress_bar: None,
            checkpoints: 0,
            game_overs: 0,
            best_distance: 0.0,
        }
    }

    fn message(&self) -> String {
        format!(
            "ok:{} dead:{} best:{:.0}",
            self.checkpoints, self.game_overs, self.best_distance
        )
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_style(template: &str) -> Result<ProgressStyle> {
    ProgressStyle::default_bar()
        .template(template)
        .map_err(|e| Error::ProgressBarTemplate {
            message: e.to_string(),
        })
}

impl Observer for ProgressObserver {
    fn on_training_start(&mut self, _agent: AgentKind, budget: Option<usize>) -> Result<()> {
        let pb = match budget {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                let template = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({msg})";
                pb.set_style(progress_style(template)?.progress_chars("=>-"));
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(progress_style(
                    "{spinner} [{elapsed_precise}] {pos} episodes ({msg})",
                )?);
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            }
        };
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
        match summary.outcome {
            EpisodeOutcome::Terminal(TerminalKind::CheckpointReached) => self.checkpoints += 1,
            EpisodeOutcome::Terminal(TerminalKind::GameOver) => self.game_overs += 1,
            _ => {}
        }
        if let Some(position) = summary.last_position {
            self.best_distance = self.best_distance.max(position.x);
        }

        if let Some(pb) = &self.progress_bar {
            pb.inc(1);
            pb.set_message(self.message());
        }
        Ok(())
    }

    fn on_training_end(&mut self) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(self.message());
        }
        Ok(())
    }
}

/// Metrics observer - Tracks training metrics
#[derive(Debug, Default)]
pub struct MetricsObserver {
    episodes: usize,
    checkpoints: usize,
    game_overs: usize,
    truncated: usize,
    rewards: Vec<f64>,
    lengths: Vec<usize>,
    best_distance: f64,
    decisions: HashMap<DecisionSource, usize>,
    updates: usize,
    update_magnitude: f64,
}

/// Summary of training metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub episodes: usize,
    pub checkpoints: usize,
    pub game_overs: usize,
    pub truncated: usize,
    pub success_rate: f64,
    pub mean_reward: f64,
    pub mean_length: f64,
    pub best_distance: f64,
    pub mean_update_magnitude: f64,
}

impl MetricsObserver {
    /// Create a new metrics observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of episodes that reached the checkpoint
    pub fn success_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.checkpoints as f64 / self.episodes as f64
        }
    }

    pub fn mean_reward(&self) -> f64 {
        mean(self.rewards.iter().copied())
    }

    /// Average number of controller steps per episode
    pub fn mean_length(&self) -> f64 {
        mean(self.lengths.iter().map(|&n| n as f64))
    }

    /// Number of actions chosen by the given selection stage
    pub fn decisions(&self, source: DecisionSource) -> usize {
        self.decisions.get(&source).copied().unwrap_or(0)
    }

    /// Get metrics summary
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            episodes: self.episodes,
            checkpoints: self.checkpoints,
            game_overs: self.game_overs,
            truncated: self.truncated,
            success_rate: self.success_rate(),
            mean_reward: self.mean_reward(),
            mean_length: self.mean_length(),
            best_distance: self.best_distance,
            mean_update_magnitude: if self.updates == 0 {
                0.0
            } else {
                self.update_magnitude / self.updates as f64
            },
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

impl Observer for MetricsObserver {
    fn on_action(&mut self, event: &ActionTelemetry) -> Result<()> {
        *self.decisions.entry(event.source).or_insert(0) += 1;
        Ok(())
    }

    fn on_update(&mut self, event: &UpdateTelemetry) -> Result<()> {
        self.updates += 1;
        self.update_magnitude += event.report.magnitude;
        Ok(())
    }

    fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
        self.episodes += 1;
        match summary.outcome {
            EpisodeOutcome::Terminal(TerminalKind::CheckpointReached) => self.checkpoints += 1,
            EpisodeOutcome::Terminal(TerminalKind::GameOver) => self.game_overs += 1,
            EpisodeOutcome::Truncated => self.truncated += 1,
            EpisodeOutcome::Interrupted => {}
        }
        self.rewards.push(summary.cumulative_reward);
        self.lengths.push(summary.steps);
        if let Some(position) = summary.last_position {
            self.best_distance = self.best_distance.max(position.x);
        }
        Ok(())
    }
}

/// One line of the JSONL telemetry stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    TrainingStart {
        agent: AgentKind,
        budget: Option<usize>,
    },
    EpisodeStart {
        episode: usize,
    },
    Action(ActionTelemetry),
    Reward(RewardTelemetry),
    Update(UpdateTelemetry),
    EpisodeEnd(EpisodeSummary),
    TrainingEnd,
}

/// JSONL observer - Exports telemetry to JSON Lines format
pub struct JsonlObserver {
    writer: BufWriter<File>,
    per_step: bool,
}

impl JsonlObserver {
    /// Create a new JSONL observer writing every event
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            per_step: true,
        })
    }

    /// Only write episode and run boundaries, skipping per-step events.
    pub fn episodes_only(mut self) -> Self {
        self.per_step = false;
        self
    }

    fn write(&mut self, event: &TelemetryEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        writeln!(&mut self.writer)?;
        Ok(())
    }
}

impl Observer for JsonlObserver {
    fn on_training_start(&mut self, agent: AgentKind, budget: Option<usize>) -> Result<()> {
        self.write(&TelemetryEvent::TrainingStart { agent, budget })
    }

    fn on_episode_start(&mut self, episode: usize) -> Result<()> {
        self.write(&TelemetryEvent::EpisodeStart { episode })
    }

    fn on_action(&mut self, event: &ActionTelemetry) -> Result<()> {
        if self.per_step {
            self.write(&TelemetryEvent::Action(*event))?;
        }
        Ok(())
    }

    fn on_reward(&mut self, event: &RewardTelemetry) -> Result<()> {
        if self.per_step {
            self.write(&TelemetryEvent::Reward(event.clone()))?;
        }
        Ok(())
    }

    fn on_update(&mut self, event: &UpdateTelemetry) -> Result<()> {
        if self.per_step {
            self.write(&TelemetryEvent::Update(*event))?;
        }
        Ok(())
    }

    fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
        self.write(&TelemetryEvent::EpisodeEnd(summary.clone()))?;
        self.writer.flush()?;
        Ok(())
    }

    fn on_training_end(&mut self) -> Result<()> {
        self.write(&TelemetryEvent::TrainingEnd)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards telemetry to `tracing`: episodes at info, steps at debug.
#[derive(Debug, Default)]
pub struct TracingObserver {
    agent: Option<AgentKind>,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Observer for TracingObserver {
    fn on_training_start(&mut self, agent: AgentKind, budget: Option<usize>) -> Result<()> {
        self.agent = Some(agent);
        info!(%agent, ?budget, "training started");
        Ok(())
    }

    fn on_action(&mut self, event: &ActionTelemetry) -> Result<()> {
        debug!(
            episode = event.episode,
            step = event.step,
            state = %event.game_state,
            action = %event.action,
            source = event.source.as_str(),
            epsilon = event.epsilon,
            "action"
        );
        Ok(())
    }

    fn on_reward(&mut self, event: &RewardTelemetry) -> Result<()> {
        let b = &event.breakdown;
        debug!(
            episode = event.episode,
            step = event.step,
            total = event.total,
            progress = b.progress,
            backward = b.backward,
            coins = b.coins,
            stagnation = b.stagnation,
            terminal = b.terminal,
            stagnation_steps = event.stagnation_steps,
            termination = event.termination.as_deref(),
            "reward"
        );
        Ok(())
    }

    fn on_update(&mut self, event: &UpdateTelemetry) -> Result<()> {
        debug!(
            episode = event.episode,
            step = event.step,
            magnitude = event.report.magnitude,
            learning_rate = event.report.learning_rate,
            neighbors = event.report.neighbors,
            target_synced = event.report.target_synced,
            "update"
        );
        Ok(())
    }

    fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
        info!(
            agent = ?self.agent,
            episode = summary.index,
            outcome = %summary.outcome,
            reward = summary.cumulative_reward,
            steps = summary.steps,
            x = summary.last_position.map(|p| p.x),
            "episode finished"
        );
        Ok(())
    }
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub episode_index: usize,
    pub cumulative_reward: f64,
    /// Distance reached, or elapsed time for checkpoint runs.
    pub terminal_score: f64,
    pub terminal_kind: String,
    pub success: bool,
    /// RFC 3339, UTC
    pub timestamp: String,
}

impl RunLogRecord {
    pub const HEADER: [&'static str; 6] = [
        "episode_index",
        "cumulative_reward",
        "terminal_score",
        "terminal_kind",
        "success",
        "timestamp",
    ];

    pub fn from_summary(summary: &EpisodeSummary) -> Result<Self> {
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
            Error::SerializationContext {
                operation: "format run log timestamp".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            episode_index: summary.index,
            cumulative_reward: summary.cumulative_reward,
            terminal_score: summary.terminal_score(),
            terminal_kind: summary.outcome.as_str().to_string(),
            success: summary.outcome.is_success(),
            timestamp,
        })
    }
}

/// Append-only CSV log with one row per finished episode.
///
/// The header is written only when the file is new or empty, so repeated
/// runs keep appending to the same table.
pub struct RunLogObserver {
    writer: csv::Writer<File>,
}

impl RunLogObserver {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| Error::Io {
                operation: format!("open run log {path:?}"),
                source,
            })?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(RunLogRecord::HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }
}

impl Observer for RunLogObserver {
    fn on_episode_end(&mut self, summary: &EpisodeSummary) -> Result<()> {
        if summary.outcome == EpisodeOutcome::Interrupted {
            return Ok(());
        }
        self.writer.serialize(RunLogRecord::from_summary(summary)?)?;
        self.writer.flush()?;
        Ok(())
    }

    fn on_training_end(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
