//! Train command - Train an agent against the course simulation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    adapters::{CourseLayout, CourseSimulation},
    app::App,
    cli::{
        config::{AgentType, CommonArgs},
        output::{format_number, format_percent, print_section, print_stats_table},
    },
    pipeline::{
        JsonlObserver, ProgressObserver, RunLogObserver, StopSignal, TracingObserver,
        TrainingConfig, TrainingPipeline, TrainingResult,
    },
};

#[derive(Parser, Debug)]
#[command(about = "Train an agent on the built-in course")]
pub struct TrainArgs {
    /// Type of agent to train
    #[arg(value_enum)]
    pub agent: AgentType,

    /// Number of episodes to play (runs until interrupted when omitted)
    #[arg(long, short = 'e')]
    pub episodes: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Delay between steps in milliseconds
    #[arg(long, default_value_t = 0)]
    pub pace_ms: u64,

    /// Truncate episodes after this many steps (0 disables the budget)
    #[arg(long, default_value_t = 5000)]
    pub max_steps: usize,

    /// Save the agent every N finished episodes
    #[arg(long, default_value_t = 1)]
    pub save_every: usize,

    /// CSV run log, appended to across runs
    #[arg(long, default_value = "runs.csv")]
    pub run_log: PathBuf,

    /// Write step and episode events as JSON lines
    #[arg(long)]
    pub telemetry: Option<PathBuf>,

    /// Only write episode-level events to the telemetry file
    #[arg(long, requires = "telemetry")]
    pub telemetry_episodes_only: bool,

    /// Write the training summary as JSON
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl TrainArgs {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            episodes: self.episodes,
            max_steps_per_episode: (self.max_steps > 0).then_some(self.max_steps),
            pace_ms: self.pace_ms,
            seed: self.common.seed,
            save_every: self.save_every,
        }
    }
}

/// Execute the train command
///
/// Raising `stop` ends the run after the current step; the agent is still
/// saved and the simulation closed.
pub fn execute(args: TrainArgs, stop: StopSignal) -> Result<()> {
    let config = args.common.agent_config(args.agent)?;
    let app = App::new();

    let mut agent = app
        .load_or_create(&config)
        .context("failed to create agent")?;

    let layout = CourseLayout {
        checkpoint_x: config.run.controller.checkpoint_x,
        report_radius: config.run.controller.object_radius,
        ..CourseLayout::default()
    };
    let simulation = CourseSimulation::new(layout).context("invalid course layout")?;
    let mut controller = app
        .create_controller(&config.run, Box::new(simulation))
        .context("failed to create episode controller")?;

    let mut pipeline = TrainingPipeline::new(args.training_config())
        .with_persistence(app.repository(), config.state_path())
        .with_stop_signal(stop)
        .with_observer(Box::new(TracingObserver::new()));

    if !args.no_progress {
        pipeline = pipeline.with_observer(Box::new(ProgressObserver::new()));
    }

    let run_log = RunLogObserver::open(&args.run_log)
        .with_context(|| format!("failed to open run log {}", args.run_log.display()))?;
    pipeline = pipeline.with_observer(Box::new(run_log));

    if let Some(path) = &args.telemetry {
        let mut observer = JsonlObserver::new(path)
            .with_context(|| format!("failed to open telemetry file {}", path.display()))?;
        if args.telemetry_episodes_only {
            observer = observer.episodes_only();
        }
        pipeline = pipeline.with_observer(Box::new(observer));
    }

    let result = pipeline
        .run(&mut controller, agent.as_mut())
        .context("training failed")?;

    print_summary(&result, agent.episodes());
    println!("\nAgent state saved to {}", config.state_path().display());

    if let Some(path) = &args.summary {
        result
            .save(path)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
        println!("Summary written to {}", path.display());
    }

    Ok(())
}

fn print_summary(result: &TrainingResult, lifetime_episodes: u64) {
    print_section("Training Summary");
    let mut stats = vec![
        ("Episodes", format_number(result.episodes as u64)),
        ("Lifetime episodes", format_number(lifetime_episodes)),
        ("Steps", format_number(result.total_steps as u64)),
        ("Checkpoints", format_number(result.checkpoints as u64)),
        ("Game overs", format_number(result.game_overs as u64)),
        ("Truncated", format_number(result.truncated as u64)),
        ("Success rate", format_percent(result.success_rate())),
        ("Mean reward", format!("{:.2}", result.mean_reward)),
        ("Best distance", format!("{:.0}", result.best_distance)),
    ];
    if let Some(time) = result.best_time {
        stats.push(("Best time", format!("{time:.2}s")));
    }
    if result.interrupted {
        stats.push(("Stopped", "interrupted".to_string()));
    }
    print_stats_table(&stats);
}
