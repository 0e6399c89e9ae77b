//! scroller CLI - Train and inspect side-scroller agents
//!
//! This CLI provides a unified interface for:
//! - Training the tabular or network agent on the built-in course
//! - Inspecting what a persisted agent has learned

use std::thread;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scroller::{
    cli::commands::{inspect, train},
    pipeline::StopSignal,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scroller")]
#[command(version, about = "Learning agents for a side-scrolling platformer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent, resuming from its saved state
    Train(Box<train::TrainArgs>),

    /// Summarize a saved agent
    Inspect(inspect::InspectArgs),
}

/// Raise `stop` on the first Ctrl-C.
fn spawn_interrupt_handler(stop: StopSignal) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "cannot listen for Ctrl-C");
                return;
            }
        };
        match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("interrupt received, finishing the current step");
                stop.stop();
            }
            Err(err) => warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => {
            let stop = StopSignal::new();
            spawn_interrupt_handler(stop.clone());
            train::execute(*args, stop)
        }
        Commands::Inspect(args) => inspect::execute(args),
    }
}
