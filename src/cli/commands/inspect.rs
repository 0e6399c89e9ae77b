//! Inspect command - Summarize a persisted agent

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    app::App,
    cli::{
        config::{AgentType, CommonArgs},
        output::{format_kv, format_number, print_section},
    },
    dqn::NetworkState,
    persistence::{AgentState, SavedAgent},
    q_learning::TabularState,
};

/// Death zones listed before the rest are elided
const MAX_ZONES: usize = 20;

#[derive(Parser, Debug)]
#[command(about = "Show what a saved agent has learned")]
pub struct InspectArgs {
    /// Type of agent to inspect
    #[arg(value_enum)]
    pub agent: AgentType,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Execute the inspect command
pub fn execute(args: InspectArgs) -> Result<()> {
    let config = args.common.agent_config(args.agent)?;
    let path = config.state_path();
    let saved = App::new()
        .load_snapshot(&path, config.kind)
        .with_context(|| format!("failed to load {}", path.display()))?;

    print_section(&format!("Agent state: {}", path.display()));
    for line in render(&saved) {
        println!("{line}");
    }
    Ok(())
}

fn render(saved: &SavedAgent) -> Vec<String> {
    let mut lines = vec![
        kv("Kind", saved.kind().to_string()),
        kv("Format version", saved.version.to_string()),
        kv("Episodes", format_number(saved.metadata.episodes)),
        kv(
            "Saved at",
            saved
                .metadata
                .saved_at
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        ),
    ];
    match &saved.state {
        AgentState::Tabular(state) => render_tabular(state, &mut lines),
        AgentState::Network(state) => render_network(state, &mut lines),
    }
    lines
}

fn render_tabular(state: &TabularState, lines: &mut Vec<String>) {
    lines.push(kv("Epsilon", format!("{:.4}", state.epsilon)));
    lines.push(kv("Table entries", format_number(state.table.len() as u64)));
    lines.push(kv("Death zones", format_number(state.memory.len() as u64)));
    lines.push(kv("Total deaths", format_number(state.memory.total_deaths())));
    if !state.reward_history.is_empty() {
        let mean =
            state.reward_history.iter().sum::<f64>() / state.reward_history.len() as f64;
        lines.push(kv("Recent reward", format!("{mean:.2}")));
    }

    let mut zones = state.memory.zones();
    if zones.is_empty() {
        return;
    }
    zones.sort_by(|a, b| b.1.occurrences.cmp(&a.1.occurrences).then(a.0.cmp(&b.0)));

    lines.push(String::new());
    lines.push(format!("{:>12}  {:>6}  strategy", "zone", "deaths"));
    for (key, zone) in zones.iter().take(MAX_ZONES) {
        let strategy: Vec<&str> = zone.strategy().iter().map(|a| a.as_str()).collect();
        lines.push(format!(
            "{:>12}  {:>6}  {}",
            format!("({}, {})", key.x, key.y),
            zone.occurrences,
            strategy.join(" > ")
        ));
    }
    if zones.len() > MAX_ZONES {
        lines.push(format!("  ... {} more", zones.len() - MAX_ZONES));
    }
}

fn render_network(state: &NetworkState, lines: &mut Vec<String>) {
    lines.push(kv("Epsilon", format!("{:.4}", state.epsilon)));
    lines.push(kv(
        "Network",
        format!("{} -> {} -> actions", state.online.input_dim, state.online.hidden_dim),
    ));
    lines.push(kv("Transitions", format_number(state.transitions)));
    lines.push(kv("Learn steps", format_number(state.learn_steps)));
}

fn kv(key: &str, value: String) -> String {
    format_kv(key, &value)
}
