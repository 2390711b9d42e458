//! Person directory demo CLI.
//!
//! Seeds a directory of people, launches the bots and lets simulated
//! visitors open person editors so the bots have someone to edit for.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bot_kernel::BotConfig;
use person_demo::generator::GeneratorConfig;
use person_demo::{SimulationConfig, SimulationRunner};

#[derive(Parser)]
#[command(name = "person-demo")]
#[command(version)]
#[command(about = "Collaborative editing demo with simulated collaborators")]
struct Cli {
    /// Bot configuration (JSON); defaults apply to missing fields
    #[arg(long, env = "BOT_CONFIG")]
    config: Option<PathBuf>,

    /// Number of people to generate
    #[arg(long, default_value = "100")]
    entities: usize,

    /// Number of simulated real visitors
    #[arg(long, default_value = "3")]
    visitors: usize,

    /// How long to run (seconds)
    #[arg(long, default_value = "30")]
    duration_secs: u64,

    /// Milliseconds between two visitor moves
    #[arg(long, default_value = "3000")]
    visitor_interval_ms: u64,

    /// Random seed for data, bots and visitors
    #[arg(long)]
    seed: Option<u64>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_bot_config(path: Option<&PathBuf>) -> Result<BotConfig> {
    let Some(path) = path else {
        return Ok(BotConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading bot config {}", path.display()))?;
    BotConfig::from_json(&json).with_context(|| format!("parsing bot config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut bots = load_bot_config(cli.config.as_ref())?;
    if cli.seed.is_some() {
        bots.seed = cli.seed;
    }

    let config = SimulationConfig {
        bots,
        people: GeneratorConfig {
            count: cli.entities,
            seed: cli.seed.or(GeneratorConfig::default().seed),
        },
        visitors: cli.visitors,
        duration: Duration::from_secs(cli.duration_secs),
        visitor_interval: Duration::from_millis(cli.visitor_interval_ms),
        seed: cli.seed,
    };

    info!(people = cli.entities, visitors = cli.visitors, "Launching demo");
    let summary = SimulationRunner::new(config).run().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n=== Simulation Summary ===");
    println!("People: {}", summary.people);
    println!("Visitors: {}", summary.visitors);
    println!("Duration: {:.1}s", summary.duration_ms as f64 / 1000.0);
    println!("\nBots:");
    println!("  Edit actors created: {}", summary.edit_actors_created);
    println!("  Edit actors active at end: {}", summary.edit_actors_active_at_end);
    println!("\nSaves:");
    println!("  Repository updates: {}", summary.repository_updates);
    println!("  Grid refreshes: {}", summary.refresh_signals);
    println!("  People refreshed: {}", summary.refreshed_people);
    println!("  Save toasts seen: {}", summary.save_toasts_seen);

    Ok(())
}
