//! Fleet controller CLI
//!
//! Broadcasts one control command to every loadgen node and prints a line
//! per node, or gathers `/stats` from all of them and prints an aggregate.
//!
//! Usage:
//!   cargo run --bin fleetctl -- start
//!   cargo run --bin fleetctl -- frequency 250ms
//!   cargo run --bin fleetctl -- stats
//!   cargo run --bin fleetctl -- --targets http://a:9000,http://b:9000 stop
//!   cargo run --bin fleetctl -- spam --total 1000 --concurrency 50
//!
//! Endpoint failures are reported but never change the exit status.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensor_loadgen::domain::{BurstRequest, ConfigUpdate, Payload};
use sensor_loadgen::infra::{parse_period, Config};
use sensor_loadgen::services::fleet::{render_command_report, render_stats_report};
use sensor_loadgen::services::{FleetCommand, FleetController};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetctl", version)]
#[command(about = "Broadcast control commands to a fleet of loadgen nodes")]
struct Args {
    /// Path to TOML configuration file holding [fleet] settings
    #[arg(short, long)]
    config: Option<String>,

    /// Comma-separated node base URLs, overrides [fleet].targets
    #[arg(long, env = "FLEET_TARGETS", value_delimiter = ',')]
    targets: Option<Vec<String>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start periodic emission on every node
    Start,
    /// Stop periodic emission on every node
    Stop,
    /// Change the emission period, e.g. "500ms" or "2s"
    Frequency { period: String },
    /// Aggregate stats across the fleet
    Stats,
    /// Update the payload on every node; omitted fields stay unchanged
    Config {
        #[arg(long)]
        value: Option<f64>,
        #[arg(long = "type")]
        sensor_type: Option<String>,
        #[arg(long)]
        id1: Option<String>,
        #[arg(long)]
        id2: Option<i32>,
    },
    /// Run a burst on every node
    Spam {
        #[arg(long)]
        total: i64,
        #[arg(long)]
        concurrency: i64,
        /// Per-call timeout; empty uses the node default
        #[arg(long, default_value = "")]
        timeout: String,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long = "type")]
        sensor_type: Option<String>,
        #[arg(long)]
        id1: Option<String>,
        #[arg(long)]
        id2: Option<i32>,
    },
}

fn to_fleet_command(command: Command) -> anyhow::Result<Option<FleetCommand>> {
    let fleet_command = match command {
        Command::Start => FleetCommand::Start,
        Command::Stop => FleetCommand::Stop,
        Command::Frequency { period } => {
            // Reject locally before any node is contacted
            parse_period(&period).with_context(|| format!("invalid period {period:?}"))?;
            FleetCommand::Frequency(period)
        }
        Command::Stats => return Ok(None),
        Command::Config { value, sensor_type, id1, id2 } => {
            FleetCommand::Configure(ConfigUpdate { value, sensor_type, id1, id2 })
        }
        Command::Spam { total, concurrency, timeout, value, sensor_type, id1, id2 } => {
            let defaults = Payload::default();
            FleetCommand::Burst(BurstRequest {
                total,
                concurrency,
                timeout,
                value: value.unwrap_or(defaults.value),
                sensor_type: sensor_type.unwrap_or(defaults.sensor_type),
                id1: id1.unwrap_or(defaults.id1),
                id2: id2.unwrap_or(defaults.id2),
            })
        }
    };
    Ok(Some(fleet_command))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load_from_path(Config::resolve_config_path(args.config.as_deref()));
    if let Some(targets) = args.targets {
        let targets: Vec<String> =
            targets.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
        config = config.with_fleet_targets(targets);
    }

    let fleet = FleetController::from_config(&config).context("failed to build fleet client")?;
    info!(targets = %fleet.targets().len(), "fleet_targets_loaded");

    match to_fleet_command(args.command)? {
        Some(command) => {
            let reports = fleet.broadcast(&command).await;
            print!("{}", render_command_report(&reports));
        }
        None => {
            let collection = fleet.collect_stats().await;
            print!("{}", render_stats_report(&collection));
        }
    }

    Ok(())
}
