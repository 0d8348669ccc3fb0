//! Sensor load generator - one fleet member
//!
//! Emits synthetic sensor readings to an ingestion endpoint at a runtime
//! adjustable rate, runs bounded-concurrency bursts on demand, and exposes
//! both through a small control HTTP API.
//!
//! Module structure:
//! - `domain/` - Wire and value types (Reading, Payload, API bodies)
//! - `io/` - External interfaces (reading sinks, control API)
//! - `services/` - Business logic (Emitter, BurstDispatcher, FleetController)
//! - `infra/` - Infrastructure (Config, Counters, Errors)

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sensor_loadgen::infra::{Config, SinkMode};
use sensor_loadgen::io::{sink_from_config, start_control_server, ControlState};
use sensor_loadgen::services::{BurstDispatcher, BurstLimits, Emitter, EmitterConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkModeArg {
    Http,
    Mock,
}

impl From<SinkModeArg> for SinkMode {
    fn from(arg: SinkModeArg) -> Self {
        match arg {
            SinkModeArg::Http => SinkMode::Http,
            SinkModeArg::Mock => SinkMode::Mock,
        }
    }
}

/// Sensor load generator node
#[derive(Parser, Debug)]
#[command(name = "loadgen", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Control API port, overrides [api].port
    #[arg(short, long)]
    port: Option<u16>,

    /// Sink mode, overrides [sink].mode
    #[arg(long, value_enum)]
    sink_mode: Option<SinkModeArg>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "loadgen starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(Config::resolve_config_path(args.config.as_deref()));
    if let Some(port) = args.port {
        config = config.with_api_port(port);
    }
    if let Some(mode) = args.sink_mode {
        config = config.with_sink_mode(mode.into());
    }

    let sink_mode_str = match config.sink_mode() {
        SinkMode::Http => "http",
        SinkMode::Mock => "mock",
    };
    info!(
        config_file = %config.config_file(),
        node_id = %config.node_id(),
        api_port = %config.api_port(),
        sink_mode = %sink_mode_str,
        sink_url = %config.sink_url(),
        period_ms = %config.period().as_millis(),
        autostart = %config.autostart(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sink = sink_from_config(&config).context("failed to build reading sink")?;
    let emitter = Emitter::new(
        sink.clone(),
        EmitterConfig {
            payload: config.payload().clone(),
            period: config.period(),
            call_timeout: config.sink_timeout(),
        },
    );
    let burst = BurstDispatcher::new(sink);

    if config.autostart() {
        emitter.start();
    }

    // Start control API
    let addr: SocketAddr = format!("{}:{}", config.api_bind_address(), config.api_port())
        .parse()
        .with_context(|| format!("invalid api bind address {}", config.api_bind_address()))?;
    let state = ControlState {
        emitter: emitter.clone(),
        burst: burst.clone(),
        burst_limits: BurstLimits::from_config(&config),
    };
    let api_shutdown = shutdown_rx.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = start_control_server(addr, state, api_shutdown).await {
            tracing::error!(error = %e, "control API error");
        }
    });

    // Periodic stats reporter (if interval > 0)
    let interval_secs = config.metrics_interval_secs();
    if interval_secs > 0 {
        let reporter = emitter.clone();
        let reporter_burst = burst.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let stats = reporter.detailed_stats();
                        let bursts = reporter_burst.totals();
                        info!(
                            running = %stats.is_running,
                            sent = %stats.total_sent,
                            failed = %stats.total_failed,
                            rps = %format!("{:.2}", stats.overall_rps),
                            period_ms = %stats.configured_freq_ms,
                            burst_sent = %bursts.sent,
                            burst_failed = %bursts.failed,
                            "stats_report"
                        );
                    }
                    _ = reporter_shutdown.changed() => break,
                }
            }
        });
    }

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    emitter.shutdown().await;
    if let Err(e) = api_task.await {
        tracing::warn!(error = %e, "control API task join failed");
    }

    let stats = emitter.stats();
    let bursts = burst.totals();
    info!(
        sent = %stats.sent,
        failed = %stats.failed,
        burst_sent = %bursts.sent,
        burst_failed = %bursts.failed,
        "loadgen shutdown complete"
    );
    Ok(())
}
