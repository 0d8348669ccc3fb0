//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::domain::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    Http,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    /// Identifier of this fleet member, used in logs
    #[serde(default = "default_node_id")]
    pub id: String,
}

fn default_node_id() -> String {
    "loadgen".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_api_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub mode: SinkMode,
    #[serde(default = "default_sink_url")]
    pub url: String,
    /// Per-call timeout for continuous emission
    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
    /// Artificial latency of the mock sink
    #[serde(default)]
    pub mock_delay_ms: u64,
    /// Mock sink fails every Nth call (0 = never)
    #[serde(default)]
    pub mock_fail_every: u64,
}

fn default_sink_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_sink_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmitterSection {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_value")]
    pub value: f64,
    #[serde(default = "default_sensor_type")]
    pub sensor_type: String,
    #[serde(default = "default_id1")]
    pub id1: String,
    #[serde(default = "default_id2")]
    pub id2: i32,
    /// Start emitting as soon as the node boots
    #[serde(default)]
    pub autostart: bool,
}

fn default_period_ms() -> u64 {
    1000
}

fn default_value() -> f64 {
    10.0
}

fn default_sensor_type() -> String {
    "TEMP".to_string()
}

fn default_id1() -> String {
    "ABCDEFGH".to_string()
}

fn default_id2() -> i32 {
    1
}

impl Default for EmitterSection {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            value: default_value(),
            sensor_type: default_sensor_type(),
            id1: default_id1(),
            id2: default_id2(),
            autostart: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BurstConfig {
    #[serde(default = "default_burst_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Largest `total` a single burst request may ask for
    #[serde(default = "default_burst_max_total")]
    pub max_total: u64,
}

fn default_burst_timeout_ms() -> u64 {
    2000
}

fn default_burst_max_total() -> u64 {
    1_000_000
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self { default_timeout_ms: default_burst_timeout_ms(), max_total: default_burst_max_total() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Base URLs of every fleet member (e.g. "http://10.0.0.4:9000")
    #[serde(default = "default_fleet_targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_fleet_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

fn default_fleet_targets() -> Vec<String> {
    (9000..=9009).map(|port| format!("http://localhost:{port}")).collect()
}

fn default_fleet_timeout_ms() -> u64 {
    10_000
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            targets: default_fleet_targets(),
            timeout_ms: default_fleet_timeout_ms(),
            api_prefix: default_api_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval of the periodic stats log line (0 to disable)
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub emitter: EmitterSection,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    node_id: String,
    api_bind_address: String,
    api_port: u16,
    sink_mode: SinkMode,
    sink_url: String,
    sink_timeout_ms: u64,
    mock_delay_ms: u64,
    mock_fail_every: u64,
    period_ms: u64,
    payload: Payload,
    autostart: bool,
    burst_timeout_ms: u64,
    burst_max_total: u64,
    fleet_targets: Vec<String>,
    fleet_timeout_ms: u64,
    fleet_api_prefix: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api_bind_address: default_bind_address(),
            api_port: default_api_port(),
            sink_mode: SinkMode::Http,
            sink_url: default_sink_url(),
            sink_timeout_ms: default_sink_timeout_ms(),
            mock_delay_ms: 0,
            mock_fail_every: 0,
            period_ms: default_period_ms(),
            payload: Payload::default(),
            autostart: false,
            burst_timeout_ms: default_burst_timeout_ms(),
            burst_max_total: default_burst_max_total(),
            fleet_targets: default_fleet_targets(),
            fleet_timeout_ms: default_fleet_timeout_ms(),
            fleet_api_prefix: default_api_prefix(),
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let emitter = toml_config.emitter;
        if emitter.period_ms == 0 {
            anyhow::bail!("emitter.period_ms must be greater than zero in {}", path.display());
        }

        Ok(Self {
            node_id: toml_config.node.id,
            api_bind_address: toml_config.api.bind_address,
            api_port: toml_config.api.port,
            sink_mode: toml_config.sink.mode,
            sink_url: toml_config.sink.url,
            sink_timeout_ms: toml_config.sink.timeout_ms,
            mock_delay_ms: toml_config.sink.mock_delay_ms,
            mock_fail_every: toml_config.sink.mock_fail_every,
            period_ms: emitter.period_ms,
            payload: Payload {
                value: emitter.value,
                sensor_type: emitter.sensor_type,
                id1: emitter.id1,
                id2: emitter.id2,
            },
            autostart: emitter.autostart,
            burst_timeout_ms: toml_config.burst.default_timeout_ms,
            burst_max_total: toml_config.burst.max_total,
            fleet_targets: toml_config.fleet.targets,
            fleet_timeout_ms: toml_config.fleet.timeout_ms,
            fleet_api_prefix: toml_config.fleet.api_prefix,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn sink_mode(&self) -> SinkMode {
        self.sink_mode
    }

    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }

    pub fn mock_fail_every(&self) -> u64 {
        self.mock_fail_every
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn autostart(&self) -> bool {
        self.autostart
    }

    pub fn burst_timeout(&self) -> Duration {
        Duration::from_millis(self.burst_timeout_ms)
    }

    pub fn burst_max_total(&self) -> usize {
        usize::try_from(self.burst_max_total).unwrap_or(usize::MAX)
    }

    pub fn fleet_targets(&self) -> &[String] {
        &self.fleet_targets
    }

    pub fn fleet_timeout(&self) -> Duration {
        Duration::from_millis(self.fleet_timeout_ms)
    }

    pub fn fleet_api_prefix(&self) -> &str {
        &self.fleet_api_prefix
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the API port (CLI flag)
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    /// Override the sink mode (CLI flag)
    pub fn with_sink_mode(mut self, mode: SinkMode) -> Self {
        self.sink_mode = mode;
        self
    }

    /// Override the fleet target list (CLI flag or FLEET_TARGETS)
    pub fn with_fleet_targets(mut self, targets: Vec<String>) -> Self {
        self.fleet_targets = targets;
        self
    }
}
