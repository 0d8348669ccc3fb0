//! Fleet controller - scatter/gather over a fixed set of loadgen nodes
//!
//! Commands are sent to every target concurrently, one spawned task per
//! target, and the controller joins them all. A failing target never aborts
//! its siblings. Stats responses are folded into min/max/avg/total over the
//! targets that answered; the rest are logged and left out.

use crate::domain::{BurstRequest, ConfigUpdate, Envelope, FrequencyRequest};
use crate::infra::Config;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, warn};

/// Action broadcast to every fleet member
#[derive(Debug, Clone)]
pub enum FleetCommand {
    Start,
    Stop,
    /// Emission period as a duration string
    Frequency(String),
    Configure(ConfigUpdate),
    Burst(BurstRequest),
}

impl FleetCommand {
    fn path(&self) -> &'static str {
        match self {
            FleetCommand::Start => "/start",
            FleetCommand::Stop => "/stop",
            FleetCommand::Frequency(_) => "/frequency",
            FleetCommand::Configure(_) => "/config",
            FleetCommand::Burst(_) => "/spam",
        }
    }

    fn body(&self) -> Option<serde_json::Value> {
        match self {
            FleetCommand::Start | FleetCommand::Stop => None,
            FleetCommand::Frequency(timeout) => {
                serde_json::to_value(FrequencyRequest { timeout: timeout.clone() }).ok()
            }
            FleetCommand::Configure(update) => serde_json::to_value(update).ok(),
            FleetCommand::Burst(req) => serde_json::to_value(req).ok(),
        }
    }
}

/// Result of one command against one target
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointOutcome {
    Success(u16),
    Http(u16),
    Transport(String),
}

impl EndpointOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EndpointOutcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointReport {
    pub target: String,
    pub outcome: EndpointOutcome,
}

/// Stats document as seen by the fleet controller.
///
/// Every numeric field is decoded as `f64` so nodes that encode counters as
/// floats aggregate just as well as ones that use integers. camelCase keys
/// are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSample {
    #[serde(rename = "Configured_FreqMs", alias = "configuredFreqMs")]
    pub configured_freq_ms: f64,
    #[serde(rename = "Is_Running", alias = "isRunning")]
    pub is_running: bool,
    #[serde(rename = "Overall_RPS", alias = "overallRPS")]
    pub overall_rps: f64,
    #[serde(rename = "Total_Failed", alias = "totalFailed")]
    pub total_failed: f64,
    #[serde(rename = "Total_Requests", alias = "totalRequests")]
    pub total_requests: f64,
    #[serde(rename = "Total_Sent", alias = "totalSent")]
    pub total_sent: f64,
    #[serde(rename = "Uptime_Seconds", alias = "uptimeSeconds")]
    pub uptime_seconds: f64,
}

/// Stats gathered from one fan-out
#[derive(Debug, Clone, Default)]
pub struct StatsCollection {
    pub queried: usize,
    pub samples: Vec<StatsSample>,
    pub failures: Vec<EndpointReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NumericAggregate {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub total: f64,
}

impl NumericAggregate {
    /// Fold values into min/max/sum, seeding min and max from the first
    /// sample. The average is taken once the fold completes. Returns `None`
    /// for an empty input.
    pub fn fold<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let mut agg = Self { min: first, max: first, avg: 0.0, total: first };
        let mut count = 1usize;

        for v in iter {
            if v < agg.min {
                agg.min = v;
            }
            if v > agg.max {
                agg.max = v;
            }
            agg.total += v;
            count += 1;
        }

        agg.avg = agg.total / count as f64;
        Some(agg)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningAggregate {
    pub running: u64,
    pub total: u64,
}

/// Aggregate report over every responding node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedStats {
    pub responded: usize,
    pub configured_freq_ms: NumericAggregate,
    pub is_running: RunningAggregate,
    pub overall_rps: NumericAggregate,
    pub total_failed: NumericAggregate,
    pub total_requests: NumericAggregate,
    pub total_sent: NumericAggregate,
    pub uptime_seconds: NumericAggregate,
}

fn fold_field(samples: &[StatsSample], f: impl Fn(&StatsSample) -> f64) -> Option<NumericAggregate> {
    NumericAggregate::fold(samples.iter().map(f))
}

/// Aggregate samples. Returns `None` when no node responded.
pub fn aggregate(samples: &[StatsSample]) -> Option<AggregatedStats> {
    if samples.is_empty() {
        return None;
    }

    Some(AggregatedStats {
        responded: samples.len(),
        configured_freq_ms: fold_field(samples, |s| s.configured_freq_ms)?,
        is_running: RunningAggregate {
            running: samples.iter().filter(|s| s.is_running).count() as u64,
            total: samples.len() as u64,
        },
        overall_rps: fold_field(samples, |s| s.overall_rps)?,
        total_failed: fold_field(samples, |s| s.total_failed)?,
        total_requests: fold_field(samples, |s| s.total_requests)?,
        total_sent: fold_field(samples, |s| s.total_sent)?,
        uptime_seconds: fold_field(samples, |s| s.uptime_seconds)?,
    })
}

/// Broadcasts commands and stats queries to a fixed list of targets
pub struct FleetController {
    client: reqwest::Client,
    targets: Vec<String>,
    api_prefix: String,
}

impl FleetController {
    pub fn new(targets: Vec<String>, api_prefix: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            targets: targets.into_iter().map(|t| t.trim_end_matches('/').to_string()).collect(),
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.fleet_targets().to_vec(), config.fleet_api_prefix(), config.fleet_timeout())
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    fn url(&self, target: &str, path: &str) -> String {
        format!("{target}{}{path}", self.api_prefix)
    }

    /// Send `command` to every target and wait for all of them. Reports are
    /// returned in target order.
    pub async fn broadcast(&self, command: &FleetCommand) -> Vec<EndpointReport> {
        let body = command.body();
        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let client = self.client.clone();
                let url = self.url(target, command.path());
                let body = body.clone();
                tokio::spawn(async move { send_command(client, url, body).await })
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (target, handle) in self.targets.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => EndpointOutcome::Transport(format!("task failed: {e}")),
            };
            debug!(target = %target, outcome = ?outcome, "fleet_command_outcome");
            reports.push(EndpointReport { target: target.clone(), outcome });
        }
        reports
    }

    /// Fetch `/stats` from every target
    pub async fn collect_stats(&self) -> StatsCollection {
        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let client = self.client.clone();
                let url = self.url(target, "/stats");
                tokio::spawn(async move { fetch_stats(client, url).await })
            })
            .collect();

        let mut collection = StatsCollection { queried: self.targets.len(), ..Default::default() };
        for (target, handle) in self.targets.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EndpointOutcome::Transport(format!("task failed: {e}"))),
            };
            match result {
                Ok(sample) => collection.samples.push(sample),
                Err(outcome) => {
                    warn!(target = %target, outcome = ?outcome, "fleet_stats_dropped");
                    collection.failures.push(EndpointReport { target: target.clone(), outcome });
                }
            }
        }
        collection
    }
}

async fn send_command(
    client: reqwest::Client,
    url: String,
    body: Option<serde_json::Value>,
) -> EndpointOutcome {
    let mut request = client.post(&url).header("Accept", "application/json");
    if let Some(body) = body {
        request = request.json(&body);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            EndpointOutcome::Success(response.status().as_u16())
        }
        Ok(response) => EndpointOutcome::Http(response.status().as_u16()),
        Err(e) => EndpointOutcome::Transport(e.to_string()),
    }
}

async fn fetch_stats(client: reqwest::Client, url: String) -> Result<StatsSample, EndpointOutcome> {
    let response = client
        .get(&url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| EndpointOutcome::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EndpointOutcome::Http(status.as_u16()));
    }

    let envelope: Envelope<StatsSample> = response
        .json()
        .await
        .map_err(|e| EndpointOutcome::Transport(format!("decode failed: {e}")))?;
    envelope.data.ok_or_else(|| EndpointOutcome::Transport("response carried no data".to_string()))
}

/// One line per target plus a completion marker
pub fn render_command_report(reports: &[EndpointReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = match &report.outcome {
            EndpointOutcome::Success(_) => writeln!(out, "✓ {}: Success", report.target),
            EndpointOutcome::Http(code) => writeln!(out, "✗ {}: HTTP {code}", report.target),
            EndpointOutcome::Transport(e) => writeln!(out, "✗ {}: {e}", report.target),
        };
    }
    out.push_str("All requests completed.\n");
    out
}

fn write_numeric(out: &mut String, title: &str, agg: &NumericAggregate) {
    let _ = writeln!(out, "{title}:");
    let _ = writeln!(
        out,
        "  Min: {:.2}, Max: {:.2}, Avg: {:.2}, Total: {:.2}\n",
        agg.min, agg.max, agg.avg, agg.total
    );
}

/// Human-readable aggregate report
pub fn render_stats_report(collection: &StatsCollection) -> String {
    let Some(agg) = aggregate(&collection.samples) else {
        return "No successful responses received\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n=== Aggregated Stats (from {} of {} endpoints) ===\n",
        agg.responded, collection.queried
    );

    let _ = writeln!(out, "Configured Frequency (ms):");
    let _ = writeln!(
        out,
        "  Min: {:.0}, Max: {:.0}, Avg: {:.2}\n",
        agg.configured_freq_ms.min, agg.configured_freq_ms.max, agg.configured_freq_ms.avg
    );

    let _ = writeln!(out, "Running Status:");
    let _ = writeln!(out, "  Running: {}/{} endpoints\n", agg.is_running.running, agg.is_running.total);

    write_numeric(&mut out, "Overall RPS", &agg.overall_rps);
    write_numeric(&mut out, "Total Failed", &agg.total_failed);
    write_numeric(&mut out, "Total Requests", &agg.total_requests);
    write_numeric(&mut out, "Total Sent", &agg.total_sent);
    write_numeric(&mut out, "Uptime (seconds)", &agg.uptime_seconds);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total_sent: f64, is_running: bool) -> StatsSample {
        StatsSample {
            configured_freq_ms: 1000.0,
            is_running,
            overall_rps: total_sent / 10.0,
            total_failed: 0.0,
            total_requests: total_sent,
            total_sent,
            uptime_seconds: 10.0,
        }
    }

    #[test]
    fn test_aggregate_three_endpoints() {
        let samples = vec![sample(10.0, true), sample(20.0, false), sample(30.0, true)];
        let agg = aggregate(&samples).unwrap();

        assert_eq!(agg.responded, 3);
        assert_eq!(agg.total_sent, NumericAggregate { min: 10.0, max: 30.0, avg: 20.0, total: 60.0 });
        assert_eq!(agg.is_running, RunningAggregate { running: 2, total: 3 });
        assert_eq!(agg.configured_freq_ms.avg, 1000.0);
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(aggregate(&[]).is_none());
        assert!(NumericAggregate::fold(std::iter::empty()).is_none());
    }

    #[test]
    fn test_fold_seeds_from_first_sample() {
        // All negative: a zero seed would corrupt max
        let agg = NumericAggregate::fold([-5.0, -2.0, -9.0]).unwrap();
        assert_eq!(agg.max, -2.0);
        assert_eq!(agg.min, -9.0);

        // All large: a zero seed would corrupt min
        let agg = NumericAggregate::fold([500.0, 700.0]).unwrap();
        assert_eq!(agg.min, 500.0);
    }

    #[test]
    fn test_fold_range_and_total_properties() {
        let inputs: [&[f64]; 4] =
            [&[1.0], &[3.5, 3.5], &[0.1, 0.2, 0.3, 0.4], &[1e9, 2.5, 17.0, 42.0, 0.0]];
        for values in inputs {
            let agg = NumericAggregate::fold(values.iter().copied()).unwrap();
            assert!(agg.min <= agg.avg && agg.avg <= agg.max, "{values:?}");
            let k = values.len() as f64;
            assert!((agg.total - k * agg.avg).abs() <= 1e-9 * agg.total.abs().max(1.0));
        }
    }

    #[test]
    fn test_sample_decodes_integer_and_float_encodings() {
        let json = r#"{"data":{"Configured_FreqMs":500,"Is_Running":true,"Overall_RPS":1.5,
            "Total_Failed":0,"Total_Requests":12.0,"Total_Sent":12,"Uptime_Seconds":8.0},
            "error":false,"message":"ok"}"#;
        let envelope: Envelope<StatsSample> = serde_json::from_str(json).unwrap();
        let sample = envelope.data.unwrap();
        assert_eq!(sample.configured_freq_ms, 500.0);
        assert_eq!(sample.total_sent, 12.0);
    }

    #[test]
    fn test_sample_accepts_camel_case_keys() {
        let json = r#"{"configuredFreqMs":250,"isRunning":false,"overallRPS":0,
            "totalFailed":1,"totalRequests":5,"totalSent":4,"uptimeSeconds":0}"#;
        let sample: StatsSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.configured_freq_ms, 250.0);
        assert_eq!(sample.total_failed, 1.0);
        assert!(!sample.is_running);
    }

    #[test]
    fn test_command_paths_and_bodies() {
        assert_eq!(FleetCommand::Start.path(), "/start");
        assert!(FleetCommand::Stop.body().is_none());

        let body = FleetCommand::Frequency("500ms".to_string()).body().unwrap();
        assert_eq!(body, serde_json::json!({"timeout": "500ms"}));

        let update = ConfigUpdate { id2: Some(3), ..Default::default() };
        assert_eq!(FleetCommand::Configure(update).body().unwrap(), serde_json::json!({"id2": 3}));
    }

    #[test]
    fn test_render_command_report() {
        let reports = vec![
            EndpointReport { target: "http://a:9000".to_string(), outcome: EndpointOutcome::Success(200) },
            EndpointReport { target: "http://b:9000".to_string(), outcome: EndpointOutcome::Http(400) },
            EndpointReport {
                target: "http://c:9000".to_string(),
                outcome: EndpointOutcome::Transport("connection refused".to_string()),
            },
        ];
        let text = render_command_report(&reports);
        assert!(text.contains("✓ http://a:9000: Success"));
        assert!(text.contains("✗ http://b:9000: HTTP 400"));
        assert!(text.contains("✗ http://c:9000: connection refused"));
        assert!(text.ends_with("All requests completed.\n"));
    }

    #[test]
    fn test_render_stats_report() {
        let empty = StatsCollection { queried: 3, ..Default::default() };
        assert_eq!(render_stats_report(&empty), "No successful responses received\n");

        let collection =
            StatsCollection { queried: 3, samples: vec![sample(10.0, true), sample(30.0, true)], failures: vec![] };
        let text = render_stats_report(&collection);
        assert!(text.contains("from 2 of 3 endpoints"));
        assert!(text.contains("Running: 2/2 endpoints"));
        assert!(text.contains("Min: 10.00, Max: 30.00, Avg: 20.00, Total: 40.00"));
    }

    #[tokio::test]
    async fn test_unreachable_targets_are_isolated_failures() {
        let fleet = FleetController::new(
            vec!["http://127.0.0.1:9".to_string(), "http://127.0.0.1:9/".to_string()],
            "/api/v1",
            Duration::from_millis(500),
        )
        .unwrap();

        let reports = fleet.broadcast(&FleetCommand::Start).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.outcome, EndpointOutcome::Transport(_))));
        assert_eq!(fleet.targets()[1], "http://127.0.0.1:9");

        let stats = fleet.collect_stats().await;
        assert_eq!(stats.queried, 2);
        assert!(stats.samples.is_empty());
        assert_eq!(stats.failures.len(), 2);
    }
}
