//! Derived statistics
//!
//! Pure functions only: nothing here touches emitter state, so every function
//! is safe to call from any task at any time.

use crate::infra::CounterSnapshot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Report served at `GET /stats`
///
/// Field names keep the wire keys used by existing fleet tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStats {
    #[serde(rename = "Total_Sent")]
    pub total_sent: u64,
    #[serde(rename = "Total_Failed")]
    pub total_failed: u64,
    #[serde(rename = "Total_Requests")]
    pub total_requests: u64,
    #[serde(rename = "Uptime_Seconds")]
    pub uptime_seconds: f64,
    #[serde(rename = "Overall_RPS")]
    pub overall_rps: f64,
    #[serde(rename = "Is_Running")]
    pub is_running: bool,
    #[serde(rename = "Configured_FreqMs")]
    pub configured_freq_ms: u64,
}

impl DetailedStats {
    /// Derive the report from counters and the emitter's run state.
    ///
    /// `uptime` is `Some` only while the emitter is running.
    pub fn derive(counters: CounterSnapshot, uptime: Option<Duration>, period: Duration) -> Self {
        let total_requests = counters.total();
        let uptime_seconds = uptime.map(|u| u.as_secs_f64()).unwrap_or(0.0);
        let overall_rps =
            if uptime_seconds > 0.0 { total_requests as f64 / uptime_seconds } else { 0.0 };

        Self {
            total_sent: counters.sent,
            total_failed: counters.failed,
            total_requests,
            uptime_seconds,
            overall_rps,
            is_running: uptime.is_some(),
            configured_freq_ms: period.as_millis() as u64,
        }
    }
}

/// Nearest-rank percentile over an ascending slice.
///
/// Index is `ceil(q * n) - 1` clamped to `[0, n - 1]`; empty input yields zero.
pub fn percentile(sorted: &[Duration], q: f64) -> Duration {
    let n = sorted.len();
    if n == 0 {
        return Duration::ZERO;
    }
    let rank = (q * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}

/// Latency distribution of one burst (milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Sorts `latencies` in place and summarizes them
    pub fn from_latencies(latencies: &mut [Duration]) -> Self {
        latencies.sort_unstable();
        let ms = |q: f64| percentile(latencies, q).as_nanos() as f64 / 1_000_000.0;
        Self { p50_ms: ms(0.50), p90_ms: ms(0.90), p95_ms: ms(0.95), p99_ms: ms(0.99), max_ms: ms(1.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_percentile_empty_is_zero() {
        for q in [0.0, 0.5, 0.99, 1.0] {
            assert_eq!(percentile(&[], q), Duration::ZERO);
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<Duration> = (1..=10).map(|i| millis(i * 10)).collect();
        assert_eq!(percentile(&values, 0.50), millis(50));
        assert_eq!(percentile(&values, 0.90), millis(90));
        assert_eq!(percentile(&values, 0.95), millis(100));
        assert_eq!(percentile(&values, 0.91), millis(100));
        assert_eq!(percentile(&values, 1.0), millis(100));
        assert_eq!(percentile(&values, 0.0), millis(10));
    }

    #[test]
    fn test_percentile_max_is_last_element() {
        for n in 1..20u64 {
            let values: Vec<Duration> = (0..n).map(millis).collect();
            assert_eq!(percentile(&values, 1.0), *values.last().unwrap());
        }
    }

    #[test]
    fn test_latency_summary_sorts_input() {
        let mut values = vec![millis(30), millis(10), millis(20)];
        let summary = LatencySummary::from_latencies(&mut values);
        assert_eq!(values, vec![millis(10), millis(20), millis(30)]);
        assert_eq!(summary.p50_ms, 20.0);
        assert_eq!(summary.max_ms, 30.0);
    }

    #[test]
    fn test_derive_stopped_has_no_uptime() {
        let stats = DetailedStats::derive(
            CounterSnapshot { sent: 8, failed: 2 },
            None,
            Duration::from_millis(500),
        );
        assert_eq!(stats.total_requests, 10);
        assert_eq!(stats.uptime_seconds, 0.0);
        assert_eq!(stats.overall_rps, 0.0);
        assert!(!stats.is_running);
        assert_eq!(stats.configured_freq_ms, 500);
    }

    #[test]
    fn test_derive_running_throughput() {
        let stats = DetailedStats::derive(
            CounterSnapshot { sent: 15, failed: 5 },
            Some(Duration::from_secs(4)),
            Duration::from_millis(200),
        );
        assert!(stats.is_running);
        assert_eq!(stats.uptime_seconds, 4.0);
        assert_eq!(stats.overall_rps, 5.0);
    }

    #[test]
    fn test_derive_zero_uptime_no_division() {
        let stats =
            DetailedStats::derive(CounterSnapshot { sent: 3, failed: 0 }, Some(Duration::ZERO), millis(1));
        assert!(stats.is_running);
        assert_eq!(stats.overall_rps, 0.0);
    }

    #[test]
    fn test_wire_keys() {
        let stats = DetailedStats::derive(CounterSnapshot::default(), None, millis(1000));
        let json = serde_json::to_value(&stats).unwrap();
        for key in [
            "Total_Sent",
            "Total_Failed",
            "Total_Requests",
            "Uptime_Seconds",
            "Overall_RPS",
            "Is_Running",
            "Configured_FreqMs",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }
}
