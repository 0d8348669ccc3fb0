//! Bounded-concurrency burst dispatcher
//!
//! Runs exactly `total` sink calls through `concurrency` workers pulling job
//! tokens from one shared queue, then reports outcome counts, wall-clock
//! throughput and nearest-rank latency percentiles.

use crate::domain::{BurstRequest, Payload};
use crate::infra::{parse_duration, Config, CounterSnapshot, Counters, LoadgenError};
use crate::io::sink::{send_bounded, ReadingSink};
use crate::services::stats::LatencySummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

/// Latencies preallocated per burst; larger bursts grow the vector as they go
const LATENCY_PREALLOC: usize = 64 * 1024;

/// Bounds applied to burst requests arriving over the control API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstLimits {
    /// Used when a request leaves its timeout empty or zero
    pub default_timeout: Duration,
    pub max_total: usize,
}

impl Default for BurstLimits {
    fn default() -> Self {
        Self { default_timeout: Duration::from_secs(2), max_total: 1_000_000 }
    }
}

impl BurstLimits {
    pub fn from_config(config: &Config) -> Self {
        Self { default_timeout: config.burst_timeout(), max_total: config.burst_max_total() }
    }
}

/// One validated burst invocation
#[derive(Debug, Clone)]
pub struct BurstJob {
    total: usize,
    concurrency: usize,
    timeout: Duration,
    payload: Payload,
}

impl BurstJob {
    pub fn new(
        total: usize,
        concurrency: usize,
        timeout: Duration,
        payload: Payload,
    ) -> Result<Self, LoadgenError> {
        if concurrency == 0 {
            return Err(LoadgenError::InvalidBurst("concurrency must be at least 1".to_string()));
        }
        if timeout.is_zero() {
            return Err(LoadgenError::InvalidBurst("timeout must be greater than zero".to_string()));
        }
        Ok(Self { total, concurrency, timeout, payload })
    }

    /// Validate a `POST /spam` body. An empty or zero timeout falls back to
    /// the default; a malformed one is rejected, as is a total above
    /// `limits.max_total`.
    pub fn from_request(req: &BurstRequest, limits: &BurstLimits) -> Result<Self, LoadgenError> {
        let total = usize::try_from(req.total)
            .map_err(|_| LoadgenError::InvalidBurst(format!("total must be >= 0, got {}", req.total)))?;
        if total > limits.max_total {
            return Err(LoadgenError::InvalidBurst(format!(
                "total must be <= {}, got {total}",
                limits.max_total
            )));
        }
        let concurrency = usize::try_from(req.concurrency).map_err(|_| {
            LoadgenError::InvalidBurst(format!("concurrency must be >= 1, got {}", req.concurrency))
        })?;

        let timeout = if req.timeout.trim().is_empty() {
            limits.default_timeout
        } else {
            match parse_duration(&req.timeout)? {
                d if d.is_zero() => limits.default_timeout,
                d => d,
            }
        };

        let payload = Payload {
            value: req.value,
            sensor_type: req.sensor_type.clone(),
            id1: req.id1.clone(),
            id2: req.id2,
        };
        Self::new(total, concurrency, timeout, payload)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Outcome of one burst
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurstResult {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub duration_ms: u64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
}

/// Runs bursts against one sink and keeps lifetime totals across them
#[derive(Clone)]
pub struct BurstDispatcher {
    sink: Arc<dyn ReadingSink>,
    totals: Arc<Counters>,
}

impl BurstDispatcher {
    pub fn new(sink: Arc<dyn ReadingSink>) -> Self {
        Self { sink, totals: Arc::new(Counters::new()) }
    }

    /// Sent/failed across every burst run by this dispatcher
    pub fn totals(&self) -> CounterSnapshot {
        self.totals.snapshot()
    }

    /// Run the burst to completion
    pub async fn run(&self, job: BurstJob) -> BurstResult {
        if job.total == 0 {
            return BurstResult::default();
        }

        info!(
            total = %job.total(),
            concurrency = %job.concurrency(),
            timeout_ms = %job.timeout().as_millis(),
            "burst_started"
        );

        let worker_count = job.concurrency.min(job.total);

        // Queue holds at most one pending token per worker; the feeder
        // finishes once every token has been taken
        let (job_tx, job_rx) = mpsc::channel::<usize>(worker_count);
        let total = job.total;
        let feeder = tokio::spawn(async move {
            for token in 0..total {
                if job_tx.send(token).await.is_err() {
                    break;
                }
            }
        });

        let job_rx = Arc::new(Mutex::new(job_rx));
        let latencies =
            Arc::new(parking_lot::Mutex::new(Vec::with_capacity(job.total.min(LATENCY_PREALLOC))));
        let outcomes = Arc::new(Counters::new());
        let payload = Arc::new(job.payload);

        let start = Instant::now();
        let workers: Vec<_> = (0..worker_count)
            .map(|_| {
                let worker = Worker {
                    sink: self.sink.clone(),
                    job_rx: job_rx.clone(),
                    latencies: latencies.clone(),
                    outcomes: outcomes.clone(),
                    totals: self.totals.clone(),
                    payload: payload.clone(),
                    timeout: job.timeout,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "burst_worker_join_failed");
            }
        }
        let elapsed = start.elapsed();
        if let Err(e) = feeder.await {
            warn!(error = %e, "burst_feeder_join_failed");
        }

        let mut latencies = std::mem::take(&mut *latencies.lock());
        let latency = LatencySummary::from_latencies(&mut latencies);
        let outcome = outcomes.snapshot();
        let secs = elapsed.as_secs_f64();
        let requests_per_second = if secs > 0.0 { job.total as f64 / secs } else { 0.0 };

        let result = BurstResult {
            total_requests: job.total as u64,
            successful: outcome.sent,
            failed: outcome.failed,
            duration_ms: elapsed.as_millis() as u64,
            requests_per_second,
            latency,
        };

        info!(
            successful = %result.successful,
            failed = %result.failed,
            duration_ms = %result.duration_ms,
            rps = %format!("{:.2}", result.requests_per_second),
            p99_ms = %format!("{:.2}", result.latency.p99_ms),
            "burst_completed"
        );
        result
    }
}

struct Worker {
    sink: Arc<dyn ReadingSink>,
    job_rx: Arc<Mutex<mpsc::Receiver<usize>>>,
    latencies: Arc<parking_lot::Mutex<Vec<Duration>>>,
    outcomes: Arc<Counters>,
    totals: Arc<Counters>,
    payload: Arc<Payload>,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            // Hold the queue lock only while taking a token
            let token = self.job_rx.lock().await.recv().await;
            if token.is_none() {
                break;
            }

            let reading = self.payload.to_reading();
            let started = Instant::now();
            let success = send_bounded(self.sink.as_ref(), &reading, self.timeout).await.is_ok();
            let latency = started.elapsed();

            self.outcomes.record(success);
            self.totals.record(success);
            self.latencies.lock().push(latency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Ack, Reading};
    use crate::infra::SinkError;
    use crate::io::sink::MockSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that tracks the highest number of concurrent calls
    struct InFlightSink {
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ReadingSink for InFlightSink {
        fn name(&self) -> &'static str {
            "in-flight"
        }

        async fn send(&self, _reading: &Reading) -> Result<Ack, SinkError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Ack { status: "ok".to_string() })
        }
    }

    fn job(total: usize, concurrency: usize, timeout: Duration) -> BurstJob {
        BurstJob::new(total, concurrency, timeout, Payload::default()).unwrap()
    }

    #[tokio::test]
    async fn test_zero_total_returns_zeroed_result() {
        let dispatcher = BurstDispatcher::new(Arc::new(MockSink::new(Duration::ZERO)));
        let result = dispatcher.run(job(0, 4, Duration::from_secs(1))).await;

        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.requests_per_second, 0.0);
        assert_eq!(result.latency, LatencySummary::default());
    }

    #[tokio::test]
    async fn test_outcomes_sum_to_total() {
        for concurrency in [1, 3, 7, 50] {
            let sink = Arc::new(MockSink::new(Duration::ZERO).with_fail_every(4));
            let dispatcher = BurstDispatcher::new(sink.clone());
            let result = dispatcher.run(job(50, concurrency, Duration::from_secs(1))).await;

            assert_eq!(result.successful + result.failed, 50, "concurrency {concurrency}");
            assert_eq!(result.failed, 12);
            assert_eq!(sink.calls(), 50);
            assert_eq!(dispatcher.totals().total(), 50);
        }
    }

    #[tokio::test]
    async fn test_concurrency_exceeding_total() {
        let dispatcher = BurstDispatcher::new(Arc::new(MockSink::new(Duration::ZERO)));
        let result = dispatcher.run(job(3, 100, Duration::from_secs(1))).await;
        assert_eq!(result.successful, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_bounded_by_concurrency() {
        let sink = Arc::new(InFlightSink {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
        });
        let dispatcher = BurstDispatcher::new(sink.clone());
        let result = dispatcher.run(job(40, 4, Duration::from_secs(1))).await;

        assert_eq!(result.successful, 40);
        assert_eq!(sink.peak.load(Ordering::SeqCst), 4);
        // 40 calls, 4 wide, 10ms each
        assert_eq!(result.duration_ms, 100);
        assert!((result.requests_per_second - 400.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_failures() {
        let dispatcher = BurstDispatcher::new(Arc::new(MockSink::new(Duration::from_secs(5))));
        let result = dispatcher.run(job(4, 2, Duration::from_secs(1))).await;

        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 4);
        assert_eq!(result.duration_ms, 2000);
        assert_eq!(result.latency.p50_ms, 1000.0);
        assert_eq!(result.latency.max_ms, 1000.0);
    }

    #[test]
    fn test_from_request_validation() {
        let limits = BurstLimits::default();
        let default = limits.default_timeout;
        let base = BurstRequest { total: 10, concurrency: 2, ..Default::default() };

        let ok = BurstJob::from_request(&base, &limits).unwrap();
        assert_eq!(ok.total(), 10);
        assert_eq!(ok.concurrency(), 2);
        assert_eq!(ok.timeout(), default);

        let custom = BurstRequest { timeout: "250ms".to_string(), ..base.clone() };
        assert_eq!(BurstJob::from_request(&custom, &limits).unwrap().timeout(), Duration::from_millis(250));

        let zero = BurstRequest { timeout: "0s".to_string(), ..base.clone() };
        assert_eq!(BurstJob::from_request(&zero, &limits).unwrap().timeout(), default);

        let negative = BurstRequest { total: -1, ..base.clone() };
        assert!(matches!(BurstJob::from_request(&negative, &limits), Err(LoadgenError::InvalidBurst(_))));

        let no_workers = BurstRequest { concurrency: 0, ..base.clone() };
        assert!(matches!(BurstJob::from_request(&no_workers, &limits), Err(LoadgenError::InvalidBurst(_))));

        let bad_timeout = BurstRequest { timeout: "soon".to_string(), ..base };
        assert!(matches!(
            BurstJob::from_request(&bad_timeout, &limits),
            Err(LoadgenError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_from_request_enforces_max_total() {
        let limits = BurstLimits { max_total: 100, ..Default::default() };

        let at_limit = BurstRequest { total: 100, concurrency: 4, ..Default::default() };
        assert_eq!(BurstJob::from_request(&at_limit, &limits).unwrap().total(), 100);

        for total in [101, i64::MAX] {
            let req = BurstRequest { total, concurrency: 4, ..Default::default() };
            assert!(
                matches!(BurstJob::from_request(&req, &limits), Err(LoadgenError::InvalidBurst(_))),
                "total {total}"
            );
        }
    }

    #[tokio::test]
    async fn test_huge_concurrency_is_capped_by_total() {
        let sink = Arc::new(MockSink::new(Duration::ZERO));
        let dispatcher = BurstDispatcher::new(sink.clone());
        let req = BurstRequest { total: 5, concurrency: i64::MAX, ..Default::default() };
        let job = BurstJob::from_request(&req, &BurstLimits::default()).unwrap();

        let result = dispatcher.run(job).await;
        assert_eq!(result.successful, 5);
        assert_eq!(sink.calls(), 5);
    }
}
