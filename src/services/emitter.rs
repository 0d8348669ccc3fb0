//! Periodic reading emitter
//!
//! One background task sends a reading every `period`. Payload, period and
//! run state live behind a single `RwLock` so that `start`, `stop`,
//! `set_frequency` and stats readers all observe one consistent view.
//! Counters are atomics outside that lock since every tick writes them.
//!
//! The loop waits on three wake sources: the stop signal, the tick deadline,
//! and a rearm notification raised by `set_frequency`. A changed period moves
//! the next deadline to `max(last_tick + new_period, now)` without emitting.
//! Every tick also re-reads the period, so a missed notification is picked up
//! one tick later at worst.

use crate::domain::{ConfigUpdate, Payload};
use crate::infra::{CounterSnapshot, Counters, LoadgenError, SinkError};
use crate::io::sink::{send_bounded, ReadingSink};
use crate::services::stats::DetailedStats;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Period used when a zero period is supplied at construction
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Log failed send (cold path)
#[cold]
fn log_send_failed(e: &SinkError) {
    warn!(error = %e, "reading_send_failed");
}

/// Initial emitter settings
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub payload: Payload,
    pub period: Duration,
    pub call_timeout: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self { payload: Payload::default(), period: DEFAULT_PERIOD, call_timeout: Duration::from_secs(1) }
    }
}

enum RunState {
    Stopped,
    Running { started_at: Instant, stop_tx: watch::Sender<bool>, task: JoinHandle<()> },
}

/// Everything guarded by the emitter lock
struct EmitterShared {
    payload: Payload,
    period: Duration,
    call_timeout: Duration,
    run: RunState,
}

struct EmitterInner {
    sink: Arc<dyn ReadingSink>,
    shared: RwLock<EmitterShared>,
    counters: Counters,
    rearm: Notify,
}

/// Handle to a runtime-reconfigurable emitter. Clones share state.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn ReadingSink>, config: EmitterConfig) -> Self {
        let period = if config.period.is_zero() {
            warn!(default_ms = %DEFAULT_PERIOD.as_millis(), "emitter_zero_period_substituted");
            DEFAULT_PERIOD
        } else {
            config.period
        };

        Self {
            inner: Arc::new(EmitterInner {
                sink,
                shared: RwLock::new(EmitterShared {
                    payload: config.payload,
                    period,
                    call_timeout: config.call_timeout,
                    run: RunState::Stopped,
                }),
                counters: Counters::new(),
                rearm: Notify::new(),
            }),
        }
    }

    /// Start the emission loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut shared = self.inner.shared.write();
        if matches!(shared.run, RunState::Running { .. }) {
            return false;
        }

        let started_at = Instant::now();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(self.inner.clone(), stop_rx, started_at, shared.period));
        shared.run = RunState::Running { started_at, stop_tx, task };

        info!(
            period_ms = %shared.period.as_millis(),
            sink = %self.inner.sink.name(),
            "emitter_started"
        );
        true
    }

    /// Signal the loop to exit and return immediately. Returns `false` if it
    /// was already stopped. The loop exits at its next wake-up; an in-flight
    /// call is allowed to finish.
    pub fn stop(&self) -> bool {
        self.signal_stop().is_some()
    }

    /// Stop and wait for the loop task to exit
    pub async fn shutdown(&self) {
        if let Some(task) = self.signal_stop() {
            if let Err(e) = task.await {
                warn!(error = %e, "emitter_task_join_failed");
            }
        }
    }

    fn signal_stop(&self) -> Option<JoinHandle<()>> {
        let mut shared = self.inner.shared.write();
        match std::mem::replace(&mut shared.run, RunState::Stopped) {
            RunState::Stopped => None,
            RunState::Running { started_at, stop_tx, task } => {
                let _ = stop_tx.send(true);
                info!(uptime_ms = %started_at.elapsed().as_millis(), "emitter_stopped");
                Some(task)
            }
        }
    }

    /// Change the emission period. Takes effect within one tick while running.
    pub fn set_frequency(&self, period: Duration) -> Result<(), LoadgenError> {
        if period.is_zero() {
            return Err(LoadgenError::NonPositivePeriod);
        }

        let previous = {
            let mut shared = self.inner.shared.write();
            std::mem::replace(&mut shared.period, period)
        };
        self.inner.rearm.notify_one();

        info!(
            previous_ms = %previous.as_millis(),
            period_ms = %period.as_millis(),
            "emitter_frequency_set"
        );
        Ok(())
    }

    /// Apply a partial payload update
    pub fn configure(&self, update: &ConfigUpdate) {
        let payload = {
            let mut shared = self.inner.shared.write();
            update.apply_to(&mut shared.payload);
            shared.payload.clone()
        };
        info!(
            value = %payload.value,
            sensor_type = %payload.sensor_type,
            id1 = %payload.id1,
            id2 = %payload.id2,
            "emitter_configured"
        );
    }

    pub fn is_running(&self) -> bool {
        matches!(self.inner.shared.read().run, RunState::Running { .. })
    }

    pub fn period(&self) -> Duration {
        self.inner.shared.read().period
    }

    pub fn payload(&self) -> Payload {
        self.inner.shared.read().payload.clone()
    }

    /// Cumulative sent/failed counters
    pub fn stats(&self) -> CounterSnapshot {
        self.inner.counters.snapshot()
    }

    /// Counters plus uptime, throughput and configured period
    pub fn detailed_stats(&self) -> DetailedStats {
        let counters = self.inner.counters.snapshot();
        let (uptime, period) = {
            let shared = self.inner.shared.read();
            let uptime = match &shared.run {
                RunState::Running { started_at, .. } => Some(started_at.elapsed()),
                RunState::Stopped => None,
            };
            (uptime, shared.period)
        };
        DetailedStats::derive(counters, uptime, period)
    }
}

impl EmitterInner {
    fn period(&self) -> Duration {
        self.shared.read().period
    }

    async fn emit_once(&self) {
        let (reading, timeout) = {
            let shared = self.shared.read();
            (shared.payload.to_reading(), shared.call_timeout)
        };

        match send_bounded(self.sink.as_ref(), &reading, timeout).await {
            Ok(_) => self.counters.record(true),
            Err(e) => {
                self.counters.record(false);
                log_send_failed(&e);
            }
        }
    }
}

async fn run_loop(
    inner: Arc<EmitterInner>,
    mut stop_rx: watch::Receiver<bool>,
    started_at: Instant,
    period: Duration,
) {
    let mut current = period;
    let mut last_tick = started_at;
    let deadline = sleep_until(started_at + current);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            // Err means the sender is gone, which also ends the run
            _ = stop_rx.changed() => break,
            _ = inner.rearm.notified() => {
                let period = inner.period();
                if period != current {
                    current = period;
                    let next = (last_tick + current).max(Instant::now());
                    deadline.as_mut().reset(next);
                    debug!(period_ms = %current.as_millis(), "emitter_rearmed");
                }
            }
            _ = &mut deadline => {
                last_tick = deadline.deadline();
                let period = inner.period();
                if period != current {
                    current = period;
                    debug!(period_ms = %current.as_millis(), "emitter_rearmed_on_tick");
                }

                inner.emit_once().await;

                let next = (last_tick + current).max(Instant::now());
                deadline.as_mut().reset(next);
            }
        }
    }

    debug!("emitter_loop_exited");
}
