//! Lock-free sent/failed counters
//!
//! Uses atomics so that many burst workers and the emission loop can record
//! outcomes without contending on the config lock.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; readers accept a slightly stale snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic sent/failed counters owned by one emitter or dispatcher
#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of `Counters`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: u64,
    pub failed: u64,
}

impl CounterSnapshot {
    #[inline]
    pub fn total(&self) -> u64 {
        self.sent + self.failed
    }
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call
    #[inline]
    pub fn record(&self, success: bool) {
        if success {
            self.sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot { sent: self.sent(), failed: self.failed() }
    }
}
