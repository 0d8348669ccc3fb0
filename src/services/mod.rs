//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `emitter` - Periodic reading emitter with runtime reconfiguration
//! - `burst` - Bounded-concurrency burst dispatcher
//! - `stats` - Derived stats and latency percentiles
//! - `fleet` - Scatter/gather controller over many loadgen nodes

pub mod burst;
pub mod emitter;
pub mod fleet;
pub mod stats;

// Re-export commonly used types
pub use burst::{BurstDispatcher, BurstJob, BurstLimits, BurstResult};
pub use emitter::{Emitter, EmitterConfig};
pub use fleet::{FleetCommand, FleetController};
pub use stats::{DetailedStats, LatencySummary};
