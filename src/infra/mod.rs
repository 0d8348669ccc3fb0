//! Infrastructure - configuration, counters and errors
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `counters` - Lock-free sent/failed counters
//! - `error` - Error taxonomy and duration parsing

pub mod config;
pub mod counters;
pub mod error;

// Re-export commonly used types
pub use config::{Config, SinkMode};
pub use counters::{CounterSnapshot, Counters};
pub use error::{parse_duration, parse_period, LoadgenError, SinkError};
