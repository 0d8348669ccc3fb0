//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sink` - Reading sinks (HTTP/JSON ingestion endpoint, in-process mock)
//! - `control_api` - Control HTTP API served by every loadgen node

pub mod control_api;
pub mod sink;

// Re-export commonly used types
pub use control_api::{serve, start_control_server, ControlState};
pub use sink::{sink_from_config, HttpSink, MockSink, ReadingSink};
