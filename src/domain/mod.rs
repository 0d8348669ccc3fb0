//! Domain models - readings, payloads and control API bodies
//!
//! This module contains the canonical data types used throughout the system:
//! - `Reading` - one synthetic sensor reading sent to the ingestion endpoint
//! - `Payload` - the mutable part of a reading owned by an emitter
//! - `Envelope` - `{data, error, message}` wrapper of every API response
//! - `ConfigUpdate`, `FrequencyRequest`, `BurstRequest` - control API bodies

pub mod types;

// Re-export commonly used types at module level
pub use types::{
    Ack, BurstRequest, ConfigUpdate, Envelope, FrequencyRequest, Payload, Reading,
};
