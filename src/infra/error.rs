//! Error types
//!
//! `LoadgenError` covers requests rejected before they take effect (bad
//! duration, non-positive period, invalid burst shape). `SinkError` covers a
//! single reading that did not make it to the ingestion endpoint; those are
//! counted as failures and never propagate past the caller that sent them.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LoadgenError {
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("period must be greater than zero")]
    NonPositivePeriod,

    #[error("invalid burst: {0}")]
    InvalidBurst(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink returned HTTP {0}")]
    Status(u16),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("sink rejected reading: {0}")]
    Rejected(String),
}

/// Parse a duration string such as "500ms", "2s" or "1m30s"
pub fn parse_duration(input: &str) -> Result<Duration, LoadgenError> {
    humantime::parse_duration(input.trim()).map_err(|e| LoadgenError::InvalidDuration {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a duration that will be used as an emission period
pub fn parse_period(input: &str) -> Result<Duration, LoadgenError> {
    let period = parse_duration(input)?;
    if period.is_zero() {
        return Err(LoadgenError::NonPositivePeriod);
    }
    Ok(period)
}
