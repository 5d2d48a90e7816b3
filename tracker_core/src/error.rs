//! Error taxonomy of the tracking core.
//!
//! - [`ConfigError`] — rejected at `start`, the tracker stays idle.
//! - [`SourceError`] — a sensor source could not be reached. Recovered per
//!   cycle; escalates to [`TrackerError::SourceFailed`] after repeated failure.
//! - Out-of-range samples are not errors: see [`crate::fusion::RejectReason`].
//! - Querying an empty index is not an error: it yields an empty result.

use sensor_models::GeometryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Invalid tracker configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {sensor} field of view: {source}")]
    FieldOfView {
        sensor: &'static str,
        #[source]
        source: GeometryError,
    },

    #[error("invalid detection range: {0}")]
    DetectionRange(#[source] GeometryError),

    #[error("cycle period must be positive")]
    ZeroCyclePeriod,

    #[error("poll timeout must be positive and not exceed the cycle period ({period:?}), got {timeout:?}")]
    PollTimeout { timeout: Duration, period: Duration },

    #[error("history window must hold at least one entry")]
    ZeroHistoryWindow,

    #[error("consecutive failure threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("batch feed capacity must be at least 1")]
    ZeroFeedCapacity,

    #[error("{name} must be a positive finite distance, got {value}")]
    InvalidDistance { name: &'static str, value: f64 },
}

/// Failure to obtain raw samples from a sensor source.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceError {
    #[error("sensor source unavailable: {0}")]
    Unavailable(String),

    #[error("sensor poll timed out after {0:?}")]
    Timeout(Duration),

    #[error("sensor source exhausted")]
    Exhausted,
}

/// Errors surfaced through the control surface.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("could not acquire sensor source: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("tracking stopped after {consecutive} consecutive source failures (last: {last})")]
    SourceFailed { consecutive: u32, last: SourceError },

    #[error("tracking task terminated abnormally: {0}")]
    TaskFailed(String),
}
