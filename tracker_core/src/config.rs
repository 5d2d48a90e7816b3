//! Typed tracker configuration.
//!
//! Everything `start` needs is enumerated here; [`TrackerConfig::validate`]
//! is the only gate between a config and a running session. Durations
//! serialize as integer milliseconds so configs stay readable as JSON.

use crate::error::ConfigError;
use sensor_models::{AngularRange, RangeBounds, SensorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(80);
pub const DEFAULT_HISTORY_WINDOW: usize = 100;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_FEED_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Sensor coverage
// ---------------------------------------------------------------------------

/// Angular coverage of both sensors plus the shared detection-range gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorRanges {
    pub camera_fov: AngularRange,
    pub lidar_fov: AngularRange,
    pub detection_range: RangeBounds,
}

impl SensorRanges {
    pub fn fov(&self, sensor: SensorKind) -> &AngularRange {
        match sensor {
            SensorKind::Camera => &self.camera_fov,
            SensorKind::Lidar => &self.lidar_fov,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera_fov
            .validate()
            .map_err(|source| ConfigError::FieldOfView {
                sensor: "camera",
                source,
            })?;
        self.lidar_fov
            .validate()
            .map_err(|source| ConfigError::FieldOfView {
                sensor: "lidar",
                source,
            })?;
        self.detection_range
            .validate()
            .map_err(ConfigError::DetectionRange)
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// How object ids carry over from one cycle to the next.
///
/// `Associated` is the default. A history entry then follows one physical
/// object, as long as it moves less than the gate between cycles.
/// `Sequential` gives the per-cycle contract: the i-th accepted sample of
/// every cycle gets id `i`, whatever it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Ids `0..n` in sample order, reassigned every cycle.
    Sequential,
    /// Detections inherit the id of the gated nearest prior object.
    #[default]
    Associated,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub identity: IdentityMode,
    /// Max distance (m) between a predicted prior object and a detection
    /// for the pair to be considered the same object.
    pub association_gate_m: f64,
    /// Detections from different sensors closer than this (m) are merged.
    /// `None` keeps every accepted sample as its own object.
    pub merge_radius_m: Option<f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            identity: IdentityMode::Associated,
            association_gate_m: 2.0,
            merge_radius_m: None,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_distance("association_gate_m", self.association_gate_m)?;
        if let Some(r) = self.merge_radius_m {
            check_distance("merge_radius_m", r)?;
        }
        Ok(())
    }
}

fn check_distance(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDistance { name, value })
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

/// Configuration for one tracking activation.
///
/// Defaults: 100 ms cycles, 80 ms poll timeout, 100-entry history window,
/// [`IdentityMode::Associated`] ids. Set `fusion.identity` to
/// [`IdentityMode::Sequential`] for ids that restart at 0 every cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub ranges: SensorRanges,
    pub fusion: FusionConfig,
    #[serde(with = "duration_ms", rename = "cycle_period_ms")]
    pub cycle_period: Duration,
    /// Upper bound on one `poll_samples` call
    #[serde(with = "duration_ms", rename = "poll_timeout_ms")]
    pub poll_timeout: Duration,
    /// Retention window per object id
    pub history_window: usize,
    /// Drop ids not observed for this many cycles (`None` keeps them)
    pub history_idle_cycles: Option<u64>,
    /// Consecutive failed polls before the loop stops itself
    pub failure_threshold: u32,
    /// Capacity of the drop-oldest batch feed
    pub feed_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ranges: SensorRanges::default(),
            fusion: FusionConfig::default(),
            cycle_period: DEFAULT_CYCLE_PERIOD,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            history_window: DEFAULT_HISTORY_WINDOW,
            history_idle_cycles: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranges.validate()?;
        self.fusion.validate()?;
        if self.cycle_period.is_zero() {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        if self.poll_timeout.is_zero() || self.poll_timeout > self.cycle_period {
            return Err(ConfigError::PollTimeout {
                timeout: self.poll_timeout,
                period: self.cycle_period,
            });
        }
        if self.history_window == 0 {
            return Err(ConfigError::ZeroHistoryWindow);
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::ZeroFeedCapacity);
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
