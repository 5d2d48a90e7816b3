//! Sensor descriptors: which sensor produced a sample and what it is able to see.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The angular sensors feeding the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Camera,
    Lidar,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Camera, SensorKind::Lidar];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Camera => "camera",
            SensorKind::Lidar => "lidar",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid sensor geometry.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum GeometryError {
    #[error("angular range [{min_deg}°, {max_deg}°] must satisfy 0 <= min < max <= 360")]
    AngularRange { min_deg: f64, max_deg: f64 },

    #[error("detection range [{min_m} m, {max_m} m] must satisfy 0 <= min < max")]
    DetectionRange { min_m: f64, max_m: f64 },
}

// ---------------------------------------------------------------------------
// Angular coverage
// ---------------------------------------------------------------------------

/// Closed interval of bearings, in degrees, that a sensor covers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngularRange {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl Default for AngularRange {
    fn default() -> Self {
        Self {
            min_deg: 0.0,
            max_deg: 180.0,
        }
    }
}

impl AngularRange {
    pub fn new(min_deg: f64, max_deg: f64) -> Self {
        Self { min_deg, max_deg }
    }

    /// True if `angle_deg` lies inside the interval (bounds included).
    /// NaN is never contained.
    pub fn contains(&self, angle_deg: f64) -> bool {
        angle_deg >= self.min_deg && angle_deg <= self.max_deg
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let ok = self.min_deg.is_finite()
            && self.max_deg.is_finite()
            && self.min_deg >= 0.0
            && self.max_deg <= 360.0
            && self.min_deg < self.max_deg;
        if ok {
            Ok(())
        } else {
            Err(GeometryError::AngularRange {
                min_deg: self.min_deg,
                max_deg: self.max_deg,
            })
        }
    }
}

impl fmt::Display for AngularRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}°, {}°]", self.min_deg, self.max_deg)
    }
}

// ---------------------------------------------------------------------------
// Range gate
// ---------------------------------------------------------------------------

/// Closed interval of horizontal (ground-plane) ranges, in meters, accepted
/// from any sensor. Height is reported separately and not gated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub min_m: f64,
    pub max_m: f64,
}

impl Default for RangeBounds {
    fn default() -> Self {
        Self {
            min_m: 40.0,
            max_m: 50.0,
        }
    }
}

impl RangeBounds {
    pub fn new(min_m: f64, max_m: f64) -> Self {
        Self { min_m, max_m }
    }

    pub fn contains(&self, range_m: f64) -> bool {
        range_m >= self.min_m && range_m <= self.max_m
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let ok = self.min_m.is_finite()
            && self.max_m.is_finite()
            && self.min_m >= 0.0
            && self.min_m < self.max_m;
        if ok {
            Ok(())
        } else {
            Err(GeometryError::DetectionRange {
                min_m: self.min_m,
                max_m: self.max_m,
            })
        }
    }
}

impl fmt::Display for RangeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} m, {} m]", self.min_m, self.max_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angular_bounds_are_inclusive() {
        let fov = AngularRange::default();
        assert!(fov.contains(0.0));
        assert!(fov.contains(180.0));
        assert!(!fov.contains(180.5));
        assert!(!fov.contains(-0.1));
        assert!(!fov.contains(f64::NAN));
    }

    #[test]
    fn inverted_angular_range_rejected() {
        assert!(AngularRange::new(90.0, 10.0).validate().is_err());
        assert!(AngularRange::new(0.0, 400.0).validate().is_err());
        assert!(AngularRange::new(10.0, 90.0).validate().is_ok());
    }

    #[test]
    fn range_bounds_validation() {
        assert!(RangeBounds::default().validate().is_ok());
        assert!(RangeBounds::new(50.0, 40.0).validate().is_err());
        assert!(RangeBounds::new(-1.0, 40.0).validate().is_err());
        assert!(RangeBounds::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn sensor_kind_serializes_lowercase() {
        assert_eq!(SensorKind::Lidar.to_string(), "lidar");
        assert_eq!(SensorKind::ALL.len(), 2);
    }
}
