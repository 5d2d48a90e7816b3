//! Fundamental types used across the entire workspace.

use nalgebra::Vector3;
use sensor_models::{PolarFix, SensorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

/// Identity of a fused object, unique within one tracking session.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Object class supplied by the external classifier.
///
/// The label set is closed; labels the tracker does not know are folded into
/// [`Classification::Unknown`] rather than rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Vehicle,
    Pedestrian,
    Cyclist,
    Animal,
    Obstacle,
    #[default]
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Vehicle => "vehicle",
            Classification::Pedestrian => "pedestrian",
            Classification::Cyclist => "cyclist",
            Classification::Animal => "animal",
            Classification::Obstacle => "obstacle",
            Classification::Unknown => "unknown",
        }
    }
}

impl FromStr for Classification {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "vehicle" | "car" | "truck" => Classification::Vehicle,
            "pedestrian" | "person" => Classification::Pedestrian,
            "cyclist" | "bicycle" => Classification::Cyclist,
            "animal" => Classification::Animal,
            "obstacle" => Classification::Obstacle,
            _ => Classification::Unknown,
        })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw samples
// ---------------------------------------------------------------------------

/// A single detection as reported by one angular sensor, before fusion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub sensor: SensorKind,
    /// Bearing in degrees
    pub angle_deg: f64,
    /// Ground range in meters
    pub range_m: f64,
    /// Height in meters
    pub height_m: f64,
    /// Sensor-supplied velocity estimate (m/s)
    pub velocity: [f64; 3],
    pub classification: Classification,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

impl RawSample {
    pub fn fix(&self) -> PolarFix {
        PolarFix::new(self.angle_deg, self.range_m, self.height_m)
    }
}

// ---------------------------------------------------------------------------
// Sensor set
// ---------------------------------------------------------------------------

/// Which sensors contributed to a fused object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorSet {
    pub camera: bool,
    pub lidar: bool,
}

impl SensorSet {
    pub fn single(kind: SensorKind) -> Self {
        let mut set = Self::default();
        set.insert(kind);
        set
    }

    pub fn insert(&mut self, kind: SensorKind) {
        match kind {
            SensorKind::Camera => self.camera = true,
            SensorKind::Lidar => self.lidar = true,
        }
    }

    pub fn contains(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Camera => self.camera,
            SensorKind::Lidar => self.lidar,
        }
    }

    pub fn union(self, other: SensorSet) -> SensorSet {
        SensorSet {
            camera: self.camera || other.camera,
            lidar: self.lidar || other.lidar,
        }
    }
}

// ---------------------------------------------------------------------------
// DetectedObject
// ---------------------------------------------------------------------------

/// Immutable snapshot of one fused detection.
///
/// A new instance is produced every cycle the object is observed; earlier
/// instances live on unchanged in the history store.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: ObjectId,
    /// Cycle that produced this snapshot
    pub cycle: u64,
    /// [x, y, z] in meters, sensor frame
    pub position: [f64; 3],
    /// [vx, vy, vz] in m/s
    pub velocity: [f64; 3],
    pub classification: Classification,
    pub confidence: f64,
    pub sensors: SensorSet,
}

impl DetectedObject {
    pub fn position_vec(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }

    pub fn velocity_vec(&self) -> Vector3<f64> {
        Vector3::from(self.velocity)
    }

    /// Constant-velocity extrapolation `dt` seconds ahead.
    pub fn predicted_position(&self, dt: f64) -> Vector3<f64> {
        self.position_vec() + self.velocity_vec() * dt
    }

    pub fn distance_to(&self, point: &Vector3<f64>) -> f64 {
        (self.position_vec() - point).norm()
    }
}

// ---------------------------------------------------------------------------
// DetectionBatch — the published result of one cycle
// ---------------------------------------------------------------------------

/// The fused object list produced by one cycle, as pushed to the batch feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub cycle: u64,
    pub objects: Arc<[DetectedObject]>,
    /// Samples that passed range checks
    pub accepted: usize,
    /// Samples discarded as out of range
    pub rejected: usize,
}

impl DetectionBatch {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_labels_fold_into_unknown() {
        assert_eq!("Car".parse::<Classification>(), Ok(Classification::Vehicle));
        assert_eq!(
            "hovercraft".parse::<Classification>(),
            Ok(Classification::Unknown)
        );
    }

    #[test]
    fn prediction_is_constant_velocity() {
        let obj = DetectedObject {
            id: ObjectId(3),
            cycle: 0,
            position: [1.0, 2.0, 0.0],
            velocity: [10.0, 0.0, -1.0],
            classification: Classification::Vehicle,
            confidence: 0.9,
            sensors: SensorSet::single(SensorKind::Lidar),
        };
        let p = obj.predicted_position(0.5);
        assert!((p.x - 6.0).abs() < 1e-12);
        assert!((p.y - 2.0).abs() < 1e-12);
        assert!((p.z + 0.5).abs() < 1e-12);
        assert_eq!(obj.id.to_string(), "O3");
    }

    #[test]
    fn sensor_set_union() {
        let both = SensorSet::single(SensorKind::Camera).union(SensorSet::single(SensorKind::Lidar));
        assert!(both.contains(SensorKind::Camera) && both.contains(SensorKind::Lidar));
    }
}
