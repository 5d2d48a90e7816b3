//! Polar ↔ cartesian conversion for angular sensors.
//!
//! A sensor reports a bearing θ (degrees, in the sensor's horizontal plane),
//! a ground range r (meters) and a height h (meters). In the sensor frame:
//!
//! x = r·cos(θ),  y = r·sin(θ),  z = h

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One angular fix as reported by a sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarFix {
    /// Bearing from the sensor x-axis (degrees)
    pub angle_deg: f64,
    /// Ground range (meters)
    pub range_m: f64,
    /// Height above the sensor plane (meters)
    pub height_m: f64,
}

impl PolarFix {
    pub fn new(angle_deg: f64, range_m: f64, height_m: f64) -> Self {
        Self {
            angle_deg,
            range_m,
            height_m,
        }
    }

    /// Cartesian position in the sensor frame.
    pub fn to_cartesian(&self) -> Vector3<f64> {
        let theta = self.angle_deg.to_radians();
        Vector3::new(
            self.range_m * theta.cos(),
            self.range_m * theta.sin(),
            self.height_m,
        )
    }

    /// Inverse of [`PolarFix::to_cartesian`]. Bearings are returned in `(-180, 180]`.
    pub fn from_cartesian(p: &Vector3<f64>) -> Self {
        let range_m = (p.x * p.x + p.y * p.y).sqrt();
        let angle_deg = p.y.atan2(p.x).to_degrees();
        Self {
            angle_deg,
            range_m,
            height_m: p.z,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.angle_deg.is_finite() && self.range_m.is_finite() && self.height_m.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boresight_lies_on_x_axis() {
        let p = PolarFix::new(0.0, 45.0, 1.5).to_cartesian();
        assert!((p.x - 45.0).abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);
        assert_eq!(p.z, 1.5);
    }

    #[test]
    fn right_angle_lies_on_y_axis() {
        let p = PolarFix::new(90.0, 40.0, 0.0).to_cartesian();
        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 40.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn cartesian_matches_polar_formula(
            angle in 0.0f64..=180.0,
            range in 40.0f64..=50.0,
            height in -5.0f64..5.0,
        ) {
            let p = PolarFix::new(angle, range, height).to_cartesian();
            let theta = angle.to_radians();
            prop_assert!((p.x - range * theta.cos()).abs() < 1e-9);
            prop_assert!((p.y - range * theta.sin()).abs() < 1e-9);
            prop_assert_eq!(p.z, height);
        }

        #[test]
        fn polar_roundtrip_in_upper_half_plane(angle in 0.0f64..=179.9, range in 1.0f64..100.0) {
            let fix = PolarFix::new(angle, range, 0.0);
            let back = PolarFix::from_cartesian(&fix.to_cartesian());
            prop_assert!((back.range_m - range).abs() < 1e-9);
            prop_assert!((back.angle_deg - angle).abs() < 1e-9);
        }
    }
}
