//! Scenario definitions.
//!
//! Each scenario is a named set of targets, sensors and scheduled outages.
//! All scenarios are deterministic given the same seed.

use crate::{
    sensor_sim::SimSensor,
    target::{MotionSpec, Target},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracker_core::Classification;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// 20 stationary obstacles on a ring, perfect LIDAR only
    Static,
    /// Pedestrians and cyclists crossing the detection band, camera + LIDAR
    Crossing,
    /// 12 vehicles on a curved road, some turning, higher clutter
    Traffic,
    /// Crossing with repeated sensor outages
    Outage,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub targets: Vec<Target>,
    pub sensors: Vec<SimSensor>,
    /// Poll indices during which the sensors are unreachable
    pub outages: Vec<Range<u64>>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Static => Self::stationary(seed),
            ScenarioKind::Crossing => Self::crossing(seed),
            ScenarioKind::Traffic => Self::traffic(seed),
            ScenarioKind::Outage => Self::outage(seed),
        }
    }

    // -----------------------------------------------------------------------
    // Static: 20 obstacles 9° apart at 45 m
    // -----------------------------------------------------------------------
    fn stationary(seed: u64) -> Self {
        let targets = (0..20)
            .map(|i| {
                Target::at_polar(
                    i,
                    i as f64 * 9.0,
                    45.0,
                    [0.0; 3],
                    MotionSpec::Stationary,
                    Classification::Obstacle,
                )
            })
            .collect();
        let lidar = SimSensor {
            p_detection: 1.0,
            angle_noise_deg: 0.0,
            range_noise_m: 0.0,
            lambda_clutter: 0.0,
            ..SimSensor::lidar()
        };
        Scenario {
            name: "static".into(),
            seed,
            targets,
            sensors: vec![lidar],
            outages: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Crossing: walkers and cyclists moving along the arc
    // -----------------------------------------------------------------------
    fn crossing(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let targets = (0..10)
            .map(|i| {
                let cyclist = i % 3 == 0;
                let speed = if cyclist {
                    4.0 + rng.gen::<f64>() * 2.0
                } else {
                    1.0 + rng.gen::<f64>() * 0.8
                };
                let angle = 15.0 + i as f64 * 15.0;
                let range = 42.0 + rng.gen::<f64>() * 6.0;
                // Tangential heading, alternating direction
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                let tangent = (angle + 90.0).to_radians();
                let velocity = [
                    sign * speed * tangent.cos(),
                    sign * speed * tangent.sin(),
                    0.0,
                ];
                let mut t = Target::at_polar(
                    i,
                    angle,
                    range,
                    velocity,
                    MotionSpec::ConstantVelocity,
                    if cyclist {
                        Classification::Cyclist
                    } else {
                        Classification::Pedestrian
                    },
                );
                t.position[2] = if cyclist { 1.2 } else { 0.9 };
                t
            })
            .collect();

        Scenario {
            name: "crossing".into(),
            seed,
            targets,
            sensors: vec![SimSensor::camera(), SimSensor::lidar()],
            outages: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Traffic: vehicles on a curved road through the band
    // -----------------------------------------------------------------------
    fn traffic(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(2));
        let mut targets: Vec<Target> = (0..12)
            .map(|i| {
                let speed = 6.0 + rng.gen::<f64>() * 6.0;
                let angle = 10.0 + i as f64 * 13.0;
                let tangent = (angle + 90.0).to_radians();
                let velocity = [speed * tangent.cos(), speed * tangent.sin(), 0.0];
                // Road curvature keeps vehicles near the 45 m arc
                let motion = if i % 4 == 3 {
                    MotionSpec::Segmented {
                        segments: vec![
                            (0.0, MotionSpec::ConstantTurn { omega: speed / 45.0 }),
                            (3.0, MotionSpec::ConstantVelocity),
                        ],
                    }
                } else {
                    MotionSpec::ConstantTurn { omega: speed / 45.0 }
                };
                Target::at_polar(i, angle, 45.0, velocity, motion, Classification::Vehicle)
            })
            .collect();

        // A stray animal wanders in late
        let mut deer = Target::at_polar(
            100,
            95.0,
            49.0,
            [0.0, -1.5, 0.0],
            MotionSpec::ConstantVelocity,
            Classification::Animal,
        );
        deer.appear_at = Some(2.0);
        deer.disappear_at = Some(6.0);
        targets.push(deer);

        let camera = SimSensor {
            lambda_clutter: 2.0,
            ..SimSensor::camera()
        };
        let lidar = SimSensor {
            lambda_clutter: 3.0,
            ..SimSensor::lidar()
        };

        Scenario {
            name: "traffic".into(),
            seed,
            targets,
            sensors: vec![camera, lidar],
            outages: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Outage: crossing with a short and a long sensor blackout
    // -----------------------------------------------------------------------
    fn outage(seed: u64) -> Self {
        let mut scenario = Self::crossing(seed);
        scenario.name = "outage".into();
        scenario.outages = vec![10..12, 30..40];
        scenario
    }
}
