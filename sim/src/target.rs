//! Simulated object trajectories.
//!
//! Each target carries a true position/velocity in the sensor frame and a
//! `MotionSpec` describing how it moves. The simulator steps every target
//! forward once per poll.

use sensor_models::PolarFix;
use serde::{Deserialize, Serialize};
use tracker_core::types::Classification;

/// How a target moves between polls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Does not move.
    Stationary,
    /// Constant velocity, no acceleration.
    ConstantVelocity,
    /// Constant turn rate on the ground plane. `omega` = yaw rate (rad/s).
    ConstantTurn { omega: f64 },
    /// Constant acceleration in m/s².
    ConstantAccel { ax: f64, ay: f64, az: f64 },
    /// Switch motion model at given times (s), sorted ascending.
    /// The active spec is the last one whose start time is <= now.
    Segmented { segments: Vec<(f64, MotionSpec)> },
}

impl MotionSpec {
    fn advance(&self, t: f64, dt: f64, position: &mut [f64; 3], velocity: &mut [f64; 3]) {
        match self {
            MotionSpec::Stationary => {
                *velocity = [0.0; 3];
            }
            MotionSpec::ConstantVelocity => {
                for i in 0..3 {
                    position[i] += velocity[i] * dt;
                }
            }
            MotionSpec::ConstantTurn { omega } => {
                let speed = velocity[0].hypot(velocity[1]);
                let heading = velocity[1].atan2(velocity[0]);
                position[0] += speed * heading.cos() * dt;
                position[1] += speed * heading.sin() * dt;
                position[2] += velocity[2] * dt;
                let turned = heading + omega * dt;
                velocity[0] = speed * turned.cos();
                velocity[1] = speed * turned.sin();
            }
            MotionSpec::ConstantAccel { ax, ay, az } => {
                let accel = [*ax, *ay, *az];
                for i in 0..3 {
                    position[i] += velocity[i] * dt + 0.5 * accel[i] * dt * dt;
                    velocity[i] += accel[i] * dt;
                }
            }
            MotionSpec::Segmented { segments } => {
                match segments.iter().rev().find(|(start, _)| *start <= t) {
                    Some((_, spec)) => spec.advance(t, dt, position, velocity),
                    None => MotionSpec::ConstantVelocity.advance(t, dt, position, velocity),
                }
            }
        }
    }
}

/// A simulated object with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    /// Ground-truth id (unrelated to tracker ids)
    pub id: u64,
    /// True position [x, y, z] in meters
    pub position: [f64; 3],
    /// True velocity [vx, vy, vz] in m/s
    pub velocity: [f64; 3],
    pub motion: MotionSpec,
    pub classification: Classification,
    /// Target appears at this time (s)
    pub appear_at: Option<f64>,
    /// Target disappears at this time (s)
    pub disappear_at: Option<f64>,
}

impl Target {
    pub fn new(
        id: u64,
        position: [f64; 3],
        velocity: [f64; 3],
        motion: MotionSpec,
        classification: Classification,
    ) -> Self {
        Self {
            id,
            position,
            velocity,
            motion,
            classification,
            appear_at: None,
            disappear_at: None,
        }
    }

    /// Place a target at bearing `angle_deg`, ground range `range_m`.
    pub fn at_polar(
        id: u64,
        angle_deg: f64,
        range_m: f64,
        velocity: [f64; 3],
        motion: MotionSpec,
        classification: Classification,
    ) -> Self {
        let p = PolarFix::new(angle_deg, range_m, 0.0).to_cartesian();
        Self::new(id, [p.x, p.y, p.z], velocity, motion, classification)
    }

    /// Propagate the true state by `dt` seconds; `t` is the time before the step.
    pub fn step(&mut self, t: f64, dt: f64) {
        let motion = self.motion.clone();
        motion.advance(t, dt, &mut self.position, &mut self.velocity);
    }

    pub fn is_active(&self, t: f64) -> bool {
        self.appear_at.map_or(true, |a| t >= a) && self.disappear_at.map_or(true, |d| t < d)
    }

    /// Bearing/range/height as an angular sensor at the origin sees it.
    pub fn polar(&self) -> PolarFix {
        PolarFix::from_cartesian(&self.position.into())
    }
}
