//! Camera/LIDAR sample simulator.
//!
//! Generates one raw sample batch per poll with:
//! - Uniform bearing/range noise
//! - Miss probability (1 - P_D)
//! - Poisson clutter scattered well beyond the detection band, so part of
//!   every batch fails range checks
//! - Scheduled outages, during which polling fails

use crate::replay::Recorder;
use crate::scenarios::{Scenario, ScenarioKind};
use crate::target::Target;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sensor_models::{AngularRange, SensorKind};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;
use tracker_core::{
    source::{BoxFuture, SampleSource, SourceProvider},
    Classification, RawSample, SourceError, TrackerConfig,
};

/// One simulated sensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimSensor {
    pub kind: SensorKind,
    /// Bearings the sensor can physically see
    pub coverage: AngularRange,
    pub p_detection: f64,
    /// Half-width of the uniform bearing error (degrees)
    pub angle_noise_deg: f64,
    /// Half-width of the uniform range error (meters)
    pub range_noise_m: f64,
    /// Mean number of false alarms per poll
    pub lambda_clutter: f64,
    /// Classifier confidence reported for true detections
    pub confidence: f64,
}

impl SimSensor {
    pub fn camera() -> Self {
        Self {
            kind: SensorKind::Camera,
            coverage: AngularRange::new(0.0, 180.0),
            p_detection: 0.95,
            angle_noise_deg: 0.3,
            range_noise_m: 0.4,
            lambda_clutter: 0.5,
            confidence: 0.85,
        }
    }

    pub fn lidar() -> Self {
        Self {
            kind: SensorKind::Lidar,
            coverage: AngularRange::new(0.0, 180.0),
            p_detection: 0.98,
            angle_noise_deg: 0.1,
            range_noise_m: 0.05,
            lambda_clutter: 1.0,
            confidence: 0.7,
        }
    }
}

/// Turns ground-truth targets into raw sensor samples.
pub struct SensorSimulator {
    pub sensors: Vec<SimSensor>,
    rng: ChaCha8Rng,
}

impl SensorSimulator {
    pub fn new(sensors: Vec<SimSensor>, seed: u64) -> Self {
        Self {
            sensors,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// One batch covering every sensor, sensors in declaration order.
    pub fn observe(&mut self, targets: &[Target], t: f64) -> Vec<RawSample> {
        let mut samples = Vec::new();

        for sensor in &self.sensors {
            for target in targets {
                if !target.is_active(t) {
                    continue;
                }
                let fix = target.polar();
                let angle = fix.angle_deg.rem_euclid(360.0);
                if !sensor.coverage.contains(angle) {
                    continue;
                }
                if self.rng.gen::<f64>() > sensor.p_detection {
                    continue;
                }

                let noisy_angle = angle + (self.rng.gen::<f64>() * 2.0 - 1.0) * sensor.angle_noise_deg;
                let noisy_range = fix.range_m + (self.rng.gen::<f64>() * 2.0 - 1.0) * sensor.range_noise_m;
                samples.push(RawSample {
                    sensor: sensor.kind,
                    angle_deg: noisy_angle,
                    range_m: noisy_range,
                    height_m: fix.height_m,
                    velocity: target.velocity,
                    classification: target.classification,
                    confidence: sensor.confidence,
                });
            }

            // Poisson draw by product of uniforms
            let n_clutter = if sensor.lambda_clutter <= 0.0 {
                0usize
            } else {
                let mut n = 0usize;
                let threshold = (-sensor.lambda_clutter).exp();
                let mut prod = self.rng.gen::<f64>();
                while prod > threshold && n < 50 {
                    prod *= self.rng.gen::<f64>();
                    n += 1;
                }
                n
            };
            for _ in 0..n_clutter {
                samples.push(RawSample {
                    sensor: sensor.kind,
                    angle_deg: self.rng.gen::<f64>() * 360.0,
                    range_m: self.rng.gen::<f64>() * 100.0,
                    height_m: 0.0,
                    velocity: [0.0; 3],
                    classification: Classification::Unknown,
                    confidence: self.rng.gen::<f64>() * 0.3,
                });
            }
        }

        samples
    }
}

// ---------------------------------------------------------------------------
// Sample source
// ---------------------------------------------------------------------------

/// A scenario played live: targets advance by one cycle period per poll.
pub struct SimulatedSource {
    scenario: Scenario,
    simulator: SensorSimulator,
    dt: f64,
    polls: u64,
    recorder: Option<Recorder>,
}

impl SimulatedSource {
    pub fn new(scenario: Scenario, dt: f64) -> Self {
        let simulator = SensorSimulator::new(scenario.sensors.clone(), scenario.seed);
        Self {
            scenario,
            simulator,
            dt,
            polls: 0,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Produce the next poll result synchronously.
    pub fn next_batch(&mut self) -> Result<Vec<RawSample>, SourceError> {
        let poll = self.polls;
        self.polls += 1;
        let t = poll as f64 * self.dt;
        for target in &mut self.scenario.targets {
            target.step(t, self.dt);
        }

        let result = if in_outage(&self.scenario.outages, poll) {
            debug!(event = "sim_outage", poll, "Simulated sensor outage");
            Err(SourceError::Unavailable(format!("simulated outage at poll {poll}")))
        } else {
            Ok(self.simulator.observe(&self.scenario.targets, t + self.dt))
        };

        if let Some(recorder) = &self.recorder {
            recorder.record(poll, &result);
        }
        result
    }
}

fn in_outage(outages: &[Range<u64>], poll: u64) -> bool {
    outages.iter().any(|r| r.contains(&poll))
}

impl SampleSource for SimulatedSource {
    fn poll_samples(&mut self) -> BoxFuture<'_, Result<Vec<RawSample>, SourceError>> {
        Box::pin(async move { self.next_batch() })
    }

    fn release(&mut self) {
        debug!(
            event = "sim_released",
            scenario = %self.scenario.name,
            polls = self.polls,
            "Simulated sensors released"
        );
    }
}

/// Builds a fresh [`SimulatedSource`] for every tracking session.
#[derive(Clone)]
pub struct SimulatedProvider {
    kind: ScenarioKind,
    seed: u64,
    recorder: Option<Recorder>,
}

impl SimulatedProvider {
    pub fn new(kind: ScenarioKind, seed: u64) -> Self {
        Self {
            kind,
            seed,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl SourceProvider for SimulatedProvider {
    fn acquire(&self, config: &TrackerConfig) -> Result<Box<dyn SampleSource>, SourceError> {
        let scenario = Scenario::build(self.kind, self.seed);
        let mut source = SimulatedSource::new(scenario, config.cycle_period.as_secs_f64());
        if let Some(recorder) = &self.recorder {
            source = source.with_recorder(recorder.clone());
        }
        Ok(Box::new(source))
    }
}
