//! Fusion engine: raw per-sensor samples → canonical object list.
//!
//! # Processing steps per cycle
//! 1. Range check every sample against its sensor's field of view, the
//!    detection-range gate and the confidence domain. Failures are dropped
//!    with a debug diagnostic, never an error.
//! 2. Convert accepted samples to cartesian (`x = r·cosθ, y = r·sinθ, z = h`).
//! 3. Optionally merge camera/LIDAR detections of the same object.
//! 4. Assign identities, either sequentially or by association with the
//!    previous cycle's objects (see [`crate::association`]).

use crate::{
    association::associate,
    config::{FusionConfig, IdentityMode, SensorRanges},
    spatial::KdTree,
    types::{Classification, DetectedObject, ObjectId, RawSample, SensorSet},
};
use nalgebra::Vector3;
use rayon::prelude::*;
use sensor_models::SensorKind;
use std::fmt;
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// Sample rejection
// ---------------------------------------------------------------------------

/// Why a sample was discarded. Purely diagnostic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RejectReason {
    NonFinite,
    AngleOutOfRange { angle_deg: f64 },
    RangeOutOfBounds { range_m: f64 },
    ConfidenceOutOfRange { confidence: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NonFinite => write!(f, "non-finite value"),
            RejectReason::AngleOutOfRange { angle_deg } => {
                write!(f, "angle {angle_deg}° outside field of view")
            }
            RejectReason::RangeOutOfBounds { range_m } => {
                write!(f, "range {range_m} m outside detection bounds")
            }
            RejectReason::ConfidenceOutOfRange { confidence } => {
                write!(f, "confidence {confidence} outside [0, 1]")
            }
        }
    }
}

/// Check one sample against the configured coverage.
pub fn check_sample(ranges: &SensorRanges, sample: &RawSample) -> Result<(), RejectReason> {
    if !sample.fix().is_finite() || !sample.velocity.iter().all(|v| v.is_finite()) {
        return Err(RejectReason::NonFinite);
    }
    if !ranges.fov(sample.sensor).contains(sample.angle_deg) {
        return Err(RejectReason::AngleOutOfRange {
            angle_deg: sample.angle_deg,
        });
    }
    if !ranges.detection_range.contains(sample.range_m) {
        return Err(RejectReason::RangeOutOfBounds {
            range_m: sample.range_m,
        });
    }
    if !(0.0..=1.0).contains(&sample.confidence) {
        return Err(RejectReason::ConfidenceOutOfRange {
            confidence: sample.confidence,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Outputs of one fusion step.
#[derive(Clone, Debug, Default)]
pub struct FusionOutput {
    /// Fused objects, in order of their first contributing sample
    pub objects: Vec<DetectedObject>,
    pub accepted: usize,
    pub rejected: usize,
    /// Number of cross-sensor merges performed
    pub merged: usize,
    /// Objects that received a fresh id this cycle
    pub births: usize,
}

/// An accepted sample in cartesian form, before identity assignment.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    position: Vector3<f64>,
    velocity: Vector3<f64>,
    classification: Classification,
    confidence: f64,
    sensors: SensorSet,
}

impl Candidate {
    fn from_sample(sample: &RawSample) -> Self {
        Self {
            position: sample.fix().to_cartesian(),
            velocity: Vector3::from(sample.velocity),
            classification: sample.classification,
            confidence: sample.confidence,
            sensors: SensorSet::single(sample.sensor),
        }
    }

    /// Confidence-weighted combination of two detections of one object.
    fn merge(&self, other: &Candidate) -> Candidate {
        let (wa, wb) = if self.confidence + other.confidence > 0.0 {
            (self.confidence, other.confidence)
        } else {
            (1.0, 1.0)
        };
        let total = wa + wb;
        Candidate {
            position: (self.position * wa + other.position * wb) / total,
            velocity: (self.velocity * wa + other.velocity * wb) / total,
            classification: if other.confidence > self.confidence {
                other.classification
            } else {
                self.classification
            },
            confidence: self.confidence.max(other.confidence),
            sensors: self.sensors.union(other.sensors),
        }
    }

    fn disjoint_sensors(&self, other: &Candidate) -> bool {
        SensorKind::ALL
            .iter()
            .all(|k| !(self.sensors.contains(*k) && other.sensors.contains(*k)))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateful fusion engine for one tracking session.
///
/// Holds the previous cycle's objects (for association) and the id counter.
pub struct FusionEngine {
    ranges: SensorRanges,
    config: FusionConfig,
    cycle_period: Duration,
    next_id: u64,
    previous: Vec<DetectedObject>,
}

impl FusionEngine {
    pub fn new(ranges: SensorRanges, config: FusionConfig, cycle_period: Duration) -> Self {
        Self {
            ranges,
            config,
            cycle_period,
            next_id: 0,
            previous: Vec::new(),
        }
    }

    /// Fuse the raw samples of cycle `cycle` into an ordered object list.
    pub fn fuse(&mut self, cycle: u64, samples: &[RawSample]) -> FusionOutput {
        // Steps 1-2: range check + conversion (parallel, order preserving)
        let ranges = &self.ranges;
        let checked: Vec<Result<Candidate, RejectReason>> = samples
            .par_iter()
            .map(|s| check_sample(ranges, s).map(|_| Candidate::from_sample(s)))
            .collect();

        let mut candidates = Vec::with_capacity(checked.len());
        let mut rejected = 0;
        for (i, (sample, result)) in samples.iter().zip(checked).enumerate() {
            match result {
                Ok(c) => candidates.push(c),
                Err(reason) => {
                    rejected += 1;
                    debug!(
                        event = "sample_rejected",
                        cycle,
                        sample = i,
                        sensor = %sample.sensor,
                        %reason,
                        "Discarded out-of-range sample"
                    );
                }
            }
        }
        let accepted = candidates.len();

        // Step 3: cross-sensor merge
        let (candidates, merged) = match self.config.merge_radius_m {
            Some(radius) => merge_across_sensors(candidates, radius),
            None => (candidates, 0),
        };

        // Step 4: identity
        let (ids, births) = self.assign_ids(cycle, &candidates);

        let objects: Vec<DetectedObject> = candidates
            .iter()
            .zip(ids)
            .map(|(c, id)| DetectedObject {
                id,
                cycle,
                position: c.position.into(),
                velocity: c.velocity.into(),
                classification: c.classification,
                confidence: c.confidence,
                sensors: c.sensors,
            })
            .collect();

        for obj in &objects {
            debug!(
                event = "detection_accepted",
                cycle,
                object_id = %obj.id,
                class = %obj.classification,
                confidence = obj.confidence,
                x = obj.position[0],
                y = obj.position[1],
                z = obj.position[2],
            );
        }

        self.previous.clone_from(&objects);

        FusionOutput {
            objects,
            accepted,
            rejected,
            merged,
            births,
        }
    }

    fn assign_ids(&mut self, cycle: u64, candidates: &[Candidate]) -> (Vec<ObjectId>, usize) {
        match self.config.identity {
            IdentityMode::Sequential => {
                let ids = (0..candidates.len() as u64).map(ObjectId).collect();
                (ids, candidates.len())
            }
            IdentityMode::Associated => {
                let last_cycle = self.previous.first().map_or(cycle, |o| o.cycle);
                let dt = cycle.saturating_sub(last_cycle) as f64 * self.cycle_period.as_secs_f64();
                let predicted: Vec<[f64; 3]> = self
                    .previous
                    .iter()
                    .map(|o| o.predicted_position(dt).into())
                    .collect();
                let detections: Vec<[f64; 3]> =
                    candidates.iter().map(|c| c.position.into()).collect();

                let assignment = associate(&predicted, &detections, self.config.association_gate_m);

                let mut ids = vec![ObjectId::default(); candidates.len()];
                for &(pi, di) in &assignment.pairs {
                    ids[di] = self.previous[pi].id;
                }
                for &di in &assignment.unmatched_detections {
                    ids[di] = ObjectId(self.next_id);
                    self.next_id += 1;
                }
                (ids, assignment.unmatched_detections.len())
            }
        }
    }
}

/// Greedy nearest-first pairing of detections from different sensors.
///
/// Walks candidates in sample order; each unconsumed candidate absorbs the
/// nearest unconsumed candidate within `radius` that came from a different
/// sensor. The merged object keeps the earlier candidate's slot.
fn merge_across_sensors(candidates: Vec<Candidate>, radius: f64) -> (Vec<Candidate>, usize) {
    let points: Vec<[f64; 3]> = candidates.iter().map(|c| c.position.into()).collect();
    let tree = KdTree::build(&points);
    let mut consumed = vec![false; candidates.len()];
    let mut out = Vec::with_capacity(candidates.len());
    let mut merged = 0;

    for i in 0..candidates.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;
        let partner = tree
            .within(&points[i], radius)
            .into_iter()
            .map(|(j, _)| j)
            .find(|&j| !consumed[j] && candidates[i].disjoint_sensors(&candidates[j]));
        match partner {
            Some(j) => {
                consumed[j] = true;
                merged += 1;
                out.push(candidates[i].merge(&candidates[j]));
            }
            None => out.push(candidates[i]),
        }
    }
    (out, merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
