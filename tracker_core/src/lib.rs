//! `tracker_core` — Real-time multi-sensor object tracking.
//!
//! # Module layout
//! - [`types`]        — Object ids, classifications, raw samples, detected objects
//! - [`config`]       — `TrackerConfig` and its validation
//! - [`error`]        — Error taxonomy
//! - [`fusion`]       — Range checks, polar conversion, cross-sensor merge, identity
//! - [`association`]  — Gated Hungarian matching of detections to prior objects
//! - [`history`]      — Bounded per-object history
//! - [`spatial`]      — k-d tree and nearest-neighbour index
//! - [`feed`]         — Bounded drop-oldest batch queue
//! - [`source`]       — Sensor source traits
//! - [`session`]      — Shared per-activation state
//! - [`tracker`]      — Control surface and periodic loop

pub mod association;
pub mod config;
pub mod error;
pub mod feed;
pub mod fusion;
pub mod history;
pub mod session;
pub mod source;
pub mod spatial;
pub mod tracker;
pub mod types;

pub use config::{FusionConfig, IdentityMode, SensorRanges, TrackerConfig};
pub use error::{ConfigError, SourceError, TrackerError};
pub use feed::BatchQueue;
pub use fusion::{FusionEngine, FusionOutput, RejectReason};
pub use history::HistoryStore;
pub use session::{LoopState, RecordOutcome, SessionSnapshot, TrackingSession};
pub use source::{BoxFuture, SampleSource, ScriptedSource, SourceProvider};
pub use spatial::SpatialIndex;
pub use tracker::{ShutdownReport, StartOutcome, Tracker, TrackerStatus};
pub use types::{
    Classification, DetectedObject, DetectionBatch, ObjectId, RawSample, SensorSet,
};
