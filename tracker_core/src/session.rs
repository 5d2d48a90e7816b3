//! Shared state of one tracking activation.
//!
//! The loop task is the only writer. Each cycle it appends to the history
//! store, builds a fresh [`SessionSnapshot`] and swaps it in; readers clone
//! the `Arc` and never observe a half-built cycle. History totals are copied
//! into the snapshot, so a status read never mixes two cycles.

use crate::{
    config::TrackerConfig,
    feed::BatchQueue,
    history::HistoryStore,
    spatial::SpatialIndex,
    types::{DetectedObject, ObjectId},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of the tracking loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Everything published at the end of one cycle.
#[derive(Debug, Default)]
pub struct SessionSnapshot {
    /// Cycles completed successfully
    pub cycle: u64,
    /// Index over the current object list; also owns the list itself
    pub index: SpatialIndex,
    pub consecutive_failures: u32,
    pub failed_cycles: u64,
    pub last_error: Option<String>,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    /// History totals as of this cycle
    pub history_entries: usize,
    pub tracked_ids: usize,
}

/// History totals right after one `record` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub pruned: usize,
    pub entries: usize,
    pub ids: usize,
}

impl SessionSnapshot {
    pub fn objects(&self) -> &Arc<[DetectedObject]> {
        self.index.objects()
    }
}

pub struct TrackingSession {
    config: TrackerConfig,
    snapshot: RwLock<Arc<SessionSnapshot>>,
    history: RwLock<HistoryStore>,
    feed: Arc<BatchQueue>,
}

impl TrackingSession {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            history: RwLock::new(HistoryStore::new(config.history_window)),
            feed: Arc::new(BatchQueue::new(config.feed_capacity)),
            snapshot: RwLock::new(Arc::new(SessionSnapshot::default())),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Current published snapshot.
    pub fn load(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: SessionSnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Record a batch into history, optionally pruning idle ids.
    pub fn record(&self, cycle: u64, objects: &[DetectedObject]) -> RecordOutcome {
        let mut history = self.history.write();
        history.record(objects);
        let pruned = match self.config.history_idle_cycles {
            Some(max_idle) => history.prune_stale(cycle, max_idle),
            None => 0,
        };
        RecordOutcome {
            pruned,
            entries: history.entry_count(),
            ids: history.len(),
        }
    }

    pub fn history(&self, id: ObjectId) -> Option<Vec<DetectedObject>> {
        self.history.read().get(id)
    }

    pub fn feed(&self) -> &Arc<BatchQueue> {
        &self.feed
    }
}
