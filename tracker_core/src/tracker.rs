//! Tracker handle: control surface plus the periodic loop task.
//!
//! ```text
//!  start ──► Idle ──► Running ──shutdown──► Stopping ──► Idle
//!                        │                                 ▲
//!                        └── failure threshold ──► Stopping┘
//! ```
//!
//! Every period the loop polls the source, fuses the samples, appends the
//! result to history, rebuilds the spatial index and publishes the cycle as
//! one snapshot. The batch is then pushed onto the feed.

use crate::{
    config::{SensorRanges, TrackerConfig},
    error::{SourceError, TrackerError},
    feed::BatchQueue,
    fusion::FusionEngine,
    session::{LoopState, RecordOutcome, SessionSnapshot, TrackingSession},
    source::{SampleSource, SourceProvider},
    spatial::SpatialIndex,
    types::{DetectedObject, DetectionBatch, ObjectId},
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of a `start` call that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A loop was already running; nothing changed.
    AlreadyRunning,
}

/// Point-in-time view of the tracker.
///
/// Cycle data (objects, history totals, failure counters) comes from one
/// published snapshot. `state` and the feed counters are read live.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackerStatus {
    pub tracking: bool,
    pub state: LoopState,
    /// Coverage of the current session, if one was ever started
    pub ranges: Option<SensorRanges>,
    pub object_count: usize,
    pub history_entry_count: usize,
    pub tracked_ids: usize,
    pub queued_batches: usize,
    pub dropped_batches: u64,
    /// Cycles completed successfully
    pub cycle: u64,
    pub consecutive_failures: u32,
    pub failed_cycles: u64,
    pub last_error: Option<String>,
}

/// Summary returned by a clean shutdown.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub object_count: usize,
    pub dropped_batches: u64,
}

enum LoopExit {
    Cancelled,
    Failed(TrackerError),
}

#[derive(Default)]
struct Control {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<LoopExit>>,
}

/// Owner of the tracking session and its loop task.
///
/// All methods take `&self`; share the tracker behind an `Arc` to query it
/// from other threads while the loop runs.
pub struct Tracker {
    provider: Arc<dyn SourceProvider>,
    state: Arc<RwLock<LoopState>>,
    session: RwLock<Option<Arc<TrackingSession>>>,
    control: Mutex<Control>,
}

impl Tracker {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            provider,
            state: Arc::new(RwLock::new(LoopState::Idle)),
            session: RwLock::new(None),
            control: Mutex::new(Control::default()),
        }
    }

    /// Validate `config`, acquire a source and spawn the loop.
    ///
    /// Returns as soon as the loop is spawned; the first cycle runs one
    /// period later. Must be called from within a tokio runtime.
    pub async fn start(&self, config: TrackerConfig) -> Result<StartOutcome, TrackerError> {
        let mut control = self.control.lock().await;

        if *self.state.read() == LoopState::Running {
            warn!(event = "duplicate_start", "Tracking already running, start ignored");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // A loop that stopped itself is still waiting to be joined.
        if let Some(task) = control.task.take() {
            control.cancel = None;
            if let Ok(LoopExit::Failed(err)) = task.await {
                warn!(event = "previous_failure_discarded", error = %err, "Restarting after failed session");
            }
        }

        if let Err(err) = config.validate() {
            warn!(event = "config_rejected", error = %err, "Refusing to start");
            return Err(err.into());
        }

        let source = self.provider.acquire(&config).map_err(|err| {
            warn!(event = "source_unavailable", error = %err, "Could not acquire sensor source");
            TrackerError::SourceUnavailable(err)
        })?;

        let period = config.cycle_period;
        let session = Arc::new(TrackingSession::new(config));
        *self.session.write() = Some(Arc::clone(&session));
        *self.state.write() = LoopState::Running;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            session,
            source,
            Arc::clone(&self.state),
            cancel.clone(),
        ));
        control.cancel = Some(cancel);
        control.task = Some(task);

        info!(
            event = "tracking_started",
            period_ms = period.as_millis() as u64,
            "Tracking started"
        );
        Ok(StartOutcome::Started)
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A cycle in progress finishes (a pending poll is abandoned) and the
    /// source is released before this returns. No-op when idle. If the loop
    /// had stopped itself after repeated source failures, that error is
    /// returned here.
    pub async fn shutdown(&self) -> Result<ShutdownReport, TrackerError> {
        let mut control = self.control.lock().await;

        let Some(task) = control.task.take() else {
            debug!(event = "shutdown_idle", "Shutdown requested while idle");
            return Ok(self.report());
        };

        {
            let mut state = self.state.write();
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
            }
        }
        if let Some(cancel) = control.cancel.take() {
            cancel.cancel();
        }

        let exit = task.await;
        *self.state.write() = LoopState::Idle;

        match exit {
            Ok(LoopExit::Cancelled) => {
                let report = self.report();
                info!(
                    event = "tracking_stopped",
                    cycles = report.cycles,
                    failed_cycles = report.failed_cycles,
                    "Tracking stopped"
                );
                Ok(report)
            }
            Ok(LoopExit::Failed(err)) => Err(err),
            Err(join) => {
                error!(event = "task_failed", error = %join, "Tracking task terminated abnormally");
                Err(TrackerError::TaskFailed(join.to_string()))
            }
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    pub fn status(&self) -> TrackerStatus {
        let state = self.state();
        let Some(session) = self.session() else {
            return TrackerStatus {
                state,
                ..Default::default()
            };
        };
        let snap = session.load();
        TrackerStatus {
            tracking: state == LoopState::Running,
            state,
            ranges: Some(session.config().ranges),
            object_count: snap.objects().len(),
            history_entry_count: snap.history_entries,
            tracked_ids: snap.tracked_ids,
            queued_batches: session.feed().len(),
            dropped_batches: session.feed().dropped(),
            cycle: snap.cycle,
            consecutive_failures: snap.consecutive_failures,
            failed_cycles: snap.failed_cycles,
            last_error: snap.last_error.clone(),
        }
    }

    /// Up to `k` current objects, nearest first. Empty before the first cycle.
    pub fn nearest_objects(&self, point: [f64; 3], k: usize) -> Vec<DetectedObject> {
        self.session()
            .map(|s| s.load().index.nearest(point, k))
            .unwrap_or_default()
    }

    /// Current object list.
    pub fn objects(&self) -> Arc<[DetectedObject]> {
        self.session()
            .map(|s| Arc::clone(s.load().objects()))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Oldest-first history of one object.
    pub fn history(&self, id: ObjectId) -> Option<Vec<DetectedObject>> {
        self.session().and_then(|s| s.history(id))
    }

    /// Batch feed of the current session.
    pub fn feed(&self) -> Option<Arc<BatchQueue>> {
        self.session().map(|s| Arc::clone(s.feed()))
    }

    pub fn session(&self) -> Option<Arc<TrackingSession>> {
        self.session.read().clone()
    }

    fn report(&self) -> ShutdownReport {
        self.session()
            .map(|s| {
                let snap = s.load();
                ShutdownReport {
                    cycles: snap.cycle,
                    failed_cycles: snap.failed_cycles,
                    object_count: snap.objects().len(),
                    dropped_batches: s.feed().dropped(),
                }
            })
            .unwrap_or_default()
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // The task releases its source once it observes cancellation.
        if let Some(cancel) = self.control.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Loop task
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LoopStats {
    completed: u64,
    failed: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
    accepted: u64,
    rejected: u64,
    history: RecordOutcome,
}

impl LoopStats {
    fn snapshot(&self, index: SpatialIndex) -> SessionSnapshot {
        SessionSnapshot {
            cycle: self.completed,
            index,
            consecutive_failures: self.consecutive_failures,
            failed_cycles: self.failed,
            last_error: self.last_error.clone(),
            samples_accepted: self.accepted,
            samples_rejected: self.rejected,
            history_entries: self.history.entries,
            tracked_ids: self.history.ids,
        }
    }
}

async fn run_loop(
    session: Arc<TrackingSession>,
    mut source: Box<dyn SampleSource>,
    state: Arc<RwLock<LoopState>>,
    cancel: CancellationToken,
) -> LoopExit {
    let config = session.config().clone();
    let period = config.cycle_period;
    let mut engine = FusionEngine::new(config.ranges, config.fusion, period);
    let mut stats = LoopStats::default();

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    let exit = 'cycles: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'cycles LoopExit::Cancelled,
            _ = ticker.tick() => {}
        }

        // Sources may start work as soon as the future exists.
        if cancel.is_cancelled() {
            break 'cycles LoopExit::Cancelled;
        }
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'cycles LoopExit::Cancelled,
            result = timeout(config.poll_timeout, source.poll_samples()) => {
                result.unwrap_or_else(|_| Err(SourceError::Timeout(config.poll_timeout)))
            }
        };

        match polled {
            Ok(samples) => {
                let out = engine.fuse(tick, &samples);
                let objects: Arc<[DetectedObject]> = out.objects.into();
                stats.history = session.record(tick, &objects);
                let index = SpatialIndex::build(Arc::clone(&objects));

                stats.completed += 1;
                stats.consecutive_failures = 0;
                stats.accepted += out.accepted as u64;
                stats.rejected += out.rejected as u64;
                session.publish(stats.snapshot(index));

                let dropped = session.feed().push(DetectionBatch {
                    cycle: tick,
                    objects: Arc::clone(&objects),
                    accepted: out.accepted,
                    rejected: out.rejected,
                });
                if dropped {
                    debug!(event = "batch_dropped", cycle = tick, "Feed full, dropped oldest batch");
                }
                debug!(
                    event = "cycle_complete",
                    cycle = tick,
                    objects = objects.len(),
                    accepted = out.accepted,
                    rejected = out.rejected,
                    merged = out.merged,
                    births = out.births,
                    pruned = stats.history.pruned,
                );
            }
            Err(err) => {
                stats.failed += 1;
                stats.consecutive_failures += 1;
                stats.last_error = Some(err.to_string());
                let index = session.load().index.clone();
                session.publish(stats.snapshot(index));
                warn!(
                    event = "cycle_failed",
                    cycle = tick,
                    consecutive = stats.consecutive_failures,
                    error = %err,
                    "Sensor poll failed"
                );

                if stats.consecutive_failures >= config.failure_threshold {
                    error!(
                        event = "tracking_failed",
                        cycle = tick,
                        consecutive = stats.consecutive_failures,
                        error = %err,
                        "Too many consecutive source failures, stopping"
                    );
                    *state.write() = LoopState::Stopping;
                    break 'cycles LoopExit::Failed(TrackerError::SourceFailed {
                        consecutive: stats.consecutive_failures,
                        last: err,
                    });
                }
            }
        }
        tick += 1;
    };

    source.release();
    debug!(event = "source_released", "Sensor source released");
    if matches!(exit, LoopExit::Failed(_)) {
        *state.write() = LoopState::Idle;
    }
    exit
}
