//! Replay: record raw sample batches to JSON and play them back through the
//! tracker, poll by poll.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tracker_core::{
    source::{BoxFuture, SampleSource, SourceProvider},
    RawSample, SourceError, TrackerConfig,
};

/// Outcome of one recorded poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedPoll {
    pub poll: u64,
    pub result: Result<Vec<RawSample>, SourceError>,
}

/// A full recorded session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub cycle_period_ms: u64,
    /// All polls in chronological order
    pub polls: Vec<RecordedPoll>,
}

impl ReplayLog {
    pub fn sample_count(&self) -> usize {
        self.polls
            .iter()
            .filter_map(|p| p.result.as_ref().ok())
            .map(Vec::len)
            .sum()
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Shared sink a live source appends its poll results to.
#[derive(Clone, Default)]
pub struct Recorder {
    polls: Arc<Mutex<Vec<RecordedPoll>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, poll: u64, result: &Result<Vec<RawSample>, SourceError>) {
        self.polls.lock().push(RecordedPoll {
            poll,
            result: result.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.polls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.lock().is_empty()
    }

    /// Snapshot everything recorded so far as a log.
    pub fn to_log(&self, scenario_name: &str, seed: u64, cycle_period_ms: u64) -> ReplayLog {
        ReplayLog {
            scenario_name: scenario_name.to_string(),
            seed,
            cycle_period_ms,
            polls: self.polls.lock().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Plays a log back one poll at a time, then reports exhaustion.
pub struct ReplaySource {
    pending: VecDeque<RecordedPoll>,
}

impl ReplaySource {
    pub fn new(log: &ReplayLog) -> Self {
        Self {
            pending: log.polls.iter().cloned().collect(),
        }
    }
}

impl SampleSource for ReplaySource {
    fn poll_samples(&mut self) -> BoxFuture<'_, Result<Vec<RawSample>, SourceError>> {
        Box::pin(async move {
            match self.pending.pop_front() {
                Some(RecordedPoll { result, .. }) => result,
                None => Err(SourceError::Exhausted),
            }
        })
    }

    fn release(&mut self) {
        self.pending.clear();
    }
}

/// Hands out a fresh playback of the same log per session.
#[derive(Clone)]
pub struct ReplayProvider {
    log: Arc<ReplayLog>,
}

impl ReplayProvider {
    pub fn new(log: ReplayLog) -> Self {
        Self { log: Arc::new(log) }
    }
}

impl SourceProvider for ReplayProvider {
    fn acquire(&self, _config: &TrackerConfig) -> Result<Box<dyn SampleSource>, SourceError> {
        if self.log.polls.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "replay '{}' contains no polls",
                self.log.scenario_name
            )));
        }
        Ok(Box::new(ReplaySource::new(&self.log)))
    }
}
