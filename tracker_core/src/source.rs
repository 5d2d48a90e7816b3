//! Sensor source seam.
//!
//! A [`SourceProvider`] hands out one [`SampleSource`] per tracking session.
//! The loop task owns the source exclusively, polls it once per cycle and
//! calls [`SampleSource::release`] exactly once when the session ends.

use crate::{config::TrackerConfig, error::SourceError, types::RawSample};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

/// Boxed future so the traits stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A live connection to the camera/LIDAR front-end.
pub trait SampleSource: Send + 'static {
    /// Fetch every raw sample observed since the previous poll.
    ///
    /// The returned future may be dropped unpolled when the session is
    /// cancelled; implementations should consume data only once polled.
    fn poll_samples(&mut self) -> BoxFuture<'_, Result<Vec<RawSample>, SourceError>>;

    /// Give the underlying sensors back. Called once, after the last poll.
    fn release(&mut self);
}

/// Factory for sample sources, shared by the tracker across sessions.
pub trait SourceProvider: Send + Sync + 'static {
    fn acquire(&self, config: &TrackerConfig) -> Result<Box<dyn SampleSource>, SourceError>;
}

/// Source that plays back a fixed list of per-cycle results.
///
/// With `repeat` set the script loops forever; otherwise polling past the
/// end yields [`SourceError::Exhausted`].
pub struct ScriptedSource {
    script: Vec<Result<Vec<RawSample>, SourceError>>,
    pending: VecDeque<Result<Vec<RawSample>, SourceError>>,
    repeat: bool,
    released: bool,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<RawSample>, SourceError>>, repeat: bool) -> Self {
        Self {
            pending: script.iter().cloned().collect(),
            script,
            repeat,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl SampleSource for ScriptedSource {
    fn poll_samples(&mut self) -> BoxFuture<'_, Result<Vec<RawSample>, SourceError>> {
        Box::pin(async move {
            if self.pending.is_empty() && self.repeat {
                self.pending.extend(self.script.iter().cloned());
            }
            self.pending.pop_front().unwrap_or(Err(SourceError::Exhausted))
        })
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_runs_out() {
        let mut src = ScriptedSource::new(vec![Ok(vec![]), Err(SourceError::Unavailable("x".into()))], false);
        assert_eq!(src.poll_samples().await, Ok(vec![]));
        assert!(src.poll_samples().await.is_err());
        assert_eq!(src.poll_samples().await, Err(SourceError::Exhausted));
    }

    #[tokio::test]
    async fn repeating_script_loops() {
        let mut src = ScriptedSource::new(vec![Ok(vec![]), Err(SourceError::Exhausted)], true);
        for _ in 0..3 {
            assert!(src.poll_samples().await.is_ok());
            assert!(src.poll_samples().await.is_err());
        }
        src.release();
        assert!(src.is_released());
    }

    #[tokio::test]
    async fn dropped_poll_keeps_script_position() {
        let mut src = ScriptedSource::new(vec![Ok(vec![]), Err(SourceError::Exhausted)], false);
        drop(src.poll_samples());
        assert_eq!(src.poll_samples().await, Ok(vec![]));
    }
}
