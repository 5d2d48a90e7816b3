//! Integration tests for the tracking loop lifecycle.
//!
//! All tests run on a paused tokio clock, so cycle timing is exact:
//! with the default 100 ms period the n-th cycle runs at `n * 100 ms`.
//!
//! Run with: `cargo test -p tracker_core --test tracking_loop`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use sensor_models::SensorKind;
use tracker_core::{
    BoxFuture, Classification, ConfigError, FusionConfig, IdentityMode, LoopState, ObjectId,
    RawSample, SampleSource, ScriptedSource, SourceError, SourceProvider, StartOutcome, Tracker,
    TrackerConfig, TrackerError,
};

// ============================================================================
// Helpers
// ============================================================================

type Script = Vec<Result<Vec<RawSample>, SourceError>>;

#[derive(Default)]
struct Probe {
    acquired: AtomicUsize,
    released: AtomicUsize,
    polls: AtomicUsize,
}

impl Probe {
    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

struct TestProvider {
    script: Script,
    poll_delay: Option<Duration>,
    refuse: bool,
    probe: Arc<Probe>,
}

struct TestSource {
    inner: ScriptedSource,
    poll_delay: Option<Duration>,
    probe: Arc<Probe>,
}

impl SampleSource for TestSource {
    fn poll_samples(&mut self) -> BoxFuture<'_, Result<Vec<RawSample>, SourceError>> {
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        let delay = self.poll_delay;
        let next = self.inner.poll_samples();
        Box::pin(async move {
            if let Some(d) = delay {
                sleep(d).await;
            }
            next.await
        })
    }

    fn release(&mut self) {
        self.inner.release();
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl SourceProvider for TestProvider {
    fn acquire(&self, _config: &TrackerConfig) -> Result<Box<dyn SampleSource>, SourceError> {
        if self.refuse {
            return Err(SourceError::Unavailable("no sensor attached".into()));
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestSource {
            inner: ScriptedSource::new(self.script.clone(), true),
            poll_delay: self.poll_delay,
            probe: Arc::clone(&self.probe),
        }))
    }
}

fn tracker_with(script: Script) -> (Tracker, Arc<Probe>) {
    build(script, None, false)
}

fn build(script: Script, poll_delay: Option<Duration>, refuse: bool) -> (Tracker, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let provider = TestProvider {
        script,
        poll_delay,
        refuse,
        probe: Arc::clone(&probe),
    };
    (Tracker::new(Arc::new(provider)), probe)
}

fn sample(angle_deg: f64) -> RawSample {
    RawSample {
        sensor: SensorKind::Lidar,
        angle_deg,
        range_m: 45.0,
        height_m: 1.0,
        velocity: [0.0; 3],
        classification: Classification::Vehicle,
        confidence: 0.9,
    }
}

/// Twenty in-range samples spread 9° apart, all 45 m out.
fn twenty_samples() -> Vec<RawSample> {
    (0..20).map(|i| sample(i as f64 * 9.0)).collect()
}

/// Twenty in-range samples whose bearings and ranges change every cycle.
fn shuffled_samples(cycle: u64) -> Vec<RawSample> {
    (0..20u64)
        .map(|i| RawSample {
            range_m: 40.0 + ((i * 7 + cycle * 3) % 10) as f64,
            ..sample(((i * 37 + cycle * 53) % 180) as f64)
        })
        .collect()
}

fn sequential_ids() -> TrackerConfig {
    TrackerConfig {
        fusion: FusionConfig {
            identity: IdentityMode::Sequential,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn unavailable() -> Result<Vec<RawSample>, SourceError> {
    Err(SourceError::Unavailable("link down".into()))
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn twenty_samples_over_three_cycles() {
    let (tracker, probe) = tracker_with(vec![Ok(twenty_samples())]);

    let outcome = tracker.start(TrackerConfig::default()).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(tracker.state(), LoopState::Running);

    sleep(Duration::from_millis(350)).await;

    let status = tracker.status();
    assert!(status.tracking);
    assert_eq!(status.cycle, 3);
    assert_eq!(status.object_count, 20);
    assert_eq!(status.history_entry_count, 60);
    for id in 0..20 {
        let history = tracker.history(ObjectId(id)).unwrap();
        assert_eq!(history.len(), 3, "object {id}");
        let cycles: Vec<u64> = history.iter().map(|o| o.cycle).collect();
        assert_eq!(cycles, vec![0, 1, 2]);
    }

    tracker.shutdown().await.unwrap();
    assert_eq!(probe.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn sequential_ids_index_each_cycle_by_sample_order() {
    let script = (0..3).map(|c| Ok(shuffled_samples(c))).collect();
    let (tracker, _probe) = tracker_with(script);
    tracker.start(sequential_ids()).await.unwrap();
    sleep(Duration::from_millis(350)).await;

    let status = tracker.status();
    assert_eq!(status.cycle, 3);
    assert_eq!(status.object_count, 20);
    assert_eq!(status.tracked_ids, 20);
    assert_eq!(status.history_entry_count, 60);
    for id in 0..20u64 {
        let history = tracker.history(ObjectId(id)).unwrap();
        assert_eq!(history.len(), 3, "object {id}");
        for (cycle, entry) in history.iter().enumerate() {
            let expected = shuffled_samples(cycle as u64)[id as usize];
            let ground = entry.position[0].hypot(entry.position[1]);
            assert_eq!(entry.cycle, cycle as u64);
            assert!((ground - expected.range_m).abs() < 1e-9);
        }
    }
    tracker.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_never_mixes_cycles() {
    let (tracker, _probe) = tracker_with(vec![Ok(twenty_samples())]);
    let tracker = Arc::new(tracker);
    let config = TrackerConfig {
        cycle_period: Duration::from_millis(1),
        poll_timeout: Duration::from_millis(1),
        ..sequential_ids()
    };
    let window = config.history_window as u64;
    tracker.start(config).await.unwrap();

    let reader = {
        let tracker = Arc::clone(&tracker);
        std::thread::spawn(move || {
            let mut last_cycle = 0;
            for _ in 0..20_000 {
                let status = tracker.status();
                let seen = status.cycle.min(window);
                let per_cycle = if status.cycle == 0 { 0 } else { 20 };
                assert_eq!(status.history_entry_count as u64, 20 * seen, "{status:?}");
                assert_eq!(status.object_count, per_cycle, "{status:?}");
                assert_eq!(status.tracked_ids, per_cycle, "{status:?}");
                assert!(status.cycle >= last_cycle);
                last_cycle = status.cycle;
            }
        })
    };
    tokio::task::spawn_blocking(move || reader.join())
        .await
        .unwrap()
        .unwrap();
    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn nearest_before_first_cycle_is_empty() {
    let (tracker, _probe) = tracker_with(vec![Ok(twenty_samples())]);
    assert!(tracker.nearest_objects([0.0, 0.0, 0.0], 5).is_empty());

    tracker.start(TrackerConfig::default()).await.unwrap();
    assert!(tracker.nearest_objects([0.0, 0.0, 0.0], 5).is_empty());

    sleep(Duration::from_millis(150)).await;
    assert_eq!(tracker.nearest_objects([0.0, 0.0, 0.0], 5).len(), 5);
    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn nearest_orders_by_distance() {
    let (tracker, _probe) = tracker_with(vec![Ok(twenty_samples())]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(150)).await;

    // Closest to the sample at 0°, then its neighbour at 9°, then 18°.
    let query = [45.0, 0.0, 1.0];
    let hits = tracker.nearest_objects(query, 3);
    let ids: Vec<u64> = hits.iter().map(|o| o.id.0).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let all = tracker.nearest_objects(query, 100);
    assert_eq!(all.len(), 20);
    let dist = |p: [f64; 3]| {
        ((p[0] - query[0]).powi(2) + (p[1] - query[1]).powi(2) + (p[2] - query[2]).powi(2)).sqrt()
    };
    for pair in all.windows(2) {
        assert!(dist(pair[0].position) <= dist(pair[1].position));
    }
    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_start_is_ignored() {
    let (tracker, probe) = tracker_with(vec![Ok(twenty_samples())]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(150)).await;
    let before = tracker.status();

    let changed = TrackerConfig {
        history_window: 5,
        ..Default::default()
    };
    let outcome = tracker.start(changed).await.unwrap();
    assert_eq!(outcome, StartOutcome::AlreadyRunning);

    let after = tracker.status();
    assert_eq!(after.cycle, before.cycle);
    assert_eq!(after.object_count, before.object_count);
    assert_eq!(tracker.session().unwrap().config().history_window, 100);
    assert_eq!(probe.acquired(), 1);
    assert_eq!(probe.released(), 0);

    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn no_cycles_after_shutdown() {
    let (tracker, probe) = tracker_with(vec![Ok(twenty_samples())]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(250)).await;

    let report = tracker.shutdown().await.unwrap();
    assert_eq!(report.cycles, 2);
    assert_eq!(report.object_count, 20);
    assert_eq!(tracker.state(), LoopState::Idle);
    let polls = probe.polls();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(probe.polls(), polls);
    assert_eq!(tracker.status().cycle, 2);
    assert!(!tracker.status().tracking);
    assert_eq!(probe.released(), 1);

    // Session stays readable, and a second shutdown is a no-op.
    assert_eq!(tracker.history(ObjectId(0)).unwrap().len(), 2);
    tracker.shutdown().await.unwrap();
    assert_eq!(probe.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_pending_poll() {
    let (tracker, probe) = build(
        vec![Ok(twenty_samples())],
        Some(Duration::from_secs(10)),
        false,
    );
    let config = TrackerConfig {
        poll_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    tracker.start(config).await.unwrap();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(probe.polls(), 1);

    let report = tracker.shutdown().await.unwrap();
    assert_eq!(report.cycles, 0);
    assert_eq!(probe.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_session() {
    let (tracker, probe) = tracker_with(vec![Ok(twenty_samples())]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(250)).await;
    tracker.shutdown().await.unwrap();

    tracker.start(TrackerConfig::default()).await.unwrap();
    assert_eq!(tracker.status().cycle, 0);
    assert!(tracker.history(ObjectId(0)).is_none());
    sleep(Duration::from_millis(150)).await;
    assert_eq!(tracker.history(ObjectId(0)).unwrap().len(), 1);

    tracker.shutdown().await.unwrap();
    assert_eq!(probe.acquired(), 2);
    assert_eq!(probe.released(), 2);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn invalid_config_leaves_tracker_idle() {
    let (tracker, probe) = tracker_with(vec![Ok(twenty_samples())]);
    let config = TrackerConfig {
        history_window: 0,
        ..Default::default()
    };
    let err = tracker.start(config).await.unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Configuration(ConfigError::ZeroHistoryWindow)
    ));
    assert_eq!(tracker.state(), LoopState::Idle);
    assert!(tracker.session().is_none());
    assert_eq!(probe.acquired(), 0);
}

#[tokio::test(start_paused = true)]
async fn unavailable_source_fails_start() {
    let (tracker, _probe) = build(vec![], None, true);
    let err = tracker.start(TrackerConfig::default()).await.unwrap_err();
    assert!(matches!(err, TrackerError::SourceUnavailable(_)));
    assert_eq!(tracker.state(), LoopState::Idle);
    assert!(!tracker.status().tracking);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let (tracker, _probe) = tracker_with(vec![
        unavailable(),
        Ok(twenty_samples()),
        unavailable(),
        Ok(twenty_samples()),
    ]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(450)).await;

    let status = tracker.status();
    assert_eq!(status.state, LoopState::Running);
    assert_eq!(status.cycle, 2);
    assert_eq!(status.failed_cycles, 2);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_error.unwrap().contains("link down"));
    // Identity survives the failed cycle in between.
    assert_eq!(tracker.history(ObjectId(19)).unwrap().len(), 2);

    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_stop_the_loop() {
    let (tracker, probe) = tracker_with(vec![unavailable()]);
    let config = TrackerConfig {
        failure_threshold: 3,
        ..Default::default()
    };
    tracker.start(config).await.unwrap();
    sleep(Duration::from_millis(350)).await;

    let status = tracker.status();
    assert_eq!(status.state, LoopState::Idle);
    assert!(!status.tracking);
    assert_eq!(status.consecutive_failures, 3);
    assert!(status.last_error.is_some());
    assert_eq!(probe.released(), 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(probe.polls(), 3);

    match tracker.shutdown().await {
        Err(TrackerError::SourceFailed { consecutive, last }) => {
            assert_eq!(consecutive, 3);
            assert_eq!(last, SourceError::Unavailable("link down".into()));
        }
        other => panic!("expected SourceFailed, got {other:?}"),
    }
    assert_eq!(probe.released(), 1);

    // The tracker can be started again afterwards.
    assert_eq!(
        tracker.start(TrackerConfig::default()).await.unwrap(),
        StartOutcome::Started
    );
    tracker.shutdown().await.ok();
}

#[tokio::test(start_paused = true)]
async fn slow_polls_time_out() {
    let (tracker, _probe) = build(
        vec![Ok(twenty_samples())],
        Some(Duration::from_millis(500)),
        false,
    );
    let config = TrackerConfig {
        failure_threshold: 2,
        ..Default::default()
    };
    tracker.start(config).await.unwrap();
    sleep(Duration::from_millis(400)).await;

    match tracker.shutdown().await {
        Err(TrackerError::SourceFailed { last, .. }) => {
            assert_eq!(last, SourceError::Timeout(Duration::from_millis(80)));
        }
        other => panic!("expected timeout escalation, got {other:?}"),
    }
    assert_eq!(tracker.status().cycle, 0);
}

// ============================================================================
// Identity and feed
// ============================================================================

#[tokio::test(start_paused = true)]
async fn ids_follow_objects_when_report_order_changes() {
    let forward = twenty_samples();
    let mut reversed = forward.clone();
    reversed.reverse();
    let (tracker, _probe) = tracker_with(vec![Ok(forward), Ok(reversed)]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(250)).await;

    for id in 0..20 {
        let history = tracker.history(ObjectId(id)).unwrap();
        assert_eq!(history.len(), 2);
        let (a, b) = (history[0].position, history[1].position);
        assert!((a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9);
    }
    assert_eq!(tracker.status().tracked_ids, 20);
    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn feed_keeps_newest_batches() {
    let (tracker, _probe) = tracker_with(vec![Ok(twenty_samples())]);
    let config = TrackerConfig {
        feed_capacity: 2,
        ..Default::default()
    };
    tracker.start(config).await.unwrap();
    sleep(Duration::from_millis(550)).await;

    let feed = tracker.feed().unwrap();
    assert_eq!(tracker.status().queued_batches, 2);
    assert_eq!(feed.dropped(), 3);
    let cycles: Vec<u64> = feed.drain().iter().map(|b| b.cycle).collect();
    assert_eq!(cycles, vec![3, 4]);

    let next = feed.recv().await;
    assert_eq!(next.cycle, 5);
    assert_eq!(next.len(), 20);
    assert_eq!(next.accepted, 20);
    tracker.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn out_of_range_samples_do_not_fail_cycles() {
    let mut batch = twenty_samples();
    batch.push(RawSample {
        range_m: 5.0,
        ..sample(90.0)
    });
    batch.push(RawSample {
        angle_deg: 270.0,
        ..sample(0.0)
    });
    let (tracker, _probe) = tracker_with(vec![Ok(batch)]);
    tracker.start(TrackerConfig::default()).await.unwrap();
    sleep(Duration::from_millis(150)).await;

    let status = tracker.status();
    assert_eq!(status.object_count, 20);
    assert_eq!(status.failed_cycles, 0);
    let snapshot = tracker.session().unwrap().load();
    assert_eq!(snapshot.samples_rejected, 2);
    tracker.shutdown().await.unwrap();
}
