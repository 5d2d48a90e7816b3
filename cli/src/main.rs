//! `objtrack` CLI: run simulated scenarios or recorded replays through the
//! tracker and report the resulting status.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sim::replay::{load_replay, save_replay, Recorder, ReplayProvider};
use sim::scenarios::ScenarioKind;
use sim::sensor_sim::SimulatedProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracker_core::{SourceProvider, Tracker, TrackerConfig, TrackerStatus};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "objtrack", about = "Multi-sensor object tracker CLI")]
struct Cli {
    /// Tracker configuration as JSON; omitted fields take defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a simulated scenario for a number of cycles.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of cycles to run
        #[arg(long, default_value_t = 50)]
        cycles: u64,
        /// Write the final status and objects to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Record the raw sample batches for later replay
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Replay a recorded log through the tracker.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Write the final status and objects to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            cycles,
            output,
            record,
        } => run_scenario(config, scenario, seed, cycles, output.as_deref(), record.as_deref()).await,
        Commands::Replay { input, output } => run_replay(config, &input, output.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    let Some(path) = path else {
        return Ok(TrackerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: TrackerConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

async fn run_scenario(
    config: TrackerConfig,
    kind: ScenarioKind,
    seed: u64,
    cycles: u64,
    output_path: Option<&Path>,
    record_path: Option<&Path>,
) -> Result<()> {
    let recorder = Recorder::new();
    let mut provider = SimulatedProvider::new(kind, seed);
    if record_path.is_some() {
        provider = provider.with_recorder(recorder.clone());
    }

    println!("Running scenario {kind:?} (seed={seed}, cycles={cycles})...");
    let name = format!("{kind:?}").to_lowercase();
    let period_ms = config.cycle_period.as_millis() as u64;
    let outcome = track(Arc::new(provider), config, cycles).await;

    if let Some(path) = record_path {
        let log = recorder.to_log(&name, seed, period_ms);
        save_replay(&log, path)?;
        println!("Replay saved to {} ({} polls)", path.display(), log.polls.len());
    }

    finish(&name, seed, outcome, output_path)
}

async fn run_replay(mut config: TrackerConfig, input: &Path, output_path: Option<&Path>) -> Result<()> {
    let log = load_replay(input).with_context(|| format!("loading replay {}", input.display()))?;
    println!(
        "Replaying '{}' ({} polls, {} samples)...",
        log.scenario_name,
        log.polls.len(),
        log.sample_count()
    );

    config.cycle_period = Duration::from_millis(log.cycle_period_ms);
    config.poll_timeout = config.poll_timeout.min(config.cycle_period);
    let cycles = log.polls.len() as u64;
    let name = log.scenario_name.clone();
    let seed = log.seed;

    let outcome = track(Arc::new(ReplayProvider::new(log)), config, cycles).await;
    finish(&name, seed, outcome, output_path)
}

struct RunOutcome {
    status: TrackerStatus,
    objects: Vec<tracker_core::DetectedObject>,
    shutdown: Result<tracker_core::ShutdownReport, tracker_core::TrackerError>,
}

/// Run the tracker for `cycles` periods, echoing every published batch.
async fn track(
    provider: Arc<dyn SourceProvider>,
    config: TrackerConfig,
    cycles: u64,
) -> Result<RunOutcome> {
    let period = config.cycle_period;
    let tracker = Tracker::new(provider);
    tracker.start(config).await?;

    let printer = tracker.feed().map(|feed| {
        tokio::spawn(async move {
            loop {
                let batch = feed.recv().await;
                info!(
                    event = "batch",
                    cycle = batch.cycle,
                    objects = batch.len(),
                    accepted = batch.accepted,
                    rejected = batch.rejected,
                );
            }
        })
    });

    // Half a period of slack so the last cycle lands before shutdown.
    let cycles = u32::try_from(cycles).unwrap_or(u32::MAX);
    tokio::time::sleep(period * cycles + period / 2).await;

    let status = tracker.status();
    let objects = tracker.objects().to_vec();
    let shutdown = tracker.shutdown().await;
    if let Some(printer) = printer {
        printer.abort();
    }

    Ok(RunOutcome {
        status,
        objects,
        shutdown,
    })
}

fn finish(name: &str, seed: u64, outcome: Result<RunOutcome>, output_path: Option<&Path>) -> Result<()> {
    let RunOutcome {
        status,
        objects,
        shutdown,
    } = outcome?;

    println!(
        "Done: {} cycles, {} failed, {} objects, {} history entries, {} batches dropped",
        status.cycle,
        status.failed_cycles,
        status.object_count,
        status.history_entry_count,
        status.dropped_batches,
    );
    if let Some(err) = &status.last_error {
        println!("Last source error: {err}");
    }

    let report = match &shutdown {
        Ok(report) => Some(report.clone()),
        Err(err) => {
            warn!(error = %err, "Tracking ended with an error");
            None
        }
    };

    if let Some(path) = output_path {
        let json = serde_json::json!({
            "scenario": name,
            "seed": seed,
            "status": status,
            "report": report,
            "objects": objects,
        });
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        println!("Status saved to {}", path.display());
    }

    shutdown.map(|_| ()).map_err(Into::into)
}
