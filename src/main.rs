//! Engine Room monitor service
//!
//! Reads sensor samples from the hardware bridge (JSON lines on stdin or a
//! recorded feed), runs one monitor per configured engine, pump and tank,
//! and raises alarms on debounced health transitions.
//!
//! ## Usage
//!
//! ```bash
//! # Live feed from the bridge
//! bridge-dump | engine-room --stdin
//!
//! # Replay a recorded feed, 100 ms between samples, without touching ./data
//! engine-room --input feed.jsonl --speed-ms 100 --ephemeral
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use engine_room::alarms::TracingAlarmSink;
use engine_room::config::defaults::ALARM_TEST_DURATION_SECS;
use engine_room::config::ServiceConfig;
use engine_room::monitor::build_monitors;
use engine_room::pipeline::{
    Clock, Coordinator, Dispatcher, JsonLinesSource, ProcessingLoop, SampleSource, VecSource,
};
use engine_room::storage::{EventLog, InMemoryEventLog, ProcessLock, SledEventLog};
use engine_room::types::AlarmState;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "engine-room")]
#[command(about = "Engine room equipment health monitor")]
#[command(version)]
struct CliArgs {
    /// Service configuration file. Overrides ENGINE_ROOM_CONFIG and
    /// ./engine_room.toml; any error in it is fatal.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Replay samples from a JSON-lines file, then exit
    #[arg(long, value_name = "PATH", conflicts_with = "stdin")]
    input: Option<PathBuf>,

    /// Read JSON-lines samples from stdin
    /// Use with the bridge: bridge-dump | ./engine-room --stdin
    #[arg(long)]
    stdin: bool,

    /// Delay between replayed samples in milliseconds (0 = no delay)
    #[arg(long, default_value = "0")]
    speed_ms: u64,

    /// Override the data directory from the config
    #[arg(long, value_name = "DIR", env = "ENGINE_ROOM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Keep the event log in memory only (history starts empty)
    #[arg(long)]
    ephemeral: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Raise a test alarm on a device at startup; it is lowered again
    /// after a few seconds
    #[arg(long, value_name = "DEVICE")]
    test_alarm: Option<String>,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    SampleProcessor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::SampleProcessor => write!(f, "SampleProcessor"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load_from_file(path)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?,
        None => ServiceConfig::load(),
    };
    if let Some(dir) = &args.data_dir {
        config.service.data_dir = dir.clone();
    }
    // Defaults and env-loaded files were validated on load; this catches
    // the fallback-to-defaults path too.
    config.validate().context("Invalid service configuration")?;
    Ok(config)
}

/// Open the event log. The sled handle is returned separately so it can be
/// flushed at shutdown.
fn open_storage(
    config: &ServiceConfig,
    ephemeral: bool,
) -> Result<(Arc<dyn EventLog>, Option<Arc<SledEventLog>>, Option<ProcessLock>)> {
    if ephemeral {
        info!("Storage: in-memory (history starts empty)");
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
        return Ok((log, None, None));
    }

    let data_dir = &config.service.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let lock = ProcessLock::acquire(data_dir)?;
    let path = data_dir.join("events.db");
    let sled = Arc::new(
        SledEventLog::open(&path).with_context(|| format!("Failed to open event log {}", path.display()))?,
    );
    info!(path = %path.display(), events = sled.event_count(), "Storage: sled");
    let log: Arc<dyn EventLog> = sled.clone();
    Ok((log, Some(sled), Some(lock)))
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the processing loop observe cancellation and exit.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Err(e)) = result {
            warn!("Task finished with error during shutdown: {}", e);
        }
    }
    Ok(())
}

fn spawn_processor<S: SampleSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    processing_loop: ProcessingLoop,
    source: S,
) {
    task_set.spawn(async move {
        processing_loop.run(source).await;
        Ok(TaskName::SampleProcessor)
    });
}

// ============================================================================
// Shutdown Report
// ============================================================================

async fn report_status(coordinator: &Coordinator) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Equipment status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for status in coordinator.status_all().await {
        if !status.enabled {
            info!("  {} ({}): disabled", status.equipment_id, status.kind);
            continue;
        }
        let states: Vec<String> = status
            .evaluations
            .iter()
            .map(|e| format!("{}={}", e.dimension, e.state))
            .collect();
        info!("  {} ({}): {}", status.equipment_id, status.kind, states.join(" "));
    }

    let alarms = coordinator.dispatcher().outstanding_alarms();
    if alarms.is_empty() {
        info!("  No outstanding alarms");
    } else {
        for (device, state) in alarms {
            warn!("  Outstanding alarm: {} {}", device, state);
        }
    }

    let stats = coordinator.dispatcher().stats();
    info!(
        transitions = stats.transitions,
        raised = stats.alarms_raised,
        lowered = stats.alarms_lowered,
        persist_failures = stats.persist_failures,
        "Dispatch totals"
    );
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let service_config = load_config(&args)?;
    info!(
        "Service: {} | engines: {} | pumps: {} | tanks: {}",
        service_config.service.name,
        service_config.engines.len(),
        service_config.pumps.len(),
        service_config.tanks.len()
    );

    let (event_log, sled, _lock) = open_storage(&service_config, args.ephemeral)?;

    let clock = Clock::new();
    let monitors = build_monitors(&service_config, event_log.as_ref(), clock.now())
        .context("Failed to build equipment monitors")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&event_log), Arc::new(TracingAlarmSink)));
    let coordinator = Arc::new(Coordinator::start(
        monitors,
        &service_config,
        dispatcher,
        clock,
        CancellationToken::new(),
    ));

    if let Some(device) = &args.test_alarm {
        let duration = Duration::from_secs(ALARM_TEST_DURATION_SECS);
        if !coordinator.test_alarm(device, AlarmState::Moderate, duration) {
            warn!(device = %device, "Alarm test already running");
        }
    }

    let processing_loop = ProcessingLoop::new(
        Arc::clone(&coordinator),
        cancel_token.clone(),
        service_config.timing.sweep_interval(),
        service_config.timing.snapshot_interval(),
    );

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    if let Some(path) = &args.input {
        info!(path = %path.display(), delay_ms = args.speed_ms, "Input: recorded feed");
        let source = JsonLinesSource::open(path, clock, args.speed_ms).await?;
        spawn_processor(&mut task_set, processing_loop.exit_on_eof(true), source);
    } else if args.stdin {
        info!("Input: stdin (JSON lines from the bridge)");
        spawn_processor(&mut task_set, processing_loop, JsonLinesSource::stdin(clock));
    } else {
        info!("Input: none (sweeps and snapshots only)");
        spawn_processor(&mut task_set, processing_loop, VecSource::new(Vec::new(), 0));
    }

    let result = run_supervisor(&mut task_set, cancel_token.clone()).await;

    report_status(&coordinator).await;
    coordinator.shutdown().await;
    if let Some(sled) = sled {
        if let Err(e) = sled.flush() {
            warn!("Failed to flush event log: {}", e);
        }
    }

    info!("Engine room monitor shutdown complete");
    result
}
