//! Sample processing loop shared across all input modes.
//!
//! The source is read on its own task and forwarded over a channel, so a
//! sweep or snapshot tick never cancels a half-read line. The loop itself
//! selects over cancellation, incoming samples and the two timers.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::{Coordinator, PipelineError};
use super::source::{SampleEvent, SampleSource};
use crate::types::Sample;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub samples_routed: u64,
    pub samples_rejected: u64,
    pub sweeps: u64,
    pub snapshots: u64,
}

/// Owns the timers and the coordinator handle for one run.
pub struct ProcessingLoop {
    coordinator: Arc<Coordinator>,
    cancel_token: CancellationToken,
    sweep_interval: Duration,
    snapshot_interval: Duration,
    exit_on_eof: bool,
}

impl ProcessingLoop {
    pub fn new(
        coordinator: Arc<Coordinator>,
        cancel_token: CancellationToken,
        sweep_interval: Duration,
        snapshot_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            cancel_token,
            sweep_interval,
            snapshot_interval,
            exit_on_eof: false,
        }
    }

    /// Stop the loop when the source reaches EOF instead of idling until
    /// cancelled. Replays and tests use this.
    pub fn exit_on_eof(mut self, exit: bool) -> Self {
        self.exit_on_eof = exit;
        self
    }

    pub async fn run<S: SampleSource>(self, source: S) -> LoopStats {
        let source_name = source.source_name().to_string();
        info!(source = %source_name, "Processing loop started");

        let (tx, mut samples) = mpsc::channel::<Sample>(crate::config::defaults::WORKER_QUEUE_CAPACITY);
        let feeder = tokio::spawn(feed(source, tx, self.cancel_token.clone()));

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot = tokio::time::interval_at(
            tokio::time::Instant::now() + self.snapshot_interval,
            self.snapshot_interval,
        );
        snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = LoopStats::default();
        let mut source_open = true;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Processing loop cancelled");
                    break;
                }
                received = samples.recv(), if source_open => match received {
                    Some(sample) => match self.coordinator.route(sample).await {
                        Ok(()) => stats.samples_routed += 1,
                        Err(PipelineError::UnknownSensor(device)) => {
                            stats.samples_rejected += 1;
                            debug!(device = %device, "Dropping sample for unknown sensor");
                        }
                        Err(e) => {
                            stats.samples_rejected += 1;
                            warn!("Failed to route sample: {}", e);
                        }
                    },
                    None => {
                        source_open = false;
                        info!(source = %source_name, routed = stats.samples_routed, "Sample source finished");
                        if self.exit_on_eof {
                            break;
                        }
                    }
                },
                _ = sweep.tick() => {
                    self.coordinator.sweep().await;
                    stats.sweeps += 1;
                }
                _ = snapshot.tick() => {
                    self.coordinator.snapshot_all().await;
                    stats.snapshots += 1;
                }
            }
        }

        feeder.abort();
        info!(
            routed = stats.samples_routed,
            rejected = stats.samples_rejected,
            sweeps = stats.sweeps,
            snapshots = stats.snapshots,
            "Processing loop stopped"
        );
        stats
    }
}

/// Read the source until EOF, an error, or cancellation.
async fn feed<S: SampleSource>(mut source: S, tx: mpsc::Sender<Sample>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = source.next_sample() => event,
        };
        match event {
            Ok(SampleEvent::Sample(sample)) => {
                if tx.send(sample).await.is_err() {
                    return;
                }
            }
            Ok(SampleEvent::Eof) => return,
            Err(e) => {
                warn!(source = %source.source_name(), "Sample source failed: {:#}", e);
                return;
            }
        }
    }
}
