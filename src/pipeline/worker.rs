//! Per-equipment worker task.
//!
//! Each monitor lives on its own task and is driven through a bounded
//! command queue, so samples, sweeps, deferred checks and operator requests
//! for one piece of equipment are applied strictly in order. Deferred
//! checks are sleeping tasks that post back into the same queue.
//!
//! Monitors only ever see the service clock. A sample is restamped with the
//! receive time before it is ingested, so running edges, grace windows and
//! too-long timers are all measured on one time base whatever the source
//! put in the timestamp field.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::clock::Clock;
use super::dispatcher::Dispatcher;
use crate::monitor::{Deferred, DeferredKind, EquipmentKind, Monitor};
use crate::types::{Evaluation, Sample, StateSnapshot};

/// Sample timestamps further than this from the service clock are logged.
const SAMPLE_SKEW_LOG_SECS: i64 = 5;

/// Answer to a status query.
#[derive(Debug, Clone)]
pub struct EquipmentStatus {
    pub equipment_id: String,
    pub kind: EquipmentKind,
    pub enabled: bool,
    /// Current state of every dimension. Empty while disabled.
    pub evaluations: Vec<Evaluation>,
}

pub(crate) enum Command {
    Sample(Sample),
    /// Periodic transitions-only evaluation
    Sweep,
    Deferred {
        kind: DeferredKind,
        generation: u64,
    },
    Status {
        reply: oneshot::Sender<EquipmentStatus>,
    },
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<StateSnapshot>>,
    },
}

pub(crate) struct Worker {
    monitor: Box<dyn Monitor>,
    commands: mpsc::Receiver<Command>,
    /// Weak so that scheduled checks never keep the queue open
    requeue: mpsc::WeakSender<Command>,
    dispatcher: Arc<Dispatcher>,
    clock: Clock,
    cancel: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        monitor: Box<dyn Monitor>,
        commands: mpsc::Receiver<Command>,
        requeue: mpsc::WeakSender<Command>,
        dispatcher: Arc<Dispatcher>,
        clock: Clock,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            commands,
            requeue,
            dispatcher,
            clock,
            cancel,
        }
    }

    /// Process commands until the queue closes or the token is cancelled.
    pub(crate) async fn run(mut self) {
        debug!(equipment = %self.monitor.id(), kind = %self.monitor.kind(), "Worker started");
        loop {
            let command = tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(c) => c,
                    None => break,
                },
            };
            self.handle(command);
        }
        debug!(equipment = %self.monitor.id(), "Worker stopped");
    }

    fn handle(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Sample(mut sample) => {
                let skew = (sample.timestamp - now).num_seconds();
                if skew.abs() > SAMPLE_SKEW_LOG_SECS {
                    debug!(
                        equipment = %self.monitor.id(),
                        device = %sample.device_id,
                        skew_secs = skew,
                        "Restamping sample with the service clock"
                    );
                }
                sample.timestamp = now;
                for deferred in self.monitor.ingest(&sample) {
                    self.schedule(deferred);
                }
                let evaluations = self.monitor.evaluate(now, true);
                self.dispatcher.dispatch(&evaluations);
            }
            Command::Sweep => {
                let evaluations = self.monitor.evaluate(now, true);
                self.dispatcher.dispatch(&evaluations);
            }
            Command::Deferred { kind, generation } => {
                let evaluations = self.monitor.on_deferred(kind, generation, now);
                self.dispatcher.dispatch(&evaluations);
            }
            Command::Status { reply } => {
                let evaluations = self.monitor.evaluate(now, false);
                self.dispatcher.dispatch(&evaluations);
                let _ = reply.send(EquipmentStatus {
                    equipment_id: self.monitor.id().to_string(),
                    kind: self.monitor.kind(),
                    enabled: self.monitor.is_enabled(),
                    evaluations,
                });
            }
            Command::SetEnabled { enabled, reply } => {
                let record = self.monitor.set_enabled(enabled, now);
                if let Some(record) = &record {
                    info!(equipment = %self.monitor.id(), enabled, "{}", record.description);
                    self.dispatcher.persist_record(record);
                }
                let _ = reply.send(record.is_some());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.monitor.snapshot());
            }
        }
    }

    fn schedule(&self, deferred: Deferred) {
        let requeue = self.requeue.clone();
        let cancel = self.cancel.clone();
        debug!(
            equipment = %self.monitor.id(),
            kind = ?deferred.kind,
            generation = deferred.generation,
            delay_secs = deferred.delay.as_secs(),
            "Scheduling deferred check"
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deferred.delay) => {
                    if let Some(sender) = requeue.upgrade() {
                        let _ = sender
                            .send(Command::Deferred {
                                kind: deferred.kind,
                                generation: deferred.generation,
                            })
                            .await;
                    }
                }
            }
        });
    }
}
