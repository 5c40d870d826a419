//! Dispatch of evaluation results to the event log and the alarm sink.
//!
//! Every device worker shares one [`Dispatcher`]. For each committed
//! transition the log record is persisted first, then the alert goes through
//! the [`AlarmManager`] and any resulting action is delivered and recorded.
//! Storage failures are logged and never stop alarm delivery.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::alarms::{deliver, AlarmAction, AlarmManager, AlarmSink};
use crate::storage::EventLog;
use crate::types::{AlarmState, Evaluation, LogEventType, LogRecord, StateSnapshot};

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub transitions: u64,
    pub alarms_raised: u64,
    pub alarms_lowered: u64,
    pub persist_failures: u64,
}

pub struct Dispatcher {
    log: Arc<dyn EventLog>,
    sink: Arc<dyn AlarmSink>,
    alarms: Mutex<AlarmManager>,
    transitions: AtomicU64,
    raised: AtomicU64,
    lowered: AtomicU64,
    persist_failures: AtomicU64,
}

impl Dispatcher {
    pub fn new(log: Arc<dyn EventLog>, sink: Arc<dyn AlarmSink>) -> Self {
        Self {
            log,
            sink,
            alarms: Mutex::new(AlarmManager::new()),
            transitions: AtomicU64::new(0),
            raised: AtomicU64::new(0),
            lowered: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    fn manager(&self) -> MutexGuard<'_, AlarmManager> {
        self.alarms.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle the committed transitions in an evaluation batch.
    ///
    /// Non-transition entries (status queries) are ignored.
    pub fn dispatch(&self, evaluations: &[Evaluation]) {
        for eval in evaluations.iter().filter(|e| e.transition) {
            self.transitions.fetch_add(1, Ordering::Relaxed);
            debug!(
                equipment = %eval.equipment_id,
                dimension = %eval.dimension,
                state = %eval.state,
                "Transition"
            );

            if let Some(record) = &eval.log {
                self.persist_record(record);
            }

            if let Some(alert) = &eval.alert {
                let action = self.manager().apply(alert);
                if let Some(action) = action {
                    self.deliver(&action, alert.timestamp);
                }
            }
        }
    }

    /// Persist one log record; failures are counted and logged.
    pub fn persist_record(&self, record: &LogRecord) {
        if let Err(e) = self.log.log_event(record) {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                source = %record.source,
                event_type = %record.event_type,
                "Failed to persist event: {}",
                e
            );
        }
    }

    /// Persist a batch of raw-value snapshots taken at `at`.
    pub fn persist_snapshots(&self, snapshots: &[StateSnapshot], at: DateTime<Utc>) {
        let mut failed = 0u64;
        for snapshot in snapshots {
            if let Err(e) = self.log.log_state(snapshot, at) {
                failed += 1;
                debug!(source = %snapshot.source, "Failed to persist snapshot: {}", e);
            }
        }
        if failed > 0 {
            self.persist_failures.fetch_add(failed, Ordering::Relaxed);
            warn!(failed, total = snapshots.len(), "Some snapshots were not persisted");
        }
    }

    /// Drop snapshots older than `cutoff`. A failure is counted and the
    /// snapshots are retried on the next tick.
    pub fn prune_snapshots(&self, cutoff: DateTime<Utc>) {
        match self.log.prune_states_before(cutoff) {
            Ok(0) => {}
            Ok(deleted) => debug!(deleted, cutoff = %cutoff, "Pruned expired snapshots"),
            Err(e) => {
                self.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to prune snapshots: {}", e);
            }
        }
    }

    fn deliver(&self, action: &AlarmAction, at: DateTime<Utc>) {
        deliver(self.sink.as_ref(), action);
        match action {
            AlarmAction::Raise { .. } => self.raised.fetch_add(1, Ordering::Relaxed),
            AlarmAction::Lower { .. } => self.lowered.fetch_add(1, Ordering::Relaxed),
        };
        self.persist_record(&LogRecord::new(
            LogEventType::Alarm,
            action.device_id(),
            format!("{}: {}", action.state(), action.message()),
            at,
        ));
    }

    /// Raise a diagnostic alarm. Returns false when a test is already
    /// running for the device or `state` is `Off`.
    pub fn start_test_alarm(&self, device_id: &str, state: AlarmState, at: DateTime<Utc>) -> bool {
        let message = format!("Alarm test for {}", device_id);
        let action = self.manager().start_test(device_id, state, &message);
        match action {
            Some(action) => {
                info!(device = device_id, state = %state, "Alarm test started");
                self.deliver(&action, at);
                true
            }
            None => false,
        }
    }

    pub fn end_test_alarm(&self, device_id: &str, at: DateTime<Utc>) {
        let action = self.manager().end_test(device_id);
        if let Some(action) = action {
            info!(device = device_id, "Alarm test finished");
            self.deliver(&action, at);
        }
    }

    /// Raised alarms, most severe first.
    pub fn outstanding_alarms(&self) -> Vec<(String, AlarmState)> {
        self.manager().outstanding()
    }

    pub fn alarm_state(&self, device_id: &str) -> AlarmState {
        self.manager().state(device_id)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            transitions: self.transitions.load(Ordering::Relaxed),
            alarms_raised: self.raised.load(Ordering::Relaxed),
            alarms_lowered: self.lowered.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}
