//! EventLog trait - pluggable storage backend for the audit log
//!
//! Abstracts event and snapshot persistence so the pipeline does not care
//! where records end up:
//! - `InMemoryEventLog`: in-memory store for testing and `--ephemeral` runs
//! - `SledEventLog`: the on-disk store used by the service

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::defaults::{IN_MEMORY_MAX_EVENTS, IN_MEMORY_MAX_STATES};
use crate::types::{EventRecord, LogEventType, LogRecord, StateRecord, StateSnapshot};

/// Trait for pluggable event log backends
///
/// Implementations must be thread-safe (Send + Sync); every device worker
/// shares the same log.
pub trait EventLog: Send + Sync {
    /// Persist a log record, returning the stored event.
    fn log_event(&self, record: &LogRecord) -> Result<EventRecord, StorageError>;

    /// Most recent event of a type for a source.
    fn latest_event(
        &self,
        event_type: LogEventType,
        source: &str,
    ) -> Result<Option<EventRecord>, StorageError>;

    /// Earliest event of a type for a source strictly after `after`
    /// (or the earliest ever when `after` is `None`).
    fn first_event_after(
        &self,
        event_type: LogEventType,
        source: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Option<EventRecord>, StorageError>;

    /// Most recent events across all sources, newest first.
    fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError>;

    /// Persist a raw-value snapshot.
    fn log_state(&self, snapshot: &StateSnapshot, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Most recent snapshots, newest first.
    fn recent_states(&self, limit: usize) -> Result<Vec<StateRecord>, StorageError>;

    /// Delete snapshots taken before `cutoff`, returning how many went.
    ///
    /// Audit events are never pruned: startup replay depends on them.
    fn prune_states_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// In-memory event log for testing and ephemeral deployments
///
/// Thread-safe via `RwLock`. Not durable: history is lost on restart, so
/// every device starts enabled and stopped.
pub struct InMemoryEventLog {
    events: RwLock<VecDeque<EventRecord>>,
    states: RwLock<VecDeque<StateRecord>>,
    next_id: AtomicU64,
    max_events: usize,
    max_states: usize,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            states: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            max_events: IN_MEMORY_MAX_EVENTS,
            max_states: IN_MEMORY_MAX_STATES,
        }
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    /// All stored events of a type for a source, oldest first.
    pub fn events_for(&self, event_type: LogEventType, source: &str) -> Vec<EventRecord> {
        match self.events.read() {
            Ok(store) => store
                .iter()
                .filter(|e| e.event_type == event_type && e.source == source)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for InMemoryEventLog {
    fn log_event(&self, record: &LogRecord) -> Result<EventRecord, StorageError> {
        let mut store = self
            .events
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        let event = EventRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            event_type: record.event_type,
            source: record.source.clone(),
            description: record.description.clone(),
            created: record.timestamp,
        };
        store.push_back(event.clone());

        // Evict oldest if over limit
        if store.len() > self.max_events {
            store.pop_front();
        }

        Ok(event)
    }

    fn latest_event(
        &self,
        event_type: LogEventType,
        source: &str,
    ) -> Result<Option<EventRecord>, StorageError> {
        let store = self
            .events
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        Ok(store
            .iter()
            .filter(|e| e.event_type == event_type && e.source == source)
            .max_by_key(|e| (e.created, e.id))
            .cloned())
    }

    fn first_event_after(
        &self,
        event_type: LogEventType,
        source: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Option<EventRecord>, StorageError> {
        let store = self
            .events
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        Ok(store
            .iter()
            .filter(|e| e.event_type == event_type && e.source == source)
            .filter(|e| after.map_or(true, |a| e.created > a))
            .min_by_key(|e| (e.created, e.id))
            .cloned())
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
        let store = self
            .events
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        let mut events: Vec<EventRecord> = store.iter().cloned().collect();
        events.sort_by_key(|e| std::cmp::Reverse((e.created, e.id)));
        events.truncate(limit);
        Ok(events)
    }

    fn log_state(&self, snapshot: &StateSnapshot, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut store = self
            .states
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        store.push_back(StateRecord {
            snapshot: snapshot.clone(),
            created: at,
        });

        if store.len() > self.max_states {
            store.pop_front();
        }

        Ok(())
    }

    fn recent_states(&self, limit: usize) -> Result<Vec<StateRecord>, StorageError> {
        let store = self
            .states
            .read()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        Ok(store.iter().rev().take(limit).cloned().collect())
    }

    fn prune_states_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut store = self
            .states
            .write()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;

        let before = store.len();
        store.retain(|record| record.created >= cutoff);
        Ok(before - store.len())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
