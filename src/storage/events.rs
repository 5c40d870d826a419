//! Sled-backed event log
//!
//! Two trees: `events` (audit log records) and `states` (raw value
//! snapshots). Keys are the record timestamp in big-endian nanoseconds
//! followed by a sled-generated id, so iteration order is chronological and
//! keys never collide.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use super::persistence::{EventLog, StorageError};
use crate::types::{EventRecord, LogEventType, LogRecord, StateRecord, StateSnapshot};

/// Durable event log in the service data directory.
#[derive(Clone)]
pub struct SledEventLog {
    db: Arc<sled::Db>,
    events: sled::Tree,
    states: sled::Tree,
}

impl SledEventLog {
    /// Open or create the event log at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let events = db.open_tree("events")?;
        let states = db.open_tree("states")?;
        Ok(Self {
            db: Arc::new(db),
            events,
            states,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get total number of stored events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn key(&self, at: DateTime<Utc>) -> Result<([u8; 16], u64), StorageError> {
        let id = self.db.generate_id()?;
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&key_prefix(at));
        key[8..].copy_from_slice(&id.to_be_bytes());
        Ok((key, id))
    }

    fn decode_event(value: &[u8]) -> Option<EventRecord> {
        match serde_json::from_slice::<EventRecord>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable event record");
                None
            }
        }
    }
}

/// Big-endian nanosecond timestamp; pre-epoch times clamp to zero.
fn key_prefix(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp().saturating_mul(1_000_000_000));
    u64::try_from(nanos).unwrap_or(0).to_be_bytes()
}

impl EventLog for SledEventLog {
    fn log_event(&self, record: &LogRecord) -> Result<EventRecord, StorageError> {
        let (key, id) = self.key(record.timestamp)?;
        let event = EventRecord {
            id,
            event_type: record.event_type,
            source: record.source.clone(),
            description: record.description.clone(),
            created: record.timestamp,
        };
        self.events.insert(key, serde_json::to_vec(&event)?)?;
        Ok(event)
    }

    fn latest_event(
        &self,
        event_type: LogEventType,
        source: &str,
    ) -> Result<Option<EventRecord>, StorageError> {
        for item in self.events.iter().rev() {
            let (_key, value) = item?;
            if let Some(event) = Self::decode_event(&value) {
                if event.event_type == event_type && event.source == source {
                    return Ok(Some(event));
                }
            }
        }
        Ok(None)
    }

    fn first_event_after(
        &self,
        event_type: LogEventType,
        source: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Option<EventRecord>, StorageError> {
        let start = after.map(key_prefix).unwrap_or([0u8; 8]);
        for item in self.events.range(start.to_vec()..) {
            let (_key, value) = item?;
            if let Some(event) = Self::decode_event(&value) {
                let is_after = after.map_or(true, |a| event.created > a);
                if is_after && event.event_type == event_type && event.source == source {
                    return Ok(Some(event));
                }
            }
        }
        Ok(None)
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
        let mut events = Vec::with_capacity(limit);
        for item in self.events.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Some(event) = Self::decode_event(&value) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Snapshots are not flushed on each write; sled flushes in the
    /// background and losing the last few snapshots on a crash is harmless.
    fn log_state(&self, snapshot: &StateSnapshot, at: DateTime<Utc>) -> Result<(), StorageError> {
        let (key, _id) = self.key(at)?;
        let record = StateRecord {
            snapshot: snapshot.clone(),
            created: at,
        };
        self.states.insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    fn recent_states(&self, limit: usize) -> Result<Vec<StateRecord>, StorageError> {
        let mut states = Vec::with_capacity(limit);
        for item in self.states.iter().rev() {
            if states.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Ok(record) = serde_json::from_slice::<StateRecord>(&value) {
                states.push(record);
            }
        }
        Ok(states)
    }

    fn prune_states_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let end = key_prefix(cutoff);
        let keys: Vec<_> = self
            .states
            .range(..end.to_vec())
            .filter_map(|item| item.ok().map(|(k, _)| k))
            .collect();
        for key in &keys {
            self.states.remove(key)?;
        }
        Ok(keys.len())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_latest_and_first_after() {
        let dir = tempdir().unwrap();
        let log = SledEventLog::open(dir.path().join("events.db")).unwrap();

        log.log_event(&LogRecord::new(LogEventType::Off, "pmp_clp", "off", at(5))).unwrap();
        log.log_event(&LogRecord::new(LogEventType::On, "pmp_clp", "on", at(10))).unwrap();
        log.log_event(&LogRecord::new(LogEventType::On, "pmp_clp", "reconnect", at(20))).unwrap();
        log.log_event(&LogRecord::new(LogEventType::On, "pmp_sol", "on", at(25))).unwrap();

        let latest = log.latest_event(LogEventType::On, "pmp_clp").unwrap().unwrap();
        assert_eq!(latest.created, at(20));

        let first = log
            .first_event_after(LogEventType::On, "pmp_clp", Some(at(5)))
            .unwrap()
            .unwrap();
        assert_eq!(first.created, at(10));
        assert_eq!(first.description, "on");
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.db");
        {
            let log = SledEventLog::open(&path).unwrap();
            log.log_event(&LogRecord::new(LogEventType::Disable, "gs1", "disable", at(1)))
                .unwrap();
            log.flush().unwrap();
        }
        let log = SledEventLog::open(&path).unwrap();
        assert_eq!(log.event_count(), 1);
        assert!(log.latest_event(LogEventType::Disable, "gs1").unwrap().is_some());
    }

    #[test]
    fn test_prune_states_leaves_audit_log() {
        let dir = tempdir().unwrap();
        let log = SledEventLog::open(dir.path().join("events.db")).unwrap();
        log.log_event(&LogRecord::new(LogEventType::On, "gs1", "started", at(0))).unwrap();
        let snapshot = StateSnapshot {
            source: "gs1_rpm".into(),
            name: "RPM".into(),
            value: 1500.0,
            description: None,
        };
        log.log_state(&snapshot, at(1)).unwrap();
        log.log_state(&snapshot, at(100)).unwrap();

        assert_eq!(log.prune_states_before(at(50)).unwrap(), 1);
        let states = log.recent_states(10).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].created, at(100));
        assert_eq!(log.event_count(), 1);
        assert!(log.latest_event(LogEventType::On, "gs1").unwrap().is_some());
    }
}
