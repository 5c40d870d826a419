//! Startup history replay.
//!
//! Monitors are hydrated from the event log before they see a sample, so a
//! restart continues from the last known on/off and enable/disable state
//! instead of fabricating transitions.

use chrono::{DateTime, Utc};

use crate::storage::{EventLog, StorageError};
use crate::types::LogEventType;

/// On/off edges and the enable flag reconstructed for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayedHistory {
    pub last_on: Option<DateTime<Utc>>,
    pub last_off: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl Default for ReplayedHistory {
    fn default() -> Self {
        Self {
            last_on: None,
            last_off: None,
            enabled: true,
        }
    }
}

impl ReplayedHistory {
    /// Replay the audit log for `device_id`.
    ///
    /// `last_off` is the latest `Off` event. `last_on` is the first `On`
    /// after it: a reconnecting device re-emits `On` while already running,
    /// so the latest `On` is not when it actually started. The enable flag
    /// follows whichever of `Enable`/`Disable` is newer, defaulting to
    /// enabled.
    pub fn replay(log: &dyn EventLog, device_id: &str) -> Result<Self, StorageError> {
        let last_off = log
            .latest_event(LogEventType::Off, device_id)?
            .map(|e| e.created);
        let last_on = log
            .first_event_after(LogEventType::On, device_id, last_off)?
            .map(|e| e.created);

        let enabled_at = log
            .latest_event(LogEventType::Enable, device_id)?
            .map(|e| e.created);
        let disabled_at = log
            .latest_event(LogEventType::Disable, device_id)?
            .map(|e| e.created);
        let enabled = match (enabled_at, disabled_at) {
            (Some(en), Some(dis)) => en >= dis,
            (None, Some(_)) => false,
            _ => true,
        };

        tracing::debug!(
            device = device_id,
            last_on = ?last_on,
            last_off = ?last_off,
            enabled,
            "Replayed device history"
        );

        Ok(Self {
            last_on,
            last_off,
            enabled,
        })
    }
}
