//! Audit log records and evaluation outputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AlertEvent;

/// Kind of an audit log event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogEventType {
    On,
    Off,
    Enable,
    Disable,
    StateChange,
    Alarm,
}

impl std::fmt::Display for LogEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEventType::On => write!(f, "ON"),
            LogEventType::Off => write!(f, "OFF"),
            LogEventType::Enable => write!(f, "ENABLE"),
            LogEventType::Disable => write!(f, "DISABLE"),
            LogEventType::StateChange => write!(f, "STATE_CHANGE"),
            LogEventType::Alarm => write!(f, "ALARM"),
        }
    }
}

/// A log record handed to the event log.
///
/// `timestamp` is when the condition happened, which is what history replay
/// reads back, not when the record reached storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub event_type: LogEventType,
    pub source: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        event_type: LogEventType,
        source: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            source: source.into(),
            description: description.into(),
            timestamp,
        }
    }
}

/// A persisted log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub id: u64,
    pub event_type: LogEventType,
    pub source: String,
    pub description: String,
    pub created: DateTime<Utc>,
}

/// Raw value snapshot, independent of the debounced alert path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub source: String,
    pub name: String,
    pub value: f64,
    pub description: Option<String>,
}

/// A persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRecord {
    #[serde(flatten)]
    pub snapshot: StateSnapshot,
    pub created: DateTime<Utc>,
}

/// Output of one dimension for one evaluation pass.
///
/// `transition` is true when the committed state differs from the state
/// reported on the previous pass. Non-transition entries only appear when
/// the caller asked for all states.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub equipment_id: String,
    pub dimension: String,
    pub state: String,
    pub transition: bool,
    pub alert: Option<AlertEvent>,
    pub log: Option<LogRecord>,
}
