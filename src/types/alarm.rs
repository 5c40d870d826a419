//! Alarm severity and alert events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alarm severity for a single device.
///
/// `Off` is the lowered state; every other variant is a raised alarm. The
/// ordering follows badness so severities can be compared directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    #[default]
    Off,
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl AlarmState {
    pub fn is_raised(self) -> bool {
        self != AlarmState::Off
    }
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Off => write!(f, "OFF"),
            AlarmState::Minor => write!(f, "MINOR"),
            AlarmState::Moderate => write!(f, "MODERATE"),
            AlarmState::Severe => write!(f, "SEVERE"),
            AlarmState::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Alarm state change produced by a monitor for one dimension.
///
/// `device_id` is the alarm identity: one physical sensor or device, never the
/// equipment as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub device_id: String,
    pub equipment_id: String,
    pub dimension: String,
    /// Display name of the classified state, e.g. `NO_PRESSURE`
    pub state: String,
    pub alarm: AlarmState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    /// True when this event asks the alerting side to lower the alarm.
    pub fn is_lowered(&self) -> bool {
        !self.alarm.is_raised()
    }
}
