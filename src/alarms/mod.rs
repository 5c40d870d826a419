//! Alarm boundary
//!
//! Monitors only emit alert events on committed transitions. The
//! [`AlarmManager`] sits between them and the alarm transport and keeps at
//! most one outstanding alarm per device ID: raising at the same severity
//! or lowering an alarm that is not raised does nothing.

use std::collections::{HashMap, HashSet};

use crate::types::{AlarmState, AlertEvent};

/// What the alarm transport has to do for an accepted alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmAction {
    Raise {
        device_id: String,
        state: AlarmState,
        message: String,
    },
    Lower {
        device_id: String,
        message: String,
    },
}

impl AlarmAction {
    pub fn device_id(&self) -> &str {
        match self {
            AlarmAction::Raise { device_id, .. } | AlarmAction::Lower { device_id, .. } => device_id,
        }
    }

    /// Severity after the action.
    pub fn state(&self) -> AlarmState {
        match self {
            AlarmAction::Raise { state, .. } => *state,
            AlarmAction::Lower { .. } => AlarmState::Off,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AlarmAction::Raise { message, .. } | AlarmAction::Lower { message, .. } => message,
        }
    }
}

/// Outstanding alarms keyed by device ID.
#[derive(Debug, Default)]
pub struct AlarmManager {
    outstanding: HashMap<String, AlarmState>,
    testing: HashSet<String>,
}

impl AlarmManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile an alert with the outstanding alarm for its device.
    ///
    /// A raise at a different severity replaces the outstanding one.
    pub fn apply(&mut self, alert: &AlertEvent) -> Option<AlarmAction> {
        self.set(&alert.device_id, alert.alarm, &alert.message)
    }

    fn set(&mut self, device_id: &str, state: AlarmState, message: &str) -> Option<AlarmAction> {
        let current = self.state(device_id);
        if current == state {
            return None;
        }
        if state.is_raised() {
            self.outstanding.insert(device_id.to_string(), state);
            Some(AlarmAction::Raise {
                device_id: device_id.to_string(),
                state,
                message: message.to_string(),
            })
        } else {
            self.outstanding.remove(device_id);
            Some(AlarmAction::Lower {
                device_id: device_id.to_string(),
                message: message.to_string(),
            })
        }
    }

    /// Current severity for a device (`Off` when nothing is raised).
    pub fn state(&self, device_id: &str) -> AlarmState {
        self.outstanding.get(device_id).copied().unwrap_or_default()
    }

    /// Raised alarms, most severe first.
    pub fn outstanding(&self) -> Vec<(String, AlarmState)> {
        let mut alarms: Vec<_> = self
            .outstanding
            .iter()
            .map(|(id, state)| (id.clone(), *state))
            .collect();
        alarms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        alarms
    }

    /// Raise a diagnostic alarm. Only one test per device at a time.
    pub fn start_test(&mut self, device_id: &str, state: AlarmState, message: &str) -> Option<AlarmAction> {
        if !state.is_raised() || self.testing.contains(device_id) {
            return None;
        }
        let action = self.set(device_id, state, message);
        if action.is_some() {
            self.testing.insert(device_id.to_string());
        }
        action
    }

    /// Lower a diagnostic alarm raised by [`start_test`](Self::start_test).
    pub fn end_test(&mut self, device_id: &str) -> Option<AlarmAction> {
        if !self.testing.remove(device_id) {
            return None;
        }
        self.set(device_id, AlarmState::Off, "Alarm test finished")
    }
}

/// Transport that actually raises and lowers alarms.
///
/// Both calls must be cheap and non-blocking; they run on the dispatch path.
pub trait AlarmSink: Send + Sync {
    fn raise_alarm(&self, device_id: &str, state: AlarmState, message: &str);
    fn lower_alarm(&self, device_id: &str, message: &str);
}

/// Sink that reports alarms through the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlarmSink;

impl AlarmSink for TracingAlarmSink {
    fn raise_alarm(&self, device_id: &str, state: AlarmState, message: &str) {
        tracing::warn!(alarm = device_id, state = %state, "ALARM RAISED: {}", message);
    }

    fn lower_alarm(&self, device_id: &str, message: &str) {
        tracing::info!(alarm = device_id, "Alarm lowered: {}", message);
    }
}

/// Deliver an action to a sink.
pub fn deliver(sink: &dyn AlarmSink, action: &AlarmAction) {
    match action {
        AlarmAction::Raise {
            device_id,
            state,
            message,
        } => sink.raise_alarm(device_id, *state, message),
        AlarmAction::Lower { device_id, message } => sink.lower_alarm(device_id, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert(device: &str, alarm: AlarmState) -> AlertEvent {
        AlertEvent {
            device_id: device.to_string(),
            equipment_id: "gs1".to_string(),
            dimension: "oil".to_string(),
            state: alarm.to_string(),
            alarm,
            message: format!("{device} {alarm}"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_raise_then_duplicate_is_noop() {
        let mut manager = AlarmManager::new();
        let action = manager.apply(&alert("gs1_oil", AlarmState::Critical)).unwrap();
        assert_eq!(action.state(), AlarmState::Critical);
        assert!(manager.apply(&alert("gs1_oil", AlarmState::Critical)).is_none());
        assert_eq!(manager.state("gs1_oil"), AlarmState::Critical);
    }

    #[test]
    fn test_lower_when_not_raised_is_noop() {
        let mut manager = AlarmManager::new();
        assert!(manager.apply(&alert("gs1_oil", AlarmState::Off)).is_none());
    }

    #[test]
    fn test_severity_change_re_raises() {
        let mut manager = AlarmManager::new();
        manager.apply(&alert("wt1_level", AlarmState::Severe));
        let action = manager.apply(&alert("wt1_level", AlarmState::Critical)).unwrap();
        assert!(matches!(action, AlarmAction::Raise { state: AlarmState::Critical, .. }));
        let action = manager.apply(&alert("wt1_level", AlarmState::Off)).unwrap();
        assert!(matches!(action, AlarmAction::Lower { .. }));
        assert!(manager.outstanding().is_empty());
    }

    #[test]
    fn test_outstanding_sorted_by_severity() {
        let mut manager = AlarmManager::new();
        manager.apply(&alert("a", AlarmState::Minor));
        manager.apply(&alert("b", AlarmState::Critical));
        let ids: Vec<_> = manager.outstanding().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_alarm_test_lifecycle() {
        let mut manager = AlarmManager::new();
        assert!(manager.start_test("pmp_clp", AlarmState::Moderate, "test").is_some());
        assert!(manager.start_test("pmp_clp", AlarmState::Moderate, "test").is_none());
        assert!(matches!(manager.end_test("pmp_clp"), Some(AlarmAction::Lower { .. })));
        assert!(manager.end_test("pmp_clp").is_none());
    }
}
