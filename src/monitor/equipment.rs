//! Generic per-dimension state machine shared by all equipment monitors.
//!
//! A [`Dimension`] owns the committed (debounced) state of one monitored
//! aspect of a device, the state last handed to the alerting side, and an
//! optional sentinel override for sensor faults. Equipment monitors feed it
//! classifications and ask it for zero-or-one [`Evaluation`] per pass.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::debounce::DebounceGate;
use super::history::ReplayedHistory;
use crate::types::{AlarmState, AlertEvent, Evaluation, LogEventType, LogRecord};

/// A discrete state a dimension can be in.
pub trait DimensionState: Copy + Eq + fmt::Debug + fmt::Display + Send + 'static {
    /// Whether transitions raise/lower alarms. Non-alarmed dimensions only
    /// produce log records.
    const ALARMED: bool = true;

    /// Alarm severity for this state. Only the dimension's "good" states may
    /// map to [`AlarmState::Off`].
    fn alarm_state(&self) -> AlarmState;

    fn log_event_type(&self) -> LogEventType {
        LogEventType::StateChange
    }
}

// ============================================================================
// Dimension
// ============================================================================

/// Committed/previous state pair for one monitored dimension.
#[derive(Debug, Clone)]
pub struct Dimension<S> {
    name: &'static str,
    device_id: String,
    gate: DebounceGate<S>,
    sentinel: Option<S>,
    reported: S,
    stable_since: DateTime<Utc>,
    last_value: Option<f64>,
}

impl<S: DimensionState> Dimension<S> {
    /// New dimension starting (and reported) at `initial`.
    pub fn new(
        name: &'static str,
        device_id: impl Into<String>,
        initial: S,
        stability: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            device_id: device_id.into(),
            gate: DebounceGate::new(initial, stability),
            sentinel: None,
            reported: initial,
            stable_since: now,
            last_value: None,
        }
    }

    /// Feed a numeric classification through the debounce gate.
    ///
    /// Ignored while a sentinel is active: the reading is not trusted.
    pub fn observe(&mut self, candidate: S, value: f64, at: DateTime<Utc>) -> S {
        self.last_value = Some(value);
        if self.sentinel.is_some() {
            return self.current();
        }
        let before = self.gate.committed();
        let after = self.gate.observe(candidate);
        if after != before {
            self.stable_since = at;
        }
        after
    }

    /// Commit a state directly (derived states, floors).
    pub fn commit(&mut self, state: S, at: DateTime<Utc>) {
        if self.gate.committed() == state {
            return;
        }
        self.gate.force(state);
        if self.sentinel.is_none() {
            self.stable_since = at;
        }
    }

    /// Set or clear the sensor sentinel. While set, it overrides the
    /// committed classification.
    pub fn set_sentinel(&mut self, sentinel: Option<S>, at: DateTime<Utc>) {
        if self.sentinel != sentinel {
            self.sentinel = sentinel;
            self.stable_since = at;
        }
    }

    pub fn sentinel(&self) -> Option<S> {
        self.sentinel
    }

    /// Externally visible state: the sentinel if any, else the committed state.
    pub fn current(&self) -> S {
        self.sentinel.unwrap_or_else(|| self.gate.committed())
    }

    /// State handed out on the last evaluation.
    pub fn reported(&self) -> S {
        self.reported
    }

    pub fn stable_since(&self) -> DateTime<Utc> {
        self.stable_since
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn record_value(&mut self, value: f64) {
        self.last_value = Some(value);
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Treat the current state as already reported.
    pub fn rebaseline(&mut self) {
        self.reported = self.current();
    }

    /// Evaluate with the state's own alarm severity.
    pub fn evaluate(
        &mut self,
        equipment_id: &str,
        transitions_only: bool,
        now: DateTime<Utc>,
        describe: impl FnOnce(S, Option<f64>) -> String,
    ) -> Option<Evaluation> {
        let alarm = self.current().alarm_state();
        self.evaluate_with_alarm(equipment_id, transitions_only, alarm, now, describe)
    }

    /// Compare committed vs. reported state and build the pass output.
    ///
    /// Returns `None` when nothing changed and only transitions were asked
    /// for. Otherwise the current state becomes the reported state.
    pub fn evaluate_with_alarm(
        &mut self,
        equipment_id: &str,
        transitions_only: bool,
        alarm: AlarmState,
        now: DateTime<Utc>,
        describe: impl FnOnce(S, Option<f64>) -> String,
    ) -> Option<Evaluation> {
        let current = self.current();
        let transition = current != self.reported;
        if transitions_only && !transition {
            return None;
        }
        self.reported = current;

        let message = describe(current, self.last_value);
        let alert = S::ALARMED.then(|| AlertEvent {
            device_id: self.device_id.clone(),
            equipment_id: equipment_id.to_string(),
            dimension: self.name.to_string(),
            state: current.to_string(),
            alarm,
            message: message.clone(),
            timestamp: now,
        });
        let log = LogRecord::new(current.log_event_type(), self.device_id.clone(), message, now);

        Some(Evaluation {
            equipment_id: equipment_id.to_string(),
            dimension: self.name.to_string(),
            state: current.to_string(),
            transition,
            alert,
            log: Some(log),
        })
    }
}

// ============================================================================
// On/Off activity
// ============================================================================

/// Binary activity state (engine running, pump switched on). Logged, never
/// alarmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OnOff {
    Off,
    On,
}

impl OnOff {
    pub fn from_bool(on: bool) -> Self {
        if on {
            OnOff::On
        } else {
            OnOff::Off
        }
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnOff::Off => write!(f, "OFF"),
            OnOff::On => write!(f, "ON"),
        }
    }
}

impl DimensionState for OnOff {
    const ALARMED: bool = false;

    fn alarm_state(&self) -> AlarmState {
        AlarmState::Off
    }

    fn log_event_type(&self) -> LogEventType {
        match self {
            OnOff::On => LogEventType::On,
            OnOff::Off => LogEventType::Off,
        }
    }
}

/// On/off flag with the timestamps of the last edges.
///
/// The timestamp matching the current flag is the authoritative one for
/// "time since the last transition".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Activity {
    on: bool,
    last_on: Option<DateTime<Utc>>,
    last_off: Option<DateTime<Utc>>,
}

impl Activity {
    /// Rebuild from replayed history: on if the last `On` is newer than the
    /// last `Off`.
    pub fn from_history(history: &ReplayedHistory) -> Self {
        let on = match (history.last_on, history.last_off) {
            (Some(on), Some(off)) => on > off,
            (Some(_), None) => true,
            _ => false,
        };
        Self {
            on,
            last_on: history.last_on,
            last_off: history.last_off,
        }
    }

    /// Apply a reading. Returns true on an edge.
    pub fn set(&mut self, on: bool, at: DateTime<Utc>) -> bool {
        if on == self.on {
            return false;
        }
        self.on = on;
        if on {
            self.last_on = Some(at);
        } else {
            self.last_off = Some(at);
        }
        true
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn last_on(&self) -> Option<DateTime<Utc>> {
        self.last_on
    }

    pub fn last_off(&self) -> Option<DateTime<Utc>> {
        self.last_off
    }

    /// Time since the last edge into the current state, if known.
    pub fn since_change(&self, now: DateTime<Utc>) -> Option<Duration> {
        let since = if self.on { self.last_on } else { self.last_off };
        since.map(|t| (now - t).to_std().unwrap_or(Duration::ZERO))
    }

    /// True once `window` has elapsed since the last edge. An unknown edge
    /// time counts as elapsed.
    pub fn has_elapsed(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.since_change(now).map_or(true, |d| d >= window)
    }
}

/// Format a duration as `HH:MM:SS`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Level {
        Good,
        Bad,
        Fault,
    }

    impl fmt::Display for Level {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl DimensionState for Level {
        fn alarm_state(&self) -> AlarmState {
            match self {
                Level::Good => AlarmState::Off,
                Level::Bad => AlarmState::Severe,
                Level::Fault => AlarmState::Moderate,
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_evaluate_emits_only_on_transition() {
        let mut dim = Dimension::new("level", "sensor-1", Level::Good, 2, t0());
        assert!(dim.evaluate("eq", true, t0(), |_, _| String::new()).is_none());

        dim.observe(Level::Bad, 5.0, t0());
        assert!(dim.evaluate("eq", true, t0(), |_, _| String::new()).is_none());

        dim.observe(Level::Bad, 6.0, t0());
        let ev = dim
            .evaluate("eq", true, t0(), |s, v| format!("{s} at {}", v.unwrap_or_default()))
            .unwrap();
        assert!(ev.transition);
        let alert = ev.alert.unwrap();
        assert_eq!(alert.alarm, AlarmState::Severe);
        assert_eq!(alert.device_id, "sensor-1");
        assert_eq!(alert.message, "Bad at 6");

        assert!(dim.evaluate("eq", true, t0(), |_, _| String::new()).is_none());
    }

    #[test]
    fn test_all_states_query_returns_unchanged_state() {
        let mut dim = Dimension::new("level", "sensor-1", Level::Good, 2, t0());
        let ev = dim.evaluate("eq", false, t0(), |_, _| "ok".into()).unwrap();
        assert!(!ev.transition);
        assert_eq!(ev.state, "Good");
        assert!(ev.alert.unwrap().is_lowered());
    }

    #[test]
    fn test_sentinel_overrides_and_blocks_observation() {
        let mut dim = Dimension::new("level", "sensor-1", Level::Good, 1, t0());
        dim.set_sentinel(Some(Level::Fault), t0());
        assert_eq!(dim.observe(Level::Bad, 1.0, t0()), Level::Fault);
        let ev = dim.evaluate("eq", true, t0(), |_, _| String::new()).unwrap();
        assert_eq!(ev.alert.unwrap().alarm, AlarmState::Moderate);

        dim.set_sentinel(None, t0());
        assert_eq!(dim.current(), Level::Good);
    }

    #[test]
    fn test_non_alarmed_dimension_logs_without_alert() {
        let mut dim = Dimension::new("running", "engine-1", OnOff::Off, 1, t0());
        dim.commit(OnOff::On, t0());
        let ev = dim.evaluate("engine-1", true, t0(), |_, _| "started".into()).unwrap();
        assert!(ev.alert.is_none());
        assert_eq!(ev.log.unwrap().event_type, LogEventType::On);
    }

    #[test]
    fn test_activity_from_history_and_elapsed() {
        let history = ReplayedHistory {
            last_on: Some(t0()),
            last_off: Some(t0() - chrono::Duration::hours(1)),
            enabled: true,
        };
        let activity = Activity::from_history(&history);
        assert!(activity.is_on());
        let later = t0() + chrono::Duration::seconds(30);
        assert!(activity.has_elapsed(later, Duration::from_secs(30)));
        assert!(!activity.has_elapsed(later, Duration::from_secs(31)));
    }

    #[test]
    fn test_activity_unknown_edge_counts_as_elapsed() {
        let activity = Activity::default();
        assert!(!activity.is_on());
        assert!(activity.has_elapsed(t0(), Duration::from_secs(3600)));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }
}
