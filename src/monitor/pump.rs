//! Pump monitor
//!
//! The relay switch is ground truth, so there is no debounce here. The only
//! stability requirement is time: a pump left on (or off) too long commits
//! a too-long state when its timer fires.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::equipment::{format_duration, Activity, Dimension, DimensionState, OnOff};
use super::history::ReplayedHistory;
use super::{deferred_is_current, enable_record, Deferred, DeferredKind, EquipmentKind, Monitor};
use crate::config::PumpConfig;
use crate::types::{AlarmState, Evaluation, LogRecord, Reading, Sample, StateSnapshot};

/// Pump activity including the duration-based alarm states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpActivity {
    Off,
    On,
    OnTooLong,
    OffTooLong,
}

impl fmt::Display for PumpActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PumpActivity::Off => "OFF",
            PumpActivity::On => "ON",
            PumpActivity::OnTooLong => "ON_TOO_LONG",
            PumpActivity::OffTooLong => "OFF_TOO_LONG",
        };
        f.write_str(s)
    }
}

impl DimensionState for PumpActivity {
    fn alarm_state(&self) -> AlarmState {
        match self {
            PumpActivity::Off | PumpActivity::On => AlarmState::Off,
            PumpActivity::OnTooLong => AlarmState::Severe,
            PumpActivity::OffTooLong => AlarmState::Minor,
        }
    }
}

pub struct PumpMonitor {
    id: String,
    switch_sensor: String,
    on_too_long: Duration,
    off_too_long: Option<Duration>,

    enabled: bool,
    activity: Activity,
    generation: u64,

    switch: Dimension<OnOff>,
    state: Dimension<PumpActivity>,
}

impl PumpMonitor {
    pub fn new(config: &PumpConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: config.id.clone(),
            switch_sensor: config.switch_sensor.clone(),
            on_too_long: config.on_too_long(),
            off_too_long: config.off_too_long(),
            enabled: true,
            activity: Activity::default(),
            generation: 0,
            switch: Dimension::new("switch", config.id.clone(), OnOff::Off, 1, now),
            state: Dimension::new(
                "activity",
                config.switch_sensor.clone(),
                PumpActivity::Off,
                1,
                now,
            ),
        }
    }

    pub fn is_on(&self) -> bool {
        self.enabled && self.activity.is_on()
    }

    pub fn activity_state(&self) -> PumpActivity {
        self.state.current()
    }

    fn refresh_state(&mut self, now: DateTime<Utc>) {
        let since = self.activity.since_change(now);
        let exceeded = |window: Duration| since.map_or(false, |d| d >= window);
        let state = if self.activity.is_on() {
            if exceeded(self.on_too_long) {
                PumpActivity::OnTooLong
            } else {
                PumpActivity::On
            }
        } else {
            match self.off_too_long {
                Some(window) if exceeded(window) => PumpActivity::OffTooLong,
                _ => PumpActivity::Off,
            }
        };
        self.state.commit(state, now);
    }
}

impl Monitor for PumpMonitor {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EquipmentKind {
        EquipmentKind::Pump
    }

    fn sensor_ids(&self) -> Vec<String> {
        vec![self.switch_sensor.clone()]
    }

    /// The replayed on/off state becomes the baseline. A pump that was
    /// already on too long before the restart is reported on the first
    /// evaluation.
    fn initialize(&mut self, history: &ReplayedHistory, now: DateTime<Utc>) {
        self.enabled = history.enabled;
        self.activity = Activity::from_history(history);

        let on = self.activity.is_on();
        self.switch.commit(OnOff::from_bool(on), now);
        self.switch.rebaseline();
        self.state.commit(
            if on {
                PumpActivity::On
            } else {
                PumpActivity::Off
            },
            now,
        );
        self.state.rebaseline();
    }

    fn ingest(&mut self, sample: &Sample) -> Vec<Deferred> {
        let on = match sample.reading {
            Reading::Switch { on } if sample.device_id == self.switch_sensor => on,
            ref other => {
                tracing::debug!(pump = %self.id, device = %sample.device_id, reading = ?other, "Ignoring unexpected reading");
                return Vec::new();
            }
        };

        self.switch.record_value(if on { 1.0 } else { 0.0 });
        if !self.activity.set(on, sample.timestamp) {
            return Vec::new();
        }
        self.switch.commit(OnOff::from_bool(on), sample.timestamp);
        self.generation += 1;

        let window = if on { Some(self.on_too_long) } else { self.off_too_long };
        window
            .map(|delay| Deferred {
                kind: DeferredKind::PumpTimer,
                generation: self.generation,
                delay,
            })
            .into_iter()
            .collect()
    }

    fn evaluate(&mut self, now: DateTime<Utc>, transitions_only: bool) -> Vec<Evaluation> {
        if !self.enabled {
            return Vec::new();
        }
        self.refresh_state(now);

        let id = self.id.clone();
        let since = self.activity.since_change(now).map(format_duration);
        let mut out = Vec::new();

        out.extend(self.switch.evaluate(&id, transitions_only, now, |state, _| match state {
            OnOff::On => format!("Pump {} switched on", id),
            OnOff::Off => format!("Pump {} switched off", id),
        }));
        out.extend(self.state.evaluate(&id, transitions_only, now, |state, _| {
            let since = since.as_deref().unwrap_or("unknown");
            match state {
                PumpActivity::On => format!("Pump {} is on", id),
                PumpActivity::Off => format!("Pump {} is off", id),
                PumpActivity::OnTooLong => format!("Pump {} has been on for {}", id, since),
                PumpActivity::OffTooLong => format!("Pump {} has been off for {}", id, since),
            }
        }));
        out
    }

    fn on_deferred(&mut self, kind: DeferredKind, generation: u64, now: DateTime<Utc>) -> Vec<Evaluation> {
        if kind != DeferredKind::PumpTimer
            || !deferred_is_current(&self.id, kind, generation, self.generation, self.enabled)
        {
            return Vec::new();
        }
        self.evaluate(now, true)
    }

    fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Option<LogRecord> {
        if self.enabled == enabled {
            return None;
        }
        self.enabled = enabled;
        self.generation += 1;
        if enabled {
            self.refresh_state(now);
            self.switch.rebaseline();
            self.state.rebaseline();
        }
        Some(enable_record(&self.id, enabled, now))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn snapshot(&self) -> Vec<StateSnapshot> {
        self.switch
            .last_value()
            .map(|value| StateSnapshot {
                source: self.switch_sensor.clone(),
                name: "Pump".to_string(),
                value,
                description: Some(format!("PumpState: {}", self.state.current())),
            })
            .into_iter()
            .collect()
    }
}
