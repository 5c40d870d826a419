//! Diesel engine monitor
//!
//! Four dimensions over three sensors:
//! - running: derived from average RPM, logged as ON/OFF, never alarmed
//! - oil: pressure switch checked against the running state once the
//!   matching grace window has elapsed
//! - rpm: RPM band, debounced, forced to OFF while stopped
//! - temperature: temperature band, debounced, forced to OK while stopped
//!
//! The oil switch lags the RPM signal, so a running transition schedules a
//! deferred oil re-check instead of trusting the switch immediately.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::equipment::{format_duration, Activity, Dimension, DimensionState, OnOff};
use super::history::ReplayedHistory;
use super::threshold_map::{ThresholdError, ThresholdMap};
use super::{
    deferred_is_current, enable_record, Deferred, DeferredKind, EquipmentKind, Monitor,
    MonitorError,
};
use crate::config::{EngineConfig, RpmThresholds, TempThresholds};
use crate::types::{AlarmState, Evaluation, LogRecord, Reading, Sample, SensorStatus, StateSnapshot};

// ============================================================================
// States
// ============================================================================

/// RPM band. `SensorFault` is only reachable through a status signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RpmBand {
    Off,
    Slow,
    Normal,
    Fast,
    TooFast,
    SensorFault,
}

impl fmt::Display for RpmBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpmBand::Off => "OFF",
            RpmBand::Slow => "SLOW",
            RpmBand::Normal => "NORMAL",
            RpmBand::Fast => "FAST",
            RpmBand::TooFast => "TOO_FAST",
            RpmBand::SensorFault => "SENSOR_FAULT",
        };
        f.write_str(s)
    }
}

/// `Slow` is idling: a good state like `Off` and `Normal`, so moving into it
/// lowers any RPM alarm.
impl DimensionState for RpmBand {
    fn alarm_state(&self) -> AlarmState {
        match self {
            RpmBand::Off | RpmBand::Slow | RpmBand::Normal => AlarmState::Off,
            RpmBand::Fast => AlarmState::Moderate,
            RpmBand::TooFast => AlarmState::Severe,
            RpmBand::SensorFault => AlarmState::Moderate,
        }
    }
}

/// Temperature band. `SensorFault` and `NoSensor` are sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TempBand {
    Ok,
    Hot,
    TooHot,
    SensorFault,
    NoSensor,
}

impl fmt::Display for TempBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TempBand::Ok => "OK",
            TempBand::Hot => "HOT",
            TempBand::TooHot => "TOO_HOT",
            TempBand::SensorFault => "SENSOR_FAULT",
            TempBand::NoSensor => "NO_SENSOR",
        };
        f.write_str(s)
    }
}

impl DimensionState for TempBand {
    fn alarm_state(&self) -> AlarmState {
        match self {
            TempBand::Ok => AlarmState::Off,
            TempBand::Hot => AlarmState::Moderate,
            TempBand::TooHot => AlarmState::Critical,
            TempBand::SensorFault => AlarmState::Moderate,
            TempBand::NoSensor => AlarmState::Minor,
        }
    }
}

/// Oil pressure consistency with the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OilState {
    OkRunning,
    OkStopped,
    /// Running past the run grace with no pressure
    NoPressure,
    /// Pressure reported while stopped past the stop grace, or a sensor
    /// fault signal
    SensorFault,
}

impl fmt::Display for OilState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OilState::OkRunning => "OK_RUNNING",
            OilState::OkStopped => "OK_STOPPED",
            OilState::NoPressure => "NO_PRESSURE",
            OilState::SensorFault => "SENSOR_FAULT",
        };
        f.write_str(s)
    }
}

impl DimensionState for OilState {
    fn alarm_state(&self) -> AlarmState {
        match self {
            OilState::OkRunning | OilState::OkStopped => AlarmState::Off,
            OilState::NoPressure => AlarmState::Critical,
            OilState::SensorFault => AlarmState::Moderate,
        }
    }
}

/// Latest reading of the oil pressure switch, after polarity mapping.
///
/// The switch reports on change, so there is no sample-count debounce; the
/// run and stop grace windows absorb its lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OilSwitch {
    Pressure,
    NoPressure,
}

/// RPM threshold table; below `slow` is OFF.
pub fn rpm_map(t: &RpmThresholds) -> Result<ThresholdMap<RpmBand>, ThresholdError> {
    ThresholdMap::new(
        RpmBand::Off,
        vec![
            (RpmBand::Slow, t.slow),
            (RpmBand::Normal, t.normal),
            (RpmBand::Fast, t.fast),
            (RpmBand::TooFast, t.too_fast),
        ],
    )
}

/// Temperature threshold table; below `hot` is OK.
pub fn temp_map(t: &TempThresholds) -> Result<ThresholdMap<TempBand>, ThresholdError> {
    ThresholdMap::new(
        TempBand::Ok,
        vec![(TempBand::Hot, t.hot), (TempBand::TooHot, t.too_hot)],
    )
}

// ============================================================================
// EngineMonitor
// ============================================================================

pub struct EngineMonitor {
    id: String,
    rpm_sensor: String,
    oil_sensor: String,
    temp_sensor: Option<String>,
    running_threshold: f64,
    run_grace: Duration,
    stop_grace: Duration,
    pressure_when_closed: bool,
    rpm_map: ThresholdMap<RpmBand>,
    temp_map: ThresholdMap<TempBand>,

    enabled: bool,
    activity: Activity,
    /// Run time of the last completed run, for the stop record
    ran_for: Option<Duration>,
    oil_switch: OilSwitch,
    oil_generation: u64,

    running: Dimension<OnOff>,
    oil: Dimension<OilState>,
    rpm: Dimension<RpmBand>,
    temp: Dimension<TempBand>,
}

impl EngineMonitor {
    pub fn new(
        config: &EngineConfig,
        default_stability: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, MonitorError> {
        let stability = config.stability_threshold.unwrap_or(default_stability);
        let rpm_map = rpm_map(&config.rpm).map_err(|source| MonitorError::Threshold {
            equipment: config.id.clone(),
            dimension: "rpm",
            source,
        })?;
        let temp_map = temp_map(&config.temperature).map_err(|source| MonitorError::Threshold {
            equipment: config.id.clone(),
            dimension: "temperature",
            source,
        })?;

        let temp_device = config
            .temp_sensor
            .clone()
            .unwrap_or_else(|| format!("{}_temp", config.id));
        let mut temp = Dimension::new("temperature", temp_device, TempBand::Ok, stability, now);
        if config.temp_sensor.is_none() {
            temp.set_sentinel(Some(TempBand::NoSensor), now);
        }

        Ok(Self {
            id: config.id.clone(),
            rpm_sensor: config.rpm_sensor.clone(),
            oil_sensor: config.oil_sensor.clone(),
            temp_sensor: config.temp_sensor.clone(),
            running_threshold: config.running_threshold_rpm,
            run_grace: config.run_grace(),
            stop_grace: config.stop_grace(),
            pressure_when_closed: config.pressure_when_closed,
            rpm_map,
            temp_map,
            enabled: true,
            activity: Activity::default(),
            ran_for: None,
            oil_switch: OilSwitch::NoPressure,
            oil_generation: 0,
            running: Dimension::new("running", config.id.clone(), OnOff::Off, 1, now),
            oil: Dimension::new("oil", config.oil_sensor.clone(), OilState::OkStopped, 1, now),
            rpm: Dimension::new("rpm", config.rpm_sensor.clone(), RpmBand::Off, stability, now),
            temp,
        })
    }

    /// Running as far as the outside world is concerned: a disabled engine
    /// always reports stopped.
    pub fn is_running(&self) -> bool {
        self.enabled && self.activity.is_on()
    }

    pub fn oil_state(&self) -> OilState {
        self.oil.current()
    }

    pub fn rpm_band(&self) -> RpmBand {
        self.rpm.current()
    }

    pub fn temp_band(&self) -> TempBand {
        self.temp.current()
    }

    pub fn last_on(&self) -> Option<DateTime<Utc>> {
        self.activity.last_on()
    }

    pub fn last_off(&self) -> Option<DateTime<Utc>> {
        self.activity.last_off()
    }

    fn ingest_rpm(&mut self, average: f64, at: DateTime<Utc>) -> Option<Deferred> {
        self.running.record_value(average);
        let running = average > self.running_threshold;
        let started = self.activity.last_on();
        let mut deferred = None;

        if self.activity.set(running, at) {
            self.running.commit(OnOff::from_bool(running), at);
            if running {
                self.ran_for = None;
            } else {
                self.ran_for = started.map(|s| (at - s).to_std().unwrap_or(Duration::ZERO));
                self.rpm.commit(RpmBand::Off, at);
                self.temp.commit(TempBand::Ok, at);
            }
            self.oil_generation += 1;
            deferred = Some(Deferred {
                kind: DeferredKind::OilRecheck,
                generation: self.oil_generation,
                delay: if running { self.run_grace } else { self.stop_grace },
            });
            tracing::debug!(engine = %self.id, running, rpm = average, "Running state changed");
        }

        if running {
            self.rpm.observe(self.rpm_map.classify(average), average, at);
        } else {
            self.rpm.record_value(average);
        }
        deferred
    }

    fn ingest_temp(&mut self, average: f64, at: DateTime<Utc>) {
        if self.activity.is_on() {
            self.temp.observe(self.temp_map.classify(average), average, at);
        } else {
            self.temp.record_value(average);
        }
    }

    fn ingest_oil_switch(&mut self, closed: bool) {
        let pressure = closed == self.pressure_when_closed;
        self.oil_switch = if pressure {
            OilSwitch::Pressure
        } else {
            OilSwitch::NoPressure
        };
        self.oil.record_value(if pressure { 1.0 } else { 0.0 });
    }

    /// Recompute the oil state from the running flag, the latest switch
    /// and the time since the last running transition.
    fn refresh_oil(&mut self, now: DateTime<Utc>) {
        let pressure = self.oil_switch == OilSwitch::Pressure;
        let state = if self.activity.is_on() {
            if !pressure && self.activity.has_elapsed(now, self.run_grace) {
                OilState::NoPressure
            } else {
                OilState::OkRunning
            }
        } else if pressure && self.activity.has_elapsed(now, self.stop_grace) {
            OilState::SensorFault
        } else {
            OilState::OkStopped
        };
        self.oil.commit(state, now);
    }

    fn rebaseline(&mut self) {
        self.running.rebaseline();
        self.oil.rebaseline();
        self.rpm.rebaseline();
        self.temp.rebaseline();
    }
}

impl Monitor for EngineMonitor {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EquipmentKind {
        EquipmentKind::Engine
    }

    fn sensor_ids(&self) -> Vec<String> {
        let mut ids = vec![self.rpm_sensor.clone(), self.oil_sensor.clone()];
        ids.extend(self.temp_sensor.clone());
        ids
    }

    /// A restart resumes the replayed running state without emitting it
    /// again. The oil switch is assumed consistent with that state until
    /// real readings arrive.
    fn initialize(&mut self, history: &ReplayedHistory, now: DateTime<Utc>) {
        self.enabled = history.enabled;
        self.activity = Activity::from_history(history);

        let running = self.activity.is_on();
        self.running.commit(OnOff::from_bool(running), now);
        self.oil_switch = if running {
            OilSwitch::Pressure
        } else {
            OilSwitch::NoPressure
        };
        self.refresh_oil(now);
        self.running.rebaseline();
        self.oil.rebaseline();
    }

    fn ingest(&mut self, sample: &Sample) -> Vec<Deferred> {
        let at = sample.timestamp;
        let device = sample.device_id.as_str();
        let mut deferred = Vec::new();

        match &sample.reading {
            Reading::Measurement { average, .. } if device == self.rpm_sensor => {
                deferred.extend(self.ingest_rpm(*average, at));
            }
            Reading::Status { status } if device == self.rpm_sensor => {
                let sentinel = (*status != SensorStatus::Ok).then_some(RpmBand::SensorFault);
                self.rpm.set_sentinel(sentinel, at);
            }
            Reading::Switch { on } if device == self.oil_sensor => {
                self.ingest_oil_switch(*on);
            }
            Reading::Status { status } if device == self.oil_sensor => {
                let sentinel = (*status != SensorStatus::Ok).then_some(OilState::SensorFault);
                self.oil.set_sentinel(sentinel, at);
            }
            Reading::Measurement { average, .. }
                if self.temp_sensor.as_deref() == Some(device) =>
            {
                self.ingest_temp(*average, at);
            }
            Reading::Status { status } if self.temp_sensor.as_deref() == Some(device) => {
                let sentinel = match status {
                    SensorStatus::Ok => None,
                    SensorStatus::Fault => Some(TempBand::SensorFault),
                    SensorStatus::Missing => Some(TempBand::NoSensor),
                };
                self.temp.set_sentinel(sentinel, at);
            }
            other => {
                tracing::debug!(engine = %self.id, device, reading = ?other, "Ignoring unexpected reading");
            }
        }
        deferred
    }

    fn evaluate(&mut self, now: DateTime<Utc>, transitions_only: bool) -> Vec<Evaluation> {
        if !self.enabled {
            return Vec::new();
        }
        self.refresh_oil(now);

        let id = self.id.clone();
        let ran_for = self.ran_for;
        let mut out = Vec::new();

        out.extend(self.running.evaluate(&id, transitions_only, now, |state, rpm| {
            let rpm = rpm.unwrap_or_default();
            match (state, ran_for) {
                (OnOff::On, _) => format!("Engine {} started with rpm {:.0}", id, rpm),
                (OnOff::Off, Some(d)) => format!(
                    "Engine {} stopped with rpm {:.0}, ran for {}",
                    id,
                    rpm,
                    format_duration(d)
                ),
                (OnOff::Off, None) => format!("Engine {} stopped with rpm {:.0}", id, rpm),
            }
        }));
        out.extend(self.oil.evaluate(&id, transitions_only, now, |state, _| match state {
            OilState::OkRunning => format!("Engine {} oil pressure OK (running)", id),
            OilState::OkStopped => format!("Engine {} oil pressure OK (stopped)", id),
            OilState::NoPressure => format!("Engine {} has NO oil pressure while running", id),
            OilState::SensorFault => format!("Engine {} oil pressure sensor fault", id),
        }));
        out.extend(self.rpm.evaluate(&id, transitions_only, now, |state, rpm| match rpm {
            Some(rpm) => format!("Engine {} RPM {} at {:.0}", id, state, rpm),
            None => format!("Engine {} RPM {}", id, state),
        }));
        out.extend(self.temp.evaluate(&id, transitions_only, now, |state, temp| match (state, temp) {
            (TempBand::NoSensor, _) => format!("Engine {} has no temperature sensor", id),
            (_, Some(temp)) => format!("Engine {} temperature {} at {:.1}C", id, state, temp),
            (_, None) => format!("Engine {} temperature {}", id, state),
        }));
        out
    }

    fn on_deferred(&mut self, kind: DeferredKind, generation: u64, now: DateTime<Utc>) -> Vec<Evaluation> {
        if kind != DeferredKind::OilRecheck
            || !deferred_is_current(&self.id, kind, generation, self.oil_generation, self.enabled)
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
        self.oil_generation += 1;
        if enabled {
            self.refresh_oil(now);
            self.rebaseline();
        }
        Some(enable_record(&self.id, enabled, now))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn snapshot(&self) -> Vec<StateSnapshot> {
        let mut snapshots = Vec::new();
        if let Some(rpm) = self.running.last_value() {
            snapshots.push(StateSnapshot {
                source: self.rpm_sensor.clone(),
                name: "RPM".to_string(),
                value: rpm,
                description: Some(format!("RPMState: {}", self.rpm.current())),
            });
        }
        if let Some(pressure) = self.oil.last_value() {
            snapshots.push(StateSnapshot {
                source: self.oil_sensor.clone(),
                name: "Oil".to_string(),
                value: pressure,
                description: Some(format!("OilState: {}", self.oil.current())),
            });
        }
        if let (Some(sensor), Some(temp)) = (&self.temp_sensor, self.temp.last_value()) {
            snapshots.push(StateSnapshot {
                source: sensor.clone(),
                name: "Temp".to_string(),
                value: temp,
                description: Some(format!("TempState: {}", self.temp.current())),
            });
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn engine() -> EngineMonitor {
        let mut e = EngineMonitor::new(&EngineConfig::standard("gs1"), 3, t(0)).unwrap();
        e.initialize(&ReplayedHistory::default(), t(0));
        e
    }

    fn states(evals: &[Evaluation]) -> Vec<(String, String)> {
        evals
            .iter()
            .map(|e| (e.dimension.clone(), e.state.clone()))
            .collect()
    }

    #[test]
    fn test_rpm_map_defaults() {
        let map = rpm_map(&RpmThresholds::default()).unwrap();
        assert_eq!(map.classify(0.0), RpmBand::Off);
        assert_eq!(map.classify(450.0), RpmBand::Slow);
        assert_eq!(map.classify(1500.0), RpmBand::Normal);
        assert_eq!(map.classify(2300.0), RpmBand::Fast);
        assert_eq!(map.classify(2600.0), RpmBand::TooFast);
    }

    #[test]
    fn test_dropping_to_idle_lowers_rpm_alarm() {
        let mut e = engine();
        for i in 0..3 {
            e.ingest(&Sample::measurement("gs1_rpm", t(i), 2300.0, 2300.0));
        }
        let raised = e.evaluate(t(2), true);
        let rpm = raised.iter().find(|ev| ev.dimension == "rpm").unwrap();
        assert_eq!(rpm.alert.as_ref().unwrap().alarm, AlarmState::Moderate);

        for i in 3..6 {
            e.ingest(&Sample::measurement("gs1_rpm", t(i), 450.0, 450.0));
        }
        assert!(e.is_running());
        let lowered = e.evaluate(t(5), true);
        let rpm = lowered.iter().find(|ev| ev.dimension == "rpm").unwrap();
        assert_eq!(rpm.state, "SLOW");
        assert!(rpm.alert.as_ref().unwrap().is_lowered());
    }

    #[test]
    fn test_temp_map_rejects_inverted_bounds() {
        let bad = TempThresholds {
            hot: 95.0,
            too_hot: 85.0,
        };
        assert!(temp_map(&bad).is_err());
    }

    #[test]
    fn test_start_schedules_oil_recheck_with_run_grace() {
        let mut e = engine();
        let deferred = e.ingest(&Sample::measurement("gs1_rpm", t(1), 1500.0, 1500.0));
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].kind, DeferredKind::OilRecheck);
        assert_eq!(deferred[0].delay, Duration::from_secs(10));
        assert!(e.is_running());

        let evals = e.evaluate(t(1), true);
        assert_eq!(
            states(&evals),
            vec![
                ("running".to_string(), "ON".to_string()),
                ("oil".to_string(), "OK_RUNNING".to_string()),
            ]
        );
        let log = evals[0].log.as_ref().unwrap();
        assert_eq!(log.description, "Engine gs1 started with rpm 1500");
    }

    #[test]
    fn test_stale_oil_recheck_ignored() {
        let mut e = engine();
        let first = e.ingest(&Sample::measurement("gs1_rpm", t(1), 1500.0, 1500.0))[0];
        e.evaluate(t(1), true);
        let second = e.ingest(&Sample::measurement("gs1_rpm", t(3), 0.0, 0.0))[0];
        assert!(second.generation > first.generation);

        assert!(e.on_deferred(DeferredKind::OilRecheck, first.generation, t(11)).is_empty());
        let evals = e.on_deferred(DeferredKind::OilRecheck, second.generation, t(33));
        assert_eq!(
            states(&evals),
            vec![
                ("running".to_string(), "OFF".to_string()),
                ("oil".to_string(), "OK_STOPPED".to_string()),
            ]
        );
    }

    #[test]
    fn test_stop_forces_rpm_and_temp_floors() {
        let mut e = engine();
        for i in 0..3 {
            e.ingest(&Sample::measurement("gs1_rpm", t(i), 2600.0, 2600.0));
            e.ingest(&Sample::measurement("gs1_temp", t(i), 97.0, 97.0));
        }
        assert_eq!(e.rpm_band(), RpmBand::TooFast);
        assert_eq!(e.temp_band(), TempBand::TooHot);
        e.evaluate(t(2), true);

        e.ingest(&Sample::measurement("gs1_rpm", t(5), 0.0, 0.0));
        assert_eq!(e.rpm_band(), RpmBand::Off);
        assert_eq!(e.temp_band(), TempBand::Ok);

        let msg = e
            .evaluate(t(5), true)
            .into_iter()
            .find(|ev| ev.dimension == "running")
            .and_then(|ev| ev.log)
            .unwrap()
            .description;
        assert_eq!(msg, "Engine gs1 stopped with rpm 0, ran for 00:00:05");
    }

    #[test]
    fn test_pressure_while_stopped_is_sensor_fault_after_stop_grace() {
        let mut e = engine();
        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1200.0, 1200.0));
        e.ingest(&Sample::measurement("gs1_rpm", t(60), 0.0, 0.0));
        for i in 0..3 {
            e.ingest(&Sample::switch("gs1_oil", t(60 + i), true));
        }
        e.evaluate(t(61), true);
        assert_eq!(e.oil_state(), OilState::OkStopped);

        let evals = e.evaluate(t(90), true);
        let oil = evals.iter().find(|ev| ev.dimension == "oil").unwrap();
        assert_eq!(oil.state, "SENSOR_FAULT");
        assert_eq!(oil.alert.as_ref().unwrap().alarm, AlarmState::Moderate);
        assert_eq!(oil.alert.as_ref().unwrap().device_id, "gs1_oil");
    }

    #[test]
    fn test_single_pressure_edge_after_start_is_ok_running() {
        let mut e = EngineMonitor::new(&EngineConfig::standard("gs1"), 5, t(0)).unwrap();
        e.initialize(&ReplayedHistory::default(), t(0));
        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1500.0, 1500.0));
        e.ingest(&Sample::switch("gs1_oil", t(2), true));
        for i in 3..=20 {
            e.ingest(&Sample::measurement("gs1_rpm", t(i), 1500.0, 1500.0));
        }
        let evals = e.evaluate(t(20), true);
        assert!(evals.iter().all(|ev| ev.dimension != "oil" || ev.state == "OK_RUNNING"));
        assert_eq!(e.oil_state(), OilState::OkRunning);

        // A single loss-of-pressure edge is enough once past the run grace.
        e.ingest(&Sample::switch("gs1_oil", t(21), false));
        let evals = e.evaluate(t(21), true);
        let oil = evals.iter().find(|ev| ev.dimension == "oil").unwrap();
        assert_eq!(oil.state, "NO_PRESSURE");
        assert_eq!(oil.alert.as_ref().unwrap().alarm, AlarmState::Critical);
    }

    #[test]
    fn test_inverted_polarity() {
        let mut config = EngineConfig::standard("gs1");
        config.pressure_when_closed = false;
        let mut e = EngineMonitor::new(&config, 1, t(0)).unwrap();
        e.initialize(&ReplayedHistory::default(), t(0));

        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1500.0, 1500.0));
        e.ingest(&Sample::switch("gs1_oil", t(0), false));
        e.evaluate(t(20), true);
        assert_eq!(e.oil_state(), OilState::OkRunning);

        e.ingest(&Sample::switch("gs1_oil", t(21), true));
        e.evaluate(t(21), true);
        assert_eq!(e.oil_state(), OilState::NoPressure);
    }

    #[test]
    fn test_missing_temp_sensor_raised_once() {
        let mut config = EngineConfig::standard("gs2");
        config.temp_sensor = None;
        let mut e = EngineMonitor::new(&config, 3, t(0)).unwrap();
        e.initialize(&ReplayedHistory::default(), t(0));

        let evals = e.evaluate(t(0), true);
        let temp = evals.iter().find(|ev| ev.dimension == "temperature").unwrap();
        assert_eq!(temp.state, "NO_SENSOR");
        assert_eq!(temp.alert.as_ref().unwrap().alarm, AlarmState::Minor);
        assert_eq!(temp.alert.as_ref().unwrap().device_id, "gs2_temp");
        assert!(e.evaluate(t(5), true).is_empty());
        assert_eq!(e.sensor_ids(), vec!["gs2_rpm".to_string(), "gs2_oil".to_string()]);
    }

    #[test]
    fn test_numeric_reading_does_not_clear_sensor_fault() {
        let mut e = engine();
        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1500.0, 1500.0));
        e.ingest(&Sample::status("gs1_temp", t(1), SensorStatus::Fault));
        for i in 0..5 {
            e.ingest(&Sample::measurement("gs1_temp", t(2 + i), 70.0, 70.0));
        }
        assert_eq!(e.temp_band(), TempBand::SensorFault);

        e.ingest(&Sample::status("gs1_temp", t(10), SensorStatus::Ok));
        assert_eq!(e.temp_band(), TempBand::Ok);
    }

    #[test]
    fn test_restart_resumes_running_without_transition() {
        let mut e = EngineMonitor::new(&EngineConfig::standard("gs1"), 3, t(100)).unwrap();
        let history = ReplayedHistory {
            last_on: Some(t(0)),
            last_off: None,
            enabled: true,
        };
        e.initialize(&history, t(100));
        assert!(e.is_running());
        assert!(e.evaluate(t(100), true).is_empty());
        assert_eq!(e.oil_state(), OilState::OkRunning);
    }

    #[test]
    fn test_disabled_engine_reports_stopped_and_silent() {
        let mut e = engine();
        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1500.0, 1500.0));
        let record = e.set_enabled(false, t(1)).unwrap();
        assert_eq!(record.source, "gs1");
        assert!(!e.is_running());
        assert!(e.evaluate(t(30), false).is_empty());
        assert!(e.set_enabled(false, t(2)).is_none());
    }

    #[test]
    fn test_snapshot_reports_raw_values() {
        let mut e = engine();
        e.ingest(&Sample::measurement("gs1_rpm", t(0), 1490.0, 1500.0));
        e.ingest(&Sample::switch("gs1_oil", t(0), true));
        let snapshots = e.snapshot();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "RPM");
        assert_eq!(snapshots[0].value, 1500.0);
        assert_eq!(snapshots[1].value, 1.0);
    }
}
