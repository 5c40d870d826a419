//! Equipment health monitoring
//!
//! Turns raw sensor samples into debounced, alarm-ready state transitions:
//! - `threshold_map`: numeric reading to ordinal band
//! - `debounce`: run-length stability gate
//! - `equipment`: per-dimension committed/reported state machine
//! - `engine`, `pump`, `tank`: equipment-specific monitors
//! - `history`: startup replay of on/off and enable/disable events
//!
//! A monitor is single-writer. The pipeline gives each one its own task and
//! serializes samples, evaluations and deferred checks through one queue.

pub mod debounce;
pub mod engine;
pub mod equipment;
pub mod history;
pub mod pump;
pub mod tank;
pub mod threshold_map;

pub use debounce::DebounceGate;
pub use engine::{EngineMonitor, OilState, RpmBand, TempBand};
pub use equipment::{Activity, Dimension, DimensionState, OnOff};
pub use history::ReplayedHistory;
pub use pump::{PumpActivity, PumpMonitor};
pub use tank::{FluidLevel, TankMonitor};
pub use threshold_map::{ThresholdError, ThresholdMap};

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::storage::EventLog;
use crate::types::{Evaluation, LogEventType, LogRecord, Sample, StateSnapshot};

/// Errors raised while building monitors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("{equipment}: invalid {dimension} thresholds: {source}")]
    Threshold {
        equipment: String,
        dimension: &'static str,
        #[source]
        source: ThresholdError,
    },
    #[error("{equipment}: {message}")]
    Config { equipment: String, message: String },
}

/// Kind of monitored equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Engine,
    Pump,
    Tank,
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquipmentKind::Engine => write!(f, "engine"),
            EquipmentKind::Pump => write!(f, "pump"),
            EquipmentKind::Tank => write!(f, "tank"),
        }
    }
}

/// What a deferred check re-evaluates when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredKind {
    /// Oil pressure after the engine settles into running/stopped
    OilRecheck,
    /// Pump on-too-long / off-too-long
    PumpTimer,
}

/// A one-shot re-evaluation requested by a monitor.
///
/// The generation ties it to the transition that scheduled it. A later
/// transition bumps the generation and the older check is dropped when it
/// fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deferred {
    pub kind: DeferredKind,
    pub generation: u64,
    pub delay: Duration,
}

/// Common interface of every equipment monitor.
pub trait Monitor: Send {
    /// Equipment ID (also the source of its on/off and enable records).
    fn id(&self) -> &str;

    fn kind(&self) -> EquipmentKind;

    /// Device IDs of the sensors this monitor consumes.
    fn sensor_ids(&self) -> Vec<String>;

    /// Hydrate from replayed history. Called once before the first sample.
    fn initialize(&mut self, history: &ReplayedHistory, now: DateTime<Utc>);

    /// Apply one sample. Returns deferred checks to schedule.
    fn ingest(&mut self, sample: &Sample) -> Vec<Deferred>;

    /// Run an evaluation pass. With `transitions_only`, unchanged dimensions
    /// are skipped; otherwise every dimension reports its current state.
    /// A disabled monitor returns nothing.
    fn evaluate(&mut self, now: DateTime<Utc>, transitions_only: bool) -> Vec<Evaluation>;

    /// A deferred check fired. Stale generations and disabled equipment
    /// produce nothing.
    fn on_deferred(&mut self, kind: DeferredKind, generation: u64, now: DateTime<Utc>) -> Vec<Evaluation>;

    /// Toggle the enable flag. Returns the audit record for a real change.
    fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Option<LogRecord>;

    fn is_enabled(&self) -> bool;

    /// Raw values for periodic state logging.
    fn snapshot(&self) -> Vec<StateSnapshot>;
}

/// Audit record for an enable flag change.
pub(crate) fn enable_record(equipment_id: &str, enabled: bool, now: DateTime<Utc>) -> LogRecord {
    let (event_type, verb) = if enabled {
        (LogEventType::Enable, "enabled")
    } else {
        (LogEventType::Disable, "disabled")
    };
    LogRecord::new(event_type, equipment_id, format!("{} {}", equipment_id, verb), now)
}

/// Shared handling of a deferred check: drop it unless it is current and
/// the equipment is enabled.
pub(crate) fn deferred_is_current(
    equipment_id: &str,
    kind: DeferredKind,
    generation: u64,
    current: u64,
    enabled: bool,
) -> bool {
    if !enabled {
        tracing::debug!(equipment = equipment_id, ?kind, "Ignoring deferred check, equipment disabled");
        return false;
    }
    if generation != current {
        tracing::debug!(
            equipment = equipment_id,
            ?kind,
            generation,
            current,
            "Ignoring stale deferred check"
        );
        return false;
    }
    true
}

/// Build and hydrate every configured monitor.
///
/// History replay failures are not fatal: the monitor starts from defaults
/// (enabled, stopped) and a warning is logged. Threshold errors are fatal.
pub fn build_monitors(
    config: &ServiceConfig,
    log: &dyn EventLog,
    now: DateTime<Utc>,
) -> Result<Vec<Box<dyn Monitor>>, MonitorError> {
    let stability = config.debounce.stability_threshold;
    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();

    for engine in &config.engines {
        monitors.push(Box::new(EngineMonitor::new(engine, stability, now)?));
    }
    for pump in &config.pumps {
        monitors.push(Box::new(PumpMonitor::new(pump, now)));
    }
    for tank in &config.tanks {
        monitors.push(Box::new(TankMonitor::new(tank, stability, now)?));
    }

    for monitor in monitors.iter_mut() {
        let history = match ReplayedHistory::replay(log, monitor.id()) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    equipment = monitor.id(),
                    error = %e,
                    "History replay failed, starting from defaults"
                );
                ReplayedHistory::default()
            }
        };
        monitor.initialize(&history, now);
        tracing::info!(
            equipment = monitor.id(),
            kind = %monitor.kind(),
            enabled = monitor.is_enabled(),
            sensors = ?monitor.sensor_ids(),
            "Monitor initialized"
        );
    }

    Ok(monitors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryEventLog;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_build_monitors_from_default_config() {
        let config = ServiceConfig::default();
        let log = InMemoryEventLog::new();
        let monitors = build_monitors(&config, &log, now()).unwrap();
        assert_eq!(monitors.len(), config.engines.len() + config.pumps.len() + config.tanks.len());
        assert!(monitors.iter().all(|m| m.is_enabled()));
    }

    #[test]
    fn test_build_monitors_replays_disable() {
        let config = ServiceConfig::default();
        let id = config.pumps[0].id.clone();
        let log = InMemoryEventLog::new();
        log.log_event(&enable_record(&id, false, now() - chrono::Duration::minutes(5)))
            .unwrap();

        let monitors = build_monitors(&config, &log, now()).unwrap();
        let pump = monitors.iter().find(|m| m.id() == id).unwrap();
        assert!(!pump.is_enabled());
    }

    #[test]
    fn test_enable_record_types() {
        assert_eq!(enable_record("gs1", true, now()).event_type, LogEventType::Enable);
        assert_eq!(enable_record("gs1", false, now()).event_type, LogEventType::Disable);
    }
}
