//! Fluid tank monitor
//!
//! Percent full is classified into a fluid level band. The level sensor is
//! a range-finder whose rolling average needs time to fill, so nothing is
//! evaluated until a settle window after start-up has passed.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::equipment::{Dimension, DimensionState};
use super::history::ReplayedHistory;
use super::threshold_map::{ThresholdError, ThresholdMap};
use super::{enable_record, Deferred, DeferredKind, EquipmentKind, Monitor, MonitorError};
use crate::config::defaults::PERCENTAGE_PRECISION;
use crate::config::{LevelThresholds, TankConfig};
use crate::types::{AlarmState, Evaluation, LogRecord, Reading, Sample, SensorStatus, StateSnapshot};

/// Snapshot name of the percent-full value.
pub const PERCENT_FULL: &str = "PercentFull";

/// Fluid level band. `SensorFault` is only reachable through a status signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FluidLevel {
    Empty,
    VeryLow,
    Low,
    Ok,
    Full,
    SensorFault,
}

impl fmt::Display for FluidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FluidLevel::Empty => "EMPTY",
            FluidLevel::VeryLow => "VERY_LOW",
            FluidLevel::Low => "LOW",
            FluidLevel::Ok => "OK",
            FluidLevel::Full => "FULL",
            FluidLevel::SensorFault => "SENSOR_FAULT",
        };
        f.write_str(s)
    }
}

impl DimensionState for FluidLevel {
    fn alarm_state(&self) -> AlarmState {
        match self {
            FluidLevel::Empty => AlarmState::Critical,
            FluidLevel::VeryLow => AlarmState::Severe,
            FluidLevel::Low => AlarmState::Minor,
            FluidLevel::Ok | FluidLevel::Full => AlarmState::Off,
            FluidLevel::SensorFault => AlarmState::Moderate,
        }
    }
}

/// Level threshold table; below `very_low` is EMPTY.
pub fn level_map(t: &LevelThresholds) -> Result<ThresholdMap<FluidLevel>, ThresholdError> {
    ThresholdMap::new(
        FluidLevel::Empty,
        vec![
            (FluidLevel::VeryLow, t.very_low),
            (FluidLevel::Low, t.low),
            (FluidLevel::Ok, t.ok),
            (FluidLevel::Full, t.full),
        ],
    )
}

/// Convert a range-finder distance into percent full, rounded to the
/// configured precision. `min_distance` is the full mark, `max_distance`
/// the empty mark; readings outside the range are clamped.
pub fn percent_full_from_distance(distance: f64, min_distance: f64, max_distance: f64) -> f64 {
    let span = max_distance - min_distance;
    if !span.is_finite() || span <= 0.0 || !distance.is_finite() {
        return 0.0;
    }
    let distance_percent = ((distance - min_distance) / span * 100.0).clamp(0.0, 100.0);
    100.0 - (distance_percent / PERCENTAGE_PRECISION).round() * PERCENTAGE_PRECISION
}

/// Mean percent full of a tank group, rounded to the configured precision.
pub fn group_percent_full(levels: &[f64]) -> Option<f64> {
    if levels.is_empty() {
        return None;
    }
    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    Some((mean / PERCENTAGE_PRECISION).round() * PERCENTAGE_PRECISION)
}

pub struct TankMonitor {
    id: String,
    level_sensor: String,
    group: Option<String>,
    min_distance: f64,
    max_distance: f64,
    settle: Duration,
    level_map: ThresholdMap<FluidLevel>,

    enabled: bool,
    settle_until: DateTime<Utc>,
    previous_average: Option<f64>,
    filling: bool,
    level: Dimension<FluidLevel>,
}

impl TankMonitor {
    pub fn new(
        config: &TankConfig,
        default_stability: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, MonitorError> {
        let level_map = level_map(&config.levels).map_err(|source| MonitorError::Threshold {
            equipment: config.id.clone(),
            dimension: "level",
            source,
        })?;
        if config.min_distance >= config.max_distance {
            return Err(MonitorError::Config {
                equipment: config.id.clone(),
                message: format!(
                    "min_distance ({}) must be less than max_distance ({})",
                    config.min_distance, config.max_distance
                ),
            });
        }
        let stability = config.stability_threshold.unwrap_or(default_stability);

        Ok(Self {
            id: config.id.clone(),
            level_sensor: config.level_sensor.clone(),
            group: config.group.clone(),
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            settle: config.settle(),
            level_map,
            enabled: true,
            settle_until: now + chrono::Duration::from_std(config.settle()).unwrap_or(chrono::Duration::zero()),
            previous_average: None,
            filling: false,
            level: Dimension::new("level", config.level_sensor.clone(), FluidLevel::Ok, stability, now),
        })
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn level(&self) -> FluidLevel {
        self.level.current()
    }

    pub fn percent_full(&self) -> Option<f64> {
        self.level.last_value()
    }

    /// True while the last two readings show the level rising.
    pub fn is_filling(&self) -> bool {
        self.filling
    }

    pub fn is_settled(&self, now: DateTime<Utc>) -> bool {
        now >= self.settle_until
    }

    fn ingest_percent(&mut self, percent: f64, at: DateTime<Utc>) {
        if let Some(previous) = self.previous_average {
            self.filling = percent > previous;
        }
        self.previous_average = Some(percent);
        self.level.observe(self.level_map.classify(percent), percent, at);
    }
}

impl Monitor for TankMonitor {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EquipmentKind {
        EquipmentKind::Tank
    }

    fn sensor_ids(&self) -> Vec<String> {
        vec![self.level_sensor.clone()]
    }

    /// Tanks have no on/off history; initialization restores the enable
    /// flag and restarts the settle window.
    fn initialize(&mut self, history: &ReplayedHistory, now: DateTime<Utc>) {
        self.enabled = history.enabled;
        self.settle_until = now + chrono::Duration::from_std(self.settle).unwrap_or(chrono::Duration::zero());
    }

    fn ingest(&mut self, sample: &Sample) -> Vec<Deferred> {
        let at = sample.timestamp;
        match sample.reading {
            Reading::Measurement { average, .. } if sample.device_id == self.level_sensor => {
                self.ingest_percent(average, at);
            }
            Reading::Distance { average, .. } if sample.device_id == self.level_sensor => {
                let percent = percent_full_from_distance(average, self.min_distance, self.max_distance);
                self.ingest_percent(percent, at);
            }
            Reading::Status { status } if sample.device_id == self.level_sensor => {
                let sentinel = (status != SensorStatus::Ok).then_some(FluidLevel::SensorFault);
                self.level.set_sentinel(sentinel, at);
            }
            ref other => {
                tracing::debug!(tank = %self.id, device = %sample.device_id, reading = ?other, "Ignoring unexpected reading");
            }
        }
        Vec::new()
    }

    fn evaluate(&mut self, now: DateTime<Utc>, transitions_only: bool) -> Vec<Evaluation> {
        if !self.enabled {
            return Vec::new();
        }
        if !self.is_settled(now) {
            tracing::debug!(tank = %self.id, settle_until = %self.settle_until, "Tank still settling, skipping evaluation");
            return Vec::new();
        }

        let level = self.level.current();
        let alarm = if level == FluidLevel::VeryLow && self.filling {
            AlarmState::Moderate
        } else {
            level.alarm_state()
        };
        let id = self.id.clone();
        let filling = self.filling;

        self.level
            .evaluate_with_alarm(&id, transitions_only, alarm, now, |state, percent| {
                let mut msg = match percent {
                    Some(p) => format!("Tank {} level {} at {:.0}% full", id, state, p),
                    None => format!("Tank {} level {}", id, state),
                };
                if filling {
                    msg.push_str(" and filling");
                }
                msg
            })
            .into_iter()
            .collect()
    }

    fn on_deferred(&mut self, kind: DeferredKind, generation: u64, _now: DateTime<Utc>) -> Vec<Evaluation> {
        tracing::debug!(tank = %self.id, ?kind, generation, "Tank monitor has no deferred checks");
        Vec::new()
    }

    fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Option<LogRecord> {
        if self.enabled == enabled {
            return None;
        }
        self.enabled = enabled;
        if enabled && self.is_settled(now) {
            self.level.rebaseline();
        }
        Some(enable_record(&self.id, enabled, now))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn snapshot(&self) -> Vec<StateSnapshot> {
        self.level
            .last_value()
            .map(|percent| StateSnapshot {
                source: self.level_sensor.clone(),
                name: PERCENT_FULL.to_string(),
                value: percent,
                description: Some(if self.is_filling() {
                    format!("Level: {}, filling", self.level.current())
                } else {
                    format!("Level: {}", self.level.current())
                }),
            })
            .into_iter()
            .collect()
    }
}
