//! Service Configuration - equipment, sensors and thresholds as TOML values
//!
//! Every threshold the monitors use is a field here. Each struct implements
//! `Default`, so a partial file (or no file at all) still yields a complete,
//! valid configuration for the standard engine room layout.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::monitor::{engine, tank};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one engine room.
///
/// Load with `ServiceConfig::load()` which searches:
/// 1. `$ENGINE_ROOM_CONFIG` env var
/// 2. `./engine_room.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceInfo,

    /// Background sweep and snapshot cadence
    #[serde(default)]
    pub timing: TimingConfig,

    /// Default debounce stability for numeric dimensions
    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default = "default_engines")]
    pub engines: Vec<EngineConfig>,

    #[serde(default = "default_pumps")]
    pub pumps: Vec<PumpConfig>,

    #[serde(default = "default_tanks")]
    pub tanks: Vec<TankConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service: ServiceInfo::default(),
            timing: TimingConfig::default(),
            debounce: DebounceConfig::default(),
            engines: default_engines(),
            pumps: default_pumps(),
            tanks: default_tanks(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration using the standard search order:
    /// 1. `$ENGINE_ROOM_CONFIG` environment variable
    /// 2. `./engine_room.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("ENGINE_ROOM_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), service = %config.service.name, "Loaded config from ENGINE_ROOM_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ENGINE_ROOM_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ENGINE_ROOM_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("engine_room.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(service = %config.service.name, "Loaded config from ./engine_room.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./engine_room.toml, using defaults");
                }
            }
        }

        info!("No engine_room.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings first; then the document is
    /// deserialized and validated.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the whole configuration, collecting every problem.
    ///
    /// Rules:
    /// - Threshold tables must be finite and strictly increasing
    /// - Grace, settle, timer and interval durations must be positive
    /// - Stability thresholds must be >= 1
    /// - Equipment and sensor IDs must be non-empty and unique
    /// - Tank min_distance must be below max_distance
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.timing.sweep_interval_secs == 0 {
            errors.push("timing.sweep_interval_secs must be > 0".to_string());
        }
        if self.timing.snapshot_interval_secs == 0 {
            errors.push("timing.snapshot_interval_secs must be > 0".to_string());
        }
        if self.debounce.stability_threshold == 0 {
            errors.push("debounce.stability_threshold must be >= 1".to_string());
        }

        let mut ids = IdRegistry::default();

        for e in &self.engines {
            let name = format!("engines.{}", e.id);
            ids.register(&e.id, &format!("{} id", name), &mut errors);
            ids.register(&e.rpm_sensor, &format!("{}.rpm_sensor", name), &mut errors);
            ids.register(&e.oil_sensor, &format!("{}.oil_sensor", name), &mut errors);
            if let Some(temp) = &e.temp_sensor {
                ids.register(temp, &format!("{}.temp_sensor", name), &mut errors);
            }

            if !e.running_threshold_rpm.is_finite() || e.running_threshold_rpm < 0.0 {
                errors.push(format!("{}.running_threshold_rpm must be a non-negative number", name));
            }
            if let Err(err) = engine::rpm_map(&e.rpm) {
                errors.push(format!("{}.rpm: {}", name, err));
            }
            if let Err(err) = engine::temp_map(&e.temperature) {
                errors.push(format!("{}.temperature: {}", name, err));
            }
            Self::check_positive(e.run_grace_secs, &format!("{}.run_grace_secs", name), &mut errors);
            Self::check_positive(e.stop_grace_secs, &format!("{}.stop_grace_secs", name), &mut errors);
            Self::check_stability(e.stability_threshold, &name, &mut errors);
        }

        for p in &self.pumps {
            let name = format!("pumps.{}", p.id);
            ids.register(&p.id, &format!("{} id", name), &mut errors);
            ids.register(&p.switch_sensor, &format!("{}.switch_sensor", name), &mut errors);
            Self::check_positive(p.on_too_long_secs, &format!("{}.on_too_long_secs", name), &mut errors);
            if let Some(off) = p.off_too_long_secs {
                Self::check_positive(off, &format!("{}.off_too_long_secs", name), &mut errors);
            }
        }

        for t in &self.tanks {
            let name = format!("tanks.{}", t.id);
            ids.register(&t.id, &format!("{} id", name), &mut errors);
            ids.register(&t.level_sensor, &format!("{}.level_sensor", name), &mut errors);
            if let Err(err) = tank::level_map(&t.levels) {
                errors.push(format!("{}.levels: {}", name, err));
            }
            Self::check_positive(t.settle_secs, &format!("{}.settle_secs", name), &mut errors);
            if !(t.min_distance.is_finite() && t.max_distance.is_finite())
                || t.min_distance >= t.max_distance
            {
                errors.push(format!(
                    "{}: min_distance ({}) must be less than max_distance ({})",
                    name, t.min_distance, t.max_distance
                ));
            }
            if matches!(&t.group, Some(g) if g.trim().is_empty()) {
                errors.push(format!("{}.group must not be empty when set", name));
            }
            Self::check_stability(t.stability_threshold, &name, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(secs: u64, name: &str, errors: &mut Vec<String>) {
        if secs == 0 {
            errors.push(format!("{} must be > 0", name));
        }
    }

    fn check_stability(value: Option<u32>, name: &str, errors: &mut Vec<String>) {
        if value == Some(0) {
            errors.push(format!("{}.stability_threshold must be >= 1", name));
        }
    }
}

/// Tracks IDs seen during validation; all equipment and sensors share one
/// namespace because alarms are keyed by device ID.
#[derive(Default)]
struct IdRegistry {
    seen: HashSet<String>,
}

impl IdRegistry {
    fn register(&mut self, id: &str, field: &str, errors: &mut Vec<String>) {
        if id.trim().is_empty() {
            errors.push(format!("{} must not be empty", field));
        } else if !self.seen.insert(id.to_string()) {
            errors.push(format!("duplicate device id '{}' ({})", id, field));
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, e) => Some(e),
            ConfigError::Parse(_, e) => Some(e),
            ConfigError::Serialize(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

// ============================================================================
// Service / Timing / Debounce
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Directory holding the event log and lock file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Age after which raw value snapshots are pruned; 0 keeps them forever
    #[serde(default = "default_state_retention")]
    pub state_retention_days: u64,
}

fn default_service_name() -> String {
    "engine-room".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}
fn default_state_retention() -> u64 { defaults::STATE_RETENTION_DAYS }

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            data_dir: default_data_dir(),
            state_retention_days: default_state_retention(),
        }
    }
}

impl ServiceInfo {
    /// Snapshot retention window, `None` when snapshots are kept forever.
    pub fn state_retention(&self) -> Option<Duration> {
        (self.state_retention_days > 0)
            .then(|| Duration::from_secs(self.state_retention_days.saturating_mul(86_400)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Background transitions-only sweep over every monitor
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Raw value snapshot logging
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

fn default_sweep_interval() -> u64 { defaults::SWEEP_INTERVAL_SECS }
fn default_snapshot_interval() -> u64 { defaults::SNAPSHOT_INTERVAL_SECS }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

impl TimingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Consecutive identical samples needed to commit a new state
    #[serde(default = "default_stability")]
    pub stability_threshold: u32,
}

fn default_stability() -> u32 { defaults::DEFAULT_STABILITY_THRESHOLD }

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            stability_threshold: default_stability(),
        }
    }
}

// ============================================================================
// Engines
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: String,
    pub rpm_sensor: String,
    pub oil_sensor: String,
    /// `None` when no temperature probe is wired; the temperature dimension
    /// then reports NO_SENSOR.
    #[serde(default)]
    pub temp_sensor: Option<String>,

    /// Engine counts as running when average RPM is above this
    #[serde(default = "default_running_threshold")]
    pub running_threshold_rpm: f64,
    /// Delay after starting before oil pressure is trusted
    #[serde(default = "default_run_grace")]
    pub run_grace_secs: u64,
    /// Delay after stopping before oil pressure is trusted
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
    /// Oil switch polarity: true when a closed switch means pressure present
    #[serde(default = "default_true")]
    pub pressure_when_closed: bool,
    /// Overrides `debounce.stability_threshold` for this engine
    #[serde(default)]
    pub stability_threshold: Option<u32>,

    #[serde(default)]
    pub rpm: RpmThresholds,
    #[serde(default)]
    pub temperature: TempThresholds,
}

fn default_running_threshold() -> f64 { defaults::RUNNING_THRESHOLD_RPM }
fn default_run_grace() -> u64 { defaults::RUN_GRACE_SECS }
fn default_stop_grace() -> u64 { defaults::STOP_GRACE_SECS }
fn default_true() -> bool { true }

impl EngineConfig {
    /// Engine with the conventional `<id>_rpm`, `<id>_oil`, `<id>_temp` sensors.
    pub fn standard(id: &str) -> Self {
        Self {
            id: id.to_string(),
            rpm_sensor: format!("{}_rpm", id),
            oil_sensor: format!("{}_oil", id),
            temp_sensor: Some(format!("{}_temp", id)),
            running_threshold_rpm: default_running_threshold(),
            run_grace_secs: default_run_grace(),
            stop_grace_secs: default_stop_grace(),
            pressure_when_closed: true,
            stability_threshold: None,
            rpm: RpmThresholds::default(),
            temperature: TempThresholds::default(),
        }
    }

    pub fn run_grace(&self) -> Duration {
        Duration::from_secs(self.run_grace_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Lower bounds of the RPM bands. Below `slow` the band is OFF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpmThresholds {
    #[serde(default = "default_rpm_slow")]
    pub slow: f64,
    #[serde(default = "default_rpm_normal")]
    pub normal: f64,
    #[serde(default = "default_rpm_fast")]
    pub fast: f64,
    #[serde(default = "default_rpm_too_fast")]
    pub too_fast: f64,
}

fn default_rpm_slow() -> f64 { 100.0 }
fn default_rpm_normal() -> f64 { 800.0 }
fn default_rpm_fast() -> f64 { 2200.0 }
fn default_rpm_too_fast() -> f64 { 2500.0 }

impl Default for RpmThresholds {
    fn default() -> Self {
        Self {
            slow: default_rpm_slow(),
            normal: default_rpm_normal(),
            fast: default_rpm_fast(),
            too_fast: default_rpm_too_fast(),
        }
    }
}

/// Lower bounds of the temperature bands (°C). Below `hot` the band is OK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempThresholds {
    #[serde(default = "default_temp_hot")]
    pub hot: f64,
    #[serde(default = "default_temp_too_hot")]
    pub too_hot: f64,
}

fn default_temp_hot() -> f64 { 85.0 }
fn default_temp_too_hot() -> f64 { 95.0 }

impl Default for TempThresholds {
    fn default() -> Self {
        Self {
            hot: default_temp_hot(),
            too_hot: default_temp_too_hot(),
        }
    }
}

// ============================================================================
// Pumps
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub id: String,
    pub switch_sensor: String,
    /// Severe alarm when the pump stays on longer than this
    #[serde(default = "default_on_too_long")]
    pub on_too_long_secs: u64,
    /// Minor alarm when the pump stays off longer than this (disabled if unset)
    #[serde(default)]
    pub off_too_long_secs: Option<u64>,
}

fn default_on_too_long() -> u64 { defaults::PUMP_ON_TOO_LONG_SECS }

impl PumpConfig {
    /// Pump with the conventional `<id>_switch` sensor.
    pub fn standard(id: &str) -> Self {
        Self {
            id: id.to_string(),
            switch_sensor: format!("{}_switch", id),
            on_too_long_secs: default_on_too_long(),
            off_too_long_secs: None,
        }
    }

    pub fn on_too_long(&self) -> Duration {
        Duration::from_secs(self.on_too_long_secs)
    }

    pub fn off_too_long(&self) -> Option<Duration> {
        self.off_too_long_secs.map(Duration::from_secs)
    }
}

// ============================================================================
// Tanks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankConfig {
    pub id: String,
    pub level_sensor: String,
    /// Tanks sharing a group report a combined percent full
    #[serde(default)]
    pub group: Option<String>,
    /// Range-finder distance at the full mark (cm)
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    /// Range-finder distance at the empty mark (cm)
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    /// No evaluation is trusted for this long after start-up
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
    #[serde(default)]
    pub stability_threshold: Option<u32>,
    #[serde(default)]
    pub levels: LevelThresholds,
}

fn default_min_distance() -> f64 { defaults::TANK_MIN_DISTANCE_CM }
fn default_max_distance() -> f64 { defaults::TANK_MAX_DISTANCE_CM }
fn default_settle() -> u64 { defaults::TANK_SETTLE_SECS }

impl TankConfig {
    /// Tank with the conventional `<id>_level` sensor.
    pub fn standard(id: &str, group: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            level_sensor: format!("{}_level", id),
            group: group.map(str::to_string),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            settle_secs: default_settle(),
            stability_threshold: None,
            levels: LevelThresholds::default(),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Lower bounds (percent full) of the fluid level bands. Below `very_low`
/// the tank is EMPTY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelThresholds {
    #[serde(default = "default_level_very_low")]
    pub very_low: f64,
    #[serde(default = "default_level_low")]
    pub low: f64,
    #[serde(default = "default_level_ok")]
    pub ok: f64,
    #[serde(default = "default_level_full")]
    pub full: f64,
}

fn default_level_very_low() -> f64 { 10.0 }
fn default_level_low() -> f64 { 25.0 }
fn default_level_ok() -> f64 { 40.0 }
fn default_level_full() -> f64 { 95.0 }

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            very_low: default_level_very_low(),
            low: default_level_low(),
            ok: default_level_ok(),
            full: default_level_full(),
        }
    }
}

// ============================================================================
// Default equipment layout
// ============================================================================

fn default_engines() -> Vec<EngineConfig> {
    vec![EngineConfig::standard("gs1"), EngineConfig::standard("gs2")]
}

fn default_pumps() -> Vec<PumpConfig> {
    vec![PumpConfig::standard("pmp_clp"), PumpConfig::standard("pmp_sol")]
}

fn default_tanks() -> Vec<TankConfig> {
    vec![
        TankConfig::standard("wt1", Some("water")),
        TankConfig::standard("wt2", Some("water")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            [debounce]
            stability_threshold = 3

            [[engines]]
            id = "main"
            rpm_sensor = "main_rpm"
            oil_sensor = "main_oil"
            "#,
        )
        .unwrap();
        assert_eq!(config.debounce.stability_threshold, 3);
        assert_eq!(config.engines.len(), 1);
        assert!(config.engines[0].temp_sensor.is_none());
        assert_eq!(config.engines[0].run_grace_secs, defaults::RUN_GRACE_SECS);
        assert_eq!(config.pumps.len(), 2);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.engines[0].rpm.fast = 100.0;
        config.engines[0].run_grace_secs = 0;
        config.pumps[1].switch_sensor = config.pumps[0].switch_sensor.clone();
        config.tanks[0].min_distance = 500.0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 4, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("duplicate device id")));
                assert!(errors.iter().any(|e| e.contains("run_grace_secs")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_to_toml_round_trips_through_loader() {
        let toml = ServiceConfig::default().to_toml().unwrap();
        let config = ServiceConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.tanks.len(), 2);
        assert_eq!(config.tanks[0].group.as_deref(), Some("water"));
    }
}
