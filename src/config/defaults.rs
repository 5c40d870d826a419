//! System-wide default constants.
//!
//! Values used when a configuration file leaves a field out. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Debounce
// ============================================================================

/// Consecutive identical samples needed before a numeric state commits.
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 5;

// ============================================================================
// Engines
// ============================================================================

/// Average RPM above which an engine counts as running.
pub const RUNNING_THRESHOLD_RPM: f64 = 100.0;

/// Oil pressure is not trusted for this long after the engine starts (seconds).
pub const RUN_GRACE_SECS: u64 = 10;

/// Oil pressure is not trusted for this long after the engine stops (seconds).
///
/// Longer than the run grace: the switch bleeds down slowly during spin-down.
pub const STOP_GRACE_SECS: u64 = 30;

// ============================================================================
// Pumps
// ============================================================================

/// A pump left on longer than this raises a severe alarm (seconds).
pub const PUMP_ON_TOO_LONG_SECS: u64 = 300;

// ============================================================================
// Tanks
// ============================================================================

/// Settling window after start-up before tank levels are evaluated (seconds).
pub const TANK_SETTLE_SECS: u64 = 45;

/// Percent-full readings are rounded to this step.
pub const PERCENTAGE_PRECISION: f64 = 5.0;

/// Range-finder blind zone, i.e. the distance reading at the full mark (cm).
pub const TANK_MIN_DISTANCE_CM: f64 = 25.0;

/// Range-finder distance reading at the empty mark (cm).
pub const TANK_MAX_DISTANCE_CM: f64 = 450.0;

// ============================================================================
// Pipeline
// ============================================================================

/// Interval of the transitions-only background sweep (seconds).
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// Interval between raw value snapshots (seconds).
pub const SNAPSHOT_INTERVAL_SECS: u64 = 30;

/// Capacity of each equipment worker's command queue.
pub const WORKER_QUEUE_CAPACITY: usize = 256;

/// How long a test alarm stays raised (seconds).
pub const ALARM_TEST_DURATION_SECS: u64 = 10;

// ============================================================================
// Storage
// ============================================================================

/// Default data directory for the event log and lock file.
pub const DATA_DIR: &str = "./data";

/// Raw value snapshots older than this are pruned (days, 0 keeps them all).
pub const STATE_RETENTION_DAYS: u64 = 30;

/// In-memory event log capacity (events).
pub const IN_MEMORY_MAX_EVENTS: usize = 10_000;

/// In-memory snapshot capacity (state records).
pub const IN_MEMORY_MAX_STATES: usize = 50_000;
