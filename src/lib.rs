//! Engine Room: shipboard equipment health monitoring
//!
//! Turns raw readings from generator engines, pumps and tanks into
//! debounced health states, persists every transition and drives alarms.
//!
//! ## Architecture
//!
//! - **Monitors**: per-equipment state machines (threshold bands, debounce,
//!   grace windows, too-long timers)
//! - **Pipeline**: sample routing, one worker task per monitor, periodic
//!   sweeps and snapshots
//! - **Alarms**: one outstanding alarm per device, delivered to a sink
//! - **Storage**: audit event log and raw-value snapshots (sled or in-memory)

pub mod alarms;
pub mod config;
pub mod monitor;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::ServiceConfig;

// Re-export commonly used types
pub use types::{AlarmState, AlertEvent, Evaluation, LogEventType, LogRecord, Reading, Sample, SensorStatus};

// Re-export monitors
pub use monitor::{build_monitors, EngineMonitor, EquipmentKind, Monitor, PumpMonitor, TankMonitor};

// Re-export storage
pub use storage::{EventLog, InMemoryEventLog, SledEventLog, StorageError};
