//! Shared data structures for engine room monitoring
//!
//! This module defines the values exchanged between the sampling side, the
//! equipment monitors and the alerting/persistence collaborators:
//! - Samples: raw readings pushed by the hardware bridge (`Sample`, `Reading`)
//! - Alarms: per-device alarm severity and the alert events monitors emit
//! - Records: audit log records, persisted events and raw-value snapshots

mod alarm;
mod record;
mod sample;

pub use alarm::{AlarmState, AlertEvent};
pub use record::{Evaluation, EventRecord, LogEventType, LogRecord, StateRecord, StateSnapshot};
pub use sample::{Measurement, Reading, Sample, SensorStatus};
