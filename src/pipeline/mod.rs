//! Sample pipeline
//!
//! Source -> ProcessingLoop -> Coordinator -> per-equipment Worker ->
//! Dispatcher (event log + alarm sink).
//!
//! - `source`: where samples come from (JSON lines, replay)
//! - `processing_loop`: sample routing plus the sweep and snapshot timers
//! - `coordinator`: sensor routing and operator requests
//! - `worker`: one task per monitor, deferred checks
//! - `dispatcher`: persistence and alarm delivery of transitions
//! - `clock`: wall time that follows the tokio clock

pub mod clock;
pub mod coordinator;
pub mod dispatcher;
pub mod processing_loop;
pub mod source;
mod worker;

pub use clock::Clock;
pub use coordinator::{Coordinator, PipelineError};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use processing_loop::{LoopStats, ProcessingLoop};
pub use source::{JsonLinesSource, SampleEvent, SampleSource, VecSource};
pub use worker::EquipmentStatus;
