//! Event and state persistence
//!
//! The monitors never talk to storage directly. Log records and snapshots are
//! handed to an [`EventLog`] by the dispatcher, and history is read back once
//! at startup to rebuild on/off and enable/disable state.
//!
//! - [`SledEventLog`]: durable backend in the service data directory
//! - [`InMemoryEventLog`]: bounded in-memory backend for tests and ephemeral runs
//! - [`ProcessLock`]: keeps a second instance away from the sled database

pub mod events;
pub mod lockfile;
pub mod persistence;

pub use events::SledEventLog;
pub use lockfile::ProcessLock;
pub use persistence::{EventLog, InMemoryEventLog, StorageError};
