//! Service Configuration Module
//!
//! Describes the monitored equipment (engines, pumps, tanks), their sensors
//! and every classification threshold, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `ENGINE_ROOM_CONFIG` environment variable (path to TOML file)
//! 2. `engine_room.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary loads one `ServiceConfig` at startup and hands the relevant
//! sections to each component explicitly:
//!
//! ```ignore
//! let config = ServiceConfig::load();
//! let monitors = build_monitors(&config, event_log.as_ref(), clock.now())?;
//! ```

mod service_config;
pub mod defaults;
pub mod validation;

pub use service_config::*;
