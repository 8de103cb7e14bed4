//! nodeguard-core — shared types and configuration for nodeguard.
//!
//! Everything that crosses a crate boundary lives here: the monitored
//! node record, health-check results, alert events and their bus
//! channels, and the `nodeguard.toml` config schema.

pub mod config;
pub mod types;

pub use config::{duration_or, parse_duration, NodeguardConfig};
pub use types::*;
