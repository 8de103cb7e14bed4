//! nodeguard-state — catalog store for nodeguard.
//!
//! Backed by [redb](https://docs.rs/redb), holds the monitored node
//! records and a bounded per-node log of raw health-check results.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{HealthLogEntry, StateStore};
