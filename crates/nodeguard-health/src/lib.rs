//! nodeguard-health — per-node polling and alert debouncing.
//!
//! The monitor runs one background task per catalog node. Every tick it
//! probes the node and hands the result to the state machine, which keeps
//! a consecutive-error counter per node and publishes `triggered` and
//! `resolved` events on the bus.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── reconcile() against the Catalog (start/stop per-node tasks)
//!   └── Per-node background task
//!       ├── Prober::probe() under probe_timeout → HealthCheckResult
//!       └── HealthStateMachine::observe()
//!           ├── Catalog::record_result()   (fire-and-forget)
//!           ├── AlertStateStore            (debounce)
//!           └── EventBus::publish()
//! ```
//!
//! # Debounce
//!
//! The `threshold`-th consecutive ERROR triggers exactly once per error
//! episode. The first OK after any ERROR ends the episode and emits a
//! `resolved` event carrying whether an alert was actually raised. INFO
//! and WARNING results are recorded but never move the counter.

pub mod alert_state;
pub mod catalog;
pub mod machine;
pub mod monitor;
pub mod probe;

pub use alert_state::{AlertStateStore, NodeAlertState, Transition};
pub use catalog::Catalog;
pub use machine::HealthStateMachine;
pub use monitor::{HealthMonitor, MonitorSettings, ReconcileStats};
pub use probe::{HttpProber, Prober, http_probe};
