//! nodeguard-events — alert event bus and dispatcher.
//!
//! # Architecture
//!
//! ```text
//! HealthStateMachine
//!   └── EventBus::publish(channel, event)      (JSON payload, non-blocking)
//!         ├── trigger    ─┐
//!         ├── retrigger  ─┼── Dispatcher (one ordered consumer per channel)
//!         └── resolved   ─┘     ├── ChatSink      (DiscordWebhook)
//!                               └── IncidentSink  (PagerDutyClient, critical chains only)
//! ```
//!
//! Delivery is at-least-once per live subscriber and the dispatcher is
//! idempotent over redelivered events. Outbound failures are reported
//! and dropped; the state transition that produced the event stands.

pub mod bus;
pub mod chat;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod incident;

pub use bus::{EventBus, Subscription};
pub use chat::{BoxFuture, ChatSink, DiscordWebhook};
pub use dispatch::{DispatchReport, Dispatcher, SeverityPolicy};
pub use error::{BusError, DispatchError};
pub use format::{ChatMessage, NewIncident, Urgency};
pub use incident::{IncidentSink, PagerDutyClient, PagerDutyConfig};
