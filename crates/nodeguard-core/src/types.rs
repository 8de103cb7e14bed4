//! Domain types shared across nodeguard crates.
//!
//! These types flow from the prober through the health state machine,
//! over the event bus, and into the alert dispatcher. All of them are
//! JSON-serializable: health-check results are persisted to the catalog
//! and alert events travel the bus as JSON payloads.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a monitored node.
pub type NodeId = String;

// ── Nodes ──────────────────────────────────────────────────────────

/// A node under monitoring, as supplied by the catalog.
///
/// Read-only to the core and re-read every polling cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoredNode {
    pub id: NodeId,
    /// Chain identifier (e.g. "eth", "pol", "avax").
    pub chain: String,
    /// Host address or FQDN the node runs on.
    pub host: String,
    /// HAProxy backend this node is a member of.
    pub backend: String,
    /// HAProxy server name of this node inside `backend`. Defaults to `id`.
    #[serde(default)]
    pub server: Option<String>,
    pub port: u16,
    /// Consecutive ERROR observations required before alerting.
    pub threshold: u32,
    #[serde(default)]
    pub haproxy_enabled: bool,
    #[serde(default)]
    pub muted: bool,
}

impl MonitoredNode {
    /// Server name used in HAProxy commands.
    pub fn server_name(&self) -> &str {
        self.server.as_deref().unwrap_or(&self.id)
    }

    /// `host:port` address of the node.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Short human-readable label used in logs and alert messages.
    pub fn label(&self) -> String {
        format!("{}/{} ({})", self.chain, self.id, self.host)
    }
}

// ── Health checks ──────────────────────────────────────────────────

/// Coarse status of a single health check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Ok,
    Error,
    Info,
    Warning,
}

/// Detailed condition reported by a health check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Healthy,
    Offline,
    NoResponse,
    NotSynchronized,
    ErrorResponse,
    NoPeers,
    PeerNotSynchronized,
    Pending,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Condition::Healthy => "HEALTHY",
            Condition::Offline => "OFFLINE",
            Condition::NoResponse => "NO_RESPONSE",
            Condition::NotSynchronized => "NOT_SYNCHRONIZED",
            Condition::ErrorResponse => "ERROR_RESPONSE",
            Condition::NoPeers => "NO_PEERS",
            Condition::PeerNotSynchronized => "PEER_NOT_SYNCHRONIZED",
            Condition::Pending => "PENDING",
        };
        f.write_str(s)
    }
}

/// Output of one probe against one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub condition: Condition,
    /// Prober-specific payload, opaque to the core.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Unix timestamp (milliseconds) when the check completed.
    pub timestamp: u64,
}

impl HealthCheckResult {
    /// Build a result stamped with the current time.
    pub fn new(status: HealthStatus, condition: Condition, details: serde_json::Value) -> Self {
        Self {
            status,
            condition,
            details,
            timestamp: epoch_millis(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Ok, Condition::Healthy, serde_json::Value::Null)
    }

    pub fn error(condition: Condition, details: serde_json::Value) -> Self {
        Self::new(HealthStatus::Error, condition, details)
    }

    /// Result recorded when a probe exceeds its deadline.
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::error(
            Condition::NoResponse,
            serde_json::json!({ "reason": "probe timed out", "timeout_ms": timeout_ms }),
        )
    }

    /// Override the timestamp (for deterministic tests and replay).
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ── Alert events ───────────────────────────────────────────────────

/// Named channels on the event bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    Trigger,
    /// Reserved for a manual re-alert path; nothing in the core publishes here.
    Retrigger,
    Resolved,
}

impl EventChannel {
    pub const ALL: [EventChannel; 3] = [
        EventChannel::Trigger,
        EventChannel::Retrigger,
        EventChannel::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventChannel::Trigger => "trigger",
            EventChannel::Retrigger => "retrigger",
            EventChannel::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert-lifecycle transition.
///
/// Published once per transition and never edited afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// The node crossed its failure threshold.
    Triggered {
        node: MonitoredNode,
        result: HealthCheckResult,
        consecutive_errors: u32,
    },
    /// The node returned to OK after an error episode.
    Resolved {
        node: MonitoredNode,
        result: HealthCheckResult,
        /// Failures accumulated during the episode.
        consecutive_errors: u32,
        /// Whether the episode ever crossed the threshold.
        was_alerting: bool,
    },
}

impl AlertEvent {
    pub fn node(&self) -> &MonitoredNode {
        match self {
            AlertEvent::Triggered { node, .. } | AlertEvent::Resolved { node, .. } => node,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node().id
    }

    pub fn result(&self) -> &HealthCheckResult {
        match self {
            AlertEvent::Triggered { result, .. } | AlertEvent::Resolved { result, .. } => result,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Triggered { .. } => "triggered",
            AlertEvent::Resolved { .. } => "resolved",
        }
    }

    /// Default bus channel for this event.
    pub fn channel(&self) -> EventChannel {
        match self {
            AlertEvent::Triggered { .. } => EventChannel::Trigger,
            AlertEvent::Resolved { .. } => EventChannel::Resolved,
        }
    }

    /// Key identifying this transition across redeliveries.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.kind(), self.node_id(), self.result().timestamp)
    }
}

/// Current unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
