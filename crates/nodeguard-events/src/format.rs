//! Human-readable alert formatting.

use serde::Serialize;

use nodeguard_core::{HealthCheckResult, MonitoredNode};

pub const COLOR_ALERT: u32 = 0xE7_4C_3C;
pub const COLOR_RESOLVED: u32 = 0x2E_CC_71;

/// A chat message: short content line plus an embed of titled fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub title: String,
    pub content: String,
    pub color: u32,
    pub fields: Vec<ChatField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl ChatField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

/// Incidents are only opened for confirmed failures, so every page is urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
}

/// Provider-neutral incident request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIncident {
    pub title: String,
    pub urgency: Urgency,
    pub details: String,
}

fn identity_fields(node: &MonitoredNode, result: &HealthCheckResult) -> Vec<ChatField> {
    vec![
        ChatField::inline("Node", node.id.clone()),
        ChatField::inline("Chain", node.chain.clone()),
        ChatField::inline("Host", node.address()),
        ChatField::inline("Backend", node.backend.clone()),
        ChatField::inline("Condition", result.condition.to_string()),
    ]
}

pub fn triggered_message(
    node: &MonitoredNode,
    result: &HealthCheckResult,
    consecutive_errors: u32,
) -> ChatMessage {
    let mut fields = identity_fields(node, result);
    fields.push(ChatField::inline(
        "Consecutive failures",
        consecutive_errors.to_string(),
    ));
    if !result.details.is_null() {
        fields.push(ChatField {
            name: "Details".to_string(),
            value: result.details.to_string(),
            inline: false,
        });
    }
    ChatMessage {
        title: format!("{} is {}", node.label(), result.condition),
        content: format!(
            "{} failed {} consecutive health checks ({})",
            node.label(),
            consecutive_errors,
            result.condition
        ),
        color: COLOR_ALERT,
        fields,
    }
}

pub fn resolved_message(
    node: &MonitoredNode,
    result: &HealthCheckResult,
    consecutive_errors: u32,
) -> ChatMessage {
    ChatMessage {
        title: format!("{} recovered", node.label()),
        content: format!(
            "{} is healthy again after {} failed checks",
            node.label(),
            consecutive_errors
        ),
        color: COLOR_RESOLVED,
        fields: identity_fields(node, result),
    }
}

pub fn incident_for(
    node: &MonitoredNode,
    result: &HealthCheckResult,
    consecutive_errors: u32,
) -> NewIncident {
    NewIncident {
        title: format!("{} is {}", node.label(), result.condition),
        urgency: Urgency::High,
        details: format!(
            "node: {}\nchain: {}\nhost: {}\nbackend: {}\ncondition: {}\nconsecutive failures: {}\ndetails: {}",
            node.id,
            node.chain,
            node.address(),
            node.backend,
            result.condition,
            consecutive_errors,
            result.details
        ),
    }
}
