//! Incident-management adapter.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::chat::BoxFuture;
use crate::error::DispatchError;
use crate::format::NewIncident;

const CHANNEL: &str = "incident api";

/// Opens incidents and returns the provider's incident id.
pub trait IncidentSink: Send + Sync {
    fn create<'a>(&'a self, incident: &'a NewIncident) -> BoxFuture<'a, Result<String, DispatchError>>;
}

/// Connection settings for a PagerDuty-compatible REST API.
#[derive(Debug, Clone)]
pub struct PagerDutyConfig {
    /// API base URL, e.g. `https://api.pagerduty.com`.
    pub base_url: String,
    pub token: String,
    pub service_id: String,
    /// Requester email sent in the `From` header.
    pub from: String,
    pub timeout: Duration,
}

pub struct PagerDutyClient {
    client: reqwest::Client,
    config: PagerDutyConfig,
}

#[derive(Deserialize)]
struct CreatedIncident {
    incident: IncidentRef,
}

#[derive(Deserialize)]
struct IncidentRef {
    id: String,
}

impl PagerDutyClient {
    pub fn new(config: PagerDutyConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Request {
                channel: CHANNEL,
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Request body for `POST /incidents`.
    pub fn request_body(&self, incident: &NewIncident) -> serde_json::Value {
        json!({
            "incident": {
                "type": "incident",
                "title": incident.title,
                "urgency": incident.urgency,
                "service": {
                    "id": self.config.service_id,
                    "type": "service_reference",
                },
                "body": {
                    "type": "incident_body",
                    "details": incident.details,
                },
            }
        })
    }
}

impl IncidentSink for PagerDutyClient {
    fn create<'a>(&'a self, incident: &'a NewIncident) -> BoxFuture<'a, Result<String, DispatchError>> {
        Box::pin(async move {
            let url = format!("{}/incidents", self.config.base_url.trim_end_matches('/'));
            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Token token={}", self.config.token))
                .header("Accept", "application/vnd.pagerduty+json;version=2")
                .header("From", &self.config.from)
                .json(&self.request_body(incident))
                .send()
                .await
                .map_err(|e| DispatchError::Request {
                    channel: CHANNEL,
                    message: e.to_string(),
                })?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DispatchError::Status {
                    channel: CHANNEL,
                    status: status.as_u16(),
                    body,
                });
            }

            let created: CreatedIncident = resp.json().await.map_err(|e| DispatchError::Decode {
                channel: CHANNEL,
                message: e.to_string(),
            })?;
            debug!(incident_id = %created.incident.id, title = %incident.title, "incident created");
            Ok(created.incident.id)
        })
    }
}
