//! Chat-webhook adapter.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::error::DispatchError;
use crate::format::ChatMessage;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const CHANNEL: &str = "chat webhook";

/// Destination for chat notifications.
pub trait ChatSink: Send + Sync {
    fn send<'a>(&'a self, message: &'a ChatMessage) -> BoxFuture<'a, Result<(), DispatchError>>;
}

/// Discord-style incoming webhook.
///
/// Posts `{content, embeds: [{title, color, fields}]}`; any 2xx is success.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Request {
                channel: CHANNEL,
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Webhook body for a chat message.
pub fn webhook_payload(message: &ChatMessage) -> serde_json::Value {
    json!({
        "content": message.content,
        "embeds": [{
            "title": message.title,
            "color": message.color,
            "fields": message.fields,
        }],
    })
}

impl ChatSink for DiscordWebhook {
    fn send<'a>(&'a self, message: &'a ChatMessage) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.url)
                .json(&webhook_payload(message))
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
            debug!(title = %message.title, status = status.as_u16(), "chat message delivered");
            Ok(())
        })
    }
}
