//! Ordered fan-out of alert events over three broadcast channels.
//!
//! One tokio broadcast channel per [`EventChannel`]. Payloads travel as
//! JSON text, the same encoding an external broker would carry, and are
//! decoded on the subscriber side.
//!
//! There is no durable backlog: a subscriber only sees events published
//! after it subscribed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use nodeguard_core::{AlertEvent, EventChannel};

use crate::error::BusError;

/// Default number of buffered events per channel.
pub const DEFAULT_CAPACITY: usize = 256;

/// In-process publish/subscribe bus with three named channels.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<EventChannel, broadcast::Sender<Arc<str>>>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per channel.
    pub fn new(capacity: usize) -> Self {
        let channels = EventChannel::ALL
            .into_iter()
            .map(|channel| (channel, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    fn sender(&self, channel: EventChannel) -> &broadcast::Sender<Arc<str>> {
        // Every channel is created in `new`.
        &self.channels[&channel]
    }

    /// Publish without blocking. Returns the number of live subscribers.
    ///
    /// Publishing with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, channel: EventChannel, event: &AlertEvent) -> Result<usize, BusError> {
        let payload = serde_json::to_string(event).map_err(|e| BusError::Encode(e.to_string()))?;
        match self.sender(channel).send(Arc::from(payload)) {
            Ok(receivers) => {
                debug!(%channel, node_id = %event.node_id(), kind = event.kind(), receivers, "event published");
                Ok(receivers)
            }
            Err(_) => {
                debug!(%channel, node_id = %event.node_id(), kind = event.kind(), "event dropped, no subscribers");
                Ok(0)
            }
        }
    }

    /// Subscribe to one channel, starting from the next published event.
    pub fn subscribe(&self, channel: EventChannel) -> Subscription {
        Subscription {
            channel,
            receiver: self.sender(channel).subscribe(),
        }
    }

    /// Live subscriber count on a channel.
    pub fn subscriber_count(&self, channel: EventChannel) -> usize {
        self.sender(channel).receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Ordered stream of events from one channel.
pub struct Subscription {
    channel: EventChannel,
    receiver: broadcast::Receiver<Arc<str>>,
}

impl Subscription {
    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    /// Next event in publish order, or `None` once the bus is gone.
    ///
    /// Lagged gaps and undecodable payloads are logged and skipped.
    pub async fn next(&mut self) -> Option<AlertEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => match serde_json::from_str::<AlertEvent>(&payload) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        warn!(channel = %self.channel, error = %e, "dropping undecodable event");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
