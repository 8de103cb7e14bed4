//! Alert dispatcher: turns bus events into chat messages and incidents.
//!
//! One consumer task per bus channel processes events strictly in publish
//! order. Within one event the chat message and the incident are sent
//! concurrently. Delivery failures are logged and reported, never retried
//! and never fed back into the state machine.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use nodeguard_core::{AlertEvent, EventChannel, MonitoredNode};

use crate::bus::EventBus;
use crate::chat::ChatSink;
use crate::error::DispatchError;
use crate::format::{incident_for, resolved_message, triggered_message};
use crate::incident::IncidentSink;

/// Number of recent event keys remembered for duplicate suppression.
pub const DEDUP_WINDOW: usize = 1024;

/// Decides which nodes are high-severity.
#[derive(Debug, Clone, Default)]
pub struct SeverityPolicy {
    critical_chains: HashSet<String>,
}

impl SeverityPolicy {
    pub fn new<I, S>(critical_chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            critical_chains: critical_chains.into_iter().map(Into::into).collect(),
        }
    }

    /// High-severity nodes also get an incident on trigger.
    pub fn is_critical(&self, node: &MonitoredNode) -> bool {
        self.critical_chains.contains(&node.chain)
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReport {
    /// Outbound calls were attempted. `None` means the channel was not used.
    Delivered {
        chat: Option<Result<(), DispatchError>>,
        incident: Option<Result<String, DispatchError>>,
    },
    /// The node is muted in the catalog.
    Muted,
    /// Already handled this transition.
    Duplicate,
    /// A resolution for an episode that never alerted.
    Quiet,
}

/// Bounded set of recently seen keys, evicting oldest first.
struct DedupWindow {
    keys: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns false if the key was already present.
    fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.keys.insert(key);
        true
    }
}

pub struct Dispatcher {
    chat: Option<Arc<dyn ChatSink>>,
    incidents: Option<Arc<dyn IncidentSink>>,
    policy: SeverityPolicy,
    seen: Mutex<DedupWindow>,
}

impl Dispatcher {
    pub fn new(policy: SeverityPolicy) -> Self {
        Self {
            chat: None,
            incidents: None,
            policy,
            seen: Mutex::new(DedupWindow::new(DEDUP_WINDOW)),
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatSink>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_incidents(mut self, incidents: Arc<dyn IncidentSink>) -> Self {
        self.incidents = Some(incidents);
        self
    }

    /// Handle one event.
    pub async fn on_event(&self, event: &AlertEvent) -> DispatchReport {
        let node = event.node();
        if node.muted {
            debug!(node_id = %node.id, kind = event.kind(), "alert suppressed, node muted");
            return DispatchReport::Muted;
        }

        let fresh = match self.seen.lock() {
            Ok(mut seen) => seen.insert(event.dedup_key()),
            Err(poisoned) => poisoned.into_inner().insert(event.dedup_key()),
        };
        if !fresh {
            debug!(key = %event.dedup_key(), "duplicate delivery ignored");
            return DispatchReport::Duplicate;
        }

        let report = match event {
            AlertEvent::Triggered {
                node,
                result,
                consecutive_errors,
            } => {
                let message = triggered_message(node, result, *consecutive_errors);
                let incident = self
                    .policy
                    .is_critical(node)
                    .then(|| incident_for(node, result, *consecutive_errors));

                let chat_call = async {
                    match &self.chat {
                        Some(chat) => Some(chat.send(&message).await),
                        None => None,
                    }
                };
                let incident_call = async {
                    match (&self.incidents, &incident) {
                        (Some(sink), Some(incident)) => Some(sink.create(incident).await),
                        _ => None,
                    }
                };
                let (chat, incident) = tokio::join!(chat_call, incident_call);
                DispatchReport::Delivered { chat, incident }
            }
            AlertEvent::Resolved {
                node,
                result,
                consecutive_errors,
                was_alerting,
            } => {
                if !was_alerting {
                    debug!(node_id = %node.id, "episode resolved below threshold, no notification");
                    return DispatchReport::Quiet;
                }
                let message = resolved_message(node, result, *consecutive_errors);
                let chat = match &self.chat {
                    Some(chat) => Some(chat.send(&message).await),
                    None => None,
                };
                DispatchReport::Delivered {
                    chat,
                    incident: None,
                }
            }
        };

        log_report(event, &report);
        report
    }

    /// Subscribe to every channel and spawn one ordered consumer per channel.
    ///
    /// Subscriptions are taken before this returns, so events published
    /// afterwards are never missed. Events already queued when `shutdown`
    /// fires are still delivered; signal it only after every publisher
    /// has stopped.
    pub fn spawn(self: Arc<Self>, bus: &EventBus, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        EventChannel::ALL
            .into_iter()
            .map(|channel| {
                let mut subscription = bus.subscribe(channel);
                let dispatcher = self.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    debug!(%channel, "dispatcher consumer started");
                    loop {
                        tokio::select! {
                            biased;
                            event = subscription.next() => match event {
                                Some(event) => {
                                    dispatcher.on_event(&event).await;
                                }
                                None => break,
                            },
                            _ = shutdown.changed() => break,
                        }
                    }
                    debug!(%channel, "dispatcher consumer stopped");
                })
            })
            .collect()
    }
}

fn log_report(event: &AlertEvent, report: &DispatchReport) {
    let DispatchReport::Delivered { chat, incident } = report else {
        return;
    };
    let node_id = event.node_id();
    let kind = event.kind();

    match chat {
        Some(Ok(())) => info!(%node_id, kind, "chat alert sent"),
        Some(Err(e)) => error!(%node_id, kind, error = %e, "chat alert failed"),
        None => warn!(%node_id, kind, "no chat webhook configured, alert logged only"),
    }
    match incident {
        Some(Ok(id)) => info!(%node_id, incident_id = %id, "incident opened"),
        Some(Err(e)) => error!(%node_id, error = %e, "incident creation failed"),
        None => {}
    }
}
