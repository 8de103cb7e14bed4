//! Per-node debounce state.
//!
//! [`AlertStateStore`] owns the only mutable state of the state machine:
//! a map from node id to [`NodeAlertState`]. Each polling task touches
//! only its own key, so a single mutex held for point-wise updates is
//! enough; it is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use nodeguard_core::{HealthStatus, NodeId};

/// Debounce state of one node during an error episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeAlertState {
    pub consecutive_errors: u32,
    /// An alert was emitted for this episode and not yet resolved.
    pub alerting: bool,
}

/// Outcome of feeding one status into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to publish.
    None,
    /// Threshold crossed for the first time this episode.
    Triggered { consecutive_errors: u32 },
    /// Episode ended; the state has been removed.
    Resolved { previous: NodeAlertState },
}

/// Shared map of node id → debounce state. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct AlertStateStore {
    states: Arc<Mutex<HashMap<NodeId, NodeAlertState>>>,
}

impl AlertStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, NodeAlertState>> {
        // Plain counters: a poisoned map is still consistent.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one observed status and report the resulting transition.
    ///
    /// `threshold` is inclusive: the `threshold`-th consecutive ERROR
    /// triggers. INFO and WARNING never change state.
    pub fn observe(&self, node_id: &str, status: HealthStatus, threshold: u32) -> Transition {
        let mut states = self.lock();
        match status {
            HealthStatus::Error => {
                let state = states.entry(node_id.to_string()).or_insert(NodeAlertState {
                    consecutive_errors: 0,
                    alerting: false,
                });
                state.consecutive_errors = state.consecutive_errors.saturating_add(1);
                if state.consecutive_errors >= threshold && !state.alerting {
                    state.alerting = true;
                    Transition::Triggered {
                        consecutive_errors: state.consecutive_errors,
                    }
                } else {
                    Transition::None
                }
            }
            HealthStatus::Ok => match states.remove(node_id) {
                Some(previous) => Transition::Resolved { previous },
                None => Transition::None,
            },
            HealthStatus::Info | HealthStatus::Warning => Transition::None,
        }
    }

    pub fn get(&self, node_id: &str) -> Option<NodeAlertState> {
        self.lock().get(node_id).copied()
    }

    /// Forget a node's state without publishing anything.
    pub fn clear(&self, node_id: &str) -> Option<NodeAlertState> {
        self.lock().remove(node_id)
    }

    /// Copy of every tracked node's state.
    pub fn snapshot(&self) -> HashMap<NodeId, NodeAlertState> {
        self.lock().clone()
    }
}
