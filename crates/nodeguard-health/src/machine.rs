//! Node health state machine.
//!
//! Turns each node's stream of health-check results into debounced
//! `triggered` / `resolved` events on the event bus. The debounce state
//! lives in an [`AlertStateStore`] owned by the machine; the raw result is
//! handed to the catalog for persistence on every observation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use nodeguard_core::{AlertEvent, HealthCheckResult, MonitoredNode};
use nodeguard_events::EventBus;

use crate::alert_state::{AlertStateStore, Transition};
use crate::catalog::Catalog;

pub struct HealthStateMachine {
    alerts: AlertStateStore,
    bus: EventBus,
    catalog: Arc<dyn Catalog>,
    persist_timeout: Duration,
}

impl HealthStateMachine {
    pub fn new(bus: EventBus, catalog: Arc<dyn Catalog>, persist_timeout: Duration) -> Self {
        Self {
            alerts: AlertStateStore::new(),
            bus,
            catalog,
            persist_timeout,
        }
    }

    /// The debounce store (shared handle, e.g. for the operator API).
    pub fn alerts(&self) -> &AlertStateStore {
        &self.alerts
    }

    /// Feed one result for one node. Returns the event published, if any.
    ///
    /// Persistence is fire-and-forget and cannot delay or undo the
    /// transition. Must be called from within a tokio runtime.
    pub fn observe(&self, node: &MonitoredNode, result: HealthCheckResult) -> Option<AlertEvent> {
        self.persist(&node.id, &result);

        let event = match self.alerts.observe(&node.id, result.status, node.threshold) {
            Transition::None => {
                debug!(node_id = %node.id, status = ?result.status, condition = %result.condition, "health observed");
                return None;
            }
            Transition::Triggered { consecutive_errors } => {
                warn!(
                    node_id = %node.id,
                    consecutive_errors,
                    threshold = node.threshold,
                    condition = %result.condition,
                    "node alert triggered"
                );
                AlertEvent::Triggered {
                    node: node.clone(),
                    result,
                    consecutive_errors,
                }
            }
            Transition::Resolved { previous } => {
                info!(
                    node_id = %node.id,
                    consecutive_errors = previous.consecutive_errors,
                    was_alerting = previous.alerting,
                    "node error episode resolved"
                );
                AlertEvent::Resolved {
                    node: node.clone(),
                    result,
                    consecutive_errors: previous.consecutive_errors,
                    was_alerting: previous.alerting,
                }
            }
        };

        if let Err(e) = self.bus.publish(event.channel(), &event) {
            error!(node_id = %node.id, kind = event.kind(), error = %e, "failed to publish alert event");
        }
        Some(event)
    }

    fn persist(&self, node_id: &str, result: &HealthCheckResult) {
        let catalog = self.catalog.clone();
        let node_id = node_id.to_string();
        let result = result.clone();
        let timeout = self.persist_timeout;

        tokio::spawn(async move {
            let id = node_id.clone();
            let write = tokio::task::spawn_blocking(move || catalog.record_result(&node_id, &result));
            match tokio::time::timeout(timeout, write).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(node_id = %id, error = %e, "failed to persist health result"),
                Ok(Err(e)) => warn!(node_id = %id, error = %e, "health result writer panicked"),
                Err(_) => warn!(node_id = %id, timeout_ms = timeout.as_millis() as u64, "health result persistence timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeguard_core::{Condition, EventChannel, HealthStatus};
    use nodeguard_state::StateStore;

    fn test_node(threshold: u32) -> MonitoredNode {
        MonitoredNode {
            id: "eth-1".to_string(),
            chain: "eth".to_string(),
            host: "10.0.0.1".to_string(),
            backend: "ethmainnet".to_string(),
            server: None,
            port: 8545,
            threshold,
            haproxy_enabled: true,
            muted: false,
        }
    }

    fn error() -> HealthCheckResult {
        HealthCheckResult::error(Condition::NoResponse, serde_json::Value::Null)
    }

    fn machine() -> (HealthStateMachine, EventBus, StateStore) {
        let bus = EventBus::new(64);
        let store = StateStore::open_in_memory().unwrap();
        let machine =
            HealthStateMachine::new(bus.clone(), Arc::new(store.clone()), Duration::from_secs(1));
        (machine, bus, store)
    }

    #[tokio::test]
    async fn scenario_two_errors_trigger_once() {
        let (machine, bus, _) = machine();
        let mut trigger = bus.subscribe(EventChannel::Trigger);
        let node = test_node(2);

        assert!(machine.observe(&node, error()).is_none());
        let event = machine.observe(&node, error()).unwrap();
        assert!(matches!(event, AlertEvent::Triggered { consecutive_errors: 2, .. }));

        let received = trigger.next().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn scenario_trigger_then_resolve() {
        let (machine, bus, _) = machine();
        let mut resolved = bus.subscribe(EventChannel::Resolved);
        let node = test_node(2);

        let events: Vec<_> = [error(), error(), error(), HealthCheckResult::healthy()]
            .into_iter()
            .filter_map(|r| machine.observe(&node, r))
            .collect();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AlertEvent::Triggered { consecutive_errors: 2, .. }));
        assert!(matches!(
            events[1],
            AlertEvent::Resolved { consecutive_errors: 3, was_alerting: true, .. }
        ));
        assert_eq!(resolved.next().await.unwrap(), events[1]);
        assert!(machine.alerts().get("eth-1").is_none());
    }

    #[tokio::test]
    async fn below_threshold_then_ok_never_triggers() {
        let (machine, _, _) = machine();
        let node = test_node(3);
        let mut events = Vec::new();
        for result in [error(), error(), HealthCheckResult::healthy()] {
            events.extend(machine.observe(&node, result));
        }
        assert!(events.iter().all(|e| !matches!(e, AlertEvent::Triggered { .. })));
    }

    #[tokio::test]
    async fn ok_replay_is_silent() {
        let (machine, _, _) = machine();
        let node = test_node(2);
        let ok = HealthCheckResult::healthy().at(100);
        assert!(machine.observe(&node, ok.clone()).is_none());
        assert!(machine.observe(&node, ok).is_none());
    }

    #[tokio::test]
    async fn muted_node_still_transitions() {
        let (machine, _, _) = machine();
        let mut node = test_node(1);
        node.muted = true;
        assert!(machine.observe(&node, error()).is_some());
    }

    #[tokio::test]
    async fn warning_is_persisted_but_inert() {
        let (machine, _, store) = machine();
        let node = test_node(1);
        let warning = HealthCheckResult::new(
            HealthStatus::Warning,
            Condition::PeerNotSynchronized,
            serde_json::Value::Null,
        );
        assert!(machine.observe(&node, warning).is_none());

        for _ in 0..50 {
            if !store.list_health_log("eth-1", 10).unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let log = store.list_health_log("eth-1", 10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].result.status, HealthStatus::Warning);
    }

    struct FailingCatalog;

    impl Catalog for FailingCatalog {
        fn list_nodes(&self) -> anyhow::Result<Vec<MonitoredNode>> {
            Ok(Vec::new())
        }

        fn get_node(&self, _id: &str) -> anyhow::Result<Option<MonitoredNode>> {
            Ok(None)
        }

        fn record_result(&self, _node_id: &str, _result: &HealthCheckResult) -> anyhow::Result<()> {
            anyhow::bail!("catalog unavailable")
        }
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_transition() {
        let bus = EventBus::new(8);
        let machine =
            HealthStateMachine::new(bus, Arc::new(FailingCatalog), Duration::from_millis(100));
        let node = test_node(1);
        assert!(machine.observe(&node, error()).is_some());
        assert!(machine.alerts().get("eth-1").unwrap().alerting);
    }
}
