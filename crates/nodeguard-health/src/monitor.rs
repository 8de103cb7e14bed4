//! Health monitor. One background polling task per monitored node.
//!
//! Each task ticks on a fixed period, re-reads its node from the catalog,
//! probes it under a deadline and feeds the result to the state machine.
//! Tasks never coordinate with each other; a slow probe only delays its
//! own node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use nodeguard_core::{AlertEvent, HealthCheckResult, MonitoredNode};

use crate::catalog::Catalog;
use crate::machine::HealthStateMachine;
use crate::probe::Prober;

/// Timing for the polling loops.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Fixed polling period per node.
    pub interval: Duration,
    /// Deadline per probe; a timed-out probe counts as an ERROR.
    pub probe_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-node monitor state.
struct MonitorSlot {
    /// Handle to the background polling task.
    handle: JoinHandle<()>,
    /// Stops the task after its in-flight cycle.
    shutdown_tx: watch::Sender<bool>,
}

/// Result of syncing running tasks with the catalog.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub started: u32,
    pub stopped: u32,
}

/// Manages polling tasks for every node in the catalog.
pub struct HealthMonitor {
    machine: Arc<HealthStateMachine>,
    prober: Arc<dyn Prober>,
    catalog: Arc<dyn Catalog>,
    settings: MonitorSettings,
    /// Active monitors: node_id → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
}

impl HealthMonitor {
    pub fn new(
        machine: Arc<HealthStateMachine>,
        prober: Arc<dyn Prober>,
        catalog: Arc<dyn Catalog>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            machine,
            prober,
            catalog,
            settings,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run a single probe-and-observe cycle for `node`.
    pub async fn poll(&self, node: &MonitoredNode) -> Option<AlertEvent> {
        poll_node(&self.machine, self.prober.as_ref(), node, self.settings.probe_timeout).await
    }

    /// Start polling a node. Replaces any existing task for the same id.
    pub async fn start_monitor(&self, node_id: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_node_loop(
            node_id.to_string(),
            self.machine.clone(),
            self.prober.clone(),
            self.catalog.clone(),
            self.settings,
            shutdown_rx,
        ));

        let old = {
            let mut monitors = self.monitors.write().await;
            monitors.insert(
                node_id.to_string(),
                MonitorSlot {
                    handle,
                    shutdown_tx,
                },
            )
        };
        if let Some(old) = old {
            stop_slot(old).await;
        }

        info!(%node_id, interval_ms = self.settings.interval.as_millis() as u64, "node monitor started");
    }

    /// Stop polling a node, letting its in-flight cycle finish.
    pub async fn stop_monitor(&self, node_id: &str) {
        let slot = self.monitors.write().await.remove(node_id);
        if let Some(slot) = slot {
            stop_slot(slot).await;
            info!(%node_id, "node monitor stopped");
        }
    }

    /// Stop every task and wait for in-flight cycles to complete.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, MonitorSlot)> = self.monitors.write().await.drain().collect();
        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }
        for (id, slot) in slots {
            if let Err(e) = slot.handle.await {
                warn!(node_id = %id, error = %e, "node monitor task failed");
            }
        }
        info!("all node monitors stopped");
    }

    /// Start tasks for new catalog nodes and stop tasks for removed ones.
    pub async fn reconcile(&self) -> anyhow::Result<ReconcileStats> {
        let catalog = self.catalog.clone();
        let nodes = tokio::task::spawn_blocking(move || catalog.list_nodes()).await??;
        let wanted: HashSet<String> = nodes.into_iter().map(|n| n.id).collect();

        let running: HashSet<String> = self.monitors.read().await.keys().cloned().collect();
        let mut stats = ReconcileStats::default();

        for id in wanted.difference(&running) {
            self.start_monitor(id).await;
            stats.started += 1;
        }
        for id in running.difference(&wanted) {
            self.stop_monitor(id).await;
            stats.stopped += 1;
        }

        if stats != ReconcileStats::default() {
            info!(started = stats.started, stopped = stats.stopped, total = wanted.len(), "monitors reconciled");
        }
        Ok(stats)
    }

    /// Reconcile on a period until shutdown, then stop every task.
    pub async fn run(&self, reconcile_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            reconcile_secs = reconcile_interval.as_secs(),
            interval_secs = self.settings.interval.as_secs(),
            "health monitor started"
        );

        let mut ticker = tokio::time::interval(reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "monitor reconcile failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// List node ids with active monitors.
    pub async fn active_monitors(&self) -> Vec<String> {
        self.monitors.read().await.keys().cloned().collect()
    }

    pub async fn is_monitoring(&self, node_id: &str) -> bool {
        self.monitors.read().await.contains_key(node_id)
    }
}

async fn stop_slot(slot: MonitorSlot) {
    let _ = slot.shutdown_tx.send(true);
    let _ = slot.handle.await;
}

/// Probe under a deadline, then observe. Timeouts fail closed as ERROR.
async fn poll_node(
    machine: &HealthStateMachine,
    prober: &dyn Prober,
    node: &MonitoredNode,
    probe_timeout: Duration,
) -> Option<AlertEvent> {
    let result = match tokio::time::timeout(probe_timeout, prober.probe(node)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(node_id = %node.id, "probe deadline exceeded");
            HealthCheckResult::timed_out(probe_timeout.as_millis() as u64)
        }
    };
    machine.observe(node, result)
}

/// The polling loop for a single node.
async fn run_node_loop(
    node_id: String,
    machine: Arc<HealthStateMachine>,
    prober: Arc<dyn Prober>,
    catalog: Arc<dyn Catalog>,
    settings: MonitorSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(%node_id, "node loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let lookup = {
                    let catalog = catalog.clone();
                    let id = node_id.clone();
                    tokio::task::spawn_blocking(move || catalog.get_node(&id)).await
                };
                match lookup {
                    Ok(Ok(Some(node))) => {
                        poll_node(&machine, prober.as_ref(), &node, settings.probe_timeout).await;
                    }
                    Ok(Ok(None)) => {
                        info!(%node_id, "node left the catalog, loop exiting");
                        break;
                    }
                    Ok(Err(e)) => warn!(%node_id, error = %e, "catalog read failed, cycle skipped"),
                    Err(e) => warn!(%node_id, error = %e, "catalog read task failed, cycle skipped"),
                }
            }
            _ = shutdown.changed() => {
                debug!(%node_id, "node loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use nodeguard_core::{Condition, EventChannel};
    use nodeguard_events::{BoxFuture, EventBus};
    use nodeguard_state::StateStore;

    /// Replays a fixed script of results, then repeats the last one.
    struct ScriptedProber {
        script: Mutex<Vec<HealthCheckResult>>,
        delay: Duration,
    }

    impl ScriptedProber {
        fn new(mut script: Vec<HealthCheckResult>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                delay: Duration::ZERO,
            }
        }
    }

    impl Prober for ScriptedProber {
        fn probe<'a>(&'a self, _node: &'a MonitoredNode) -> BoxFuture<'a, HealthCheckResult> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop().unwrap()
                } else {
                    script[0].clone()
                }
            })
        }
    }

    fn test_node(id: &str) -> MonitoredNode {
        MonitoredNode {
            id: id.to_string(),
            chain: "eth".to_string(),
            host: "127.0.0.1".to_string(),
            backend: "ethmainnet".to_string(),
            server: None,
            port: 1,
            threshold: 2,
            haproxy_enabled: false,
            muted: false,
        }
    }

    fn error() -> HealthCheckResult {
        HealthCheckResult::error(Condition::Offline, serde_json::Value::Null)
    }

    fn monitor_with(prober: ScriptedProber, settings: MonitorSettings) -> (HealthMonitor, EventBus, StateStore) {
        let bus = EventBus::new(64);
        let store = StateStore::open_in_memory().unwrap();
        let catalog: Arc<dyn Catalog> = Arc::new(store.clone());
        let machine = Arc::new(HealthStateMachine::new(
            bus.clone(),
            catalog.clone(),
            Duration::from_secs(1),
        ));
        let monitor = HealthMonitor::new(machine, Arc::new(prober), catalog, settings);
        (monitor, bus, store)
    }

    fn fast() -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn reconcile_starts_and_stops_tasks() {
        let (monitor, _, store) = monitor_with(ScriptedProber::new(vec![HealthCheckResult::healthy()]), fast());
        store.put_node(&test_node("a")).unwrap();
        store.put_node(&test_node("b")).unwrap();

        let stats = monitor.reconcile().await.unwrap();
        assert_eq!(stats, ReconcileStats { started: 2, stopped: 0 });
        assert!(monitor.is_monitoring("a").await);

        store.delete_node("a").unwrap();
        let stats = monitor.reconcile().await.unwrap();
        assert_eq!(stats, ReconcileStats { started: 0, stopped: 1 });
        assert_eq!(monitor.active_monitors().await, vec!["b".to_string()]);

        monitor.shutdown().await;
        assert!(monitor.active_monitors().await.is_empty());
    }

    #[tokio::test]
    async fn polling_loop_triggers_then_resolves() {
        let prober = ScriptedProber::new(vec![error(), error(), error(), HealthCheckResult::healthy()]);
        let (monitor, bus, store) = monitor_with(prober, fast());
        let mut trigger = bus.subscribe(EventChannel::Trigger);
        let mut resolved = bus.subscribe(EventChannel::Resolved);
        store.put_node(&test_node("a")).unwrap();

        monitor.start_monitor("a").await;

        let event = tokio::time::timeout(Duration::from_secs(2), trigger.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, AlertEvent::Triggered { consecutive_errors: 2, .. }));

        let event = tokio::time::timeout(Duration::from_secs(2), resolved.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, AlertEvent::Resolved { was_alerting: true, .. }));

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn probe_timeout_counts_as_error() {
        let mut prober = ScriptedProber::new(vec![HealthCheckResult::healthy()]);
        prober.delay = Duration::from_millis(200);
        let settings = MonitorSettings {
            interval: Duration::from_millis(10),
            probe_timeout: Duration::from_millis(20),
        };
        let (monitor, _, _) = monitor_with(prober, settings);

        let node = test_node("slow");
        assert!(monitor.poll(&node).await.is_none());
        let event = monitor.poll(&node).await.unwrap();
        match event {
            AlertEvent::Triggered { result, .. } => {
                assert_eq!(result.condition, Condition::NoResponse);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn loop_exits_when_node_leaves_catalog() {
        let (monitor, _, _) = monitor_with(ScriptedProber::new(vec![HealthCheckResult::healthy()]), fast());
        // Never stored, so the first tick finds nothing.
        monitor.start_monitor("ghost").await;

        let slot = monitor.monitors.write().await.remove("ghost").unwrap();
        tokio::time::timeout(Duration::from_secs(2), slot.handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn start_monitor_replaces_existing() {
        let (monitor, _, store) = monitor_with(ScriptedProber::new(vec![HealthCheckResult::healthy()]), fast());
        store.put_node(&test_node("a")).unwrap();
        monitor.start_monitor("a").await;
        monitor.start_monitor("a").await;
        assert_eq!(monitor.active_monitors().await.len(), 1);
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let (monitor, _, store) = monitor_with(ScriptedProber::new(vec![HealthCheckResult::healthy()]), fast());
        store.put_node(&test_node("a")).unwrap();
        let monitor = Arc::new(monitor);
        let (tx, rx) = watch::channel(false);

        let runner = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.run(Duration::from_millis(10), rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_monitoring("a").await);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();
        assert!(monitor.active_monitors().await.is_empty());
    }
}
