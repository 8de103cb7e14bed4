//! End-to-end alert path: state machine → event bus → dispatcher → sinks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use nodeguard_core::{Condition, HealthCheckResult, MonitoredNode};
use nodeguard_events::{
    BoxFuture, ChatMessage, ChatSink, DispatchError, Dispatcher, EventBus, IncidentSink,
    NewIncident, SeverityPolicy,
};
use nodeguard_health::{Catalog, HealthStateMachine};
use nodeguard_state::StateStore;

#[derive(Default)]
struct RecordingChat {
    titles: Mutex<Vec<String>>,
}

impl ChatSink for RecordingChat {
    fn send<'a>(&'a self, message: &'a ChatMessage) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            self.titles.lock().unwrap().push(message.title.clone());
            Ok(())
        })
    }
}

#[derive(Default)]
struct RecordingIncidents {
    opened: Mutex<Vec<NewIncident>>,
}

impl IncidentSink for RecordingIncidents {
    fn create<'a>(&'a self, incident: &'a NewIncident) -> BoxFuture<'a, Result<String, DispatchError>> {
        Box::pin(async move {
            let mut opened = self.opened.lock().unwrap();
            opened.push(incident.clone());
            Ok(format!("INC{}", opened.len()))
        })
    }
}

struct Pipeline {
    machine: HealthStateMachine,
    chat: Arc<RecordingChat>,
    incidents: Arc<RecordingIncidents>,
    store: StateStore,
    shutdown: watch::Sender<bool>,
}

fn pipeline(critical_chains: &[&str]) -> Pipeline {
    let bus = EventBus::new(64);
    let chat = Arc::new(RecordingChat::default());
    let incidents = Arc::new(RecordingIncidents::default());
    let dispatcher = Arc::new(
        Dispatcher::new(SeverityPolicy::new(critical_chains.iter().copied()))
            .with_chat(chat.clone())
            .with_incidents(incidents.clone()),
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    dispatcher.spawn(&bus, shutdown_rx);

    let store = StateStore::open_in_memory().unwrap();
    let catalog: Arc<dyn Catalog> = Arc::new(store.clone());
    let machine = HealthStateMachine::new(bus, catalog, Duration::from_secs(1));

    Pipeline {
        machine,
        chat,
        incidents,
        store,
        shutdown,
    }
}

fn node(chain: &str, threshold: u32) -> MonitoredNode {
    MonitoredNode {
        id: format!("{chain}-1"),
        chain: chain.to_string(),
        host: "10.0.0.1".to_string(),
        backend: format!("{chain}mainnet"),
        server: None,
        port: 8545,
        threshold,
        haproxy_enabled: true,
        muted: false,
    }
}

fn error_at(ts: u64) -> HealthCheckResult {
    HealthCheckResult::error(Condition::NoResponse, serde_json::Value::Null).at(ts)
}

fn ok_at(ts: u64) -> HealthCheckResult {
    HealthCheckResult::healthy().at(ts)
}

/// Wait until the sink holds `n` messages (or give up after a second).
async fn wait_for_chat(chat: &RecordingChat, n: usize) -> Vec<String> {
    for _ in 0..100 {
        let titles = chat.titles.lock().unwrap().clone();
        if titles.len() >= n {
            return titles;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    chat.titles.lock().unwrap().clone()
}

#[tokio::test]
async fn two_errors_send_one_trigger_alert() {
    let p = pipeline(&[]);
    let node = node("eth", 2);

    p.machine.observe(&node, error_at(1));
    p.machine.observe(&node, error_at(2));
    p.machine.observe(&node, error_at(3));

    let titles = wait_for_chat(&p.chat, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(p.chat.titles.lock().unwrap().len(), 1);
    assert!(titles[0].contains("eth-1"));
    assert!(p.incidents.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn trigger_then_resolve_sends_both() {
    let p = pipeline(&[]);
    let node = node("eth", 2);

    for result in [error_at(1), error_at(2), error_at(3), ok_at(4)] {
        p.machine.observe(&node, result);
    }

    let titles = wait_for_chat(&p.chat, 2).await;
    assert_eq!(titles.len(), 2);
    assert!(p.machine.alerts().get("eth-1").is_none());
}

#[tokio::test]
async fn critical_chain_opens_incident() {
    let p = pipeline(&["eth"]);
    let node = node("eth", 1);

    p.machine.observe(&node, error_at(1));

    wait_for_chat(&p.chat, 1).await;
    for _ in 0..100 {
        if !p.incidents.opened.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let opened = p.incidents.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].title.contains("eth-1"));
}

#[tokio::test]
async fn short_episode_and_muted_node_stay_quiet() {
    let p = pipeline(&["eth"]);
    let quiet = node("eth", 3);
    p.machine.observe(&quiet, error_at(1));
    p.machine.observe(&quiet, ok_at(2));

    let mut muted = node("pokt", 1);
    muted.muted = true;
    p.machine.observe(&muted, error_at(3));
    p.machine.observe(&muted, ok_at(4));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(p.chat.titles.lock().unwrap().is_empty());
    assert!(p.incidents.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn results_reach_the_health_log() {
    let p = pipeline(&[]);
    let node = node("eth", 5);
    p.store.put_node(&node).unwrap();

    p.machine.observe(&node, error_at(10));
    p.machine.observe(&node, ok_at(20));

    let mut log = Vec::new();
    for _ in 0..100 {
        log = p.store.list_health_log("eth-1", 10).unwrap();
        if log.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].result.timestamp, 20);

    let _ = p.shutdown.send(true);
}
