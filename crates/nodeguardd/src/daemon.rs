//! `nodeguardd run`: subsystem wiring and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use nodeguard_api::ApiState;
use nodeguard_core::config::AlertsConfig;
use nodeguard_core::{NodeguardConfig, duration_or};
use nodeguard_events::{
    DiscordWebhook, Dispatcher, EventBus, PagerDutyClient, PagerDutyConfig, SeverityPolicy,
};
use nodeguard_haproxy::HaproxyClient;
use nodeguard_health::{Catalog, HealthMonitor, HealthStateMachine, HttpProber, MonitorSettings};
use nodeguard_state::StateStore;

pub async fn run(config: NodeguardConfig) -> anyhow::Result<()> {
    info!("nodeguard daemon starting");

    let monitor_cfg = &config.monitor;
    let settings = MonitorSettings {
        interval: duration_or(&monitor_cfg.interval, Duration::from_secs(10)),
        probe_timeout: duration_or(&monitor_cfg.probe_timeout, Duration::from_secs(5)),
    };
    let persist_timeout = duration_or(&monitor_cfg.persist_timeout, Duration::from_secs(2));
    let reconcile_interval = duration_or(&monitor_cfg.reconcile_interval, Duration::from_secs(30));

    // ── Catalog store ──────────────────────────────────────────

    if let Some(dir) = config.store.path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store = StateStore::open(&config.store.path)?
        .with_log_retention(config.store.max_log_entries_per_node);
    info!(path = ?config.store.path, "catalog store opened");

    for node in &config.nodes {
        store.put_node(node)?;
    }
    info!(count = config.nodes.len(), "seed nodes written to catalog");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Event bus + dispatcher ─────────────────────────────────

    // Consumers subscribe before the monitor can publish anything, and
    // stop on their own signal once the monitor has finished.
    let bus = EventBus::new(monitor_cfg.bus_capacity);
    let dispatcher = Arc::new(build_dispatcher(&config.alerts)?);
    let (dispatch_stop_tx, dispatch_stop_rx) = watch::channel(false);
    let dispatch_handles = dispatcher.spawn(&bus, dispatch_stop_rx);
    info!("alert dispatcher started");

    // ── Health monitor ─────────────────────────────────────────

    let catalog: Arc<dyn Catalog> = Arc::new(store.clone());
    let machine = Arc::new(HealthStateMachine::new(bus.clone(), catalog.clone(), persist_timeout));
    let prober = Arc::new(HttpProber::new(monitor_cfg.probe_path.clone(), settings.probe_timeout));
    let monitor = Arc::new(HealthMonitor::new(machine.clone(), prober, catalog, settings));

    let monitor_handle = {
        let monitor = monitor.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { monitor.run(reconcile_interval, shutdown).await })
    };

    // ── API server ─────────────────────────────────────────────

    let haproxy = HaproxyClient::new(
        config.haproxy.address.clone(),
        duration_or(&config.haproxy.timeout, Duration::from_secs(5)),
    );
    let router = nodeguard_api::build_router(ApiState {
        store,
        alerts: machine.alerts().clone(),
        haproxy,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    drain(monitor_handle, dispatch_stop_tx, dispatch_handles).await;

    info!("nodeguard daemon stopped");
    Ok(())
}

/// Wait for the monitor's in-flight cycles, then stop the dispatcher so
/// the events those cycles published are still delivered.
async fn drain(
    monitor_handle: JoinHandle<()>,
    dispatch_stop: watch::Sender<bool>,
    dispatch_handles: Vec<JoinHandle<()>>,
) {
    if let Err(e) = monitor_handle.await {
        error!(error = %e, "health monitor task failed");
    }
    let _ = dispatch_stop.send(true);
    for handle in dispatch_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "dispatcher consumer failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
}

/// Wire the configured outbound adapters into a dispatcher.
///
/// The incident adapter needs url, token and service id together; a
/// partial set is a config error rather than a silently disabled channel.
pub fn build_dispatcher(alerts: &AlertsConfig) -> anyhow::Result<Dispatcher> {
    let timeout = duration_or(&alerts.timeout, Duration::from_secs(10));
    let mut dispatcher = Dispatcher::new(SeverityPolicy::new(alerts.critical_chains.iter()));

    match &alerts.chat_webhook_url {
        Some(url) => {
            dispatcher = dispatcher.with_chat(Arc::new(DiscordWebhook::new(url.clone(), timeout)?));
            info!("chat webhook configured");
        }
        None => warn!("no chat webhook configured, alerts will only be logged"),
    }

    match (
        &alerts.incident_api_url,
        &alerts.incident_api_token,
        &alerts.incident_service_id,
    ) {
        (Some(base_url), Some(token), Some(service_id)) => {
            let client = PagerDutyClient::new(PagerDutyConfig {
                base_url: base_url.clone(),
                token: token.clone(),
                service_id: service_id.clone(),
                from: alerts.incident_from.clone().unwrap_or_default(),
                timeout,
            })?;
            dispatcher = dispatcher.with_incidents(Arc::new(client));
            info!(critical_chains = ?alerts.critical_chains, "incident API configured");
        }
        (None, None, None) => {
            if !alerts.critical_chains.is_empty() {
                warn!("critical chains configured without an incident API");
            }
        }
        _ => anyhow::bail!(
            "alerts.incident_api_url, incident_api_token and incident_service_id must be set together"
        ),
    }

    Ok(dispatcher)
}
