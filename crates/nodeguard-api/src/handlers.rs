//! REST API handlers.
//!
//! Catalog handlers read and write the `StateStore`; alert handlers read
//! the shared `AlertStateStore`; load-balancer handlers forward to the
//! HAProxy control client. All respond with the same JSON envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use nodeguard_core::MonitoredNode;
use nodeguard_haproxy::HaproxyError;
use nodeguard_health::NodeAlertState;
use nodeguard_state::StateError;

use crate::ApiState;

/// Default and maximum page size for the health log.
const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 1000;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn store_error(e: StateError) -> Response {
    match e {
        StateError::InvalidKey(_) => error_response(&e.to_string(), StatusCode::BAD_REQUEST),
        _ => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Rotation refusals are the caller's conflict; everything else is upstream.
fn haproxy_error(e: HaproxyError) -> Response {
    let status = match e {
        HaproxyError::Rotation { .. } => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!(error = %e, "haproxy request failed");
    error_response(&e.to_string(), status)
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> Response {
    match state.store.list_nodes() {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/v1/nodes/{id}
pub async fn get_node(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_node(&id) {
        Ok(Some(node)) => ApiResponse::ok(node).into_response(),
        Ok(None) => error_response("node not found", StatusCode::NOT_FOUND),
        Err(e) => store_error(e),
    }
}

/// POST /api/v1/nodes
///
/// The monitor picks new nodes up on its next reconcile.
pub async fn put_node(State(state): State<ApiState>, Json(node): Json<MonitoredNode>) -> Response {
    if node.threshold == 0 {
        return error_response("threshold must be at least 1", StatusCode::BAD_REQUEST);
    }
    match state.store.put_node(&node) {
        Ok(()) => {
            info!(node_id = %node.id, "node stored");
            (StatusCode::CREATED, ApiResponse::ok(node)).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// DELETE /api/v1/nodes/{id}
pub async fn delete_node(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.delete_node(&id) {
        Ok(true) => {
            state.alerts.clear(&id);
            info!(node_id = %id, "node deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("node not found", StatusCode::NOT_FOUND),
        Err(e) => store_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

/// PUT /api/v1/nodes/{id}/mute
pub async fn set_muted(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<MuteRequest>,
) -> Response {
    let mut node = match state.store.get_node(&id) {
        Ok(Some(node)) => node,
        Ok(None) => return error_response("node not found", StatusCode::NOT_FOUND),
        Err(e) => return store_error(e),
    };
    node.muted = req.muted;
    match state.store.put_node(&node) {
        Ok(()) => {
            info!(node_id = %id, muted = req.muted, "node mute updated");
            ApiResponse::ok(node).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── Alert state ────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct AlertStateView {
    node_id: String,
    #[serde(flatten)]
    state: NodeAlertState,
}

/// GET /api/v1/nodes/{id}/alert
///
/// A known node with no tracked state reports zero errors, not alerting.
pub async fn get_alert_state(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_node(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("node not found", StatusCode::NOT_FOUND),
        Err(e) => return store_error(e),
    }
    let current = state.alerts.get(&id).unwrap_or(NodeAlertState {
        consecutive_errors: 0,
        alerting: false,
    });
    ApiResponse::ok(AlertStateView {
        node_id: id,
        state: current,
    })
    .into_response()
}

/// GET /api/v1/alerts
pub async fn list_alert_states(State(state): State<ApiState>) -> Response {
    let mut states: Vec<AlertStateView> = state
        .alerts
        .snapshot()
        .into_iter()
        .map(|(node_id, state)| AlertStateView { node_id, state })
        .collect();
    states.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    ApiResponse::ok(states).into_response()
}

#[derive(serde::Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/nodes/{id}/log
pub async fn get_health_log(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    match state.store.list_health_log(&id, limit) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => store_error(e),
    }
}

// ── Load balancer ──────────────────────────────────────────────

/// GET /api/v1/lb/{backend}/servers
pub async fn list_servers(State(state): State<ApiState>, Path(backend): Path<String>) -> Response {
    match state.haproxy.query_state(&backend).await {
        Ok(rows) => ApiResponse::ok(rows).into_response(),
        Err(e) => haproxy_error(e),
    }
}

/// GET /api/v1/lb/{backend}/servers/{server}
pub async fn server_status(
    State(state): State<ApiState>,
    Path((backend, server)): Path<(String, String)>,
) -> Response {
    match state.haproxy.get_server_status(&backend, &server).await {
        Ok(Some(up)) => ApiResponse::ok(serde_json::json!({
            "backend": backend,
            "server": server,
            "up": up,
        }))
        .into_response(),
        Ok(None) => error_response("server not found", StatusCode::NOT_FOUND),
        Err(e) => haproxy_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct CountQuery {
    #[serde(default)]
    pub exclude_backup: bool,
    pub exclude_tag: Option<String>,
}

/// GET /api/v1/lb/{backend}/count
pub async fn server_count(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
    Query(query): Query<CountQuery>,
) -> Response {
    match state
        .haproxy
        .get_server_count(&backend, query.exclude_backup, query.exclude_tag.as_deref())
        .await
    {
        Ok(count) => ApiResponse::ok(serde_json::json!({
            "backend": backend,
            "up": count,
        }))
        .into_response(),
        Err(e) => haproxy_error(e),
    }
}

/// With a `peer`, enable/disable become the guarded pair rotations.
#[derive(serde::Deserialize)]
pub struct RotationQuery {
    pub peer: Option<String>,
}

/// POST /api/v1/lb/{backend}/servers/{server}/enable
pub async fn enable_server(
    State(state): State<ApiState>,
    Path((backend, server)): Path<(String, String)>,
    Query(query): Query<RotationQuery>,
) -> Response {
    let result = match &query.peer {
        Some(peer) => state.haproxy.rotate_in(&backend, &server, peer).await,
        None => state.haproxy.enable_server(&backend, &server).await,
    };
    match result {
        Ok(()) => ApiResponse::ok("enabled").into_response(),
        Err(e) => haproxy_error(e),
    }
}

/// POST /api/v1/lb/{backend}/servers/{server}/disable
pub async fn disable_server(
    State(state): State<ApiState>,
    Path((backend, server)): Path<(String, String)>,
    Query(query): Query<RotationQuery>,
) -> Response {
    let result = match &query.peer {
        Some(peer) => state.haproxy.rotate_out(&backend, &server, peer).await,
        None => state.haproxy.disable_server(&backend, &server).await,
    };
    match result {
        Ok(()) => ApiResponse::ok("disabled").into_response(),
        Err(e) => haproxy_error(e),
    }
}

// ── Node rotation ──────────────────────────────────────────────

/// Resolve a node to its HAProxy backend and server name.
fn rotation_target(state: &ApiState, id: &str) -> Result<MonitoredNode, Response> {
    match state.store.get_node(id) {
        Ok(Some(node)) if node.haproxy_enabled => Ok(node),
        Ok(Some(_)) => Err(error_response("node is not managed by haproxy", StatusCode::CONFLICT)),
        Ok(None) => Err(error_response("node not found", StatusCode::NOT_FOUND)),
        Err(e) => Err(store_error(e)),
    }
}

/// POST /api/v1/nodes/{id}/rotate-out
pub async fn rotate_node_out(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<RotationQuery>,
) -> Response {
    let node = match rotation_target(&state, &id) {
        Ok(node) => node,
        Err(resp) => return resp,
    };
    let result = match &query.peer {
        Some(peer) => state.haproxy.rotate_out(&node.backend, node.server_name(), peer).await,
        None => state.haproxy.disable_server(&node.backend, node.server_name()).await,
    };
    match result {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "node": id,
            "backend": node.backend,
            "server": node.server_name(),
            "enabled": false,
        }))
        .into_response(),
        Err(e) => haproxy_error(e),
    }
}

/// POST /api/v1/nodes/{id}/rotate-in
pub async fn rotate_node_in(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<RotationQuery>,
) -> Response {
    let node = match rotation_target(&state, &id) {
        Ok(node) => node,
        Err(resp) => return resp,
    };
    let result = match &query.peer {
        Some(peer) => state.haproxy.rotate_in(&node.backend, node.server_name(), peer).await,
        None => state.haproxy.enable_server(&node.backend, node.server_name()).await,
    };
    match result {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "node": id,
            "backend": node.backend,
            "server": node.server_name(),
            "enabled": true,
        }))
        .into_response(),
        Err(e) => haproxy_error(e),
    }
}
