//! nodeguard-api — operator REST API.
//!
//! Exposes the catalog, the live debounce state and the HAProxy control
//! client over HTTP. Nothing here sits on the alert path.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | List monitored nodes |
//! | POST | `/api/v1/nodes` | Add or replace a node |
//! | GET | `/api/v1/nodes/{id}` | Get a node |
//! | DELETE | `/api/v1/nodes/{id}` | Remove a node and its log |
//! | PUT | `/api/v1/nodes/{id}/mute` | Mute or unmute a node |
//! | POST | `/api/v1/nodes/{id}/rotate-out` | Disable the node's HAProxy server (guarded with `?peer=`) |
//! | POST | `/api/v1/nodes/{id}/rotate-in` | Enable the node's HAProxy server (verified with `?peer=`) |
//! | GET | `/api/v1/nodes/{id}/alert` | Current debounce state |
//! | GET | `/api/v1/nodes/{id}/log` | Recent health results, newest first |
//! | GET | `/api/v1/alerts` | Debounce state of every tracked node |
//! | GET | `/api/v1/lb/{backend}/servers` | Server rows of a backend |
//! | GET | `/api/v1/lb/{backend}/servers/{server}` | UP/DOWN of one server |
//! | GET | `/api/v1/lb/{backend}/count` | Number of UP servers |
//! | POST | `/api/v1/lb/{backend}/servers/{server}/enable` | Enable (or rotate in with `?peer=`) |
//! | POST | `/api/v1/lb/{backend}/servers/{server}/disable` | Disable (or rotate out with `?peer=`) |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post, put};

use nodeguard_haproxy::HaproxyClient;
use nodeguard_health::AlertStateStore;
use nodeguard_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub alerts: AlertStateStore,
    pub haproxy: HaproxyClient,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/nodes", get(handlers::list_nodes).post(handlers::put_node))
        .route("/nodes/{id}", get(handlers::get_node).delete(handlers::delete_node))
        .route("/nodes/{id}/mute", put(handlers::set_muted))
        .route("/nodes/{id}/rotate-out", post(handlers::rotate_node_out))
        .route("/nodes/{id}/rotate-in", post(handlers::rotate_node_in))
        .route("/nodes/{id}/alert", get(handlers::get_alert_state))
        .route("/nodes/{id}/log", get(handlers::get_health_log))
        .route("/alerts", get(handlers::list_alert_states))
        .route("/lb/{backend}/servers", get(handlers::list_servers))
        .route("/lb/{backend}/servers/{server}", get(handlers::server_status))
        .route("/lb/{backend}/count", get(handlers::server_count))
        .route("/lb/{backend}/servers/{server}/enable", post(handlers::enable_server))
        .route("/lb/{backend}/servers/{server}/disable", post(handlers::disable_server))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
