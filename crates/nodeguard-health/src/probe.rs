//! Health probes.
//!
//! The [`Prober`] trait is the boundary to whatever actually checks a
//! node; the state machine only sees the [`HealthCheckResult`] it yields.
//! [`HttpProber`] is a generic reachability probe (GET a path, 2xx is
//! healthy) for fleets without a chain-aware checker.

use std::time::Duration;

use tracing::debug;

use nodeguard_core::{Condition, HealthCheckResult, MonitoredNode};
use nodeguard_events::BoxFuture;

/// Produces one health-check result for one node.
///
/// Implementations report failures as `ERROR` results, never as panics
/// or errors; the monitor adds its own deadline on top.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, node: &'a MonitoredNode) -> BoxFuture<'a, HealthCheckResult>;
}

/// HTTP GET reachability probe.
#[derive(Debug, Clone)]
pub struct HttpProber {
    path: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, node: &'a MonitoredNode) -> BoxFuture<'a, HealthCheckResult> {
        Box::pin(http_probe(node.address(), &self.path, self.timeout))
    }
}

/// Perform an HTTP health probe against an endpoint.
///
/// `HEALTHY` on 2xx, `ERROR_RESPONSE` on other statuses, `OFFLINE` when
/// the connection cannot be made and `NO_RESPONSE` on timeout.
pub async fn http_probe(address: String, path: &str, timeout: Duration) -> HealthCheckResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return HealthCheckResult::error(
                    Condition::Offline,
                    serde_json::json!({ "error": e.to_string() }),
                );
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return HealthCheckResult::error(
                    Condition::ErrorResponse,
                    serde_json::json!({ "error": e.to_string() }),
                );
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &address)
            .header("user-agent", "nodeguard-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                return HealthCheckResult::error(
                    Condition::ErrorResponse,
                    serde_json::json!({ "error": e.to_string(), "uri": uri }),
                );
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => HealthCheckResult::healthy(),
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-2xx");
                HealthCheckResult::error(
                    Condition::ErrorResponse,
                    serde_json::json!({ "status": resp.status().as_u16() }),
                )
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                HealthCheckResult::error(
                    Condition::NoResponse,
                    serde_json::json!({ "error": e.to_string() }),
                )
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            HealthCheckResult::timed_out(timeout.as_millis() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeguard_core::HealthStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        address
    }

    #[tokio::test]
    async fn closed_port_is_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = http_probe(address, "/health", Duration::from_millis(500)).await;
        assert_eq!(result.status, HealthStatus::Error);
        assert_eq!(result.condition, Condition::Offline);
    }

    #[tokio::test]
    async fn ok_response_is_healthy() {
        let address =
            serve_once("HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let result = http_probe(address, "/health", Duration::from_secs(2)).await;
        assert_eq!(result.status, HealthStatus::Ok);
        assert_eq!(result.condition, Condition::Healthy);
    }

    #[tokio::test]
    async fn server_error_is_error_response() {
        let address = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let result = http_probe(address, "/health", Duration::from_secs(2)).await;
        assert_eq!(result.condition, Condition::ErrorResponse);
        assert_eq!(result.details["status"], 503);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = http_probe(address, "/health", Duration::from_millis(100)).await;
        assert_eq!(result.condition, Condition::NoResponse);
    }
}
