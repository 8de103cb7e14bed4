//! Stats-socket client.
//!
//! Every operation is one request/response exchange over a fresh TCP
//! connection: connect, write a single command line, read until HAProxy
//! closes the socket, disconnect. The client holds no connection state,
//! so it is cheap to clone and safe to share across tasks.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{HaproxyError, HaproxyResult};
use crate::state::{parse_server_state, ServerStateLine};

/// Client for a single HAProxy stats endpoint.
#[derive(Debug, Clone)]
pub struct HaproxyClient {
    address: String,
    timeout: Duration,
}

impl HaproxyClient {
    /// Create a client for the stats socket at `address` (`host:port`).
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one command and return the full response text.
    pub async fn execute(&self, command: &str) -> HaproxyResult<String> {
        let timeout_ms = self.timeout.as_millis() as u64;

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| HaproxyError::Timeout(timeout_ms))?
            .map_err(|e| HaproxyError::Connect {
                address: self.address.clone(),
                message: e.to_string(),
            })?;

        let exchange = async {
            stream.write_all(command.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await?;

            let mut response = String::new();
            stream.read_to_string(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HaproxyError::Timeout(timeout_ms))?
            .map_err(|e| HaproxyError::Io(e.to_string()))?;

        debug!(address = %self.address, %command, bytes = response.len(), "stats command completed");
        Ok(response)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// All server rows for a backend, in dump order.
    pub async fn query_state(&self, destination: &str) -> HaproxyResult<Vec<ServerStateLine>> {
        let response = self
            .execute(&format!("show servers state {destination}"))
            .await?;
        parse_server_state(&response)
    }

    /// `Some(up)` for the first row matching `destination`/`server`, `None` if absent.
    pub async fn get_server_status(
        &self,
        destination: &str,
        server: &str,
    ) -> HaproxyResult<Option<bool>> {
        let rows = self.query_state(destination).await?;
        Ok(server_status(&rows, destination, server))
    }

    /// Number of operational servers in a backend.
    ///
    /// `exclude_backup` skips rows flagged as backup; `exclude_tag` skips
    /// rows whose backend name contains the tag.
    pub async fn get_server_count(
        &self,
        destination: &str,
        exclude_backup: bool,
        exclude_tag: Option<&str>,
    ) -> HaproxyResult<usize> {
        let rows = self.query_state(destination).await?;
        Ok(count_up(&rows, exclude_backup, exclude_tag))
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Take a server out of rotation.
    pub async fn disable_server(&self, destination: &str, server: &str) -> HaproxyResult<()> {
        self.admin_command("disable", destination, server).await?;
        info!(%destination, %server, "server disabled");
        Ok(())
    }

    /// Put a server back into rotation.
    pub async fn enable_server(&self, destination: &str, server: &str) -> HaproxyResult<()> {
        self.admin_command("enable", destination, server).await?;
        info!(%destination, %server, "server enabled");
        Ok(())
    }

    /// Disable `server` only if it and its `peer` are both currently UP.
    ///
    /// No command is sent when the precheck fails, so a pair can never be
    /// taken fully offline through this path.
    pub async fn rotate_out(
        &self,
        destination: &str,
        server: &str,
        peer: &str,
    ) -> HaproxyResult<()> {
        let rows = self.query_state(destination).await?;
        require_up(&rows, destination, server, peer)?;
        self.disable_server(destination, server).await
    }

    /// Enable `server`, then verify it and its `peer` are both UP.
    pub async fn rotate_in(&self, destination: &str, server: &str, peer: &str) -> HaproxyResult<()> {
        self.enable_server(destination, server).await?;
        let rows = self.query_state(destination).await?;
        require_up(&rows, destination, server, peer).inspect_err(|e| {
            warn!(%destination, %server, %peer, error = %e, "post-enable verification failed");
        })
    }

    async fn admin_command(&self, verb: &str, destination: &str, server: &str) -> HaproxyResult<()> {
        let command = format!("{verb} server {destination}/{server}");
        let response = self.execute(&command).await?;
        // Admin commands answer with an empty line on success.
        let message = response.trim();
        if !message.is_empty() {
            return Err(HaproxyError::Command {
                command,
                message: message.to_string(),
            });
        }
        Ok(())
    }
}

/// Status lookup over already-parsed rows.
pub fn server_status(rows: &[ServerStateLine], destination: &str, server: &str) -> Option<bool> {
    rows.iter()
        .find(|row| row.backend == destination && row.server == server)
        .map(|row| row.up)
}

/// Operational-server count over already-parsed rows.
pub fn count_up(rows: &[ServerStateLine], exclude_backup: bool, exclude_tag: Option<&str>) -> usize {
    rows.iter()
        .filter(|row| row.up)
        .filter(|row| !(exclude_backup && row.backup))
        .filter(|row| exclude_tag.is_none_or(|tag| !row.backend.contains(tag)))
        .count()
}

fn require_up(
    rows: &[ServerStateLine],
    destination: &str,
    server: &str,
    peer: &str,
) -> HaproxyResult<()> {
    for name in [server, peer] {
        let reason = match server_status(rows, destination, name) {
            Some(true) => continue,
            Some(false) => format!("{name} is not operational"),
            None => format!("{name} not found in {destination}"),
        };
        return Err(HaproxyError::Rotation {
            backend: destination.to_string(),
            server: server.to_string(),
            reason,
        });
    }
    Ok(())
}
