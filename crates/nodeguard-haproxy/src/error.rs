//! Error types for the HAProxy control client.

use thiserror::Error;

/// Result type alias for HAProxy operations.
pub type HaproxyResult<T> = Result<T, HaproxyError>;

/// Errors raised while talking to the stats socket.
///
/// Every variant carries the raw text it was built from so callers can
/// surface it verbatim.
#[derive(Debug, Error)]
pub enum HaproxyError {
    #[error("failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("stats socket i/o error: {0}")]
    Io(String),

    #[error("stats socket timed out after {0}ms")]
    Timeout(u64),

    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("malformed server state row {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("rotation refused for {backend}/{server}: {reason}")]
    Rotation {
        backend: String,
        server: String,
        reason: String,
    },
}

impl HaproxyError {
    /// Whether this is a transport-class failure (anything but a parse error).
    pub fn is_transport(&self) -> bool {
        !matches!(self, HaproxyError::Parse { .. })
    }
}
