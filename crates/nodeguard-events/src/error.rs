//! Error types for the event bus and alert dispatcher.

use thiserror::Error;

/// Event bus failures.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Failure of one outbound alert call.
///
/// Reported after the state transition has already been committed; never
/// retried and never rolled back.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("{channel} request failed: {message}")]
    Request { channel: &'static str, message: String },

    #[error("{channel} returned HTTP {status}: {body}")]
    Status {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("{channel} response could not be decoded: {message}")]
    Decode { channel: &'static str, message: String },
}
