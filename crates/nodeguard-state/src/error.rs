//! Failures surfaced by the node catalog and health log.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Each variant carries the backend's message for the step that failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open catalog database: {0}")]
    Open(String),

    #[error("catalog transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open catalog table: {0}")]
    Table(String),

    #[error("catalog read failed: {0}")]
    Read(String),

    #[error("catalog write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("cannot decode stored record: {0}")]
    Deserialize(String),

    /// Rejected before touching the database; maps to a client error.
    #[error("invalid node id: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_names_the_node_id() {
        let err = StateError::InvalidKey("\"a:b\" must not contain ':'".to_string());
        assert_eq!(err.to_string(), "invalid node id: \"a:b\" must not contain ':'");
    }
}
