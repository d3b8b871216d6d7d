//! Transport failures.
//!
//! Distinct from protocol rejections: the request may or may not have
//! reached its destination.

use thiserror::Error;

/// Failure talking to the authority or a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// No reply within the deadline.
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Reply did not have the expected shape.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// The peer refused our credentials.
    #[error("authentication refused: {0}")]
    AuthRefused(String),

    /// Connection closed before a reply.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Unreachable(_) | TransportError::Timeout | TransportError::Closed => true,
            TransportError::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Unreachable(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::Unreachable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Status(503).is_transient());
        assert!(TransportError::Status(429).is_transient());
        assert!(!TransportError::Status(400).is_transient());
        assert!(!TransportError::Malformed("x".into()).is_transient());
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u8>("nope").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Malformed(_)));
    }
}
