//! # Keyring Error Types
//!
//! Errors reported by keyring and leadership calls, with classification of
//! transient vs permanent failures.

use std::time::Duration;
use thiserror::Error;

/// A failed Consul call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyringError {
    /// The call did not complete within the RPC timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The agent could not be reached
    #[error("connection to Consul failed: {0}")]
    Connection(String),
    /// The agent answered with a non-success status
    #[error("Consul returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// The agent answered with a body we could not interpret
    #[error("unexpected Consul response: {0}")]
    Decode(String),
}

impl KeyringError {
    /// Whether retrying the same call may succeed
    ///
    /// Server-side failures (5xx, including "No cluster leader"), throttling and
    /// network faults are transient. Client errors such as ACL denials or a
    /// rejected key are permanent for the current attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            KeyringError::Timeout(_) | KeyringError::Connection(_) => true,
            KeyringError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            KeyringError::Decode(_) => false,
        }
    }

    /// Label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            KeyringError::Timeout(_) => "timeout",
            KeyringError::Connection(_) => "connection",
            KeyringError::Status { status, .. } if *status >= 500 => "server_error",
            KeyringError::Status { .. } => "client_error",
            KeyringError::Decode(_) => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> KeyringError {
        KeyringError::Status {
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(KeyringError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(KeyringError::Connection("refused".to_string()).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!status(400).is_transient());
        assert!(!status(403).is_transient());
        assert!(!KeyringError::Decode("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(status(500).kind(), "server_error");
        assert_eq!(status(403).kind(), "client_error");
        assert_eq!(KeyringError::Timeout(Duration::ZERO).kind(), "timeout");
    }
}
