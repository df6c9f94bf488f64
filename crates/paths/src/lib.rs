//! Shared Consul API path definitions
//!
//! This crate centralizes the Consul HTTP API paths used by the rotator so the
//! client and the in-process mock server used by the tests never drift apart.
//!
//! ## Route Constants
//!
//! Route constants are provided for Axum routes, which require static string literals.
//! [`ConsulOperation`] maps each keyring operation to its HTTP method and path.

/// Consul API version prefix
pub const API_VERSION: &str = "v1";

/// Raft leader address (`"10.0.0.1:8300"`, JSON-encoded string)
pub const STATUS_LEADER: &str = "/v1/status/leader";

/// Gossip keyring management (list, install, use, remove)
pub const OPERATOR_KEYRING: &str = "/v1/operator/keyring";

/// Header carrying the ACL token
pub const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul API operations the rotator performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsulOperation {
    /// `GET /v1/status/leader`
    Leader,
    /// `GET /v1/operator/keyring`
    KeyringList,
    /// `POST /v1/operator/keyring`
    KeyringInstall,
    /// `PUT /v1/operator/keyring`
    KeyringUse,
    /// `DELETE /v1/operator/keyring`
    KeyringRemove,
}

impl ConsulOperation {
    /// HTTP method as an uppercase string
    pub fn method(self) -> &'static str {
        match self {
            ConsulOperation::Leader | ConsulOperation::KeyringList => "GET",
            ConsulOperation::KeyringInstall => "POST",
            ConsulOperation::KeyringUse => "PUT",
            ConsulOperation::KeyringRemove => "DELETE",
        }
    }

    /// Path relative to the agent address
    pub fn path(self) -> &'static str {
        match self {
            ConsulOperation::Leader => STATUS_LEADER,
            _ => OPERATOR_KEYRING,
        }
    }

    /// Label used in metrics and logs
    pub fn as_str(self) -> &'static str {
        match self {
            ConsulOperation::Leader => "leader",
            ConsulOperation::KeyringList => "list",
            ConsulOperation::KeyringInstall => "install",
            ConsulOperation::KeyringUse => "promote",
            ConsulOperation::KeyringRemove => "remove",
        }
    }

    /// Whether the operation changes cluster state
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            ConsulOperation::KeyringInstall
                | ConsulOperation::KeyringUse
                | ConsulOperation::KeyringRemove
        )
    }
}

/// Join an agent base address and an API path without doubling slashes
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
