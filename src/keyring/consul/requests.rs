//! # Request Types
//!
//! Consul keyring API request bodies.
//!
//! API Reference: https://developer.hashicorp.com/consul/api-docs/operator/keyring

use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Request body shared by install (`POST`), use (`PUT`) and remove (`DELETE`)
///
/// Consul expects the key under a PascalCase `"Key"` field.
#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyringRequest {
    #[serde(rename = "Key")]
    pub key: String,
}

impl KeyringRequest {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

impl std::fmt::Debug for KeyringRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringRequest").finish_non_exhaustive()
    }
}
