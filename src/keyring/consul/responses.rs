//! # Response Types
//!
//! Consul keyring API response structures.
//!
//! `GET /v1/operator/keyring` returns one object per gossip pool:
//!
//! ```json
//! [{
//!   "WAN": false,
//!   "Datacenter": "dc1",
//!   "Segment": "",
//!   "Keys": { "pUqJ...u5s=": 3 },
//!   "PrimaryKeys": { "pUqJ...u5s=": 3 },
//!   "NumNodes": 3,
//!   "Messages": {}
//! }]
//! ```

use crate::keyring::KeyringPool;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// One pool of the keyring list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyringResponse {
    #[serde(rename = "WAN", default)]
    pub wan: bool,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub segment: Option<String>,
    /// Null when no member answered
    #[serde(default)]
    pub keys: Option<BTreeMap<String, u32>>,
    /// Absent on Consul versions before 1.12
    #[serde(default)]
    pub primary_keys: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub num_nodes: u32,
    /// Per-node errors collected while querying the pool
    #[serde(default)]
    pub messages: Option<HashMap<String, String>>,
}

impl From<KeyringResponse> for KeyringPool {
    fn from(response: KeyringResponse) -> Self {
        Self {
            wan: response.wan,
            datacenter: response.datacenter,
            segment: response.segment.unwrap_or_default(),
            keys: response.keys.unwrap_or_default(),
            primary_keys: response.primary_keys.unwrap_or_default(),
            num_nodes: response.num_nodes,
        }
    }
}
