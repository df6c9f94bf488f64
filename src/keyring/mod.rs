//! # Keyring Client
//!
//! Typed access to the cluster's shared gossip keyring.
//!
//! - [`KeyringClient`] lists, installs, promotes and removes keys
//! - [`LeaderSource`] reports the current Raft leader address
//! - [`KeyringSnapshot`] is one `list()` observation, from which key entries,
//!   the total member count and propagation are derived
//!
//! The client only reports success or failure per call. Retry decisions are
//! made by the rotation orchestrator.

pub mod consul;
mod error;

pub use consul::ConsulClient;
pub use error::KeyringError;

use crate::detector::Fingerprint;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Keyring operations against the cluster API
#[async_trait]
pub trait KeyringClient: Send + Sync {
    /// Keys installed in every gossip pool, with member counts
    async fn list(&self) -> Result<KeyringSnapshot, KeyringError>;

    /// Install a key; installing a present key succeeds without effect
    async fn install(&self, key: &str) -> Result<(), KeyringError>;

    /// Make an installed key primary
    async fn promote(&self, key: &str) -> Result<(), KeyringError>;

    /// Remove a non-primary key; removing an absent key succeeds without effect
    async fn remove(&self, key: &str) -> Result<(), KeyringError>;
}

/// Source of the cluster's current leader address
#[async_trait]
pub trait LeaderSource: Send + Sync {
    /// Leader address as `host:port`, empty when the cluster has no leader
    async fn leader(&self) -> Result<String, KeyringError>;
}

/// One gossip pool as reported by the keyring API
///
/// Consul reports a WAN pool per datacenter and a LAN pool per datacenter
/// (and per network segment or partition in Enterprise).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyringPool {
    pub wan: bool,
    pub datacenter: String,
    pub segment: String,
    /// Installed keys and how many members reported each
    pub keys: BTreeMap<String, u32>,
    /// Primary keys and how many members use each as primary
    pub primary_keys: BTreeMap<String, u32>,
    /// Members of this pool
    pub num_nodes: u32,
}

impl KeyringPool {
    /// `dc1/lan`, `dc1/wan`, `dc1/lan/segment`
    pub fn name(&self) -> String {
        let scope = if self.wan { "wan" } else { "lan" };
        if self.segment.is_empty() {
            format!("{}/{scope}", self.datacenter)
        } else {
            format!("{}/{scope}/{}", self.datacenter, self.segment)
        }
    }

    /// Every member of this pool reports the key
    pub fn is_propagated(&self, key: &str) -> bool {
        self.num_nodes > 0 && self.keys.get(key).copied() == Some(self.num_nodes)
    }
}

impl std::fmt::Debug for KeyringPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fingerprints = |keys: &BTreeMap<String, u32>| {
            keys.iter()
                .map(|(k, n)| (Fingerprint::of(k).short().to_string(), *n))
                .collect::<Vec<_>>()
        };
        f.debug_struct("KeyringPool")
            .field("pool", &self.name())
            .field("keys", &fingerprints(&self.keys))
            .field("primary_keys", &fingerprints(&self.primary_keys))
            .field("num_nodes", &self.num_nodes)
            .finish()
    }
}

/// A key as seen across all pools
#[derive(Clone, PartialEq, Eq)]
pub struct KeyringEntry {
    pub key: String,
    /// Primary in at least one pool
    pub is_primary: bool,
    /// Members reporting possession, summed over pools
    pub member_count: u32,
}

impl std::fmt::Debug for KeyringEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringEntry")
            .field("fingerprint", &Fingerprint::of(&self.key))
            .field("is_primary", &self.is_primary)
            .field("member_count", &self.member_count)
            .finish()
    }
}

/// Result of one `list()` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyringSnapshot {
    pub pools: Vec<KeyringPool>,
}

impl KeyringSnapshot {
    pub fn new(pools: Vec<KeyringPool>) -> Self {
        Self { pools }
    }

    /// Members across all pools, as reported by this same response
    pub fn total_members(&self) -> u32 {
        self.pools.iter().map(|p| p.num_nodes).sum()
    }

    /// Members reporting `key`, summed over pools
    pub fn member_count(&self, key: &str) -> u32 {
        self.pools
            .iter()
            .map(|p| p.keys.get(key).copied().unwrap_or(0))
            .sum()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pools.iter().any(|p| p.keys.contains_key(key))
    }

    /// The key is reported by every member of every pool
    ///
    /// Checked per pool, which implies the aggregate member count equals the
    /// aggregate total of this response.
    pub fn is_propagated(&self, key: &str) -> bool {
        !self.pools.is_empty() && self.pools.iter().all(|p| p.is_propagated(key))
    }

    /// Aggregated entries, sorted by key
    pub fn entries(&self) -> Vec<KeyringEntry> {
        let mut merged: BTreeMap<&str, KeyringEntry> = BTreeMap::new();
        for pool in &self.pools {
            for (key, count) in &pool.keys {
                let entry = merged.entry(key.as_str()).or_insert_with(|| KeyringEntry {
                    key: key.clone(),
                    is_primary: false,
                    member_count: 0,
                });
                entry.member_count += count;
                if pool.primary_keys.get(key).is_some_and(|n| *n > 0) {
                    entry.is_primary = true;
                }
            }
        }
        merged.into_values().collect()
    }

    /// Distinct primary keys reported across pools
    pub fn primary_keys(&self) -> BTreeSet<&str> {
        self.pools
            .iter()
            .flat_map(|p| p.primary_keys.iter())
            .filter(|(_, n)| **n > 0)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// The single primary key, if every pool agrees on one
    pub fn sole_primary(&self) -> Option<&str> {
        let primaries = self.primary_keys();
        if primaries.len() == 1 {
            primaries.into_iter().next()
        } else {
            None
        }
    }

    /// Installed keys other than `keep`
    pub fn keys_except(&self, keep: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.key != keep)
            .map(|e| e.key)
            .collect()
    }
}
