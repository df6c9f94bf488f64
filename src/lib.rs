//! # Gossip Key Rotator
//!
//! Sidecar that rotates the Consul gossip encryption key across a cluster
//! without ever leaving members unable to talk to each other.
//!
//! ## Overview
//!
//! The sidecar watches a mounted key file. When its content changes, the
//! instance colocated with the Raft leader drives the rotation:
//!
//! 1. **Install** the new key on every member
//! 2. **Await propagation** until every member of every pool reports it
//! 3. **Promote** it to primary
//! 4. **Retire** every other key
//!
//! Each step is idempotent and retried with a bounded policy. A failed or
//! interrupted rotation leaves the old primary active and is retried on the
//! next tick.

pub mod config;
pub mod constants;
pub mod detector;
pub mod keyring;
pub mod leadership;
pub mod observability;
pub mod rotation;
pub mod runtime;
pub mod server;
