//! # Metrics Module
//!
//! Prometheus metrics for monitoring the rotator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `rotation_metrics` - Rotation outcomes, state, duration and detections
//! - `keyring_metrics` - Consul keyring and leadership calls

pub mod keyring_metrics;
pub mod registry;
pub mod rotation_metrics;

pub use keyring_metrics::*;
pub use registry::*;
pub use rotation_metrics::*;
