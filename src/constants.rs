//! # Constants
//!
//! Default values for configuration, timers and retry policies.

/// Default Consul agent address
pub const DEFAULT_CONSUL_HTTP_ADDR: &str = "http://127.0.0.1:8500";

/// Default safety timer period (seconds)
/// Catches file system events that were missed or coalesced
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 600;

/// Default timeout for a single Consul RPC (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Default install retry budget
pub const DEFAULT_INSTALL_MAX_ATTEMPTS: u32 = 100;
/// Default spacing between install attempts (seconds)
pub const DEFAULT_INSTALL_RETRY_INTERVAL_SECS: u64 = 1;

/// Default number of keyring polls while waiting for propagation
pub const DEFAULT_PROPAGATION_MAX_POLLS: u32 = 100;
/// Default spacing between propagation polls (seconds)
pub const DEFAULT_PROPAGATION_POLL_INTERVAL_SECS: u64 = 1;

/// Default promote retry budget
pub const DEFAULT_PROMOTE_MAX_ATTEMPTS: u32 = 100;
/// Default spacing between promote attempts (seconds)
pub const DEFAULT_PROMOTE_RETRY_INTERVAL_SECS: u64 = 1;

/// Default retry budget per stale key removal
pub const DEFAULT_REMOVE_MAX_ATTEMPTS: u32 = 10;
/// Default spacing between removal attempts (seconds)
pub const DEFAULT_REMOVE_RETRY_INTERVAL_SECS: u64 = 1;

/// Default HTTP port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 20100;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default log level when `RUST_LOG` is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Capacity of the watch event channel
/// Events beyond this are dropped; the detector rereads the file anyway
pub const WATCH_EVENT_CHANNEL_CAPACITY: usize = 16;

/// Length of the fingerprint prefix printed in logs
pub const FINGERPRINT_DISPLAY_LEN: usize = 12;

/// Decoded lengths Consul accepts for a gossip key (AES-128, AES-192, AES-256)
pub const VALID_GOSSIP_KEY_LENGTHS: [usize; 3] = [16, 24, 32];
