//! # Rotator Settings
//!
//! Watched path, pod identity, Consul connection and retry budgets.

use super::{parse_or, ConfigError};
use crate::constants::*;
use crate::rotation::RetryPolicy;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Consul connection settings
#[derive(Clone)]
pub struct ConsulConfig {
    /// Agent address, e.g. `http://127.0.0.1:8500`
    pub address: String,
    /// ACL token, if ACLs are enabled
    pub token: Option<String>,
    /// PEM CA bundle used to verify an HTTPS agent
    pub ca_cert: Option<PathBuf>,
}

impl std::fmt::Debug for ConsulConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_cert", &self.ca_cert)
            .finish()
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_CONSUL_HTTP_ADDR.to_string(),
            token: None,
            ca_cert: None,
        }
    }
}

impl ConsulConfig {
    /// Read `CONSUL_HTTP_ADDR`, `CONSUL_HTTP_TOKEN(_FILE)` and `CONSUL_CACERT`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| super::env_non_empty(key))
    }

    /// Same as [`ConsulConfig::from_env`] through a lookup that already
    /// drops blank values
    pub fn from_lookup<G>(get: &G) -> Result<Self, ConfigError>
    where
        G: Fn(&str) -> Option<String>,
    {
        let token = match (get("CONSUL_HTTP_TOKEN"), get("CONSUL_HTTP_TOKEN_FILE")) {
            (Some(token), _) => Some(token),
            (None, Some(path)) => {
                let contents =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::File {
                        name: "CONSUL_HTTP_TOKEN_FILE",
                        path: path.clone(),
                        source,
                    })?;
                Some(contents.trim().to_string()).filter(|t| !t.is_empty())
            }
            (None, None) => None,
        };

        Ok(Self {
            address: get("CONSUL_HTTP_ADDR")
                .unwrap_or_else(|| DEFAULT_CONSUL_HTTP_ADDR.to_string()),
            token,
            ca_cert: get("CONSUL_CACERT").map(PathBuf::from),
        })
    }
}

/// Log output settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            level: super::env_non_empty("LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json: super::env_flag_or_default("LOG_JSON", false),
        }
    }
}

/// Retry budgets for each rotation step
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub install: RetryPolicy,
    pub propagation: RetryPolicy,
    pub promote: RetryPolicy,
    pub remove: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            install: RetryPolicy::fixed(
                DEFAULT_INSTALL_MAX_ATTEMPTS,
                Duration::from_secs(DEFAULT_INSTALL_RETRY_INTERVAL_SECS),
            ),
            propagation: RetryPolicy::fixed(
                DEFAULT_PROPAGATION_MAX_POLLS,
                Duration::from_secs(DEFAULT_PROPAGATION_POLL_INTERVAL_SECS),
            ),
            promote: RetryPolicy::fixed(
                DEFAULT_PROMOTE_MAX_ATTEMPTS,
                Duration::from_secs(DEFAULT_PROMOTE_RETRY_INTERVAL_SECS),
            ),
            remove: RetryPolicy::fixed(
                DEFAULT_REMOVE_MAX_ATTEMPTS,
                Duration::from_secs(DEFAULT_REMOVE_RETRY_INTERVAL_SECS),
            ),
        }
    }
}

/// Sidecar configuration
#[derive(Debug, Clone)]
pub struct RotatorConfig {
    /// Gossip encryption key file (usually a mounted secret)
    pub key_file: PathBuf,
    /// This pod's address, compared against the Raft leader
    pub pod_ip: IpAddr,
    pub consul: ConsulConfig,
    /// Safety timer period
    pub reconcile_interval: Duration,
    /// Timeout applied to every Consul call
    pub rpc_timeout: Duration,
    pub retry: RetryConfig,
    /// Compare the file against the cluster's primary key at startup
    pub resume_from_keyring: bool,
}

impl RotatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key_file = get("GOSSIP_ENCRYPTION_FILE")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("GOSSIP_ENCRYPTION_FILE"))?;

        let pod_ip_raw = get("POD_IP").ok_or(ConfigError::Missing("POD_IP"))?;
        let pod_ip = pod_ip_raw
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "POD_IP",
                value: pod_ip_raw.clone(),
                reason: e.to_string(),
            })?;

        let consul = ConsulConfig::from_lookup(&get)?;

        let jitter = match get("RETRY_JITTER") {
            Some(raw) => parse_bool("RETRY_JITTER", &raw)?,
            None => false,
        };

        let retry = RetryConfig {
            install: policy(
                &get,
                "INSTALL_MAX_ATTEMPTS",
                DEFAULT_INSTALL_MAX_ATTEMPTS,
                "INSTALL_RETRY_INTERVAL_SECS",
                DEFAULT_INSTALL_RETRY_INTERVAL_SECS,
                jitter,
            )?,
            propagation: policy(
                &get,
                "PROPAGATION_MAX_POLLS",
                DEFAULT_PROPAGATION_MAX_POLLS,
                "PROPAGATION_POLL_INTERVAL_SECS",
                DEFAULT_PROPAGATION_POLL_INTERVAL_SECS,
                jitter,
            )?,
            promote: policy(
                &get,
                "PROMOTE_MAX_ATTEMPTS",
                DEFAULT_PROMOTE_MAX_ATTEMPTS,
                "PROMOTE_RETRY_INTERVAL_SECS",
                DEFAULT_PROMOTE_RETRY_INTERVAL_SECS,
                jitter,
            )?,
            remove: policy(
                &get,
                "REMOVE_MAX_ATTEMPTS",
                DEFAULT_REMOVE_MAX_ATTEMPTS,
                "REMOVE_RETRY_INTERVAL_SECS",
                DEFAULT_REMOVE_RETRY_INTERVAL_SECS,
                jitter,
            )?,
        };

        let resume_from_keyring = match get("RESUME_FROM_KEYRING") {
            Some(raw) => parse_bool("RESUME_FROM_KEYRING", &raw)?,
            None => true,
        };

        Ok(Self {
            key_file,
            pod_ip,
            consul,
            reconcile_interval: Duration::from_secs(parse_or(
                &get,
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?),
            rpc_timeout: Duration::from_secs(parse_or(
                &get,
                "RPC_TIMEOUT_SECS",
                DEFAULT_RPC_TIMEOUT_SECS,
            )?),
            retry,
            resume_from_keyring,
        })
    }

    /// Reject values that would make the event loop spin or never retry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_interval.is_zero() {
            return Err(zero("RECONCILE_INTERVAL_SECS"));
        }
        if self.rpc_timeout.is_zero() {
            return Err(zero("RPC_TIMEOUT_SECS"));
        }
        let budgets = [
            (
                "INSTALL_MAX_ATTEMPTS",
                "INSTALL_RETRY_INTERVAL_SECS",
                &self.retry.install,
            ),
            (
                "PROPAGATION_MAX_POLLS",
                "PROPAGATION_POLL_INTERVAL_SECS",
                &self.retry.propagation,
            ),
            (
                "PROMOTE_MAX_ATTEMPTS",
                "PROMOTE_RETRY_INTERVAL_SECS",
                &self.retry.promote,
            ),
            (
                "REMOVE_MAX_ATTEMPTS",
                "REMOVE_RETRY_INTERVAL_SECS",
                &self.retry.remove,
            ),
        ];
        for (attempts_name, interval_name, policy) in budgets {
            if policy.max_attempts == 0 {
                return Err(zero(attempts_name));
            }
            if policy.interval.is_zero() {
                return Err(zero(interval_name));
            }
        }
        if !self.consul.address.contains("://") && self.consul.address.contains('/') {
            return Err(ConfigError::Invalid {
                name: "CONSUL_HTTP_ADDR",
                value: self.consul.address.clone(),
                reason: "expected host:port or a URL".to_string(),
            });
        }
        Ok(())
    }
}

fn zero(name: &'static str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: "0".to_string(),
        reason: "must be greater than 0".to_string(),
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    super::parse_flag(raw).ok_or_else(|| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: "expected true or false".to_string(),
    })
}

fn policy<G>(
    get: &G,
    attempts_name: &'static str,
    default_attempts: u32,
    interval_name: &'static str,
    default_interval_secs: u64,
    jitter: bool,
) -> Result<RetryPolicy, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let attempts = parse_or(get, attempts_name, default_attempts)?;
    let interval = parse_or(get, interval_name, default_interval_secs)?;
    Ok(RetryPolicy::fixed(attempts, Duration::from_secs(interval)).with_jitter(jitter))
}
