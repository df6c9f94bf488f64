//! # Probe Server Configuration
//!
//! Bind address and startup timing of the metrics/health server.

use super::{env_non_empty, parse_or, ConfigError};
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Probe server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind (`METRICS_BIND_ADDR`)
    pub bind_addr: IpAddr,
    /// Port serving `/metrics`, `/healthz` and `/readyz` (`METRICS_PORT`)
    pub metrics_port: u16,
    /// How long startup waits for the server to bind
    pub startup_timeout: Duration,
    /// How often startup checks whether the server is bound
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout: Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS),
        }
    }
}

impl ServerConfig {
    /// Read `METRICS_BIND_ADDR`, `METRICS_PORT` and the startup timings
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_non_empty)
    }

    pub fn from_lookup<G>(get: &G) -> Result<Self, ConfigError>
    where
        G: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: parse_or(get, "METRICS_BIND_ADDR", defaults.bind_addr)?,
            metrics_port: parse_or(get, "METRICS_PORT", defaults.metrics_port)?,
            startup_timeout: Duration::from_secs(parse_or(
                get,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            )?),
            poll_interval: Duration::from_millis(parse_or(
                get,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            )?),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.metrics_port)
    }
}
