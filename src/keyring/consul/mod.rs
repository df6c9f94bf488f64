//! # Consul Keyring Client
//!
//! Native REST implementation over the Consul HTTP API using reqwest with rustls.

pub mod requests;
pub mod responses;

use crate::config::ConsulConfig;
use crate::keyring::{KeyringClient, KeyringError, KeyringSnapshot, LeaderSource};
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use paths::ConsulOperation;
use reqwest::{Client as ReqwestClient, Method};
use std::time::Duration;
use tracing::{debug, warn};

use self::requests::KeyringRequest;
use self::responses::KeyringResponse;

/// Consul HTTP API client for keyring and leader queries
#[derive(Clone)]
pub struct ConsulClient {
    http: ReqwestClient,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for ConsulClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ConsulClient {
    /// Create a client for the configured agent
    ///
    /// Every request carries `timeout`, the ACL token if configured and a
    /// `User-Agent` identifying this sidecar.
    ///
    /// # Errors
    ///
    /// Fails when the CA bundle cannot be read or parsed, or when the HTTP
    /// client cannot be built.
    pub fn new(config: &ConsulConfig, timeout: Duration) -> Result<Self> {
        let mut builder = ReqwestClient::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!(
                "gossip-key-rotator/{}",
                env!("CARGO_PKG_VERSION")
            ));

        if let Some(ca_path) = &config.ca_cert {
            let pem = std::fs::read(ca_path)
                .with_context(|| format!("Failed to read Consul CA bundle {}", ca_path.display()))?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .context("Consul CA bundle is not valid PEM")?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: normalize_address(&config.address),
            token: config.token.clone(),
            timeout,
        })
    }

    async fn send(
        &self,
        operation: ConsulOperation,
        body: Option<KeyringRequest>,
    ) -> Result<reqwest::Response, KeyringError> {
        let url = paths::join(&self.base_url, operation.path());
        debug!(
            method = operation.method(),
            path = operation.path(),
            "Calling Consul API"
        );

        let mut request = self.http.request(method(operation), &url);
        if let Some(token) = &self.token {
            request = request.header(paths::TOKEN_HEADER, token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(status_error(response).await),
            Err(e) => Err(self.transport_error(&e)),
        };

        let label = match &result {
            Ok(_) => "success",
            Err(e) => {
                if operation.is_mutating() {
                    warn!(operation = operation.as_str(), error = %e, "Keyring mutation failed");
                } else {
                    debug!(operation = operation.as_str(), error = %e, "Consul query failed");
                }
                e.kind()
            }
        };
        metrics::increment_keyring_requests(operation.as_str(), label);
        result
    }

    async fn mutate(&self, operation: ConsulOperation, key: &str) -> Result<(), KeyringError> {
        self.send(operation, Some(KeyringRequest::new(key)))
            .await
            .map(|_| ())
    }

    fn transport_error(&self, error: &reqwest::Error) -> KeyringError {
        if error.is_timeout() {
            KeyringError::Timeout(self.timeout)
        } else if error.is_decode() {
            KeyringError::Decode(error.to_string())
        } else {
            KeyringError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl KeyringClient for ConsulClient {
    async fn list(&self) -> Result<KeyringSnapshot, KeyringError> {
        let response = self.send(ConsulOperation::KeyringList, None).await?;
        let pools: Vec<KeyringResponse> = response
            .json()
            .await
            .map_err(|e| KeyringError::Decode(e.to_string()))?;

        for pool in &pools {
            if let Some(messages) = pool.messages.as_ref().filter(|m| !m.is_empty()) {
                warn!(
                    datacenter = %pool.datacenter,
                    wan = pool.wan,
                    errors = messages.len(),
                    "Some members did not answer the keyring query"
                );
            }
        }

        Ok(KeyringSnapshot::new(
            pools.into_iter().map(Into::into).collect(),
        ))
    }

    async fn install(&self, key: &str) -> Result<(), KeyringError> {
        self.mutate(ConsulOperation::KeyringInstall, key).await
    }

    async fn promote(&self, key: &str) -> Result<(), KeyringError> {
        self.mutate(ConsulOperation::KeyringUse, key).await
    }

    async fn remove(&self, key: &str) -> Result<(), KeyringError> {
        self.mutate(ConsulOperation::KeyringRemove, key).await
    }
}

#[async_trait]
impl LeaderSource for ConsulClient {
    async fn leader(&self) -> Result<String, KeyringError> {
        let response = self.send(ConsulOperation::Leader, None).await?;
        response
            .json::<String>()
            .await
            .map_err(|e| KeyringError::Decode(e.to_string()))
    }
}

fn method(operation: ConsulOperation) -> Method {
    match operation {
        ConsulOperation::Leader | ConsulOperation::KeyringList => Method::GET,
        ConsulOperation::KeyringInstall => Method::POST,
        ConsulOperation::KeyringUse => Method::PUT,
        ConsulOperation::KeyringRemove => Method::DELETE,
    }
}

async fn status_error(response: reqwest::Response) -> KeyringError {
    let status = response.status();
    let message = response
        .text()
        .await
        .map(|body| body.trim().to_string())
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        });
    KeyringError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Accept `host:port` as well as full URLs, like `CONSUL_HTTP_ADDR` does
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
