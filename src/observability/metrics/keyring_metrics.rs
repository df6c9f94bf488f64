//! # Keyring Metrics
//!
//! Metrics for Consul calls: keyring operations and leadership checks.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static KEYRING_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gossip_key_keyring_requests_total",
            "Total number of keyring API calls by operation and result",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create KEYRING_REQUESTS_TOTAL metric - this should never happen")
});

static LEADERSHIP_CHECKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gossip_key_leadership_checks_total",
            "Total number of leadership checks by result",
        ),
        &["result"],
    )
    .expect("Failed to create LEADERSHIP_CHECKS_TOTAL metric - this should never happen")
});

/// Register keyring metrics with the registry
pub(crate) fn register_keyring_metrics() -> Result<()> {
    REGISTRY.register(Box::new(KEYRING_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LEADERSHIP_CHECKS_TOTAL.clone()))?;
    Ok(())
}

/// Count one keyring call (`result` is `success` or an error kind)
pub fn increment_keyring_requests(operation: &str, result: &str) {
    KEYRING_REQUESTS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

/// Count one leadership check (`leader`, `follower` or `unknown`)
pub fn increment_leadership_checks(result: &str) {
    LEADERSHIP_CHECKS_TOTAL.with_label_values(&[result]).inc();
}
