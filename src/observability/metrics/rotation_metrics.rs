//! # Rotation Metrics
//!
//! Metrics for the rotation protocol: outcomes, current state, duration,
//! stale keys left behind and change detections.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounterVec, IntGauge};
use std::sync::LazyLock;

static ROTATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gossip_key_rotations_total",
            "Total number of rotation attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create ROTATIONS_TOTAL metric - this should never happen")
});

static ROTATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gossip_key_rotation_duration_seconds",
            "Duration of rotation attempts in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .expect("Failed to create ROTATION_DURATION metric - this should never happen")
});

static ROTATION_STATE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "gossip_key_rotation_state",
        "Current rotation state (0 idle, 1 detected, 2 installing, 3 awaiting propagation, 4 promoting, 5 retiring, 6 done, 7 failed)",
    )
    .expect("Failed to create ROTATION_STATE metric - this should never happen")
});

static STALE_KEYS_REMAINING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "gossip_key_stale_keys_remaining",
        "Non-primary keys the last rotation failed to remove",
    )
    .expect("Failed to create STALE_KEYS_REMAINING metric - this should never happen")
});

static DETECTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gossip_key_detections_total",
            "Total number of key file checks by result",
        ),
        &["result"],
    )
    .expect("Failed to create DETECTIONS_TOTAL metric - this should never happen")
});

/// Register rotation metrics with the registry
pub(crate) fn register_rotation_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ROTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROTATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ROTATION_STATE.clone()))?;
    REGISTRY.register(Box::new(STALE_KEYS_REMAINING.clone()))?;
    REGISTRY.register(Box::new(DETECTIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_rotations(outcome: &str) {
    ROTATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_rotation_duration(duration: f64) {
    ROTATION_DURATION.observe(duration);
}

pub fn set_rotation_state(state_index: i64) {
    ROTATION_STATE.set(state_index);
}

pub fn set_stale_keys_remaining(count: usize) {
    STALE_KEYS_REMAINING.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_detections(result: &str) {
    DETECTIONS_TOTAL.with_label_values(&[result]).inc();
}
