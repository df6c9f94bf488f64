//! # Rotation State
//!
//! Protocol states and the per-attempt record owned by the orchestrator.

use crate::detector::KeyMaterial;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Rotation protocol state
///
/// `Idle -> Detected -> Installing -> AwaitingPropagation -> Promoting ->
/// Retiring -> Done`, with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RotationState {
    Idle,
    Detected,
    Installing,
    AwaitingPropagation,
    Promoting,
    Retiring,
    Done,
    Failed,
}

impl RotationState {
    pub fn as_str(self) -> &'static str {
        match self {
            RotationState::Idle => "idle",
            RotationState::Detected => "detected",
            RotationState::Installing => "installing",
            RotationState::AwaitingPropagation => "awaiting_propagation",
            RotationState::Promoting => "promoting",
            RotationState::Retiring => "retiring",
            RotationState::Done => "done",
            RotationState::Failed => "failed",
        }
    }

    /// Value exported by the state gauge
    pub fn index(self) -> i64 {
        match self {
            RotationState::Idle => 0,
            RotationState::Detected => 1,
            RotationState::Installing => 2,
            RotationState::AwaitingPropagation => 3,
            RotationState::Promoting => 4,
            RotationState::Retiring => 5,
            RotationState::Done => 6,
            RotationState::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RotationState::Done | RotationState::Failed)
    }

    /// Forward successor on the success path
    pub fn successor(self) -> Option<RotationState> {
        match self {
            RotationState::Idle => Some(RotationState::Detected),
            RotationState::Detected => Some(RotationState::Installing),
            RotationState::Installing => Some(RotationState::AwaitingPropagation),
            RotationState::AwaitingPropagation => Some(RotationState::Promoting),
            RotationState::Promoting => Some(RotationState::Retiring),
            RotationState::Retiring => Some(RotationState::Done),
            RotationState::Done => Some(RotationState::Idle),
            RotationState::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: RotationState) -> bool {
        if next == RotationState::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

impl std::fmt::Display for RotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rotation towards a target key
///
/// Lives for a single orchestrator run and is dropped on a terminal state.
#[derive(Debug)]
pub struct RotationAttempt {
    target: KeyMaterial,
    state: RotationState,
    attempts: BTreeMap<RotationState, u32>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RotationAttempt {
    pub fn new(target: KeyMaterial) -> Self {
        Self {
            target,
            state: RotationState::Idle,
            attempts: BTreeMap::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn target(&self) -> &KeyMaterial {
        &self.target
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, logging the transition
    pub fn transition(&mut self, next: RotationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid rotation transition {} -> {}",
            self.state,
            next
        );
        info!(
            fingerprint = %self.target.fingerprint(),
            from = %self.state,
            to = %next,
            "Rotation state transition"
        );
        self.state = next;
        metrics::set_rotation_state(next.index());
    }

    /// Count an attempt in the current state, returning the new count
    pub fn record_attempt(&mut self) -> u32 {
        let count = self.attempts.entry(self.state).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts_in(&self, state: RotationState) -> u32 {
        self.attempts.get(&state).copied().unwrap_or(0)
    }
}
