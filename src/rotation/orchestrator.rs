//! # Rotation Orchestrator
//!
//! Drives one rotation attempt through install, propagation, promotion and
//! retirement. Every step is idempotent on the Consul side, so an attempt
//! that fails or is cancelled can simply be driven again from the start.

use crate::config::RetryConfig;
use crate::detector::{ChangeDetector, Fingerprint, KeyMaterial};
use crate::keyring::{KeyringClient, KeyringError, KeyringSnapshot};
use crate::leadership::LeadershipGate;
use crate::observability::metrics;
use crate::rotation::policy::RetryPolicy;
use crate::rotation::state::{RotationAttempt, RotationState};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Why an attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last_error: KeyringError,
    },
    #[error("{operation} rejected by Consul: {error}")]
    Rejected {
        operation: &'static str,
        error: KeyringError,
    },
    #[error(
        "propagation not confirmed after {polls} polls ({member_count}/{total_members} members report the new key)"
    )]
    PropagationTimeout {
        polls: u32,
        member_count: u32,
        total_members: u32,
    },
    #[error("leadership lost before {0}")]
    LeadershipLost(RotationState),
}

/// Terminal result of [`RotationOrchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// This instance is not colocated with the leader; nothing was called
    NotAuthorized,
    /// New key is primary and committed
    Done {
        fingerprint: Fingerprint,
        /// Stale keys that could not be removed (non-primary, harmless)
        stale_keys_remaining: Vec<Fingerprint>,
    },
    Failed {
        fingerprint: Fingerprint,
        state: RotationState,
        reason: FailureReason,
    },
    /// Shutdown observed mid-attempt; nothing committed
    Cancelled {
        fingerprint: Fingerprint,
        state: RotationState,
    },
}

impl RotationOutcome {
    /// Metric label for `gossip_key_rotations_total`
    pub fn label(&self) -> &'static str {
        match self {
            RotationOutcome::NotAuthorized => "not_authorized",
            RotationOutcome::Done {
                stale_keys_remaining,
                ..
            } if stale_keys_remaining.is_empty() => "done",
            RotationOutcome::Done { .. } => "degraded",
            RotationOutcome::Failed { .. } => "failed",
            RotationOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RotationOutcome::Done { .. })
    }
}

/// How a step ended early
#[derive(Debug)]
enum StepError {
    Failed(FailureReason),
    Cancelled,
}

impl From<FailureReason> for StepError {
    fn from(reason: FailureReason) -> Self {
        StepError::Failed(reason)
    }
}

/// Runs rotation attempts, one at a time, against a keyring
pub struct RotationOrchestrator {
    keyring: Arc<dyn KeyringClient>,
    gate: LeadershipGate,
    policies: RetryConfig,
    rpc_timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RotationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationOrchestrator")
            .field("gate", &self.gate)
            .field("policies", &self.policies)
            .field("rpc_timeout", &self.rpc_timeout)
            .finish_non_exhaustive()
    }
}

impl RotationOrchestrator {
    pub fn new(
        keyring: Arc<dyn KeyringClient>,
        gate: LeadershipGate,
        policies: RetryConfig,
        rpc_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            keyring,
            gate,
            policies,
            rpc_timeout,
            cancel,
        }
    }

    /// Rotate the cluster to `material`
    ///
    /// Commits the new fingerprint in `detector` only when the attempt
    /// reaches `Done`. Any other outcome leaves the baseline untouched so the
    /// next detection retries the same target.
    pub async fn run(
        &self,
        material: KeyMaterial,
        detector: &mut ChangeDetector,
    ) -> RotationOutcome {
        let fingerprint = material.fingerprint().clone();
        let span = tracing::info_span!("rotation", fingerprint = %fingerprint);
        let outcome = self.run_attempt(material).instrument(span).await;

        if let RotationOutcome::Done { fingerprint, .. } = &outcome {
            detector.commit(fingerprint);
        }
        if outcome != RotationOutcome::NotAuthorized {
            metrics::increment_rotations(outcome.label());
        }
        metrics::set_rotation_state(RotationState::Idle.index());
        outcome
    }

    async fn run_attempt(&self, material: KeyMaterial) -> RotationOutcome {
        let mut attempt = RotationAttempt::new(material);
        let fingerprint = attempt.target().fingerprint().clone();

        if self.cancel.is_cancelled() {
            return RotationOutcome::Cancelled {
                fingerprint,
                state: attempt.state(),
            };
        }

        if !self.gate.is_authorized().await {
            debug!("Gossip key change detected but not authorized to rotate");
            return RotationOutcome::NotAuthorized;
        }

        info!(started_at = %attempt.started_at(), "Starting gossip key rotation");
        attempt.transition(RotationState::Detected);

        let result = self.drive(&mut attempt).await;
        let elapsed = attempt.elapsed();
        metrics::observe_rotation_duration(elapsed.as_secs_f64());

        match result {
            Ok(stale_keys_remaining) => {
                attempt.transition(RotationState::Done);
                metrics::set_stale_keys_remaining(stale_keys_remaining.len());
                if stale_keys_remaining.is_empty() {
                    info!(duration = ?elapsed, "Gossip key rotation completed");
                } else {
                    warn!(
                        duration = ?elapsed,
                        stale_keys = stale_keys_remaining.len(),
                        "Gossip key rotation completed with stale keys still installed"
                    );
                }
                RotationOutcome::Done {
                    fingerprint,
                    stale_keys_remaining,
                }
            }
            Err(StepError::Failed(reason)) => {
                let state = attempt.state();
                attempt.transition(RotationState::Failed);
                error!(
                    state = %state,
                    attempts = attempt.attempts_in(state),
                    duration = ?elapsed,
                    error = %reason,
                    "Gossip key rotation failed, current primary key stays active until the next tick"
                );
                RotationOutcome::Failed {
                    fingerprint,
                    state,
                    reason,
                }
            }
            Err(StepError::Cancelled) => {
                let state = attempt.state();
                warn!(state = %state, "Gossip key rotation cancelled by shutdown");
                RotationOutcome::Cancelled { fingerprint, state }
            }
        }
    }

    /// Install, confirm, promote, retire; returns fingerprints left behind
    async fn drive(&self, attempt: &mut RotationAttempt) -> Result<Vec<Fingerprint>, StepError> {
        let key = attempt.target().key().to_owned();

        attempt.transition(RotationState::Installing);
        self.retry(attempt, &self.policies.install, "install", || {
            self.keyring.install(&key)
        })
        .await?;

        attempt.transition(RotationState::AwaitingPropagation);
        let confirmed = self.await_propagation(attempt, &key).await?;

        self.ensure_leadership(RotationState::Promoting).await?;
        attempt.transition(RotationState::Promoting);
        self.retry(attempt, &self.policies.promote, "promote", || {
            self.keyring.promote(&key)
        })
        .await?;

        self.ensure_leadership(RotationState::Retiring).await?;
        attempt.transition(RotationState::Retiring);
        self.retire(attempt, &key, confirmed).await
    }

    /// Poll `list()` until every member of every pool reports `key`
    ///
    /// The comparison uses the member total of the same response, so a
    /// member joining mid-poll only delays confirmation.
    async fn await_propagation(
        &self,
        attempt: &mut RotationAttempt,
        key: &str,
    ) -> Result<KeyringSnapshot, StepError> {
        let policy = self.policies.propagation;
        let polls = policy.max_attempts.max(1);
        let mut last_seen: Option<(u32, u32)> = None;
        let mut last_error: Option<KeyringError> = None;
        info!(
            max_polls = polls,
            max_wait = ?policy.max_total_delay(),
            "Waiting for the new gossip key to reach every member"
        );

        for poll in 1..=polls {
            self.check_cancelled()?;
            attempt.record_attempt();

            match self.call(self.keyring.list()).await {
                Ok(snapshot) if snapshot.is_propagated(key) => {
                    info!(
                        poll,
                        members = snapshot.total_members(),
                        "New gossip key reported by every member"
                    );
                    return Ok(snapshot);
                }
                Ok(snapshot) => {
                    let counts = (snapshot.member_count(key), snapshot.total_members());
                    debug!(
                        poll,
                        max_polls = polls,
                        member_count = counts.0,
                        total_members = counts.1,
                        "New gossip key not yet propagated"
                    );
                    last_seen = Some(counts);
                }
                Err(e) if e.is_transient() => {
                    warn!(poll, max_polls = polls, error = %e, "Keyring list failed while awaiting propagation");
                    last_error = Some(e);
                }
                Err(e) => {
                    return Err(FailureReason::Rejected {
                        operation: "list",
                        error: e,
                    }
                    .into());
                }
            }

            if poll < polls {
                self.pause(policy.delay()).await?;
            }
        }

        let reason = match (last_seen, last_error) {
            (Some((member_count, total_members)), _) => FailureReason::PropagationTimeout {
                polls,
                member_count,
                total_members,
            },
            (None, Some(last_error)) => FailureReason::Exhausted {
                operation: "list",
                attempts: polls,
                last_error,
            },
            (None, None) => FailureReason::PropagationTimeout {
                polls,
                member_count: 0,
                total_members: 0,
            },
        };
        Err(reason.into())
    }

    /// Remove every key other than `key`, each with its own retry budget
    async fn retire(
        &self,
        attempt: &mut RotationAttempt,
        key: &str,
        confirmed: KeyringSnapshot,
    ) -> Result<Vec<Fingerprint>, StepError> {
        let (snapshot, fresh) = match self.call(self.keyring.list()).await {
            Ok(snapshot) => (snapshot, true),
            Err(e) => {
                warn!(error = %e, "Unable to refresh keyring before retiring, using propagation snapshot");
                (confirmed, false)
            }
        };

        // The propagation snapshot predates the promotion, its primary flags are stale
        let primaries = if fresh {
            snapshot.primary_keys()
        } else {
            BTreeSet::new()
        };
        let mut remaining = Vec::new();

        for stale in snapshot.keys_except(key) {
            let stale_fingerprint = Fingerprint::of(&stale);
            if primaries.contains(stale.as_str()) {
                warn!(
                    stale = %stale_fingerprint,
                    "Stale key is still primary on some members, leaving it installed"
                );
                remaining.push(stale_fingerprint);
                continue;
            }

            match self
                .retry(attempt, &self.policies.remove, "remove", || {
                    self.keyring.remove(&stale)
                })
                .await
            {
                Ok(()) => info!(stale = %stale_fingerprint, "Removed stale gossip key"),
                Err(StepError::Cancelled) => return Err(StepError::Cancelled),
                Err(StepError::Failed(reason)) => {
                    error!(
                        stale = %stale_fingerprint,
                        error = %reason,
                        "Unable to remove stale gossip key, leaving it installed as non-primary"
                    );
                    remaining.push(stale_fingerprint);
                }
            }
        }

        Ok(remaining)
    }

    /// Run `op` under `policy`, retrying transient errors only
    async fn retry<T, F, Fut>(
        &self,
        attempt: &mut RotationAttempt,
        policy: &RetryPolicy,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, KeyringError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut tries = 0;

        loop {
            self.check_cancelled()?;
            tries += 1;
            attempt.record_attempt();

            match self.call(op()).await {
                Ok(value) => {
                    if tries > 1 {
                        info!(operation, attempts = tries, "Keyring call succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    return Err(FailureReason::Rejected {
                        operation,
                        error: e,
                    }
                    .into());
                }
                Err(e) if tries >= max_attempts => {
                    return Err(FailureReason::Exhausted {
                        operation,
                        attempts: tries,
                        last_error: e,
                    }
                    .into());
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts,
                        error = %e,
                        "Keyring call failed, retrying"
                    );
                }
            }

            self.pause(policy.delay()).await?;
        }
    }

    async fn ensure_leadership(&self, next: RotationState) -> Result<(), StepError> {
        self.check_cancelled()?;
        if self.gate.is_authorized().await {
            Ok(())
        } else {
            warn!(next = %next, "Lost cluster leadership mid-rotation");
            Err(FailureReason::LeadershipLost(next).into())
        }
    }

    /// Bound a single keyring call by the RPC timeout
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, KeyringError>>,
    ) -> Result<T, KeyringError> {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(KeyringError::Timeout(self.rpc_timeout)),
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), StepError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(StepError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self) -> Result<(), StepError> {
        if self.cancel.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }
}
