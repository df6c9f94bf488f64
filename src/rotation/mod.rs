//! # Rotation
//!
//! Gossip key rotation state machine and its retry policy.

mod orchestrator;
mod policy;
mod state;

pub use orchestrator::{FailureReason, RotationOrchestrator, RotationOutcome};
pub use policy::RetryPolicy;
pub use state::{RotationAttempt, RotationState};
