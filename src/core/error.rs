//! Error types for scheduler and reset operations.

use thiserror::Error;

use crate::core::region::{BlockPos, ResetStatus};

/// Errors produced by the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Submission queue is full.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The scheduler has been shut down.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// `tick()` was called from a thread other than the bound foreground thread.
    #[error("tick called off the foreground thread")]
    ForeignThread,
    /// Foreground-only work was attempted without the foreground token.
    #[error("unit `{0}` requires the foreground context")]
    WrongContext(String),
    /// Waiting for the scheduler to drain timed out.
    #[error("timed out waiting for pending units")]
    Timeout,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker or loop thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),
}

/// Errors produced by a reset cycle.
///
/// The first three variants form the reset failure taxonomy; a busy region is
/// not an error and surfaces as [`TriggerOutcome::Deferred`](crate::core::TriggerOutcome).
#[derive(Debug, Error)]
pub enum ResetError {
    /// A single position could not be written; the entry is skipped.
    #[error("write failed at {position}: {reason}")]
    TransientWriteFailure {
        /// Position that failed.
        position: BlockPos,
        /// Collaborator-supplied reason.
        reason: String,
    },
    /// The snapshot or composition was malformed; the cycle is aborted.
    #[error("planner failure: {0}")]
    PlannerFailure(String),
    /// An out-of-order status transition was attempted.
    #[error("status sequence violation: {from:?} -> {to:?}")]
    SequenceViolation {
        /// Status the region was in.
        from: ResetStatus,
        /// Status that was requested.
        to: ResetStatus,
    },
    /// No region with this name is registered.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    /// Region or engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The scheduler refused the work.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Application-facing result using anyhow for unit work closures.
pub type AppResult<T> = Result<T, anyhow::Error>;
