//! Tests for error types

use mine_reset::core::{BlockPos, ResetError, ResetStatus, SchedulerError, WorldError};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("4096 units pending".to_string());
    assert_eq!(format!("{}", err), "queue full: 4096 units pending");
}

#[test]
fn test_wrong_context_error() {
    let err = SchedulerError::WrongContext("north:apply".to_string());
    assert_eq!(
        format!("{}", err),
        "unit `north:apply` requires the foreground context"
    );
}

#[test]
fn test_transient_write_failure_error() {
    let err = ResetError::TransientWriteFailure {
        position: BlockPos::new(1, -2, 3),
        reason: "chunk unloaded".to_string(),
    };
    assert_eq!(format!("{}", err), "write failed at (1, -2, 3): chunk unloaded");
}

#[test]
fn test_sequence_violation_error() {
    let err = ResetError::SequenceViolation {
        from: ResetStatus::Idle,
        to: ResetStatus::Applying,
    };
    assert_eq!(
        format!("{}", err),
        "status sequence violation: Idle -> Applying"
    );
}

#[test]
fn test_scheduler_error_is_wrapped_transparently() {
    let err: ResetError = SchedulerError::Shutdown.into();
    assert!(matches!(err, ResetError::Scheduler(SchedulerError::Shutdown)));
    assert_eq!(format!("{}", err), "scheduler has been shut down");
}

#[test]
fn test_world_error() {
    let err = WorldError::Unavailable {
        position: BlockPos::new(0, 0, 0),
        reason: "locked".to_string(),
    };
    assert_eq!(format!("{}", err), "position (0, 0, 0) unavailable: locked");
}
