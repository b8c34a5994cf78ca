//! Tests for audit sink

use mine_reset::core::{build_reset_event, AuditSink, InMemoryAuditSink, ResetAction, ResetStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let cycle = Uuid::new_v4();

    sink.record(build_reset_event(cycle, "north", ResetAction::Accepted));
    sink.record(build_reset_event(
        cycle,
        "north",
        ResetAction::Transition {
            from: ResetStatus::Idle,
            to: ResetStatus::SweepScheduled,
        },
    ));
    sink.record(build_reset_event(Uuid::nil(), "north", ResetAction::Deferred { queued: false }));

    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].cycle_id, cycle);
    assert_eq!(events[0].action.name(), "accepted");
    assert_eq!(
        sink.transitions("north"),
        vec![(ResetStatus::Idle, ResetStatus::SweepScheduled)]
    );
    assert_eq!(sink.count("north", "deferred"), 1);
    assert_eq!(sink.count("south", "deferred"), 0);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for planned in 1..=3 {
        sink.record(build_reset_event(Uuid::new_v4(), "north", ResetAction::Completed { planned }));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, ResetAction::Completed { planned: 2 }); // First one popped
    assert_eq!(events[1].action, ResetAction::Completed { planned: 3 });
}

#[test]
fn test_build_reset_event() {
    let cycle = Uuid::new_v4();
    let event = build_reset_event(
        cycle,
        "north",
        ResetAction::Failed {
            reason: "planner failure: snapshot has 9 cells, expected 10".to_string(),
        },
    );

    assert_eq!(event.cycle_id, cycle);
    assert_eq!(event.region, "north");
    assert_eq!(event.action.name(), "failed");
    assert_ne!(event.event_id, cycle);
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_shared_sink_records_through_arc() {
    let shared = Arc::new(Mutex::new(InMemoryAuditSink::new(4)));
    let mut writer = Arc::clone(&shared);
    writer.record(build_reset_event(Uuid::new_v4(), "north", ResetAction::Accepted));
    assert_eq!(shared.lock().events().len(), 1);
}
