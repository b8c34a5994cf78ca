//! Tests for region state and model serialization

use mine_reset::core::{
    BlockPos, BlockType, Bounds, Composition, Region, ResetError, ResetStatus, TriggerPolicy,
};

fn region() -> Region {
    Region::new(
        "north",
        Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(4, 0, 0)),
        Composition::default().with("stone", 1),
        TriggerPolicy::Manual,
    )
    .unwrap()
}

#[test]
fn test_advance_with_observes_previous_status() {
    let region = region();
    assert!(region.begin_reset());
    let mut seen = None;
    region
        .advance_with(ResetStatus::Sweeping, |from| seen = Some(from))
        .unwrap();
    assert_eq!(seen, Some(ResetStatus::SweepScheduled));

    let mut called = false;
    assert!(region
        .advance_with(ResetStatus::Cooling, |_| called = true)
        .is_err());
    assert!(!called);
}

#[test]
fn test_rollback_only_from_sweep_scheduled() {
    let region = region();
    assert!(matches!(
        region.rollback_begin(),
        Err(ResetError::SequenceViolation { .. })
    ));
    assert!(region.begin_reset());
    region.rollback_begin().unwrap();
    assert_eq!(region.status(), ResetStatus::Idle);
    assert!(region.begin_reset());
}

#[test]
fn test_pending_flag_is_taken_once() {
    let region = region();
    assert!(!region.take_pending());
    region.mark_pending();
    region.mark_pending();
    assert!(region.take_pending());
    assert!(!region.take_pending());
}

#[test]
fn test_status_successors_cycle() {
    let mut status = ResetStatus::Idle;
    let mut seen = vec![status];
    for _ in 0..6 {
        status = status.successor();
        seen.push(status);
    }
    assert_eq!(seen.first(), seen.last());
    assert!(!ResetStatus::Idle.is_active());
    assert!(!ResetStatus::Cooling.is_active());
    assert!(ResetStatus::Applying.is_active());
}

#[test]
fn test_trigger_policy_serde_shape() {
    let json = serde_json::to_string(&TriggerPolicy::Interval { every_secs: 60 }).unwrap();
    assert_eq!(json, r#"{"kind":"interval","every_secs":60}"#);
    let manual: TriggerPolicy = serde_json::from_str(r#"{"kind":"manual"}"#).unwrap();
    assert_eq!(manual, TriggerPolicy::Manual);
}

#[test]
fn test_composition_serde_is_a_plain_list() {
    let comp: Composition =
        serde_json::from_str(r#"[{"block":"stone","weight":3},{"block":"gold_ore","weight":1}]"#)
            .unwrap();
    assert_eq!(comp.total_weight(), 4);
    assert!(comp.contains(&BlockType::from("gold_ore")));
    assert!(!comp.contains(&BlockType::from("dirt")));
}
