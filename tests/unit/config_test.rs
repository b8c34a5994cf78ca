//! Tests for configuration validation

use mine_reset::config::{BusyTriggerPolicy, EngineConfig, RegionConfig, ResetConfig, SchedulerConfig};
use mine_reset::core::{BlockPos, Bounds, Composition, ResetError, TriggerPolicy};
use std::collections::HashMap;
use std::time::Duration;

fn region(name: &str) -> RegionConfig {
    RegionConfig {
        name: name.to_string(),
        bounds: Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(3, 3, 3)),
        composition: Composition::default().with("stone", 3).with("coal", 1),
        trigger: TriggerPolicy::Manual,
        cooldown_ms: None,
    }
}

const SAMPLE: &str = r#"{
    "scheduler": { "foreground_budget": 32, "background_workers": 2 },
    "reset": { "apply_budget": 128, "cooldown_ms": 5000, "busy_trigger": "queue" },
    "regions": [
        {
            "name": "north",
            "bounds": { "min": { "x": 0, "y": 10, "z": 0 }, "max": { "x": 15, "y": 40, "z": 15 } },
            "composition": [
                { "block": "stone", "weight": 80 },
                { "block": "iron_ore", "weight": 20 }
            ],
            "trigger": { "kind": "threshold", "remaining_percent": 30.0 }
        },
        {
            "name": "south",
            "bounds": { "min": { "x": 100, "y": 10, "z": 0 }, "max": { "x": 115, "y": 20, "z": 15 } },
            "composition": [{ "block": "stone", "weight": 1 }],
            "trigger": { "kind": "interval", "every_secs": 900 },
            "cooldown_ms": 0
        }
    ]
}"#;

#[test]
fn test_scheduler_config_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.foreground_budget, 64);
    assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
}

#[test]
fn test_scheduler_config_invalid_budget() {
    let invalid = SchedulerConfig::new().with_foreground_budget(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_queue_depth() {
    let invalid = SchedulerConfig::new().with_max_queue_depth(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_inline_workers_allowed() {
    let cfg = SchedulerConfig::new()
        .with_background_workers(0)
        .with_thread_stack_size(0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_reset_config_invalid_apply_budget() {
    let invalid = ResetConfig {
        apply_budget: 0,
        ..ResetConfig::default()
    };
    assert!(invalid.validate().is_err());
    assert_eq!(ResetConfig::default().apply_budget, 256);
    assert_eq!(ResetConfig::default().busy_trigger, BusyTriggerPolicy::Drop);
}

#[test]
fn test_region_config_validation() {
    assert!(region("north").validate().is_ok());

    let mut empty_name = region("  ");
    assert!(empty_name.validate().is_err());
    empty_name.name = "ok".into();
    assert!(empty_name.validate().is_ok());

    let mut bad_weights = region("north");
    bad_weights.composition = Composition::default().with("stone", 0);
    assert!(bad_weights.validate().is_err());

    let mut bad_interval = region("north");
    bad_interval.trigger = TriggerPolicy::Interval { every_secs: 0 };
    assert!(bad_interval.validate().is_err());

    let mut bad_threshold = region("north");
    bad_threshold.trigger = TriggerPolicy::Threshold {
        remaining_percent: 140.0,
    };
    assert!(bad_threshold.validate().is_err());
}

#[test]
fn test_region_config_build_uses_cooldown_override() {
    let mut cfg = region("north");
    let built = cfg.build(Duration::from_secs(3)).unwrap();
    assert_eq!(built.name(), "north");
    assert_eq!(built.bounds().volume(), 64);

    cfg.composition = Composition::default();
    assert!(matches!(
        cfg.build(Duration::ZERO),
        Err(ResetError::InvalidConfig(_))
    ));
}

#[test]
fn test_engine_config_rejects_duplicate_regions() {
    let cfg = EngineConfig {
        regions: vec![region("north"), region("north")],
        ..EngineConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("duplicate region"));
}

#[test]
fn test_engine_config_from_json() {
    let cfg = EngineConfig::from_json_str(SAMPLE).unwrap();
    assert_eq!(cfg.scheduler.foreground_budget, 32);
    assert_eq!(cfg.scheduler.background_workers, 2);
    assert_eq!(cfg.scheduler.max_queue_depth, 4096);
    assert_eq!(cfg.reset.apply_budget, 128);
    assert_eq!(cfg.reset.cooldown(), Duration::from_secs(5));
    assert_eq!(cfg.reset.busy_trigger, BusyTriggerPolicy::Queue);
    assert_eq!(cfg.regions.len(), 2);
    assert_eq!(
        cfg.regions[0].trigger,
        TriggerPolicy::Threshold {
            remaining_percent: 30.0
        }
    );
    assert_eq!(cfg.regions[1].cooldown_ms, Some(0));
    assert_eq!(cfg.regions[1].composition.total_weight(), 1);
}

#[test]
fn test_engine_config_from_json_rejects_garbage() {
    assert!(EngineConfig::from_json_str("{ not json").unwrap_err().starts_with("parse error"));
    let invalid = SAMPLE.replace("\"apply_budget\": 128", "\"apply_budget\": 0");
    assert!(EngineConfig::from_json_str(&invalid).is_err());
}

#[test]
fn test_engine_config_overrides() {
    let env: HashMap<&str, &str> = [
        ("MINE_RESET_FOREGROUND_BUDGET", "8"),
        ("MINE_RESET_BACKGROUND_WORKERS", "0"),
        ("MINE_RESET_APPLY_BUDGET", " 512 "),
        ("MINE_RESET_PLANNER_SEED", "99"),
    ]
    .into_iter()
    .collect();

    let mut cfg = EngineConfig::default();
    cfg.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
        .unwrap();
    assert_eq!(cfg.scheduler.foreground_budget, 8);
    assert_eq!(cfg.scheduler.background_workers, 0);
    assert_eq!(cfg.reset.apply_budget, 512);
    assert_eq!(cfg.reset.planner_seed, Some(99));
    assert_eq!(cfg.reset.cooldown_ms, 0);
}

#[test]
fn test_engine_config_override_parse_error() {
    let mut cfg = EngineConfig::default();
    let err = cfg
        .apply_overrides(|key| (key == "MINE_RESET_COOLDOWN_MS").then(|| "soon".to_string()))
        .unwrap_err();
    assert!(err.contains("MINE_RESET_COOLDOWN_MS"));
}
