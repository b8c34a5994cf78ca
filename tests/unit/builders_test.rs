//! Tests for builder modules

use mine_reset::builders::{build_engine, EngineBuilder};
use mine_reset::config::{EngineConfig, RegionConfig, ResetConfig};
use mine_reset::core::{BlockPos, Bounds, Composition, Region, ResetError, ResetStatus, TriggerPolicy};
use mine_reset::infra::InMemoryWorld;
use std::time::Duration;

fn region(name: &str, x: i32) -> RegionConfig {
    RegionConfig {
        name: name.to_string(),
        bounds: Bounds::new(BlockPos::new(x, 0, 0), BlockPos::new(x + 3, 0, 0)),
        composition: Composition::default().with("stone", 1),
        trigger: TriggerPolicy::Manual,
        cooldown_ms: Some(250),
    }
}

#[test]
fn test_build_engine_registers_regions() {
    let cfg = EngineConfig {
        regions: vec![region("south", 100), region("north", 0)],
        ..EngineConfig::default()
    };
    let engine = build_engine(&cfg, InMemoryWorld::new()).unwrap();

    let names: Vec<_> = engine.regions().iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["north", "south"]);
    assert_eq!(engine.region("north").unwrap().status(), ResetStatus::Idle);
    assert_eq!(engine.config().apply_budget, 256);
    assert_eq!(
        engine.scheduler().config().background_workers,
        cfg.scheduler.background_workers
    );
    engine.scheduler().shutdown();
}

#[test]
fn test_build_engine_rejects_invalid_config() {
    let cfg = EngineConfig {
        reset: ResetConfig {
            apply_budget: 0,
            ..ResetConfig::default()
        },
        ..EngineConfig::default()
    };
    let err = build_engine(&cfg, InMemoryWorld::new()).err().unwrap();
    assert!(matches!(err, ResetError::InvalidConfig(_)));
}

#[test]
fn test_register_duplicate_region_fails() {
    let cfg = EngineConfig {
        regions: vec![region("north", 0)],
        ..EngineConfig::default()
    };
    let engine = EngineBuilder::new(cfg)
        .with_span(tracing::info_span!("test-engine"))
        .build(InMemoryWorld::new())
        .unwrap();

    let again = Region::new(
        "north",
        Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1)),
        Composition::default().with("stone", 1),
        TriggerPolicy::Manual,
    )
    .unwrap()
    .with_cooldown(Duration::ZERO);
    assert!(matches!(
        engine.register(again),
        Err(ResetError::InvalidConfig(_))
    ));
    assert_eq!(engine.regions().len(), 1);
}
