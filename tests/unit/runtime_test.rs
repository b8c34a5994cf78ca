//! Tests for the foreground loop and async trigger sources

use mine_reset::builders::build_engine;
use mine_reset::config::{EngineConfig, RegionConfig, ResetConfig, SchedulerConfig};
use mine_reset::core::{BlockPos, Bounds, Composition, ResetOrchestrator, ResetStatus, TriggerPolicy};
use mine_reset::infra::InMemoryWorld;
use mine_reset::runtime::{
    command_channel, drive_triggers, ForegroundLoop, IntervalTrigger, ThresholdTrigger,
    TriggerReason, TriggerSource,
};
use std::thread;
use std::time::Duration;

fn engine(trigger: TriggerPolicy) -> ResetOrchestrator<InMemoryWorld> {
    let cfg = EngineConfig {
        scheduler: SchedulerConfig::new().with_background_workers(1),
        reset: ResetConfig {
            planner_seed: Some(7),
            ..ResetConfig::default()
        },
        regions: vec![RegionConfig {
            name: "north".to_string(),
            bounds: Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(4, 1, 4)),
            composition: Composition::default().with("stone", 9).with("coal", 1),
            trigger,
            cooldown_ms: None,
        }],
    };
    build_engine(&cfg, InMemoryWorld::new()).unwrap()
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..2_000 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_foreground_loop_drives_a_full_reset() {
    let engine = engine(TriggerPolicy::Manual);
    let ticker = ForegroundLoop::spawn(engine.scheduler().clone(), Duration::from_millis(1)).unwrap();
    assert!(ticker.is_running());

    assert!(engine.begin_reset("north").unwrap().is_accepted());
    let bounds = *engine.region("north").unwrap().bounds();
    assert!(wait_until(|| engine.world().lock().filled_in(&bounds) == 50));
    assert!(wait_until(|| engine.scheduler().is_idle()));
    assert_eq!(engine.region("north").unwrap().status(), ResetStatus::Idle);
    assert!(ticker.ticks() > 0);

    ticker.stop();
    engine.scheduler().shutdown();
}

#[test]
fn test_foreground_loop_exits_on_shutdown() {
    let engine = engine(TriggerPolicy::Manual);
    let ticker = ForegroundLoop::spawn(engine.scheduler().clone(), Duration::from_millis(1)).unwrap();
    engine.scheduler().shutdown();
    assert!(wait_until(|| !ticker.is_running()));
    ticker.stop();
}

#[tokio::test]
async fn test_command_trigger_reports_outcomes() {
    let engine = engine(TriggerPolicy::Manual);
    let (sender, mut commands) = command_channel(8);

    sender.instant_reset("north").unwrap();
    sender.manual_reset("north").unwrap();
    sender.manual_reset("nowhere").unwrap();
    drop(sender);

    let report = drive_triggers(&mut commands, &engine).await;
    assert_eq!(report.accepted, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.failed, 1);
    engine.scheduler().shutdown();
}

#[tokio::test]
async fn test_command_sender_full_and_closed() {
    let (sender, commands) = command_channel(1);
    sender.manual_reset("north").unwrap();
    assert!(sender.manual_reset("north").is_err());
    drop(commands);
    assert!(sender.instant_reset("north").is_err());
}

#[tokio::test]
async fn test_threshold_trigger_fires_once_per_depletion() {
    let engine = engine(TriggerPolicy::Threshold {
        remaining_percent: 25.0,
    });
    let mut source = ThresholdTrigger::new(&engine.regions(), Duration::from_millis(2));
    let region = engine.region("north").unwrap();

    let startup = tokio::time::timeout(Duration::from_millis(30), source.next()).await;
    assert!(startup.is_err(), "fired before the fill level was known");

    region.sync_filled(5);
    let trigger = source.next().await.unwrap();
    assert_eq!(trigger.region, "north");
    assert_eq!(trigger.reason, TriggerReason::Depletion);

    let again = tokio::time::timeout(Duration::from_millis(30), source.next()).await;
    assert!(again.is_err(), "threshold re-fired without a refill");

    region.record_filled(50);
    assert!(tokio::time::timeout(Duration::from_millis(30), source.next()).await.is_err());
    region.record_depleted(45);
    let refired = tokio::time::timeout(Duration::from_secs(1), source.next()).await;
    assert_eq!(refired.unwrap().unwrap().region, "north");
    engine.scheduler().shutdown();
}

#[tokio::test]
async fn test_threshold_trigger_ignores_other_policies() {
    let engine = engine(TriggerPolicy::Manual);
    let mut source = ThresholdTrigger::new(&engine.regions(), Duration::from_millis(2));
    assert!(source.next().await.is_none());
    engine.scheduler().shutdown();
}

#[tokio::test]
async fn test_interval_trigger_fires_after_period() {
    let mut source = IntervalTrigger::new().with_region("north", Duration::from_millis(10));
    assert_eq!(source.len(), 1);
    let trigger = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trigger.region, "north");
    assert_eq!(trigger.reason, TriggerReason::Interval);

    assert!(IntervalTrigger::new().next().await.is_none());
}

#[tokio::test]
async fn test_interval_trigger_from_region_policies() {
    let engine = engine(TriggerPolicy::Interval { every_secs: 600 });
    let source = IntervalTrigger::from_regions(&engine.regions());
    assert_eq!(source.len(), 1);
    assert!(!source.is_empty());
    engine.scheduler().shutdown();
}
