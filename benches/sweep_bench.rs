//! Benchmarks for the reset pipeline.
//!
//! Benchmarks cover:
//! - Sweep planning over empty and partially mined snapshots
//! - Full reset cycles (plan + budgeted apply) against the in-memory world
//! - Scheduler tick overhead

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use mine_reset::builders::build_engine;
use mine_reset::config::{EngineConfig, RegionConfig, ResetConfig, SchedulerConfig};
use mine_reset::core::{
    BlockPos, BlockType, Bounds, Composition, OccupancySnapshot, Scheduler, SweepPlanner,
    TriggerPolicy, Unit, UnitOutcome,
};
use mine_reset::infra::InMemoryWorld;

// ============================================================================
// Fixtures
// ============================================================================

fn cube(side: i32) -> Bounds {
    Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(side - 1, side - 1, side - 1))
}

fn composition() -> Composition {
    Composition::default()
        .with("stone", 70)
        .with("coal_ore", 15)
        .with("iron_ore", 10)
        .with("gold_ore", 4)
        .with("diamond_ore", 1)
}

fn engine_config(side: i32, apply_budget: usize) -> EngineConfig {
    EngineConfig {
        scheduler: SchedulerConfig::new()
            .with_background_workers(0)
            .with_foreground_budget(64),
        reset: ResetConfig {
            apply_budget,
            planner_seed: Some(1),
            ..ResetConfig::default()
        },
        regions: vec![RegionConfig {
            name: "bench".into(),
            bounds: cube(side),
            composition: composition(),
            trigger: TriggerPolicy::Manual,
            cooldown_ms: None,
        }],
    }
}

// ============================================================================
// Planner
// ============================================================================

fn bench_planner(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_planner");
    let comp = composition();

    for side in [16, 32, 64] {
        let bounds = cube(side);
        let cells = bounds.volume() as u64;
        group.throughput(Throughput::Elements(cells));

        let empty = OccupancySnapshot::capture(bounds, |_| None);
        group.bench_with_input(BenchmarkId::new("empty", side), &empty, |b, snapshot| {
            let planner = SweepPlanner::new(&bounds, &comp);
            b.iter(|| black_box(planner.plan(snapshot, 42).unwrap()));
        });

        // Every third cell mined, the rest still stone.
        let stone = BlockType::from("stone");
        let mined = OccupancySnapshot::capture(bounds, |p| {
            ((p.x + p.y + p.z) % 3 != 0).then(|| stone.clone())
        });
        group.bench_with_input(BenchmarkId::new("one_third_mined", side), &mined, |b, snapshot| {
            let planner = SweepPlanner::new(&bounds, &comp);
            b.iter(|| black_box(planner.plan(snapshot, 42).unwrap()));
        });
    }
    group.finish();
}

// ============================================================================
// Full cycle
// ============================================================================

fn bench_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reset_cycle");
    group.sample_size(20);
    let side = 32;
    group.throughput(Throughput::Elements(cube(side).volume() as u64));

    for budget in [256, 4096] {
        group.bench_with_input(BenchmarkId::new("apply_budget", budget), &budget, |b, &budget| {
            b.iter_batched(
                || build_engine(&engine_config(side, budget), InMemoryWorld::new()).unwrap(),
                |engine| {
                    engine.begin_reset("bench").unwrap();
                    let ticks = engine.scheduler().run_until_idle(Duration::from_secs(60)).unwrap();
                    engine.scheduler().shutdown();
                    black_box(ticks)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ============================================================================
// Scheduler
// ============================================================================

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_tick");
    for units in [1_usize, 64] {
        group.throughput(Throughput::Elements(units as u64));
        group.bench_with_input(BenchmarkId::new("foreground_units", units), &units, |b, &units| {
            let scheduler = Scheduler::new(
                SchedulerConfig::new()
                    .with_background_workers(0)
                    .with_foreground_budget(units),
            )
            .unwrap();
            b.iter(|| {
                for i in 0..units {
                    scheduler
                        .submit(Unit::foreground(format!("u{i}"), |_| Ok(UnitOutcome::Done)))
                        .unwrap();
                }
                black_box(scheduler.tick().unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_planner, bench_full_cycle, bench_tick);
criterion_main!(benches);
