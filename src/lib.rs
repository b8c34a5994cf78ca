//! # Mine Reset
//!
//! A scheduling engine that periodically restores bounded 3-D regions
//! ("mines") to a target content composition without stalling the host's
//! single foreground thread.
//!
//! ## Core Problem Solved
//!
//! Rebuilding a region means reading and rewriting up to millions of
//! positions, but world content may only be mutated from one foreground
//! thread that also has to stay responsive:
//!
//! - **Two execution contexts**: pure planning runs on background workers,
//!   every world mutation runs on the foreground tick
//! - **Bounded foreground work**: patch plans are applied in budgeted passes,
//!   one pass per unit, so a huge region never monopolises a tick
//! - **One reset per region**: triggers for a busy region are deferred,
//!   never run concurrently
//! - **Ordered continuations**: a caller can chain work that runs only after
//!   the region has been fully rebuilt
//!
//! ## Pipeline
//!
//! ```text
//! trigger ─▶ ResetOrchestrator::begin_reset
//!              │ Idle → SweepScheduled
//!              ▼
//!   [foreground] read occupancy snapshot          → Sweeping
//!   [background] SweepPlanner: snapshot → PatchPlan
//!   [foreground] ResetApplier passes (≤ budget)   → ApplyScheduled → Applying
//!   [foreground] plan applied                     → Cooling, then successor chain
//!   [foreground] cooldown elapsed                 → Idle
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mine_reset::builders::build_engine;
//! use mine_reset::config::EngineConfig;
//! use mine_reset::infra::InMemoryWorld;
//! use mine_reset::runtime::ForegroundLoop;
//!
//! let config = EngineConfig::from_json_str(&std::fs::read_to_string("mines.json")?)?
//!     .with_env_overrides()?;
//! let engine = build_engine(&config, InMemoryWorld::new())?;
//! let ticker = ForegroundLoop::spawn(engine.scheduler().clone(), config.scheduler.tick_interval())?;
//!
//! engine.begin_reset("north-mine")?;
//! ```
//!
//! For complete examples, see:
//! - `tests/reset_cycle_test.rs` - Full reset cycles against an in-memory world
//! - `tests/scheduler_test.rs` - Scheduler ordering, cancellation, and contexts

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling primitives, region state, and the reset pipeline.
pub mod core;
/// Configuration models for the scheduler, reset pipeline, and regions.
pub mod config;
/// Builders to construct the engine from configuration.
pub mod builders;
/// Infrastructure adapters for world storage.
pub mod infra;
/// Runtime drivers: foreground loop and trigger sources.
pub mod runtime;
/// Shared utilities.
pub mod util;
