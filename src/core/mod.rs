//! Scheduling primitives, region state, and the reset pipeline.

pub mod applier;
pub mod audit;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod region;
pub mod scheduler;
pub mod unit;
pub mod world;

pub use applier::{PassReport, ResetApplier};
pub use audit::{build_reset_event, AuditSink, InMemoryAuditSink, ResetAction, ResetEvent};
pub use error::{AppResult, ResetError, SchedulerError};
pub use orchestrator::{ResetOrchestrator, ResetTicket, TriggerOutcome};
pub use plan::{OccupancySnapshot, PatchEntry, PatchPlan, SweepPlanner};
pub use region::{
    BlockPos, BlockType, Bounds, Composition, CompositionEntry, Region, ResetStatus, TriggerPolicy,
};
pub use scheduler::{Scheduler, SchedulerStats, TickReport};
pub use unit::{
    Chain, ExecutionContext, Foreground, Unit, UnitContext, UnitFailure, UnitHandle, UnitOutcome,
    UnitState,
};
pub use world::{WorldAccess, WorldError};
