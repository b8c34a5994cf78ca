//! Configuration models for the scheduler, reset pipeline, and regions.

pub mod engine;

pub use engine::{BusyTriggerPolicy, EngineConfig, RegionConfig, ResetConfig, SchedulerConfig};
