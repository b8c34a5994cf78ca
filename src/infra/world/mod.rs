//! World providers.
//!
//! A host integration implements [`WorldAccess`](crate::core::WorldAccess)
//! over its own block storage. The in-memory provider here backs tests,
//! benchmarks, and headless runs.

pub mod memory;
pub use memory::InMemoryWorld;
