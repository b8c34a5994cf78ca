//! Infrastructure adapters for world storage.

pub mod world;
pub use world::InMemoryWorld;
