//! Block/world read-write collaborator.
//!
//! The engine never touches world storage directly. Implementations wrap the
//! host's block API (and any custom block registries behind it). Both calls
//! demand a [`Foreground`] token, so they can only be made from units running
//! on the foreground context.

use thiserror::Error;

use crate::core::plan::OccupancySnapshot;
use crate::core::region::{BlockPos, BlockType, Bounds};
use crate::core::unit::Foreground;

/// Failures reported by a world provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// The position could not be read or written right now.
    #[error("position {position} unavailable: {reason}")]
    Unavailable {
        /// Affected position.
        position: BlockPos,
        /// Provider-supplied reason.
        reason: String,
    },
    /// The region could not be read at all.
    #[error("occupancy read failed: {0}")]
    ReadFailed(String),
}

/// Foreground-only access to world blocks.
pub trait WorldAccess: Send + 'static {
    /// Read every position inside `bounds`, in scan order.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::ReadFailed` if the area cannot be read.
    fn read_occupancy(&self, fg: &Foreground, bounds: &Bounds) -> Result<OccupancySnapshot, WorldError>;

    /// Set one position to `block`. Either fully applied or not at all.
    ///
    /// # Errors
    ///
    /// Returns `WorldError::Unavailable` if the position cannot be written.
    fn write_unit(&mut self, fg: &Foreground, position: BlockPos, block: &BlockType) -> Result<(), WorldError>;
}
