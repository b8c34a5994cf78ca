//! In-memory world keyed by block position.

use std::collections::{HashMap, HashSet};

use crate::core::plan::OccupancySnapshot;
use crate::core::region::{BlockPos, BlockType, Bounds};
use crate::core::unit::Foreground;
use crate::core::world::{WorldAccess, WorldError};

/// Sparse block store; absent positions are empty.
#[derive(Debug, Default)]
pub struct InMemoryWorld {
    blocks: HashMap<BlockPos, BlockType>,
    failing: HashSet<BlockPos>,
    writes: u64,
    corrupt_snapshots: bool,
}

impl InMemoryWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`InMemoryWorld::set_block`].
    #[must_use]
    pub fn with_block(mut self, position: BlockPos, block: impl Into<BlockType>) -> Self {
        self.set_block(position, block);
        self
    }

    /// Place a block directly, bypassing write accounting.
    pub fn set_block(&mut self, position: BlockPos, block: impl Into<BlockType>) {
        self.blocks.insert(position, block.into());
    }

    /// Empty a position, as a player mining it would. Returns what was there.
    pub fn break_block(&mut self, position: BlockPos) -> Option<BlockType> {
        self.blocks.remove(&position)
    }

    /// Content at `position`.
    #[must_use]
    pub fn block_at(&self, position: BlockPos) -> Option<&BlockType> {
        self.blocks.get(&position)
    }

    /// Number of positions inside `bounds` holding `block`.
    #[must_use]
    pub fn count_in(&self, bounds: &Bounds, block: &BlockType) -> usize {
        bounds
            .positions()
            .filter(|p| self.blocks.get(p) == Some(block))
            .count()
    }

    /// Number of non-empty positions inside `bounds`.
    #[must_use]
    pub fn filled_in(&self, bounds: &Bounds) -> usize {
        bounds
            .positions()
            .filter(|p| self.blocks.contains_key(p))
            .count()
    }

    /// Make every write to `position` fail until cleared.
    pub fn fail_writes_at(&mut self, position: BlockPos) {
        self.failing.insert(position);
    }

    /// Let writes to every position succeed again.
    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Return snapshots that are one cell short of the requested bounds.
    pub fn corrupt_snapshots(&mut self, corrupt: bool) {
        self.corrupt_snapshots = corrupt;
    }

    /// Successful writes so far.
    #[must_use]
    pub const fn write_count(&self) -> u64 {
        self.writes
    }
}

impl WorldAccess for InMemoryWorld {
    fn read_occupancy(&self, _fg: &Foreground, bounds: &Bounds) -> Result<OccupancySnapshot, WorldError> {
        let mut cells: Vec<_> = bounds
            .positions()
            .map(|p| self.blocks.get(&p).cloned())
            .collect();
        if self.corrupt_snapshots {
            cells.pop();
        }
        Ok(OccupancySnapshot::new(*bounds, cells))
    }

    fn write_unit(&mut self, _fg: &Foreground, position: BlockPos, block: &BlockType) -> Result<(), WorldError> {
        if self.failing.contains(&position) {
            return Err(WorldError::Unavailable {
                position,
                reason: "position locked".into(),
            });
        }
        self.blocks.insert(position, block.clone());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reports_empty_and_filled_cells() {
        let bounds = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(2, 0, 0));
        let world = InMemoryWorld::new().with_block(BlockPos::new(1, 0, 0), "stone");
        let snapshot = world.read_occupancy(&Foreground::new(), &bounds).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.filled_count(), 1);
        assert_eq!(snapshot.get(BlockPos::new(1, 0, 0)), Some(&BlockType::from("stone")));
    }

    #[test]
    fn test_corrupt_snapshot_is_short() {
        let bounds = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(2, 0, 0));
        let mut world = InMemoryWorld::new();
        world.corrupt_snapshots(true);
        let snapshot = world.read_occupancy(&Foreground::new(), &bounds).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_failing_write_leaves_cell_untouched() {
        let mut world = InMemoryWorld::new();
        let pos = BlockPos::new(0, 0, 0);
        world.fail_writes_at(pos);
        assert!(world.write_unit(&Foreground::new(), pos, &"ore".into()).is_err());
        assert!(world.block_at(pos).is_none());
        assert_eq!(world.write_count(), 0);
    }
}
