//! Occupancy snapshots, patch plans, and the sweep planner.
//!
//! Planning is pure: it reads an immutable [`OccupancySnapshot`] and produces
//! an immutable [`PatchPlan`], so it can run on any background worker.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::core::error::ResetError;
use crate::core::region::{BlockPos, BlockType, Bounds, Composition};

/// Immutable point-in-time read of every position in a region, in scan order.
#[derive(Debug, Clone)]
pub struct OccupancySnapshot {
    bounds: Bounds,
    cells: Arc<[Option<BlockType>]>,
}

impl OccupancySnapshot {
    /// Wrap cells already laid out in the bounds' scan order.
    #[must_use]
    pub fn new(bounds: Bounds, cells: Vec<Option<BlockType>>) -> Self {
        Self {
            bounds,
            cells: cells.into(),
        }
    }

    /// Read each position in scan order through `read`.
    pub fn capture<F>(bounds: Bounds, read: F) -> Self
    where
        F: FnMut(BlockPos) -> Option<BlockType>,
    {
        let cells: Vec<_> = bounds.positions().map(read).collect();
        Self::new(bounds, cells)
    }

    /// Bounds the snapshot was taken over.
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the snapshot has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Content at `pos`, if inside the bounds and non-empty.
    #[must_use]
    pub fn get(&self, pos: BlockPos) -> Option<&BlockType> {
        self.bounds
            .index_of(pos)
            .and_then(|i| self.cells.get(i))
            .and_then(Option::as_ref)
    }

    /// Positions paired with their content, in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockPos, Option<&BlockType>)> {
        self.bounds
            .positions()
            .zip(self.cells.iter().map(Option::as_ref))
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// One action of a patch plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    /// Position to set.
    pub position: BlockPos,
    /// Replacement block.
    pub block: BlockType,
    /// Content seen in the snapshot (`None` for empty).
    pub previous: Option<BlockType>,
}

/// Ordered, immutable list of actions that restore a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    entries: Vec<PatchEntry>,
    seed: u64,
}

impl PatchPlan {
    /// Entries in application order.
    #[must_use]
    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seed the plan was drawn with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn into_entries(self) -> Vec<PatchEntry> {
        self.entries
    }
}

/// Computes the minimal patch plan for a region from a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SweepPlanner<'a> {
    bounds: &'a Bounds,
    composition: &'a Composition,
}

impl<'a> SweepPlanner<'a> {
    /// Planner for a region's bounds and target composition.
    #[must_use]
    pub const fn new(bounds: &'a Bounds, composition: &'a Composition) -> Self {
        Self {
            bounds,
            composition,
        }
    }

    /// Plan replacements for every empty or foreign position.
    ///
    /// Positions already holding a target block are left out. Each planned
    /// position draws its block from the composition with a `StdRng` seeded by
    /// `seed`, in scan order, so the same snapshot and seed always yield the
    /// same plan.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::PlannerFailure` when the composition is unusable or
    /// the snapshot does not cover exactly the region's bounds.
    pub fn plan(&self, snapshot: &OccupancySnapshot, seed: u64) -> Result<PatchPlan, ResetError> {
        self.composition
            .validate()
            .map_err(ResetError::PlannerFailure)?;
        if snapshot.bounds() != self.bounds {
            return Err(ResetError::PlannerFailure(format!(
                "snapshot bounds {}..{} do not match region bounds {}..{}",
                snapshot.bounds().min,
                snapshot.bounds().max,
                self.bounds.min,
                self.bounds.max
            )));
        }
        if snapshot.len() != self.bounds.volume() {
            return Err(ResetError::PlannerFailure(format!(
                "snapshot holds {} cells, bounds cover {}",
                snapshot.len(),
                self.bounds.volume()
            )));
        }

        let total = self.composition.total_weight();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut entries = Vec::new();
        for (position, current) in snapshot.iter() {
            if current.is_some_and(|block| self.composition.contains(block)) {
                continue;
            }
            let roll = rng.random_range(0..total);
            let block = self
                .composition
                .pick(roll)
                .ok_or_else(|| ResetError::PlannerFailure(format!("roll {roll} outside weights")))?
                .clone();
            entries.push(PatchEntry {
                position,
                block,
                previous: current.cloned(),
            });
        }

        debug!(
            cells = snapshot.len(),
            planned = entries.len(),
            seed,
            "sweep planned"
        );
        Ok(PatchPlan { entries, seed })
    }
}
