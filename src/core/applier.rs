//! Budgeted, foreground-only application of a patch plan.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::core::error::ResetError;
use crate::core::plan::{PatchEntry, PatchPlan};
use crate::core::region::Region;
use crate::core::unit::Foreground;
use crate::core::world::WorldAccess;

/// Outcome of one applier pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries written.
    pub applied: usize,
    /// Entries skipped after a transient write failure.
    pub skipped: usize,
    /// Entries left for later passes.
    pub remaining: usize,
}

/// Owns the remaining entries of a plan and applies them in bounded passes.
///
/// Every pass consumes at most `budget` entries from the front of the plan.
/// An entry is consumed whether its write succeeds or fails, so no entry is
/// ever attempted twice.
#[derive(Debug)]
pub struct ResetApplier {
    remaining: VecDeque<PatchEntry>,
    budget: usize,
    passes: u32,
}

impl ResetApplier {
    /// Take ownership of `plan`; `budget` is clamped to at least 1.
    #[must_use]
    pub fn new(plan: PatchPlan, budget: usize) -> Self {
        Self {
            remaining: plan.into_entries().into(),
            budget: budget.max(1),
            passes: 0,
        }
    }

    /// Entries not yet attempted.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Whether every entry has been attempted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Passes run so far.
    #[must_use]
    pub const fn passes(&self) -> u32 {
        self.passes
    }

    /// Apply up to `budget` entries in plan order.
    ///
    /// Write failures are skipped and logged as transient; newly filled
    /// positions are reported to the region's occupancy bookkeeping.
    pub fn apply_pass<W>(&mut self, fg: &Foreground, world: &mut W, region: &Region) -> PassReport
    where
        W: WorldAccess + ?Sized,
    {
        self.passes += 1;
        let mut report = PassReport::default();
        let take = self.budget.min(self.remaining.len());
        for entry in self.remaining.drain(..take) {
            match world.write_unit(fg, entry.position, &entry.block) {
                Ok(()) => {
                    report.applied += 1;
                    if entry.previous.is_none() {
                        region.record_filled(1);
                    }
                }
                Err(e) => {
                    let failure = ResetError::TransientWriteFailure {
                        position: entry.position,
                        reason: e.to_string(),
                    };
                    warn!(region = region.name(), error = %failure, "skipping patch entry");
                    report.skipped += 1;
                }
            }
        }
        report.remaining = self.remaining.len();
        debug!(
            region = region.name(),
            pass = self.passes,
            applied = report.applied,
            skipped = report.skipped,
            remaining = report.remaining,
            "apply pass"
        );
        report
    }
}
