//! Resettable region (mine) state: bounds, target composition, lifecycle status.
//!
//! The status field is the only mutual-exclusion primitive for a region. It is
//! read-modify-written under a `parking_lot::Mutex` so two triggers racing on
//! [`Region::begin_reset`] can never both win.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::error::ResetError;

/// Block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Inclusive 3-D bounds of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lowest corner (inclusive).
    pub min: BlockPos,
    /// Highest corner (inclusive).
    pub max: BlockPos,
}

impl Bounds {
    /// Create bounds from two corners in any order.
    #[must_use]
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Validate that `min <= max` on every axis and the volume fits in `usize`.
    pub fn validate(&self) -> Result<(), String> {
        if self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z {
            return Err(format!("bounds min {} exceeds max {}", self.min, self.max));
        }
        if self.checked_volume().is_none() {
            return Err(format!("bounds {} to {} hold too many positions", self.min, self.max));
        }
        Ok(())
    }

    fn extent(&self) -> (u64, u64, u64) {
        let span = |lo: i32, hi: i32| u64::try_from(i64::from(hi) - i64::from(lo) + 1).unwrap_or(0);
        (
            span(self.min.x, self.max.x),
            span(self.min.y, self.max.y),
            span(self.min.z, self.max.z),
        )
    }

    fn checked_volume(&self) -> Option<usize> {
        let (dx, dy, dz) = self.extent();
        let volume = dx.checked_mul(dy)?.checked_mul(dz)?;
        usize::try_from(volume).ok()
    }

    /// Number of positions inside the bounds (saturating for bounds that fail [`Bounds::validate`]).
    #[must_use]
    pub fn volume(&self) -> usize {
        self.checked_volume().unwrap_or(usize::MAX)
    }

    /// Whether `pos` lies inside the bounds.
    #[must_use]
    pub const fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Index of `pos` in scan order, if inside the bounds.
    #[must_use]
    pub fn index_of(&self, pos: BlockPos) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        let (dx, _, dz) = self.extent();
        let offset = |p: i32, lo: i32| u64::try_from(i64::from(p) - i64::from(lo)).ok();
        let x = offset(pos.x, self.min.x)?;
        let y = offset(pos.y, self.min.y)?;
        let z = offset(pos.z, self.min.z)?;
        let index = y.checked_mul(dz)?.checked_add(z)?.checked_mul(dx)?.checked_add(x)?;
        usize::try_from(index).ok()
    }

    /// All positions in scan order: y, then z, then x innermost.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| {
            (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| BlockPos::new(x, y, z)))
        })
    }
}

/// Identity of a block/replacement unit, e.g. `"stone"` or `"customitems:ruby_ore"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockType(String);

impl BlockType {
    /// Create a block type from its identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockType {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One weighted entry of a target composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionEntry {
    /// Replacement block.
    pub block: BlockType,
    /// Relative weight.
    pub weight: u32,
}

/// Ordered weighted list of replacement blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition {
    entries: Vec<CompositionEntry>,
}

impl Composition {
    /// Create a composition from entries, preserving order.
    #[must_use]
    pub const fn new(entries: Vec<CompositionEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry.
    #[must_use]
    pub fn with(mut self, block: impl Into<BlockType>, weight: u32) -> Self {
        self.entries.push(CompositionEntry {
            block: block.into(),
            weight,
        });
        self
    }

    /// Entries in list order.
    #[must_use]
    pub fn entries(&self) -> &[CompositionEntry] {
        &self.entries
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.weight)).sum()
    }

    /// Whether `block` is one of the target blocks.
    #[must_use]
    pub fn contains(&self, block: &BlockType) -> bool {
        self.entries.iter().any(|e| e.weight > 0 && &e.block == block)
    }

    /// Pick the entry owning `roll` in `0..total_weight()`.
    ///
    /// Entries are scanned in list order, so equal weights resolve by position.
    #[must_use]
    pub fn pick(&self, roll: u64) -> Option<&BlockType> {
        let mut acc = 0u64;
        for entry in &self.entries {
            acc += u64::from(entry.weight);
            if roll < acc {
                return Some(&entry.block);
            }
        }
        None
    }

    /// Reject empty compositions and a zero total weight.
    pub fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("composition has no entries".into());
        }
        if self.total_weight() == 0 {
            return Err("composition weights sum to zero".into());
        }
        Ok(())
    }
}

/// What causes a region to reset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Reset on a fixed period.
    Interval {
        /// Seconds between resets.
        every_secs: u64,
    },
    /// Reset once the remaining fraction of filled positions drops to a threshold.
    Threshold {
        /// Remaining percentage (0-100) at or below which a reset fires.
        remaining_percent: f64,
    },
    /// Reset only on command or item activation.
    #[default]
    Manual,
}

/// Lifecycle status of a region's reset pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetStatus {
    /// No reset in progress.
    Idle,
    /// Accepted; snapshot and sweep not started yet.
    SweepScheduled,
    /// Snapshot taken; planner running.
    Sweeping,
    /// Plan ready; applier queued.
    ApplyScheduled,
    /// Applier passes in progress.
    Applying,
    /// Finished or aborted; waiting for cooldown.
    Cooling,
}

impl ResetStatus {
    /// The only status this one may advance to.
    #[must_use]
    pub const fn successor(self) -> Self {
        match self {
            Self::Idle => Self::SweepScheduled,
            Self::SweepScheduled => Self::Sweeping,
            Self::Sweeping => Self::ApplyScheduled,
            Self::ApplyScheduled => Self::Applying,
            Self::Applying => Self::Cooling,
            Self::Cooling => Self::Idle,
        }
    }

    /// Whether a reset pipeline is running (anything but `Idle` and `Cooling`).
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Cooling)
    }
}

#[derive(Debug)]
struct StatusCell {
    status: ResetStatus,
    cooling_since: Option<Instant>,
    pending: bool,
}

/// Authoritative state of one resettable region.
#[derive(Debug)]
pub struct Region {
    name: String,
    bounds: Bounds,
    composition: Composition,
    trigger: TriggerPolicy,
    cooldown: Duration,
    state: Mutex<StatusCell>,
    filled: AtomicU64,
    filled_known: AtomicBool,
}

impl Region {
    /// Create a region after validating bounds and composition.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::InvalidConfig` for inverted bounds or an unusable composition.
    pub fn new(
        name: impl Into<String>,
        bounds: Bounds,
        composition: Composition,
        trigger: TriggerPolicy,
    ) -> Result<Self, ResetError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ResetError::InvalidConfig("region name is empty".into()));
        }
        bounds
            .validate()
            .and_then(|()| composition.validate())
            .map_err(|e| ResetError::InvalidConfig(format!("region `{name}`: {e}")))?;
        Ok(Self {
            name,
            bounds,
            composition,
            trigger,
            cooldown: Duration::ZERO,
            state: Mutex::new(StatusCell {
                status: ResetStatus::Idle,
                cooling_since: None,
                pending: false,
            }),
            filled: AtomicU64::new(0),
            filled_known: AtomicBool::new(false),
        })
    }

    /// Set how long the region stays `Cooling` after a cycle.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region bounds.
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Target composition.
    #[must_use]
    pub const fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Trigger policy.
    #[must_use]
    pub const fn trigger(&self) -> &TriggerPolicy {
        &self.trigger
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ResetStatus {
        self.state.lock().status
    }

    /// Atomically move `Idle -> SweepScheduled`.
    ///
    /// Returns `false` and leaves the status untouched if the region was busy.
    pub fn begin_reset(&self) -> bool {
        let mut cell = self.state.lock();
        if cell.status != ResetStatus::Idle {
            return false;
        }
        cell.status = ResetStatus::SweepScheduled;
        true
    }

    /// Like [`Region::begin_reset`]; a rejected trigger sets the pending flag
    /// in the same step when `queue` is true.
    pub fn begin_reset_or_mark_pending(&self, queue: bool) -> bool {
        let mut cell = self.state.lock();
        if cell.status == ResetStatus::Idle {
            cell.status = ResetStatus::SweepScheduled;
            return true;
        }
        cell.pending |= queue;
        false
    }

    /// Advance along the fixed status sequence.
    ///
    /// `Cooling -> Idle` is only in sequence once the cooldown has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::SequenceViolation` for any out-of-order transition.
    pub fn advance(&self, to: ResetStatus) -> Result<(), ResetError> {
        self.advance_with(to, |_| {})
    }

    /// Like [`Region::advance`], calling `observe(from)` before the status lock is released.
    ///
    /// # Errors
    ///
    /// Same as [`Region::advance`]; `observe` is not called on error.
    pub fn advance_with<F>(&self, to: ResetStatus, observe: F) -> Result<(), ResetError>
    where
        F: FnOnce(ResetStatus),
    {
        let mut cell = self.state.lock();
        let from = cell.status;
        let early_idle = to == ResetStatus::Idle && !Self::elapsed(&cell, self.cooldown);
        if from.successor() != to || early_idle {
            return Err(ResetError::SequenceViolation { from, to });
        }
        cell.status = to;
        cell.cooling_since = (to == ResetStatus::Cooling).then(Instant::now);
        observe(from);
        Ok(())
    }

    /// Move `Cooling -> Idle` and, if a trigger is pending, straight on to
    /// `SweepScheduled`, all under one lock.
    ///
    /// `observe(from, to)` is called for each transition made. Returns whether
    /// a pending trigger was claimed.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::SequenceViolation` unless the region is `Cooling`
    /// with its cooldown elapsed.
    pub fn finish_cooldown<F>(&self, mut observe: F) -> Result<bool, ResetError>
    where
        F: FnMut(ResetStatus, ResetStatus),
    {
        let mut cell = self.state.lock();
        if cell.status != ResetStatus::Cooling || !Self::elapsed(&cell, self.cooldown) {
            return Err(ResetError::SequenceViolation {
                from: cell.status,
                to: ResetStatus::Idle,
            });
        }
        cell.status = ResetStatus::Idle;
        cell.cooling_since = None;
        observe(ResetStatus::Cooling, ResetStatus::Idle);
        if !cell.pending {
            return Ok(false);
        }
        cell.pending = false;
        cell.status = ResetStatus::SweepScheduled;
        observe(ResetStatus::Idle, ResetStatus::SweepScheduled);
        Ok(true)
    }

    /// Whether the cooldown since entering `Cooling` has passed.
    #[must_use]
    pub fn cooldown_elapsed(&self) -> bool {
        let cell = self.state.lock();
        cell.status == ResetStatus::Cooling && Self::elapsed(&cell, self.cooldown)
    }

    fn elapsed(cell: &StatusCell, cooldown: Duration) -> bool {
        cell.cooling_since.is_some_and(|since| since.elapsed() >= cooldown)
    }

    /// Abort an active pipeline straight to `Cooling`.
    ///
    /// Returns the status the region was in. `Idle` and `Cooling` are left as is.
    pub fn abort(&self) -> ResetStatus {
        let mut cell = self.state.lock();
        let from = cell.status;
        if from.is_active() {
            cell.status = ResetStatus::Cooling;
            cell.cooling_since = Some(Instant::now());
        }
        from
    }

    /// Undo a `begin_reset` whose work could not be scheduled.
    ///
    /// Triggers queued behind the rejected one are dropped with it.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::SequenceViolation` unless the region is `SweepScheduled`.
    pub fn rollback_begin(&self) -> Result<(), ResetError> {
        let mut cell = self.state.lock();
        if cell.status != ResetStatus::SweepScheduled {
            return Err(ResetError::SequenceViolation {
                from: cell.status,
                to: ResetStatus::Idle,
            });
        }
        cell.status = ResetStatus::Idle;
        cell.pending = false;
        Ok(())
    }

    /// Remember a trigger that arrived while busy.
    pub fn mark_pending(&self) {
        self.state.lock().pending = true;
    }

    /// Take and clear the pending-trigger flag.
    pub fn take_pending(&self) -> bool {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Overwrite the filled-position count (from a fresh snapshot).
    pub fn sync_filled(&self, filled: u64) {
        self.filled.store(filled, Ordering::Release);
        self.filled_known.store(true, Ordering::Release);
    }

    /// Record positions filled by the applier.
    pub fn record_filled(&self, count: u64) {
        self.filled.fetch_add(count, Ordering::AcqRel);
        self.filled_known.store(true, Ordering::Release);
    }

    /// Record positions emptied by consumers (players breaking blocks).
    pub fn record_depleted(&self, count: u64) {
        let _ = self
            .filled
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| Some(f.saturating_sub(count)));
    }

    /// Filled positions as last known; `0` before the first snapshot.
    #[must_use]
    pub fn filled(&self) -> u64 {
        self.filled.load(Ordering::Acquire)
    }

    /// Whether a snapshot or applier pass has reported the fill level yet.
    #[must_use]
    pub fn filled_known(&self) -> bool {
        self.filled_known.load(Ordering::Acquire)
    }

    /// Fraction of positions currently filled, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn remaining_ratio(&self) -> f64 {
        let volume = self.bounds.volume();
        if volume == 0 {
            return 0.0;
        }
        (self.filled() as f64 / volume as f64).min(1.0)
    }

    /// Whether a threshold policy says the region is depleted enough to reset.
    ///
    /// Always `false` until the fill level is known.
    #[must_use]
    pub fn depletion_due(&self) -> bool {
        match self.trigger {
            TriggerPolicy::Threshold { remaining_percent } if self.filled_known() => {
                self.remaining_ratio() * 100.0 <= remaining_percent
            }
            _ => false,
        }
    }
}
