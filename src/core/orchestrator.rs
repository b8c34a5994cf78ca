//! Reset orchestrator: drives one region through a full reset cycle.
//!
//! ```text
//! begin_reset ── Idle → SweepScheduled
//!   [foreground] snapshot        → Sweeping
//!   [background] sweep planner
//!   [foreground] stage apply     → ApplyScheduled
//!   [foreground] apply pass × n  → Applying   (each pass is its own unit)
//!                complete        → Cooling, then the caller's successor chain
//!   [foreground] cooldown        → Idle       (re-checked every tick)
//! ```
//!
//! Every status write after `begin_reset` happens in a foreground unit. Any
//! failure moves the region straight to `Cooling` and drops the caller's
//! successor chain, so the region always becomes eligible again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn, Span};
use uuid::Uuid;

use crate::config::{BusyTriggerPolicy, ResetConfig};
use crate::core::applier::ResetApplier;
use crate::core::audit::{build_reset_event, AuditSink, ResetAction};
use crate::core::error::ResetError;
use crate::core::plan::{OccupancySnapshot, PatchPlan, SweepPlanner};
use crate::core::region::{Region, ResetStatus};
use crate::core::scheduler::Scheduler;
use crate::core::unit::{Chain, Unit, UnitFailure, UnitOutcome};
use crate::core::world::WorldAccess;

/// Result of asking for a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new cycle was started.
    Accepted(ResetTicket),
    /// The region was busy; nothing was started.
    Deferred,
}

impl TriggerOutcome {
    /// Whether a cycle was started.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Identifies an accepted reset cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTicket {
    /// Cycle identifier, as recorded in audit events.
    pub cycle_id: Uuid,
    /// Region being reset.
    pub region: String,
}

/// Data carried from stage to stage of one cycle.
struct Cycle {
    id: Uuid,
    region: Arc<Region>,
    seed: u64,
    on_complete: Option<Chain>,
}

struct OrchestratorInner<W: WorldAccess> {
    scheduler: Scheduler,
    world: Arc<Mutex<W>>,
    config: ResetConfig,
    regions: RwLock<HashMap<String, Arc<Region>>>,
    audit: Mutex<Option<Box<dyn AuditSink>>>,
    cycles: AtomicU64,
    span: Span,
}

/// Owns the per-region reset pipeline and its mutual-exclusion guarantee.
pub struct ResetOrchestrator<W: WorldAccess> {
    inner: Arc<OrchestratorInner<W>>,
}

impl<W: WorldAccess> Clone for ResetOrchestrator<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: WorldAccess> ResetOrchestrator<W> {
    /// Create an orchestrator over a scheduler and world provider.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::InvalidConfig` for an invalid reset configuration.
    pub fn new(scheduler: Scheduler, world: Arc<Mutex<W>>, config: ResetConfig) -> Result<Self, ResetError> {
        Self::with_span(scheduler, world, config, tracing::info_span!("orchestrator"))
    }

    /// Create an orchestrator that logs inside `span`.
    ///
    /// # Errors
    ///
    /// Same as [`ResetOrchestrator::new`].
    pub fn with_span(
        scheduler: Scheduler,
        world: Arc<Mutex<W>>,
        config: ResetConfig,
        span: Span,
    ) -> Result<Self, ResetError> {
        config.validate().map_err(ResetError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                scheduler,
                world,
                config,
                regions: RwLock::new(HashMap::new()),
                audit: Mutex::new(None),
                cycles: AtomicU64::new(0),
                span,
            }),
        })
    }

    /// Attach an audit sink, replacing any previous one.
    pub fn set_audit_sink(&self, sink: Box<dyn AuditSink>) {
        *self.inner.audit.lock() = Some(sink);
    }

    /// Register a region.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::InvalidConfig` if the name is already taken.
    pub fn register(&self, region: Region) -> Result<Arc<Region>, ResetError> {
        let mut regions = self.inner.regions.write();
        if regions.contains_key(region.name()) {
            return Err(ResetError::InvalidConfig(format!(
                "region `{}` already registered",
                region.name()
            )));
        }
        let region = Arc::new(region);
        regions.insert(region.name().to_string(), Arc::clone(&region));
        debug!(parent: &self.inner.span, region = region.name(), volume = region.bounds().volume(), "region registered");
        Ok(region)
    }

    /// Look up a region.
    #[must_use]
    pub fn region(&self, name: &str) -> Option<Arc<Region>> {
        self.inner.regions.read().get(name).cloned()
    }

    /// All registered regions, sorted by name.
    #[must_use]
    pub fn regions(&self) -> Vec<Arc<Region>> {
        let mut regions: Vec<_> = self.inner.regions.read().values().cloned().collect();
        regions.sort_by(|a, b| a.name().cmp(b.name()));
        regions
    }

    /// Scheduler the cycles run on.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// World provider.
    #[must_use]
    pub fn world(&self) -> &Arc<Mutex<W>> {
        &self.inner.world
    }

    /// Reset configuration.
    #[must_use]
    pub fn config(&self) -> &ResetConfig {
        &self.inner.config
    }

    /// Number of cycles accepted so far.
    #[must_use]
    pub fn cycles_started(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }

    /// Start a reset of `region`.
    ///
    /// A busy region yields `Ok(TriggerOutcome::Deferred)` and its status is
    /// not touched.
    ///
    /// # Errors
    ///
    /// - `ResetError::UnknownRegion` for an unregistered name
    /// - `ResetError::Scheduler` if the first unit could not be queued
    pub fn begin_reset(&self, region: &str) -> Result<TriggerOutcome, ResetError> {
        self.inner.begin_reset(region, None)
    }

    /// Start a reset and run `on_complete` after the region's plan is fully applied.
    ///
    /// `on_complete` is dropped if the cycle fails.
    ///
    /// # Errors
    ///
    /// Same as [`ResetOrchestrator::begin_reset`].
    pub fn begin_reset_then(
        &self,
        region: &str,
        on_complete: impl Into<Chain>,
    ) -> Result<TriggerOutcome, ResetError> {
        self.inner.begin_reset(region, Some(on_complete.into()))
    }

    /// Report positions emptied by consumers.
    ///
    /// Returns whether the region's threshold policy now calls for a reset.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::UnknownRegion` for an unregistered name.
    pub fn record_depleted(&self, region: &str, count: u64) -> Result<bool, ResetError> {
        let region = self
            .region(region)
            .ok_or_else(|| ResetError::UnknownRegion(region.to_string()))?;
        region.record_depleted(count);
        Ok(region.depletion_due())
    }
}

impl<W: WorldAccess> OrchestratorInner<W> {
    fn begin_reset(self: &Arc<Self>, name: &str, on_complete: Option<Chain>) -> Result<TriggerOutcome, ResetError> {
        let _span = self.span.enter();
        let region = self
            .regions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ResetError::UnknownRegion(name.to_string()))?;

        let queued = self.config.busy_trigger == BusyTriggerPolicy::Queue;
        if !region.begin_reset_or_mark_pending(queued) {
            debug!(region = name, status = ?region.status(), queued, "reset deferred: region busy");
            self.record(Uuid::nil(), name, ResetAction::Deferred { queued });
            return Ok(TriggerOutcome::Deferred);
        }

        let id = Uuid::new_v4();
        self.record(id, name, ResetAction::Accepted);
        self.record(
            id,
            name,
            ResetAction::Transition {
                from: ResetStatus::Idle,
                to: ResetStatus::SweepScheduled,
            },
        );

        let cycle = self.new_cycle(id, Arc::clone(&region), on_complete);
        if let Err(e) = self.scheduler.submit(self.snapshot_unit(cycle)) {
            if let Err(rollback) = region.rollback_begin() {
                error!(region = name, error = %rollback, "could not roll back rejected reset");
            }
            self.record(id, name, ResetAction::Failed { reason: e.to_string() });
            warn!(region = name, error = %e, "reset could not be scheduled");
            return Err(e.into());
        }

        info!(region = name, cycle = %id, "reset accepted");
        Ok(TriggerOutcome::Accepted(ResetTicket {
            cycle_id: id,
            region: name.to_string(),
        }))
    }

    fn new_cycle(&self, id: Uuid, region: Arc<Region>, on_complete: Option<Chain>) -> Cycle {
        let n = self.cycles.fetch_add(1, Ordering::AcqRel);
        let seed = self
            .config
            .planner_seed
            .map_or_else(rand::random::<u64>, |base| base.wrapping_add(n));
        debug!(region = region.name(), cycle = %id, seed, "cycle created");
        Cycle {
            id,
            region,
            seed,
            on_complete,
        }
    }

    fn record(&self, cycle_id: Uuid, region: &str, action: ResetAction) {
        if let Some(sink) = self.audit.lock().as_mut() {
            sink.record(build_reset_event(cycle_id, region, action));
        }
    }

    /// Advance `region` one step and audit it. Foreground only.
    fn transition(&self, cycle_id: Uuid, region: &Region, to: ResetStatus) -> Result<(), ResetError> {
        region.advance_with(to, |from| {
            self.record(cycle_id, region.name(), ResetAction::Transition { from, to });
        })
    }

    /// Abort the cycle: log, move to `Cooling`, and queue the cooldown. Foreground only.
    fn fail(self: &Arc<Self>, cycle_id: Uuid, region: &Arc<Region>, err: &ResetError) -> UnitOutcome {
        error!(region = region.name(), cycle = %cycle_id, error = %err, "reset cycle aborted");
        let from = region.abort();
        if from.is_active() {
            self.record(
                cycle_id,
                region.name(),
                ResetAction::Transition {
                    from,
                    to: ResetStatus::Cooling,
                },
            );
        }
        self.record(
            cycle_id,
            region.name(),
            ResetAction::Failed {
                reason: err.to_string(),
            },
        );
        UnitOutcome::Continue(Chain::from(self.cooldown_unit(cycle_id, Arc::clone(region))))
    }

    /// Failure hook for unclassified errors and panics inside cycle units.
    fn abort_hook(self: &Arc<Self>, cycle_id: Uuid, region: Arc<Region>) -> impl FnOnce(&UnitFailure) + Send + 'static {
        let inner = Arc::clone(self);
        move |failure: &UnitFailure| {
            let err = ResetError::PlannerFailure(format!(
                "unclassified failure in `{}`: {}",
                failure.label, failure.message
            ));
            let abort = inner.abort_unit(cycle_id, Arc::clone(&region), err);
            if let Err(e) = inner.scheduler.submit_unchecked(abort) {
                // Only refused after shutdown: nothing runs on the foreground any more.
                error!(region = region.name(), error = %e, "could not schedule abort; releasing region");
                region.abort();
            }
        }
    }

    fn abort_unit(self: &Arc<Self>, cycle_id: Uuid, region: Arc<Region>, err: ResetError) -> Unit {
        let inner = Arc::clone(self);
        Unit::foreground(format!("{}:abort", region.name()), move |_| {
            let _span = inner.span.enter();
            Ok(inner.fail(cycle_id, &region, &err))
        })
    }

    fn snapshot_unit(self: &Arc<Self>, cycle: Cycle) -> Unit {
        let inner = Arc::clone(self);
        let hook = self.abort_hook(cycle.id, Arc::clone(&cycle.region));
        Unit::foreground(format!("{}:snapshot", cycle.region.name()), move |ctx| {
            let fg = ctx.foreground()?;
            let _span = inner.span.enter();
            if let Err(e) = inner.transition(cycle.id, &cycle.region, ResetStatus::Sweeping) {
                return Ok(inner.fail(cycle.id, &cycle.region, &e));
            }
            let read = inner.world.lock().read_occupancy(fg, cycle.region.bounds());
            let snapshot = match read {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let err = ResetError::PlannerFailure(e.to_string());
                    return Ok(inner.fail(cycle.id, &cycle.region, &err));
                }
            };
            cycle.region.sync_filled(snapshot.filled_count() as u64);
            Ok(UnitOutcome::Continue(Chain::from(inner.planner_unit(cycle, snapshot))))
        })
        .on_failure(hook)
    }

    fn planner_unit(self: &Arc<Self>, cycle: Cycle, snapshot: OccupancySnapshot) -> Unit {
        let inner = Arc::clone(self);
        let hook = self.abort_hook(cycle.id, Arc::clone(&cycle.region));
        Unit::background(format!("{}:sweep", cycle.region.name()), move |_| {
            let _span = inner.span.enter();
            let planned = SweepPlanner::new(cycle.region.bounds(), cycle.region.composition())
                .plan(&snapshot, cycle.seed);
            let next = match planned {
                Ok(plan) => inner.stage_apply_unit(cycle, plan),
                Err(e) => inner.abort_unit(cycle.id, Arc::clone(&cycle.region), e),
            };
            Ok(UnitOutcome::Continue(Chain::from(next)))
        })
        .on_failure(hook)
    }

    fn stage_apply_unit(self: &Arc<Self>, cycle: Cycle, plan: PatchPlan) -> Unit {
        let inner = Arc::clone(self);
        let hook = self.abort_hook(cycle.id, Arc::clone(&cycle.region));
        Unit::foreground(format!("{}:stage-apply", cycle.region.name()), move |_| {
            let _span = inner.span.enter();
            if let Err(e) = inner.transition(cycle.id, &cycle.region, ResetStatus::ApplyScheduled) {
                return Ok(inner.fail(cycle.id, &cycle.region, &e));
            }
            if plan.is_empty() {
                debug!(region = cycle.region.name(), "nothing to apply");
                if let Err(e) = inner.transition(cycle.id, &cycle.region, ResetStatus::Applying) {
                    return Ok(inner.fail(cycle.id, &cycle.region, &e));
                }
                return Ok(inner.complete(cycle, 0));
            }
            let planned = plan.len();
            let applier = ResetApplier::new(plan, inner.config.apply_budget);
            Ok(UnitOutcome::Continue(Chain::from(inner.apply_unit(cycle, applier, planned))))
        })
        .on_failure(hook)
    }

    fn apply_unit(self: &Arc<Self>, cycle: Cycle, mut applier: ResetApplier, planned: usize) -> Unit {
        let inner = Arc::clone(self);
        let hook = self.abort_hook(cycle.id, Arc::clone(&cycle.region));
        Unit::foreground(format!("{}:apply", cycle.region.name()), move |ctx| {
            let fg = ctx.foreground()?;
            let _span = inner.span.enter();
            if cycle.region.status() == ResetStatus::ApplyScheduled {
                if let Err(e) = inner.transition(cycle.id, &cycle.region, ResetStatus::Applying) {
                    return Ok(inner.fail(cycle.id, &cycle.region, &e));
                }
            }
            let report = {
                let mut world = inner.world.lock();
                applier.apply_pass(fg, &mut *world, &cycle.region)
            };
            inner.record(
                cycle.id,
                cycle.region.name(),
                ResetAction::PassApplied {
                    applied: report.applied,
                    skipped: report.skipped,
                    remaining: report.remaining,
                },
            );
            if applier.is_exhausted() {
                return Ok(inner.complete(cycle, planned));
            }
            Ok(UnitOutcome::Continue(Chain::from(inner.apply_unit(cycle, applier, planned))))
        })
        .on_failure(hook)
    }

    /// Plan fully applied: enter `Cooling`, queue the cooldown, hand over to the caller's chain.
    ///
    /// The cooldown runs as its own chain so nothing the caller's chain does can hold the region.
    fn complete(self: &Arc<Self>, cycle: Cycle, planned: usize) -> UnitOutcome {
        if let Err(e) = self.transition(cycle.id, &cycle.region, ResetStatus::Cooling) {
            return self.fail(cycle.id, &cycle.region, &e);
        }
        self.record(cycle.id, cycle.region.name(), ResetAction::Completed { planned });
        info!(region = cycle.region.name(), cycle = %cycle.id, planned, "reset applied");

        let cooldown = self.cooldown_unit(cycle.id, Arc::clone(&cycle.region));
        if let Err(e) = self.scheduler.submit_unchecked(cooldown) {
            warn!(region = cycle.region.name(), error = %e, "cooldown not queued; region stays cooling");
        }
        let next = cycle.on_complete.unwrap_or_default();
        if next.is_empty() {
            UnitOutcome::Done
        } else {
            UnitOutcome::Continue(next)
        }
    }

    fn cooldown_unit(self: &Arc<Self>, cycle_id: Uuid, region: Arc<Region>) -> Unit {
        let inner = Arc::clone(self);
        Unit::foreground(format!("{}:cooldown", region.name()), move |_| {
            let _span = inner.span.enter();
            if !region.cooldown_elapsed() {
                return Ok(UnitOutcome::Continue(Chain::from(inner.cooldown_unit(cycle_id, region))));
            }
            let next_id = Uuid::new_v4();
            let replayed = region.finish_cooldown(|from, to| {
                if to == ResetStatus::Idle {
                    inner.record(cycle_id, region.name(), ResetAction::Transition { from, to });
                } else {
                    inner.record(next_id, region.name(), ResetAction::Accepted);
                    inner.record(next_id, region.name(), ResetAction::Transition { from, to });
                }
            });
            match replayed {
                Ok(false) => {
                    debug!(region = region.name(), cycle = %cycle_id, "region idle");
                    Ok(UnitOutcome::Done)
                }
                Ok(true) => {
                    info!(region = region.name(), cycle = %next_id, "queued trigger replayed");
                    let cycle = inner.new_cycle(next_id, Arc::clone(&region), None);
                    Ok(UnitOutcome::Continue(Chain::from(inner.snapshot_unit(cycle))))
                }
                Err(e) => {
                    error!(region = region.name(), error = %e, "cooldown finished out of sequence");
                    Ok(UnitOutcome::Done)
                }
            }
        })
        .with_delay(1)
    }
}
