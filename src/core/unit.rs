//! Schedulable units and successor chains.
//!
//! A [`Unit`] is one piece of work tagged with the execution context it needs.
//! Successors are not nested inside their predecessor; they live in a flat
//! [`Chain`] and the scheduler pops the next one only after the current unit
//! has finished. A unit may also extend its own chain at run time by returning
//! [`UnitOutcome::Continue`], which is how budgeted work hands the remainder of
//! its input to a fresh continuation unit.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppResult, SchedulerError};

/// Where a unit is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// Only on the single foreground thread, during `tick()`.
    Foreground,
    /// Anywhere: a background worker, or inline when no workers are configured.
    BackgroundEligible,
}

/// Proof that the caller is running on the foreground context.
///
/// Only the scheduler's tick can lend one out, and it is neither `Send` nor
/// `Sync`, so it cannot leak onto a background worker. Foreground-only
/// collaborator calls take `&Foreground`.
pub struct Foreground {
    _not_send: PhantomData<*const ()>,
}

impl Foreground {
    pub(crate) const fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for Foreground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Foreground")
    }
}

/// What a running unit can see about where and when it runs.
pub struct UnitContext<'a> {
    label: &'a str,
    tick: u64,
    foreground: Option<&'a Foreground>,
}

impl<'a> UnitContext<'a> {
    pub(crate) const fn new(label: &'a str, tick: u64, foreground: Option<&'a Foreground>) -> Self {
        Self {
            label,
            tick,
            foreground,
        }
    }

    /// The foreground token.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WrongContext` when running off the foreground.
    pub fn foreground(&self) -> Result<&'a Foreground, SchedulerError> {
        self.foreground
            .ok_or_else(|| SchedulerError::WrongContext(self.label.to_string()))
    }

    /// Whether this run is on the foreground context.
    #[must_use]
    pub const fn is_foreground(&self) -> bool {
        self.foreground.is_some()
    }

    /// Foreground tick during which the unit was dispatched.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Label of the running unit.
    #[must_use]
    pub const fn label(&self) -> &str {
        self.label
    }
}

/// How a unit finished.
pub enum UnitOutcome {
    /// Work done; run the rest of the chain.
    Done,
    /// Run these units before the rest of the chain.
    Continue(Chain),
    /// Stop the chain; remaining successors are dropped.
    FailChain(String),
}

impl fmt::Debug for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Continue(chain) => write!(f, "Continue({} units)", chain.len()),
            Self::FailChain(reason) => write!(f, "FailChain({reason})"),
        }
    }
}

/// Why a unit's work did not complete normally.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    /// Label of the failing unit.
    pub label: String,
    /// Error message or panic payload.
    pub message: String,
    /// Whether the work panicked rather than returning an error.
    pub panicked: bool,
}

type Work = Box<dyn FnOnce(&UnitContext<'_>) -> AppResult<UnitOutcome> + Send + 'static>;
type FailureHook = Box<dyn FnOnce(&UnitFailure) + Send + 'static>;

/// One runnable piece of work.
pub struct Unit {
    id: Uuid,
    label: String,
    context: ExecutionContext,
    delay_ticks: u64,
    work: Work,
    on_failure: Option<FailureHook>,
}

impl Unit {
    /// Create a unit with an explicit context requirement.
    pub fn new<F>(label: impl Into<String>, context: ExecutionContext, work: F) -> Self
    where
        F: FnOnce(&UnitContext<'_>) -> AppResult<UnitOutcome> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            context,
            delay_ticks: 0,
            work: Box::new(work),
            on_failure: None,
        }
    }

    /// Create a foreground-only unit.
    pub fn foreground<F>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&UnitContext<'_>) -> AppResult<UnitOutcome> + Send + 'static,
    {
        Self::new(label, ExecutionContext::Foreground, work)
    }

    /// Create a background-eligible unit.
    pub fn background<F>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&UnitContext<'_>) -> AppResult<UnitOutcome> + Send + 'static,
    {
        Self::new(label, ExecutionContext::BackgroundEligible, work)
    }

    /// Delay the unit by a number of foreground ticks after it is queued.
    #[must_use]
    pub const fn with_delay(mut self, ticks: u64) -> Self {
        self.delay_ticks = ticks;
        self
    }

    /// Hook run when the work returns an error or panics.
    #[must_use]
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&UnitFailure) + Send + 'static,
    {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Build a two-unit chain: `self`, then `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Chain {
        Chain::from(self).then(next)
    }

    /// Unique id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Context requirement.
    #[must_use]
    pub const fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Delay in ticks.
    #[must_use]
    pub const fn delay_ticks(&self) -> u64 {
        self.delay_ticks
    }

    pub(crate) fn into_parts(self) -> (String, Work, Option<FailureHook>) {
        (self.label, self.work, self.on_failure)
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("context", &self.context)
            .field("delay_ticks", &self.delay_ticks)
            .finish_non_exhaustive()
    }
}

/// Ordered list of units; each starts only after the previous one finished.
#[derive(Debug, Default)]
pub struct Chain {
    units: VecDeque<Unit>,
}

impl Chain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a successor.
    #[must_use]
    pub fn then(mut self, unit: Unit) -> Self {
        self.units.push_back(unit);
        self
    }

    /// Append a successor in place.
    pub fn push(&mut self, unit: Unit) {
        self.units.push_back(unit);
    }

    /// Pop the unit that runs next.
    pub fn next_unit(&mut self) -> Option<Unit> {
        self.units.pop_front()
    }

    /// Put `front` ahead of everything already in this chain.
    pub fn prepend(&mut self, front: Self) {
        let mut front = front.units;
        front.append(&mut self.units);
        self.units = front;
    }

    /// Number of units left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no units are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl From<Unit> for Chain {
    fn from(unit: Unit) -> Self {
        let mut units = VecDeque::with_capacity(1);
        units.push_back(unit);
        Self { units }
    }
}

impl FromIterator<Unit> for Chain {
    fn from_iter<I: IntoIterator<Item = Unit>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

/// Lifecycle state of a submitted chain, as seen through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Next unit is waiting to start.
    Queued,
    /// A unit of the chain is executing.
    Running,
    /// Every unit ran.
    Completed,
    /// Cancelled before the next unit started.
    Cancelled,
    /// A unit marked the chain as failed.
    Failed,
}

impl UnitState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
            Self::Failed => 4,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// Shared state cell between a handle and the scheduler.
#[derive(Debug)]
pub(crate) struct HandleState(AtomicU8);

impl HandleState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(UnitState::Queued.as_u8())))
    }

    pub(crate) fn load(&self) -> UnitState {
        UnitState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: UnitState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// `Queued -> to`; false if the chain was no longer queued.
    pub(crate) fn transition_from_queued(&self, to: UnitState) -> bool {
        self.0
            .compare_exchange(
                UnitState::Queued.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Handle to a submitted chain.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    id: Uuid,
    state: Arc<HandleState>,
}

impl UnitHandle {
    pub(crate) const fn new(id: Uuid, state: Arc<HandleState>) -> Self {
        Self { id, state }
    }

    /// Id of the chain's first unit.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> UnitState {
        self.state.load()
    }

    /// Cancel the chain if its next unit has not started.
    ///
    /// Returns `false` when a unit is running or the chain already finished;
    /// running units are never preempted.
    pub fn cancel(&self) -> bool {
        self.state.transition_from_queued(UnitState::Cancelled)
    }
}
