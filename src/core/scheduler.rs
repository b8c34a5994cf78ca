//! Two-context scheduler: one foreground thread driven by `tick()`, plus a
//! pool of background workers for background-eligible units.
//!
//! # Guarantees
//!
//! - Foreground units only run inside `tick()`, on the thread that first
//!   called it, and at most `foreground_budget` of them per tick.
//! - A unit's successor is queued only after the unit finished, so every
//!   chain runs in strict causal order. Independent chains are unordered.
//! - A chain can be cancelled through its handle until its next unit starts.
//! - Errors and panics inside a unit are caught and logged; the chain keeps
//!   going unless the unit returned [`UnitOutcome::FailChain`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mine_reset::config::SchedulerConfig;
//! use mine_reset::core::{Scheduler, Unit, UnitOutcome};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new().with_background_workers(2))?;
//! let chain = Unit::background("plan", |_| Ok(UnitOutcome::Done))
//!     .then(Unit::foreground("apply", |ctx| {
//!         let _fg = ctx.foreground()?;
//!         Ok(UnitOutcome::Done)
//!     }));
//! let handle = scheduler.submit(chain)?;
//! scheduler.run_until_idle(std::time::Duration::from_secs(1))?;
//! ```

mod queue;
mod worker;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn, Span};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::error::{AppResult, SchedulerError};
use crate::core::unit::{
    Chain, ExecutionContext, Foreground, HandleState, Unit, UnitContext, UnitFailure, UnitHandle,
    UnitOutcome, UnitState,
};

use queue::DelayQueue;

/// A queued unit together with the rest of its chain.
pub(crate) struct Job {
    unit: Unit,
    rest: Chain,
    handle: Arc<HandleState>,
}

/// Statistics about scheduler activity.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Number of background worker threads.
    pub background_workers: usize,
    /// Units queued, delayed, or running.
    pub pending: u64,
    /// Chains accepted by `submit`.
    pub submitted: u64,
    /// Units that ran to completion.
    pub completed: u64,
    /// Units whose work errored, panicked, or failed its chain.
    pub failed: u64,
    /// Units dropped because their chain was cancelled.
    pub cancelled: u64,
    /// Foreground ticks so far.
    pub ticks: u64,
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
struct SchedulerCounters {
    pending: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// What one `tick()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// The tick number.
    pub tick: u64,
    /// Units executed on the foreground thread.
    pub ran: usize,
    /// Background units handed to workers.
    pub dispatched: usize,
    /// Items still waiting in the delay queue.
    pub queued: usize,
}

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    queue: Mutex<DelayQueue<Job>>,
    background_tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: SchedulerCounters,
    tick: AtomicU64,
    foreground_thread: Mutex<Option<ThreadId>>,
    shutdown: AtomicBool,
    span: Span,
}

/// Cheaply cloneable scheduler handle.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler and spawn its background workers.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for an invalid configuration and
    /// `SchedulerError::Spawn` if a worker thread cannot be started.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_span(config, tracing::info_span!("scheduler"))
    }

    /// Create a scheduler that logs inside `span`.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::new`].
    pub fn with_span(config: SchedulerConfig, span: Span) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let worker_count = config.background_workers;
        let (tx, rx) = if worker_count > 0 {
            let (tx, rx) = bounded::<Job>(config.max_queue_depth);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(DelayQueue::new()),
            background_tx: Mutex::new(tx),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            counters: SchedulerCounters::default(),
            tick: AtomicU64::new(0),
            foreground_thread: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            span,
            config,
        });

        if let Some(rx) = rx {
            let mut workers = inner.workers.lock();
            for worker_id in 0..worker_count {
                let handle = worker::spawn_worker(
                    worker_id,
                    rx.clone(),
                    Arc::downgrade(&inner),
                    inner.config.thread_stack_size,
                )?;
                workers.push(handle);
            }
        }

        {
            let _span = inner.span.enter();
            info!(
                background_workers = worker_count,
                foreground_budget = inner.config.foreground_budget,
                max_queue_depth = inner.config.max_queue_depth,
                "scheduler initialized"
            );
        }

        Ok(Self { inner })
    }

    /// Submit a unit or chain.
    ///
    /// The first unit is queued according to its context and delay; each
    /// successor is queued only once its predecessor has finished.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Shutdown` after `shutdown()`
    /// - `SchedulerError::QueueFull` when `max_queue_depth` units are pending
    pub fn submit(&self, chain: impl Into<Chain>) -> Result<UnitHandle, SchedulerError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        let pending = self.inner.counters.pending.load(Ordering::Acquire);
        if pending >= self.inner.config.max_queue_depth as u64 {
            warn!(pending, "scheduler queue is full");
            return Err(SchedulerError::QueueFull(format!("{pending} units pending")));
        }
        self.admit(chain.into())
    }

    /// Submit follow-up work that must not be refused while the scheduler runs.
    ///
    /// Skips the `max_queue_depth` check, like successors of a running chain.
    pub(crate) fn submit_unchecked(&self, chain: impl Into<Chain>) -> Result<UnitHandle, SchedulerError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        self.admit(chain.into())
    }

    fn admit(&self, mut chain: Chain) -> Result<UnitHandle, SchedulerError> {
        let state = HandleState::new();
        let Some(unit) = chain.next_unit() else {
            state.store(UnitState::Completed);
            return Ok(UnitHandle::new(Uuid::nil(), state));
        };

        let handle = UnitHandle::new(unit.id(), Arc::clone(&state));
        debug!(unit = unit.label(), context = ?unit.context(), successors = chain.len(), "unit submitted");
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.counters.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.enqueue(Job {
            unit,
            rest: chain,
            handle: state,
        });
        Ok(handle)
    }

    /// Run `work` every `period_ticks` ticks until the returned handle is cancelled.
    ///
    /// Errors from `work` are logged and do not stop the repetition.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::submit`].
    pub fn submit_periodic<F>(
        &self,
        label: impl Into<String>,
        context: ExecutionContext,
        period_ticks: u64,
        work: F,
    ) -> Result<UnitHandle, SchedulerError>
    where
        F: Fn(&UnitContext<'_>) -> AppResult<()> + Send + Sync + 'static,
    {
        let period = period_ticks.max(1);
        self.submit(periodic_unit(label.into(), context, period, Arc::new(work)))
    }

    /// Run one foreground cycle.
    ///
    /// Due background units are handed to workers; due foreground units (and
    /// background units when no workers exist) run here, up to the per-tick
    /// budget. Units queued while this tick runs are due next tick at the
    /// earliest.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Shutdown` after `shutdown()`
    /// - `SchedulerError::ForeignThread` when called off the foreground thread
    pub fn tick(&self) -> Result<TickReport, SchedulerError> {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        {
            let current = thread::current().id();
            let mut bound = inner.foreground_thread.lock();
            match *bound {
                Some(id) if id != current => return Err(SchedulerError::ForeignThread),
                Some(_) => {}
                None => *bound = Some(current),
            }
        }

        let _span = inner.span.enter();
        let now = inner.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let budget = inner.config.foreground_budget;
        let mut batch = Vec::new();
        let mut dispatched = 0;
        let queued = {
            let mut queue = inner.queue.lock();
            let mut retry = Vec::new();
            while batch.len() < budget {
                let Some(job) = queue.pop_due(now) else {
                    break;
                };
                if job.unit.context() == ExecutionContext::BackgroundEligible && inner.has_workers() {
                    match inner.dispatch_background(job) {
                        Ok(()) => dispatched += 1,
                        Err(job) => retry.push(job),
                    }
                } else {
                    batch.push(job);
                }
            }
            for job in retry {
                queue.push(now, job);
            }
            queue.len()
        };

        let ran = batch.len();
        let token = Foreground::new();
        for job in batch {
            let foreground = match job.unit.context() {
                ExecutionContext::Foreground => Some(&token),
                ExecutionContext::BackgroundEligible => None,
            };
            inner.run_job(job, foreground, now);
        }

        if ran > 0 || dispatched > 0 {
            debug!(tick = now, ran, dispatched, queued, "tick");
        }
        Ok(TickReport {
            tick: now,
            ran,
            dispatched,
            queued,
        })
    }

    /// Tick until nothing is pending.
    ///
    /// Returns the number of ticks taken.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Timeout` if units are still pending after `timeout`,
    /// plus any error from [`Scheduler::tick`].
    pub fn run_until_idle(&self, timeout: Duration) -> Result<u64, SchedulerError> {
        let deadline = Instant::now() + timeout;
        let mut ticks = 0;
        loop {
            if self.is_idle() {
                return Ok(ticks);
            }
            if Instant::now() >= deadline {
                return Err(SchedulerError::Timeout);
            }
            let report = self.tick()?;
            ticks += 1;
            if report.ran == 0 && report.dispatched == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Whether no unit is queued, delayed, or running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.counters.pending.load(Ordering::Acquire) == 0
    }

    /// Last tick number.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let c = &self.inner.counters;
        SchedulerStats {
            background_workers: self.inner.config.background_workers,
            pending: c.pending.load(Ordering::Relaxed),
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            ticks: self.inner.tick.load(Ordering::Relaxed),
        }
    }

    /// Stop workers and drop every queued unit. Running units finish first.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let _span = inner.span.enter();
        info!("shutting down scheduler");

        // Dropping the sender unblocks idle workers; they discard what is still buffered.
        inner.background_tx.lock().take();
        let queued = inner.queue.lock().drain();
        let dropped = queued.len();
        for job in queued {
            inner.discard(job);
        }

        let current = thread::current().id();
        let workers: Vec<_> = inner.workers.lock().drain(..).collect();
        for (worker_id, worker) in workers.into_iter().enumerate() {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!(worker_id, "background worker panicked");
            }
        }
        info!(dropped, "scheduler shut down");
    }
}

impl SchedulerInner {
    const fn has_workers(&self) -> bool {
        self.config.background_workers > 0
    }

    /// Queue a job without admission checks (successors are never refused).
    fn enqueue(&self, job: Job) {
        if self.shutdown.load(Ordering::Acquire) {
            self.discard(job);
            return;
        }
        let delay = job.unit.delay_ticks();
        let job = if delay == 0 && job.unit.context() == ExecutionContext::BackgroundEligible {
            match self.dispatch_background(job) {
                Ok(()) => return,
                Err(job) => job,
            }
        } else {
            job
        };
        let due = self.tick.load(Ordering::Acquire) + delay;
        self.queue.lock().push(due, job);
    }

    /// Drop a job that will never run.
    pub(crate) fn discard(&self, job: Job) {
        job.handle.store(UnitState::Cancelled);
        self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        self.counters.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Hand a job to the workers; gives it back if there are none or the channel is full.
    fn dispatch_background(&self, job: Job) -> Result<(), Job> {
        let tx = self.background_tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(job);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => Err(job),
        }
    }

    /// Execute one job and queue its successor.
    pub(crate) fn run_job(&self, job: Job, foreground: Option<&Foreground>, tick: u64) {
        let Job {
            unit,
            mut rest,
            handle,
        } = job;

        if !handle.transition_from_queued(UnitState::Running) {
            debug!(unit = unit.label(), "unit cancelled before start");
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            self.counters.pending.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        let (label, work, on_failure) = unit.into_parts();
        let ctx = UnitContext::new(&label, tick, foreground);
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| work(&ctx))) {
            Ok(Ok(UnitOutcome::Done)) => None,
            Ok(Ok(UnitOutcome::Continue(front))) => {
                rest.prepend(front);
                None
            }
            Ok(Ok(UnitOutcome::FailChain(reason))) => {
                warn!(unit = %label, %reason, dropped = rest.len(), "unit failed its chain");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                handle.store(UnitState::Failed);
                self.counters.pending.fetch_sub(1, Ordering::AcqRel);
                return;
            }
            Ok(Err(e)) => Some(UnitFailure {
                label: label.clone(),
                message: format!("{e:#}"),
                panicked: false,
            }),
            Err(payload) => Some(UnitFailure {
                label: label.clone(),
                message: panic_message(payload.as_ref()),
                panicked: true,
            }),
        };

        if let Some(failure) = failure {
            error!(
                unit = %failure.label,
                error = %failure.message,
                panicked = failure.panicked,
                "unit failed"
            );
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            if let Some(hook) = on_failure {
                if panic::catch_unwind(AssertUnwindSafe(|| hook(&failure))).is_err() {
                    error!(unit = %failure.label, "failure hook panicked");
                }
            }
        } else {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        }

        match rest.next_unit() {
            Some(next) => {
                handle.store(UnitState::Queued);
                self.counters.pending.fetch_add(1, Ordering::AcqRel);
                self.enqueue(Job {
                    unit: next,
                    rest,
                    handle,
                });
            }
            None => handle.store(UnitState::Completed),
        }
        self.counters.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        // Workers hold only weak references; dropping the sender lets them exit.
        self.shutdown.store(true, Ordering::Release);
        self.background_tx.get_mut().take();
    }
}

fn periodic_unit<F>(label: String, context: ExecutionContext, period: u64, work: Arc<F>) -> Unit
where
    F: Fn(&UnitContext<'_>) -> AppResult<()> + Send + Sync + 'static,
{
    let next_label = label.clone();
    Unit::new(label, context, move |ctx| {
        if let Err(e) = (*work)(ctx) {
            warn!(unit = ctx.label(), error = %e, "periodic unit failed; rescheduling");
        }
        let next = periodic_unit(next_label, context, period, work);
        Ok(UnitOutcome::Continue(Chain::from(next)))
    })
    .with_delay(period)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
