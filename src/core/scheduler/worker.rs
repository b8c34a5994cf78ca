//! Background worker threads for background-eligible units.
//!
//! Workers block on the channel and exit when the sender is dropped or the
//! scheduler is gone. They only hold a weak reference to the scheduler so an
//! abandoned scheduler can still be torn down.

use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::core::error::SchedulerError;

use super::{Job, SchedulerInner};

/// Spawn one background worker.
pub(super) fn spawn_worker(
    worker_id: usize,
    jobs: Receiver<Job>,
    scheduler: Weak<SchedulerInner>,
    stack_size: usize,
) -> Result<JoinHandle<()>, SchedulerError> {
    thread::Builder::new()
        .name(format!("mine-reset-bg-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "background worker started");

            // Blocking recv; returns Err once the sender is dropped and the buffer is empty.
            while let Ok(job) = jobs.recv() {
                let Some(inner) = scheduler.upgrade() else {
                    break;
                };
                if inner.shutdown.load(Ordering::Acquire) {
                    inner.discard(job);
                    continue;
                }
                let _span = inner.span.enter();
                let tick = inner.tick.load(Ordering::Acquire);
                inner.run_job(job, None, tick);
            }

            debug!(worker_id, "background worker exiting");
        })
        .map_err(|e| SchedulerError::Spawn(e.to_string()))
}
