//! Dedicated foreground thread that ticks a scheduler at a fixed interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::core::{Scheduler, SchedulerError};

/// Thread name of the foreground loop.
pub const FOREGROUND_THREAD_NAME: &str = "mine-reset-foreground";

/// Handle to a running foreground loop.
///
/// The loop thread becomes the scheduler's foreground thread, so nothing else
/// may call `tick()` on the same scheduler while it runs.
pub struct ForegroundLoop {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl ForegroundLoop {
    /// Start ticking `scheduler` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if the thread cannot be started.
    pub fn spawn(scheduler: Scheduler, interval: Duration) -> Result<Self, SchedulerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let thread = {
            let stop = Arc::clone(&stop);
            let ticks = Arc::clone(&ticks);
            thread::Builder::new()
                .name(FOREGROUND_THREAD_NAME.into())
                .spawn(move || run_loop(&scheduler, interval, &stop, &ticks))
                .map_err(|e| SchedulerError::Spawn(e.to_string()))?
        };
        info!(interval_ms = interval.as_millis(), "foreground loop started");
        Ok(Self {
            stop,
            ticks,
            thread: Some(thread),
        })
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Whether the loop thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("foreground loop panicked");
            }
            info!(ticks = self.ticks(), "foreground loop stopped");
        }
    }
}

impl Drop for ForegroundLoop {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run_loop(scheduler: &Scheduler, interval: Duration, stop: &AtomicBool, ticks: &AtomicU64) {
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        match scheduler.tick() {
            Ok(_) => {
                ticks.fetch_add(1, Ordering::AcqRel);
            }
            Err(SchedulerError::Shutdown) => {
                debug!("scheduler shut down; foreground loop exiting");
                break;
            }
            Err(e) => {
                error!(error = %e, "foreground tick failed; loop exiting");
                break;
            }
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
}
