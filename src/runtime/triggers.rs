//! Async trigger sources feeding `begin_reset`.
//!
//! Each source yields [`Trigger`]s; [`drive_triggers`] forwards them to the
//! orchestrator and tallies the outcomes. Sources never touch region status
//! themselves, so a trigger for a busy region is simply reported as deferred.
//!
//! ```rust,ignore
//! let (sender, mut commands) = command_channel(64);
//! tokio::spawn(async move { drive_triggers(&mut commands, &orchestrator).await });
//! sender.instant_reset("north-mine")?;
//! ```

use std::collections::HashSet;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::{
    Region, ResetOrchestrator, ResetStatus, SchedulerError, TriggerOutcome, TriggerPolicy, WorldAccess,
};

/// Why a reset was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Periodic timer.
    Interval,
    /// Remaining content fell to the threshold.
    Depletion,
    /// Operator command.
    Manual,
    /// A player used an instant-reset item.
    ItemActivation,
}

/// A request to reset one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Region name.
    pub region: String,
    /// Why.
    pub reason: TriggerReason,
}

impl Trigger {
    /// Create a trigger.
    pub fn new(region: impl Into<String>, reason: TriggerReason) -> Self {
        Self {
            region: region.into(),
            reason,
        }
    }
}

/// Producer of reset requests.
#[async_trait]
pub trait TriggerSource: Send {
    /// Wait for the next trigger; `None` once the source is exhausted.
    async fn next(&mut self) -> Option<Trigger>;
}

/// Fires each registered region on its own fixed period.
///
/// Must be created inside a tokio runtime.
pub struct IntervalTrigger {
    timers: Vec<(String, Interval)>,
}

impl IntervalTrigger {
    /// No regions yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Every region whose policy is [`TriggerPolicy::Interval`].
    #[must_use]
    pub fn from_regions(regions: &[Arc<Region>]) -> Self {
        regions.iter().fold(Self::new(), |source, region| match region.trigger() {
            TriggerPolicy::Interval { every_secs } => {
                source.with_region(region.name(), Duration::from_secs(*every_secs))
            }
            _ => source,
        })
    }

    /// Add a region; its first trigger fires one `period` from now.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut timer = time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timers.push((region.into(), timer));
        self
    }

    /// Number of regions on a timer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no region is on a timer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for IntervalTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerSource for IntervalTrigger {
    async fn next(&mut self) -> Option<Trigger> {
        if self.timers.is_empty() {
            return None;
        }
        let timers = &mut self.timers;
        let region = poll_fn(|cx| {
            for (region, timer) in timers.iter_mut() {
                if timer.poll_tick(cx).is_ready() {
                    return Poll::Ready(region.clone());
                }
            }
            Poll::Pending
        })
        .await;
        Some(Trigger::new(region, TriggerReason::Interval))
    }
}

/// Polls threshold regions and fires once per depletion.
///
/// A region fires when it is idle and its remaining ratio has fallen to its
/// threshold, then re-arms once a reset lifts it back above. Regions whose
/// fill level is still unknown (no snapshot yet) never fire.
pub struct ThresholdTrigger {
    regions: Vec<Arc<Region>>,
    poll: Duration,
    fired: HashSet<String>,
}

impl ThresholdTrigger {
    /// Watch the regions whose policy is [`TriggerPolicy::Threshold`].
    #[must_use]
    pub fn new(regions: &[Arc<Region>], poll: Duration) -> Self {
        let regions = regions
            .iter()
            .filter(|r| matches!(r.trigger(), TriggerPolicy::Threshold { .. }))
            .cloned()
            .collect();
        Self {
            regions,
            poll: poll.max(Duration::from_millis(1)),
            fired: HashSet::new(),
        }
    }

    fn due(&mut self) -> Option<Trigger> {
        let mut found = None;
        for region in &self.regions {
            if !region.depletion_due() {
                self.fired.remove(region.name());
                continue;
            }
            if found.is_none()
                && region.status() == ResetStatus::Idle
                && !self.fired.contains(region.name())
            {
                found = Some(region.name().to_string());
            }
        }
        let region = found?;
        self.fired.insert(region.clone());
        Some(Trigger::new(region, TriggerReason::Depletion))
    }
}

#[async_trait]
impl TriggerSource for ThresholdTrigger {
    async fn next(&mut self) -> Option<Trigger> {
        if self.regions.is_empty() {
            return None;
        }
        loop {
            if let Some(trigger) = self.due() {
                return Some(trigger);
            }
            time::sleep(self.poll).await;
        }
    }
}

/// Create a command channel for manual and item-activation requests.
#[must_use]
pub fn command_channel(capacity: usize) -> (CommandSender, CommandTrigger) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, CommandTrigger { rx })
}

/// Sending half, held by command handlers.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Trigger>,
}

impl CommandSender {
    /// Request a reset without waiting.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::QueueFull` when the channel is full
    /// - `SchedulerError::Shutdown` when the receiving side is gone
    pub fn request_reset(&self, region: impl Into<String>, reason: TriggerReason) -> Result<(), SchedulerError> {
        self.tx
            .try_send(Trigger::new(region, reason))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(t) => {
                    SchedulerError::QueueFull(format!("command for `{}` dropped", t.region))
                }
                mpsc::error::TrySendError::Closed(_) => SchedulerError::Shutdown,
            })
    }

    /// An operator asked for a reset.
    ///
    /// # Errors
    ///
    /// Same as [`CommandSender::request_reset`].
    pub fn manual_reset(&self, region: impl Into<String>) -> Result<(), SchedulerError> {
        self.request_reset(region, TriggerReason::Manual)
    }

    /// A player used an instant-reset item.
    ///
    /// # Errors
    ///
    /// Same as [`CommandSender::request_reset`].
    pub fn instant_reset(&self, region: impl Into<String>) -> Result<(), SchedulerError> {
        self.request_reset(region, TriggerReason::ItemActivation)
    }
}

/// Receiving half; ends when every sender is dropped.
pub struct CommandTrigger {
    rx: mpsc::Receiver<Trigger>,
}

#[async_trait]
impl TriggerSource for CommandTrigger {
    async fn next(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }
}

/// Outcome tally of [`drive_triggers`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveReport {
    /// Triggers that started a cycle.
    pub accepted: usize,
    /// Triggers that hit a busy region.
    pub deferred: usize,
    /// Triggers that could not be handled.
    pub failed: usize,
}

/// Forward every trigger from `source` to the orchestrator until the source ends.
pub async fn drive_triggers<S, W>(source: &mut S, orchestrator: &ResetOrchestrator<W>) -> DriveReport
where
    S: TriggerSource + ?Sized,
    W: WorldAccess,
{
    let mut report = DriveReport::default();
    while let Some(trigger) = source.next().await {
        match orchestrator.begin_reset(&trigger.region) {
            Ok(TriggerOutcome::Accepted(ticket)) => {
                info!(region = %trigger.region, reason = ?trigger.reason, cycle = %ticket.cycle_id, "trigger accepted");
                report.accepted += 1;
            }
            Ok(TriggerOutcome::Deferred) => {
                debug!(region = %trigger.region, reason = ?trigger.reason, "trigger deferred");
                report.deferred += 1;
            }
            Err(e) => {
                warn!(region = %trigger.region, reason = ?trigger.reason, error = %e, "trigger failed");
                report.failed += 1;
            }
        }
    }
    report
}
