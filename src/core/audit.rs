//! Audit trail of reset cycles.
//!
//! The orchestrator records one event per decision: accepted or deferred
//! triggers, every status transition, every applier pass, failures, and
//! completion. Sinks are pluggable; the in-memory sink backs tests and
//! diagnostics commands.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::region::ResetStatus;
use crate::util::clock::now_ms;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetAction {
    /// A trigger started a cycle.
    Accepted,
    /// A trigger hit a busy region.
    Deferred {
        /// Whether a follow-up reset was queued.
        queued: bool,
    },
    /// The region changed status.
    Transition {
        /// Previous status.
        from: ResetStatus,
        /// New status.
        to: ResetStatus,
    },
    /// One applier pass finished.
    PassApplied {
        /// Entries written.
        applied: usize,
        /// Entries skipped.
        skipped: usize,
        /// Entries left.
        remaining: usize,
    },
    /// The cycle was aborted.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// The cycle applied its whole plan.
    Completed {
        /// Plan size.
        planned: usize,
    },
}

impl ResetAction {
    /// Short action name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Deferred { .. } => "deferred",
            Self::Transition { .. } => "transition",
            Self::PassApplied { .. } => "pass",
            Self::Failed { .. } => "failed",
            Self::Completed { .. } => "completed",
        }
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct ResetEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Cycle the event belongs to (`nil` for deferred triggers).
    pub cycle_id: Uuid,
    /// Region name.
    pub region: String,
    /// What happened.
    pub action: ResetAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: ResetEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<ResetEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<ResetEvent> {
        self.events.iter().cloned().collect()
    }

    /// Status transitions recorded for `region`, in order.
    #[must_use]
    pub fn transitions(&self, region: &str) -> Vec<(ResetStatus, ResetStatus)> {
        self.events
            .iter()
            .filter(|e| e.region == region)
            .filter_map(|e| match e.action {
                ResetAction::Transition { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Number of events for `region` with the given action name.
    #[must_use]
    pub fn count(&self, region: &str, action: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.region == region && e.action.name() == action)
            .count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: ResetEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Shared sinks: the orchestrator records while the owner keeps reading.
impl<S: AuditSink> AuditSink for Arc<Mutex<S>> {
    fn record(&mut self, event: ResetEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_reset_event(cycle_id: Uuid, region: impl Into<String>, action: ResetAction) -> ResetEvent {
    ResetEvent {
        event_id: Uuid::new_v4(),
        cycle_id,
        region: region.into(),
        action,
        created_at_ms: now_ms(),
    }
}
