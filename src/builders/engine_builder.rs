//! Assemble a scheduler, orchestrator, and configured regions.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, Span};

use crate::config::EngineConfig;
use crate::core::{AuditSink, ResetError, ResetOrchestrator, Scheduler, WorldAccess};

/// Build a ready-to-tick engine from configuration.
///
/// # Errors
///
/// - `ResetError::InvalidConfig` if the configuration fails validation
/// - `ResetError::Scheduler` if the worker threads cannot be started
pub fn build_engine<W: WorldAccess>(cfg: &EngineConfig, world: W) -> Result<ResetOrchestrator<W>, ResetError> {
    EngineBuilder::new(cfg.clone()).build(world)
}

/// Engine construction with optional audit sink and tracing spans.
pub struct EngineBuilder {
    config: EngineConfig,
    audit: Option<Box<dyn AuditSink>>,
    span: Option<Span>,
}

impl EngineBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            audit: None,
            span: None,
        }
    }

    /// Record reset events into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Parent span for the scheduler and orchestrator spans.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate, start the scheduler, and register every region.
    ///
    /// # Errors
    ///
    /// Same as [`build_engine`].
    pub fn build<W: WorldAccess>(self, world: W) -> Result<ResetOrchestrator<W>, ResetError> {
        self.config.validate().map_err(ResetError::InvalidConfig)?;

        let parent = self.span.unwrap_or_else(Span::current);
        let scheduler_span = tracing::info_span!(parent: &parent, "scheduler");
        let orchestrator_span = tracing::info_span!(parent: &parent, "orchestrator");

        let scheduler = Scheduler::with_span(self.config.scheduler.clone(), scheduler_span)?;
        let orchestrator = ResetOrchestrator::with_span(
            scheduler,
            Arc::new(Mutex::new(world)),
            self.config.reset.clone(),
            orchestrator_span,
        )?;
        if let Some(sink) = self.audit {
            orchestrator.set_audit_sink(sink);
        }

        let cooldown = self.config.reset.cooldown();
        for region_cfg in &self.config.regions {
            orchestrator.register(region_cfg.build(cooldown)?)?;
        }
        info!(
            regions = self.config.regions.len(),
            workers = self.config.scheduler.background_workers,
            "engine built"
        );
        Ok(orchestrator)
    }
}
