//! Scheduler, reset, and region configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::region::{Bounds, Composition, Region, TriggerPolicy};
use crate::core::ResetError;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum foreground units executed per tick.
    pub foreground_budget: usize,
    /// Background worker threads; `0` runs background-eligible units inline on tick.
    pub background_workers: usize,
    /// Maximum pending units before `submit` is refused.
    pub max_queue_depth: usize,
    /// Stack size for background worker threads, in bytes.
    pub thread_stack_size: usize,
    /// Interval between foreground ticks when driven by the foreground loop.
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            foreground_budget: 64,
            background_workers: num_cpus::get(),
            max_queue_depth: 4096,
            thread_stack_size: 2 * 1024 * 1024,
            tick_interval_ms: 50,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with defaults (one background worker per CPU).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-tick foreground budget.
    #[must_use]
    pub const fn with_foreground_budget(mut self, budget: usize) -> Self {
        self.foreground_budget = budget;
        self
    }

    /// Set the number of background workers.
    #[must_use]
    pub const fn with_background_workers(mut self, workers: usize) -> Self {
        self.background_workers = workers;
        self
    }

    /// Set the maximum number of pending units.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the foreground tick interval.
    #[must_use]
    pub const fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Tick interval as a `Duration`.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.foreground_budget == 0 {
            return Err("foreground_budget must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.background_workers > 0 && self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// What to do with a trigger that arrives while a region is resetting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyTriggerPolicy {
    /// Report it as deferred and forget it.
    #[default]
    Drop,
    /// Report it as deferred and run one more reset once the region is idle.
    Queue,
}

/// Reset pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Maximum patch entries applied per foreground pass.
    pub apply_budget: usize,
    /// How long a region stays `Cooling` after a cycle, in milliseconds.
    pub cooldown_ms: u64,
    /// Handling of triggers for busy regions.
    pub busy_trigger: BusyTriggerPolicy,
    /// Fixed base seed for the sweep planner; random when unset.
    pub planner_seed: Option<u64>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            apply_budget: 256,
            cooldown_ms: 0,
            busy_trigger: BusyTriggerPolicy::Drop,
            planner_seed: None,
        }
    }
}

impl ResetConfig {
    /// Cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.apply_budget == 0 {
            return Err("apply_budget must be greater than 0".into());
        }
        Ok(())
    }
}

/// Definition of one region, loaded before the engine starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Unique region name.
    pub name: String,
    /// Region bounds.
    pub bounds: Bounds,
    /// Target composition, in draw order.
    pub composition: Composition,
    /// Reset trigger policy.
    #[serde(default)]
    pub trigger: TriggerPolicy,
    /// Per-region cooldown override, in milliseconds.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
}

impl RegionConfig {
    /// Build the runtime region, using `default_cooldown` unless overridden.
    ///
    /// # Errors
    ///
    /// Returns `ResetError::InvalidConfig` for invalid bounds or composition.
    pub fn build(&self, default_cooldown: Duration) -> Result<Region, ResetError> {
        let cooldown = self
            .cooldown_ms
            .map_or(default_cooldown, Duration::from_millis);
        Ok(Region::new(
            self.name.clone(),
            self.bounds,
            self.composition.clone(),
            self.trigger.clone(),
        )?
        .with_cooldown(cooldown))
    }

    /// Validate the region definition.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("region name must not be empty".into());
        }
        self.bounds.validate()?;
        self.composition.validate()?;
        match self.trigger {
            TriggerPolicy::Interval { every_secs } if every_secs == 0 => {
                Err("interval trigger needs every_secs > 0".into())
            }
            TriggerPolicy::Threshold { remaining_percent }
                if !(0.0..=100.0).contains(&remaining_percent) =>
            {
                Err("threshold remaining_percent must be within 0..=100".into())
            }
            _ => Ok(()),
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Reset pipeline settings.
    #[serde(default)]
    pub reset: ResetConfig,
    /// Region definitions.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

impl EngineConfig {
    /// Validate every section and reject duplicate region names.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.reset
            .validate()
            .map_err(|e| format!("reset invalid: {e}"))?;
        let mut seen = std::collections::HashSet::new();
        for region in &self.regions {
            region
                .validate()
                .map_err(|e| format!("region `{}` invalid: {e}", region.name))?;
            if !seen.insert(region.name.as_str()) {
                return Err(format!("duplicate region `{}`", region.name));
            }
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay `MINE_RESET_*` variables from the environment (and `.env`, if present).
    pub fn with_env_overrides(mut self) -> Result<Self, String> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        self.apply_overrides(|key| std::env::var(key).ok())?;
        self.validate()?;
        Ok(self)
    }

    /// Overlay values produced by `lookup` for each known variable name.
    ///
    /// Recognised keys: `MINE_RESET_FOREGROUND_BUDGET`, `MINE_RESET_BACKGROUND_WORKERS`,
    /// `MINE_RESET_TICK_INTERVAL_MS`, `MINE_RESET_APPLY_BUDGET`, `MINE_RESET_COOLDOWN_MS`,
    /// `MINE_RESET_PLANNER_SEED`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
            raw.trim()
                .parse()
                .map_err(|_| format!("{key}: cannot parse `{raw}`"))
        }

        if let Some(v) = lookup("MINE_RESET_FOREGROUND_BUDGET") {
            self.scheduler.foreground_budget = parse("MINE_RESET_FOREGROUND_BUDGET", &v)?;
        }
        if let Some(v) = lookup("MINE_RESET_BACKGROUND_WORKERS") {
            self.scheduler.background_workers = parse("MINE_RESET_BACKGROUND_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MINE_RESET_TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms = parse("MINE_RESET_TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("MINE_RESET_APPLY_BUDGET") {
            self.reset.apply_budget = parse("MINE_RESET_APPLY_BUDGET", &v)?;
        }
        if let Some(v) = lookup("MINE_RESET_COOLDOWN_MS") {
            self.reset.cooldown_ms = parse("MINE_RESET_COOLDOWN_MS", &v)?;
        }
        if let Some(v) = lookup("MINE_RESET_PLANNER_SEED") {
            self.reset.planner_seed = Some(parse("MINE_RESET_PLANNER_SEED", &v)?);
        }
        Ok(())
    }
}
