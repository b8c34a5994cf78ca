//! Runtime drivers: the foreground tick thread and async trigger sources.

pub mod foreground;
#[cfg(feature = "tokio-runtime")]
pub mod triggers;

pub use foreground::ForegroundLoop;
#[cfg(feature = "tokio-runtime")]
pub use triggers::{
    command_channel, drive_triggers, CommandSender, CommandTrigger, DriveReport, IntervalTrigger,
    ThresholdTrigger, Trigger, TriggerReason, TriggerSource,
};
