//! Telemetry helpers for structured logging.
//!
//! Components log through `tracing` inside the span they were constructed
//! with; this module only installs a subscriber for binaries and tests that do
//! not bring their own.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "mine_reset=info";

/// Install an env-filtered fmt subscriber if none is set.
///
/// `RUST_LOG` wins; otherwise [`DEFAULT_DIRECTIVE`] applies. Per-area
/// debugging uses module targets, e.g.
/// `RUST_LOG=mine_reset::core::applier=debug`.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_DIRECTIVE);
}

/// Like [`init_tracing`], with a caller-chosen fallback directive.
pub fn init_tracing_with(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
