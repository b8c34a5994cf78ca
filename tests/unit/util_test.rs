//! Tests for utility functions

use mine_reset::util::{init_tracing, init_tracing_with, now_ms, DEFAULT_DIRECTIVE};

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing_with("mine_reset=debug");
    init_tracing();
    tracing::info!("telemetry still usable");
}

#[test]
fn test_default_directive_targets_crate() {
    assert!(DEFAULT_DIRECTIVE.starts_with("mine_reset"));
}
