//! Tracing subscriber setup for the daemon.
//!
//! `RUST_LOG` wins when set; otherwise the `[logging] level` from the
//! configuration file is used.
//!
//! - ERROR: daemon failures (link setup, bind errors)
//! - WARN: malformed frames, recoverable link failures
//! - INFO: node and link lifecycle
//! - DEBUG: per-packet routing decisions and drops
//! - TRACE: wire-level detail

use tracing_subscriber::EnvFilter;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub fn init(default_level: &str) {
    tracing_subscriber::fmt().with_env_filter(filter(default_level)).init();
}

/// JSON lines output, selected with `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Test subscriber; safe to call from every test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
