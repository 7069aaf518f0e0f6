//! Tracing subscriber configuration for wavemesh devices.
//!
//! Log levels follow these conventions:
//! - ERROR: Unrecoverable failures (settings store unusable)
//! - WARN: Recoverable anomalies, unexpected but handled conditions
//! - INFO: Admissions, removals and other administrative changes
//! - DEBUG: Transaction and transfer state changes
//! - TRACE: Wire-level data, dropped frames, engine transitions

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(filter_or("info")).init();
}

/// Initialize the tracing subscriber with JSON output.
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter_or("info"))
        .init();
}

/// Initialize from the `[logging]` section. `RUST_LOG` still wins.
pub fn init_from_config(section: &LoggingSection) {
    let filter = filter_or(&section.level);
    if section.json {
        let _ = tracing_subscriber::fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or("debug"))
        .with_test_writer()
        .try_init();
}
