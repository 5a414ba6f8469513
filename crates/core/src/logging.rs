//! Structured logging infrastructure for devsec.
//!
//! Centralized logging initialization with plain or JSON output and
//! environment-based filtering.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system with human-readable output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use devsec_core::logging;
///
/// logging::init();
/// tracing::info!("STATUS: DeviceSecurity :: started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output.
///
/// Suitable for firmware test harnesses that collect logs for later
/// analysis. Log level is taken from `RUST_LOG`.
///
/// # Example
/// ```no_run
/// use devsec_core::logging;
///
/// logging::init_json();
/// tracing::info!(device = "pci:0x10", "Orchestration started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Like [`init`], but returns quietly if a global subscriber already exists.
///
/// Integration tests call this from several test functions in one process.
pub fn try_init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_test_writer())
        .try_init();
}
