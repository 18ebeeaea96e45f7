//! Logging setup for native hosts.
//!
//! In a browser the probe installs no subscriber: `tracing` calls are no-ops
//! unless the embedding page's build wires one up.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_level(true)
        .try_init();
}
