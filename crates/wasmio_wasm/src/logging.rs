//! Log initialisation.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "wasmio=info";

/// Initialise logging with [`DEFAULT_FILTER`].
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logs() {
    init_logs_with(DEFAULT_FILTER);
}

/// Initialise logging with a fallback filter; `RUST_LOG` still wins.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logs_with(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
