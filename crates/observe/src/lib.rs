//! Process-wide tracing setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes the global tracing subscriber. `env_filter` is the default
/// directive set, overridable through `RUST_LOG`. Calling this more than once
/// is a no-op so tests can initialize freely.
pub fn tracing_init(env_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env_filter));
    let result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber was already initialized");
    }
}
