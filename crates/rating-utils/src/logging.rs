//! Logging and tracing utilities

use crate::config::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing subscriber with default configuration
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize tracing subscriber emitting one JSON object per line
pub fn init_tracing_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
        .init();
}

/// Initialize tracing subscriber, emitting JSON lines when `config.log_json` is set
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing_from(config: &Config) {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_ok() {
        tracing::debug!(app = %config.app_name, env = %config.environment, "tracing initialized");
    }
}
