//! Shared utilities for rating-tracker
//!
//! Logging setup and process-level configuration used by the engine and the CLI.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError};
pub use logging::{init_tracing, init_tracing_from, init_tracing_json};
