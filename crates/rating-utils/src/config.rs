//! Configuration management utilities

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading process configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Emit log lines as JSON
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "rating-tracker".to_string(),
            environment: "development".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Read `RATING_TRACKER_ENV` and `RATING_TRACKER_LOG_JSON` from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(environment) = lookup("RATING_TRACKER_ENV").filter(|v| !v.trim().is_empty()) {
            config.environment = environment.trim().to_string();
        }

        if let Some(value) = lookup("RATING_TRACKER_LOG_JSON") {
            config.log_json = parse_flag("RATING_TRACKER_LOG_JSON", &value)?;
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
