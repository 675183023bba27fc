//! Configuration for fetch and score operations

use crate::error::{FetchError, Result};
use rating_core::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Settings for fetching from a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// A stock fetched more recently than this is skipped
    pub freshness: Duration,

    /// Worker pool size when a request does not specify one
    pub default_concurrency: usize,

    /// Outgoing request pacing
    pub requests_per_minute: u32,

    /// Provider base URL; the adapter is not configured without one
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// Default settings for a provider
    pub fn default_for(provider: Provider) -> Self {
        let freshness = match provider {
            Provider::Morningstar | Provider::MarketScreener => Duration::from_secs(12 * HOUR),
            Provider::Msci | Provider::Lseg | Provider::Sp | Provider::Sustainalytics => {
                Duration::from_secs(7 * DAY)
            }
        };

        Self {
            freshness,
            default_concurrency: 2,
            requests_per_minute: 60,
            base_url: None,
        }
    }
}

/// Configuration for fetch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-provider settings
    pub providers: BTreeMap<Provider, ProviderSettings>,

    /// A run aborts its remaining queue once this many stocks failed
    pub max_failures_per_run: usize,

    /// Timeout for a single provider request
    pub request_timeout: Duration,

    /// Upper bound for the worker pool size of any run, whatever the request asks for
    pub max_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            providers: Provider::ALL
                .into_iter()
                .map(|provider| (provider, ProviderSettings::default_for(provider)))
                .collect(),
            max_failures_per_run: 10,
            request_timeout: Duration::from_secs(30),
            max_concurrency: 4,
        }
    }
}

impl FetchConfig {
    /// Create a new configuration builder
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    /// Settings for `provider`, falling back to its defaults
    pub fn settings(&self, provider: Provider) -> ProviderSettings {
        self.providers
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::default_for(provider))
    }

    /// Worker pool size for a run of `provider`
    ///
    /// The requested size, or the provider's default, capped at `max_concurrency`.
    pub fn concurrency(&self, provider: Provider, requested: Option<usize>) -> usize {
        let wanted = requested.unwrap_or_else(|| self.settings(provider).default_concurrency);
        if wanted > self.max_concurrency {
            tracing::warn!(
                provider = %provider,
                requested = wanted,
                max = self.max_concurrency,
                "requested concurrency exceeds the maximum, capping"
            );
        }
        wanted.clamp(1, self.max_concurrency.max(1))
    }

    /// Default configuration with overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Default configuration with overrides from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup
    ///
    /// Reads `RATING_<PROVIDER>_URL`, `RATING_<PROVIDER>_TTL_SECS`, `MAX_FETCH_CONCURRENCY`,
    /// `FETCH_MAX_FAILURES` and `FETCH_REQUEST_TIMEOUT_SECS`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MAX_FETCH_CONCURRENCY") {
            self.max_concurrency = parse_number("MAX_FETCH_CONCURRENCY", &value)?;
        }

        for provider in Provider::ALL {
            let prefix = provider.env_prefix();
            let settings = self
                .providers
                .entry(provider)
                .or_insert_with(|| ProviderSettings::default_for(provider));

            if let Some(url) = lookup(&format!("{prefix}_URL")).filter(|v| !v.trim().is_empty()) {
                settings.base_url = Some(url.trim().to_string());
            }

            let ttl_key = format!("{prefix}_TTL_SECS");
            if let Some(value) = lookup(&ttl_key) {
                settings.freshness = Duration::from_secs(parse_number(&ttl_key, &value)?);
            }

            settings.default_concurrency = settings.default_concurrency.min(self.max_concurrency);
        }

        if let Some(value) = lookup("FETCH_MAX_FAILURES") {
            self.max_failures_per_run = parse_number("FETCH_MAX_FAILURES", &value)?;
        }

        if let Some(value) = lookup("FETCH_REQUEST_TIMEOUT_SECS") {
            self.request_timeout =
                Duration::from_secs(parse_number("FETCH_REQUEST_TIMEOUT_SECS", &value)?);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_failures_per_run == 0 {
            return Err(FetchError::Config(
                "max_failures_per_run must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(FetchError::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(FetchError::Config(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        for (provider, settings) in &self.providers {
            if settings.default_concurrency == 0 || settings.default_concurrency > self.max_concurrency {
                return Err(FetchError::Config(format!(
                    "default concurrency for {provider} must be between 1 and {}",
                    self.max_concurrency
                )));
            }

            if settings.requests_per_minute == 0 {
                return Err(FetchError::Config(format!(
                    "requests per minute for {provider} must be greater than 0"
                )));
            }

            if let Some(base_url) = &settings.base_url {
                let url = Url::parse(base_url).map_err(|e| {
                    FetchError::Config(format!("invalid base URL for {provider}: {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(FetchError::Config(format!(
                        "base URL for {provider} must use http or https"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FetchError::Config(format!("invalid value '{value}' for {key}")))
}

/// Builder for FetchConfig
#[derive(Debug, Default)]
pub struct FetchConfigBuilder {
    providers: BTreeMap<Provider, ProviderSettings>,
    max_failures_per_run: Option<usize>,
    request_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
}

impl FetchConfigBuilder {
    fn entry(&mut self, provider: Provider) -> &mut ProviderSettings {
        self.providers
            .entry(provider)
            .or_insert_with(|| ProviderSettings::default_for(provider))
    }

    /// Set the freshness window of a provider
    pub fn freshness(mut self, provider: Provider, freshness: Duration) -> Self {
        self.entry(provider).freshness = freshness;
        self
    }

    /// Set the default worker pool size of a provider
    pub fn concurrency(mut self, provider: Provider, concurrency: usize) -> Self {
        self.entry(provider).default_concurrency = concurrency;
        self
    }

    /// Set the request pacing of a provider
    pub fn requests_per_minute(mut self, provider: Provider, requests: u32) -> Self {
        self.entry(provider).requests_per_minute = requests;
        self
    }

    /// Set the base URL of a provider
    pub fn base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.entry(provider).base_url = Some(url.into());
        self
    }

    /// Set the failure budget of a run
    pub fn max_failures_per_run(mut self, failures: usize) -> Self {
        self.max_failures_per_run = Some(failures);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the upper bound for worker pool sizes
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<FetchConfig> {
        let mut config = FetchConfig::default();
        config.providers.extend(self.providers);
        if let Some(failures) = self.max_failures_per_run {
            config.max_failures_per_run = failures;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(max) = self.max_concurrency {
            config.max_concurrency = max;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Calibration constants of the score computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum divisor of the financial sub-score sum
    pub financial_min_divisor: usize,

    /// Minimum divisor of the ESG sub-score sum
    pub esg_min_divisor: usize,

    /// Analyst metrics get full weight from this many analysts on
    pub analyst_full_weight_count: u32,

    /// Deviation from last close, in percent, that maps to a sub-score of -1
    pub price_deviation_scale: f64,

    /// LSEG and S&P scores at this value map to a sub-score of 0
    pub esg_score_midpoint: f64,

    /// Sustainalytics risk at this value maps to a sub-score of 0
    pub sustainalytics_risk_scale: f64,

    /// MSCI implied temperature rise, in °C, that maps to a sub-score of 0
    pub msci_temperature_neutral: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            financial_min_divisor: 3,
            esg_min_divisor: 4,
            analyst_full_weight_count: 10,
            price_deviation_scale: 50.0,
            esg_score_midpoint: 50.0,
            sustainalytics_risk_scale: 20.0,
            msci_temperature_neutral: 2.0,
        }
    }
}

impl ScoringConfig {
    /// Default constants with overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Default constants with overrides from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup
    ///
    /// Reads `SCORE_FINANCIAL_MIN_DIVISOR`, `SCORE_ESG_MIN_DIVISOR`,
    /// `SCORE_ANALYST_FULL_WEIGHT_COUNT`, `SCORE_PRICE_DEVIATION_SCALE`, `SCORE_ESG_MIDPOINT`,
    /// `SCORE_SUSTAINALYTICS_RISK_SCALE` and `SCORE_MSCI_TEMPERATURE_NEUTRAL`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn apply<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            target: &mut T,
        ) -> Result<()> {
            if let Some(value) = lookup(key) {
                *target = parse_number(key, &value)?;
            }
            Ok(())
        }

        apply(&lookup, "SCORE_FINANCIAL_MIN_DIVISOR", &mut self.financial_min_divisor)?;
        apply(&lookup, "SCORE_ESG_MIN_DIVISOR", &mut self.esg_min_divisor)?;
        apply(&lookup, "SCORE_ANALYST_FULL_WEIGHT_COUNT", &mut self.analyst_full_weight_count)?;
        apply(&lookup, "SCORE_PRICE_DEVIATION_SCALE", &mut self.price_deviation_scale)?;
        apply(&lookup, "SCORE_ESG_MIDPOINT", &mut self.esg_score_midpoint)?;
        apply(&lookup, "SCORE_SUSTAINALYTICS_RISK_SCALE", &mut self.sustainalytics_risk_scale)?;
        apply(&lookup, "SCORE_MSCI_TEMPERATURE_NEUTRAL", &mut self.msci_temperature_neutral)?;

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.financial_min_divisor == 0 || self.esg_min_divisor == 0 {
            return Err(FetchError::Config(
                "score divisors must be greater than 0".to_string(),
            ));
        }

        if self.analyst_full_weight_count == 0 {
            return Err(FetchError::Config(
                "analyst_full_weight_count must be greater than 0".to_string(),
            ));
        }

        let scales = [
            self.price_deviation_scale,
            self.esg_score_midpoint,
            self.sustainalytics_risk_scale,
        ];
        if scales.iter().any(|scale| !scale.is_finite() || *scale <= 0.0) {
            return Err(FetchError::Config(
                "score scales must be positive".to_string(),
            ));
        }

        if !self.msci_temperature_neutral.is_finite() {
            return Err(FetchError::Config(
                "msci_temperature_neutral must be a finite number".to_string(),
            ));
        }

        Ok(())
    }
}
