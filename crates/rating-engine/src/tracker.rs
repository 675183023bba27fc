//! Fetch state tracking and the skip policy

use crate::config::FetchConfig;
use chrono::{DateTime, Utc};
use rating_core::{Provider, Stock};
use std::time::Duration;

/// Why a stock is not fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No identifier for the provider is stored
    MissingIdentifier,
    /// The last successful fetch is within the freshness window
    Fresh { last_fetch: DateTime<Utc> },
}

/// Decides whether a (stock, provider) pair needs fetching and records successes
#[derive(Debug, Clone)]
pub struct FetchStateTracker {
    freshness: [Duration; Provider::ALL.len()],
}

impl FetchStateTracker {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            freshness: Provider::ALL.map(|provider| config.settings(provider).freshness),
        }
    }

    /// Freshness window of a provider
    pub fn freshness(&self, provider: Provider) -> Duration {
        self.freshness[provider as usize]
    }

    /// The reason to skip fetching `stock` from `provider`, if any
    pub fn skip_reason(
        &self,
        stock: &Stock,
        provider: Provider,
        no_skip: bool,
        now: DateTime<Utc>,
    ) -> Option<SkipReason> {
        if stock.provider_id(provider).is_none() {
            return Some(SkipReason::MissingIdentifier);
        }
        if no_skip {
            return None;
        }

        let last_fetch = stock.last_fetch(provider)?;
        let age = now.signed_duration_since(last_fetch).to_std().unwrap_or(Duration::ZERO);
        (age < self.freshness(provider)).then_some(SkipReason::Fresh { last_fetch })
    }

    /// Whether `stock` should be fetched from `provider`
    ///
    /// A stock without an identifier for the provider is never fetched, even with `no_skip`.
    pub fn should_fetch(
        &self,
        stock: &Stock,
        provider: Provider,
        no_skip: bool,
        now: DateTime<Utc>,
    ) -> bool {
        self.skip_reason(stock, provider, no_skip, now).is_none()
    }

    /// Record a successful fetch
    pub fn record_success(&self, stock: &mut Stock, provider: Provider, at: DateTime<Utc>) {
        stock.set_last_fetch(provider, Some(at));
    }
}
