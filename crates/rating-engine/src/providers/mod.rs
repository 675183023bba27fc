//! Provider adapters
//!
//! One [`ProviderAdapter`] per data provider turns a provider identifier into a
//! classified [`ProviderResult`]. Adapters never touch the store; merging the
//! returned patch is up to the orchestrator.

mod lseg;
mod market_screener;
mod morningstar;
mod msci;
mod sp;
mod sustainalytics;
mod transport;

pub use lseg::LsegAdapter;
pub use market_screener::MarketScreenerAdapter;
pub use morningstar::MorningstarAdapter;
pub use msci::MsciAdapter;
pub use sp::SpAdapter;
pub use sustainalytics::SustainalyticsAdapter;
pub use transport::{HttpTransport, classify_status};

use crate::config::FetchConfig;
use crate::error::Result;
use async_trait::async_trait;
use rating_core::{Provider, StockPatch};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of one adapter invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    /// Attributes reported by the provider
    Success(StockPatch),
    /// The adapter cannot run, e.g. without a base URL
    NotConfigured,
    /// The provider declined due to quota
    RateLimited,
    /// Transient network or parsing failure
    Unreachable(String),
    /// The data exists but needs a paid subscription
    PremiumRequired,
    /// The provider does not know the identifier
    NotFound,
}

impl ProviderResult {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotConfigured => "not configured",
            Self::RateLimited => "rate limited",
            Self::Unreachable(_) => "unreachable",
            Self::PremiumRequired => "premium required",
            Self::NotFound => "not found",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for ProviderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Retrieves data for one provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter talks to
    fn provider(&self) -> Provider;

    /// Fetch the attributes of the stock identified by `provider_id`
    async fn fetch(&self, provider_id: &str) -> ProviderResult;

    /// Drop anything cached between runs so the next fetch reaches the provider
    async fn refresh(&self) {}
}

/// Adapters keyed by provider
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any adapter for the same provider
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Get the adapter for a provider
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Providers with a registered adapter
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.adapters.keys().copied().collect();
        providers.sort();
        providers
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Register an HTTP adapter for every provider with a base URL
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let mut registry = Self::new();

        for provider in Provider::ALL {
            let settings = config.settings(provider);
            let Some(base_url) = settings.base_url.as_deref() else {
                tracing::debug!(provider = %provider, "no base URL, adapter not configured");
                continue;
            };

            let transport = HttpTransport::new(
                provider,
                base_url,
                settings.requests_per_minute,
                config.request_timeout,
            )?;

            let adapter: Arc<dyn ProviderAdapter> = match provider {
                Provider::Morningstar => Arc::new(MorningstarAdapter::new(transport)),
                Provider::MarketScreener => Arc::new(MarketScreenerAdapter::new(transport)),
                Provider::Msci => Arc::new(MsciAdapter::new(transport)),
                Provider::Lseg => Arc::new(LsegAdapter::new(transport)),
                Provider::Sp => Arc::new(SpAdapter::new(transport)),
                Provider::Sustainalytics => {
                    Arc::new(SustainalyticsAdapter::new(transport, settings.freshness))
                }
            };
            registry.register(adapter);
        }

        tracing::info!(adapters = registry.len(), "provider adapters registered");
        Ok(registry)
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
