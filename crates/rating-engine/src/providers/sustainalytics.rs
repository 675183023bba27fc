//! Sustainalytics ESG risk
//!
//! Sustainalytics publishes one listing covering every rated company. It is
//! downloaded once and cached for the provider's freshness window; stocks are
//! then looked up in the cached listing. A forced run drops the cached
//! listing first.

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use cached::{Cached, TimedCache};
use rating_core::{Provider, StockPatch};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;

const LISTING_PATH: &str = "esg-risk-ratings";

static COMPANY_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^<a data-href="/([^"]+)""#).ok());
static RISK_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^<div class="col-2">\s*(\d+(\.\d+)?)"#).ok());

/// ESG risk per Sustainalytics identifier
pub type RiskListing = HashMap<String, f64>;

/// Parse the listing: a company link line followed by its risk score line
pub fn parse_listing(body: &str) -> RiskListing {
    let (Some(company_line), Some(risk_line)) = (COMPANY_LINE.as_ref(), RISK_LINE.as_ref()) else {
        return RiskListing::new();
    };

    let lines: Vec<&str> = body.lines().map(str::trim).collect();
    lines
        .windows(2)
        .filter_map(|pair| {
            let id = company_line.captures(pair[0])?.get(1)?.as_str();
            let risk = risk_line.captures(pair[1])?.get(1)?.as_str().parse().ok()?;
            Some((id.to_string(), risk))
        })
        .collect()
}

/// Adapter for Sustainalytics
pub struct SustainalyticsAdapter {
    transport: HttpTransport,
    listing: Mutex<TimedCache<&'static str, Arc<RiskListing>>>,
}

impl SustainalyticsAdapter {
    /// Create an adapter caching the listing for `ttl`
    pub fn new(transport: HttpTransport, ttl: Duration) -> Self {
        Self {
            transport,
            listing: Mutex::new(TimedCache::with_lifespan(ttl)),
        }
    }

    async fn listing(&self) -> Result<Arc<RiskListing>, ProviderResult> {
        // Held across the download so concurrent workers share one request
        let mut cache = self.listing.lock().await;
        if let Some(listing) = cache.cache_get(&LISTING_PATH) {
            tracing::debug!("using cached Sustainalytics listing");
            return Ok(Arc::clone(listing));
        }

        let body = self.transport.get_text(&[LISTING_PATH], &[]).await?;
        let listing = Arc::new(parse_listing(&body));
        if listing.is_empty() {
            return Err(ProviderResult::Unreachable(
                "Sustainalytics listing contains no ratings".to_string(),
            ));
        }

        tracing::info!(companies = listing.len(), "fetched Sustainalytics listing");
        let _ = cache.cache_set(LISTING_PATH, Arc::clone(&listing));
        Ok(listing)
    }
}

impl std::fmt::Debug for SustainalyticsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SustainalyticsAdapter")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Look up one identifier in a listing
pub fn lookup(listing: &RiskListing, provider_id: &str) -> ProviderResult {
    match listing.get(provider_id) {
        Some(risk) => ProviderResult::Success(StockPatch {
            sustainalytics_esg_risk: Some(*risk),
            ..StockPatch::default()
        }),
        None => ProviderResult::NotFound,
    }
}

#[async_trait]
impl ProviderAdapter for SustainalyticsAdapter {
    fn provider(&self) -> Provider {
        Provider::Sustainalytics
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        match self.listing().await {
            Ok(listing) => lookup(&listing, provider_id),
            Err(outcome) => outcome,
        }
    }

    async fn refresh(&self) {
        if self.listing.lock().await.cache_remove(&LISTING_PATH).is_some() {
            tracing::debug!("dropped cached Sustainalytics listing");
        }
    }
}
