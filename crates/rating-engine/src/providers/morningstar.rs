//! Morningstar star rating, fair value and quote data

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use rating_core::{Provider, StockPatch};
use serde::Deserialize;

/// Quote data as reported by Morningstar
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorningstarQuote {
    pub star_rating: Option<u8>,
    pub fair_value: Option<f64>,
    pub last_close: Option<f64>,
    pub dividend_yield_percent: Option<f64>,
    pub price_earning_ratio: Option<f64>,
    pub market_cap: Option<f64>,
}

impl MorningstarQuote {
    /// Patch of the attributes Morningstar owns
    pub fn into_patch(self) -> StockPatch {
        StockPatch {
            star_rating: self.star_rating.filter(|rating| (1..=5).contains(rating)),
            morningstar_fair_value: self.fair_value,
            last_close: self.last_close,
            dividend_yield_percent: self.dividend_yield_percent,
            price_earning_ratio: self.price_earning_ratio,
            market_cap: self.market_cap,
            ..StockPatch::default()
        }
    }
}

/// Adapter for Morningstar
#[derive(Debug, Clone)]
pub struct MorningstarAdapter {
    transport: HttpTransport,
}

impl MorningstarAdapter {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for MorningstarAdapter {
    fn provider(&self) -> Provider {
        Provider::Morningstar
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        match self
            .transport
            .get_json::<MorningstarQuote>(&["stocks", provider_id, "quote"], &[])
            .await
        {
            Ok(quote) => ProviderResult::Success(quote.into_patch()),
            Err(outcome) => outcome,
        }
    }
}
