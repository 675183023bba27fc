//! MarketScreener analyst consensus, ratings and target price

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use rating_core::{AnalystRating, Provider, StockPatch};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static CODE_ZB: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"-([0-9]+)$").ok());

/// Numeric instrument code at the end of a MarketScreener identifier,
/// e.g. `4849` in `APPLE-INC-4849`
pub fn code_zb(market_screener_id: &str) -> Option<u64> {
    CODE_ZB
        .as_ref()?
        .captures(market_screener_id)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingCount {
    pub name: String,
    pub y: u32,
}

/// Analyst consensus as reported by MarketScreener
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketScreenerConsensus {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub data: Vec<Vec<RatingCount>>,
    pub analyst_count: Option<u32>,
    pub average_target_price: Option<f64>,
}

impl MarketScreenerConsensus {
    /// Counts per rating, present only when all five ratings are reported
    fn ratings(&self) -> Option<BTreeMap<AnalystRating, u32>> {
        let counts = self.data.first()?;
        AnalystRating::ALL
            .into_iter()
            .map(|rating| {
                counts
                    .iter()
                    .find(|count| count.name.eq_ignore_ascii_case(rating.as_str()))
                    .map(|count| (rating, count.y))
            })
            .collect()
    }

    pub fn into_result(self) -> ProviderResult {
        if self.error {
            return ProviderResult::Unreachable(
                "the server reported an error when fetching analyst ratings".to_string(),
            );
        }

        let analyst_ratings = self.ratings();
        let rated: u32 = analyst_ratings.as_ref().map_or(0, |ratings| ratings.values().sum());

        ProviderResult::Success(StockPatch {
            analyst_consensus: analyst_ratings.as_ref().and_then(consensus),
            analyst_count: self.analyst_count.or((rated > 0).then_some(rated)),
            analyst_target_price: self.average_target_price,
            analyst_ratings,
            ..StockPatch::default()
        })
    }
}

/// Rating at the count-weighted mean position of the scale
pub fn consensus(ratings: &BTreeMap<AnalystRating, u32>) -> Option<AnalystRating> {
    let total: u32 = ratings.values().sum();
    if total == 0 {
        return None;
    }

    let weighted: f64 = ratings
        .iter()
        .map(|(rating, count)| rating.index() as f64 * f64::from(*count))
        .sum();
    let index = (weighted / f64::from(total)).round() as usize;
    AnalystRating::ALL.get(index).copied()
}

/// Adapter for MarketScreener
#[derive(Debug, Clone)]
pub struct MarketScreenerAdapter {
    transport: HttpTransport,
}

impl MarketScreenerAdapter {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for MarketScreenerAdapter {
    fn provider(&self) -> Provider {
        Provider::MarketScreener
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        let Some(code) = code_zb(provider_id) else {
            tracing::warn!(id = provider_id, "unable to extract ZB code from MarketScreener ID");
            return ProviderResult::NotFound;
        };

        let code = code.to_string();
        match self
            .transport
            .get_json::<MarketScreenerConsensus>(&["consensus", &code], &[])
            .await
        {
            Ok(consensus) => consensus.into_result(),
            Err(outcome) => outcome,
        }
    }
}
