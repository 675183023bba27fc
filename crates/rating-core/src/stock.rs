//! The canonical stock record and provider patches

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::ratings::{AnalystRating, MsciEsgRating};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stock with its provider identifiers, provider-reported metrics and
/// derived scores
///
/// Identifiers and metrics are written only by the fetch engine, the three
/// scores only by the score computation. `total_score` is always derived from
/// `financial_score` and `esg_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub ticker: String,
    pub name: String,
    pub isin: String,
    pub country: String,

    // Morningstar
    #[serde(rename = "morningstarID")]
    pub morningstar_id: Option<String>,
    pub morningstar_last_fetch: Option<DateTime<Utc>>,
    pub star_rating: Option<u8>,
    pub morningstar_fair_value: Option<f64>,
    pub last_close: Option<f64>,
    pub dividend_yield_percent: Option<f64>,
    pub price_earning_ratio: Option<f64>,
    pub market_cap: Option<f64>,

    // MarketScreener
    #[serde(rename = "marketScreenerID")]
    pub market_screener_id: Option<String>,
    pub market_screener_last_fetch: Option<DateTime<Utc>>,
    pub analyst_consensus: Option<AnalystRating>,
    pub analyst_ratings: Option<BTreeMap<AnalystRating, u32>>,
    pub analyst_count: Option<u32>,
    pub analyst_target_price: Option<f64>,

    // MSCI
    #[serde(rename = "msciID")]
    pub msci_id: Option<String>,
    pub msci_last_fetch: Option<DateTime<Utc>>,
    #[serde(rename = "msciESGRating")]
    pub msci_esg_rating: Option<MsciEsgRating>,
    pub msci_temperature: Option<f64>,

    // LSEG
    pub ric: Option<String>,
    pub lseg_last_fetch: Option<DateTime<Utc>>,
    #[serde(rename = "lsegESGScore")]
    pub lseg_esg_score: Option<f64>,
    pub lseg_emissions: Option<f64>,

    // Standard & Poor's
    #[serde(rename = "spID")]
    pub sp_id: Option<u64>,
    pub sp_last_fetch: Option<DateTime<Utc>>,
    #[serde(rename = "spESGScore")]
    pub sp_esg_score: Option<f64>,

    // Sustainalytics
    #[serde(rename = "sustainalyticsID")]
    pub sustainalytics_id: Option<String>,
    pub sustainalytics_last_fetch: Option<DateTime<Utc>>,
    #[serde(rename = "sustainalyticsESGRisk")]
    pub sustainalytics_esg_risk: Option<f64>,

    // Derived attributes
    #[serde(default)]
    pub financial_score: f64,
    #[serde(default)]
    pub esg_score: f64,
    #[serde(default)]
    pub total_score: f64,
    pub morningstar_fair_value_percentage_to_last_close: Option<f64>,
    pub analyst_target_price_percentage_to_last_close: Option<f64>,
}

/// Attributes reported by one provider call
///
/// `None` means "not reported". Only the fields owned by the reporting
/// provider are merged into a stock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPatch {
    pub star_rating: Option<u8>,
    pub morningstar_fair_value: Option<f64>,
    pub last_close: Option<f64>,
    pub dividend_yield_percent: Option<f64>,
    pub price_earning_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub analyst_consensus: Option<AnalystRating>,
    pub analyst_ratings: Option<BTreeMap<AnalystRating, u32>>,
    pub analyst_count: Option<u32>,
    pub analyst_target_price: Option<f64>,
    #[serde(rename = "msciESGRating")]
    pub msci_esg_rating: Option<MsciEsgRating>,
    pub msci_temperature: Option<f64>,
    #[serde(rename = "lsegESGScore")]
    pub lseg_esg_score: Option<f64>,
    pub lseg_emissions: Option<f64>,
    #[serde(rename = "spESGScore")]
    pub sp_esg_score: Option<f64>,
    #[serde(rename = "sustainalyticsESGRisk")]
    pub sustainalytics_esg_risk: Option<f64>,
}

/// Expands `$action!(stock, other, fields...)` with the fields owned by a provider.
macro_rules! with_owned_fields {
    ($provider:expr, $action:ident!($($args:tt)*)) => {
        match $provider {
            Provider::Morningstar => $action!(
                $($args)*,
                star_rating,
                morningstar_fair_value,
                last_close,
                dividend_yield_percent,
                price_earning_ratio,
                market_cap
            ),
            Provider::MarketScreener => $action!(
                $($args)*,
                analyst_consensus,
                analyst_ratings,
                analyst_count,
                analyst_target_price
            ),
            Provider::Msci => $action!($($args)*, msci_esg_rating, msci_temperature),
            Provider::Lseg => $action!($($args)*, lseg_esg_score, lseg_emissions),
            Provider::Sp => $action!($($args)*, sp_esg_score),
            Provider::Sustainalytics => $action!($($args)*, sustainalytics_esg_risk),
        }
    };
}

macro_rules! clear_fields {
    ($stock:ident, $($field:ident),+) => {{
        $($stock.$field = None;)+
    }};
}

macro_rules! merge_fields {
    ($stock:ident, $patch:ident, $written:ident, $($field:ident),+) => {{
        $(
            if let Some(value) = &$patch.$field {
                $stock.$field = Some(value.clone());
                $written += 1;
            }
        )+
    }};
}

macro_rules! count_fields {
    ($patch:ident, $count:ident, $($field:ident),+) => {{
        $(
            if $patch.$field.is_some() {
                $count += 1;
            }
        )+
    }};
}

impl Stock {
    /// Create a stock with only its core information set
    pub fn new(
        ticker: impl Into<String>,
        name: impl Into<String>,
        isin: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            isin: isin.into(),
            country: country.into(),
            morningstar_id: None,
            morningstar_last_fetch: None,
            star_rating: None,
            morningstar_fair_value: None,
            last_close: None,
            dividend_yield_percent: None,
            price_earning_ratio: None,
            market_cap: None,
            market_screener_id: None,
            market_screener_last_fetch: None,
            analyst_consensus: None,
            analyst_ratings: None,
            analyst_count: None,
            analyst_target_price: None,
            msci_id: None,
            msci_last_fetch: None,
            msci_esg_rating: None,
            msci_temperature: None,
            ric: None,
            lseg_last_fetch: None,
            lseg_esg_score: None,
            lseg_emissions: None,
            sp_id: None,
            sp_last_fetch: None,
            sp_esg_score: None,
            sustainalytics_id: None,
            sustainalytics_last_fetch: None,
            sustainalytics_esg_risk: None,
            financial_score: 0.0,
            esg_score: 0.0,
            total_score: 0.0,
            morningstar_fair_value_percentage_to_last_close: None,
            analyst_target_price_percentage_to_last_close: None,
        }
    }

    /// Set the identifier used to look this stock up at `provider`
    pub fn with_provider_id(mut self, provider: Provider, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        match provider {
            Provider::Morningstar => self.morningstar_id = Some(id),
            Provider::MarketScreener => self.market_screener_id = Some(id),
            Provider::Msci => self.msci_id = Some(id),
            Provider::Lseg => self.ric = Some(id),
            Provider::Sp => {
                let sp_id = id.parse().map_err(|_| {
                    Error::InvalidInput(format!("'{id}' is no valid Standard & Poor's ID"))
                })?;
                self.sp_id = Some(sp_id);
            }
            Provider::Sustainalytics => self.sustainalytics_id = Some(id),
        }
        Ok(self)
    }

    /// The provider identifier, if one is set and non-empty
    pub fn provider_id(&self, provider: Provider) -> Option<String> {
        let id = match provider {
            Provider::Morningstar => self.morningstar_id.clone(),
            Provider::MarketScreener => self.market_screener_id.clone(),
            Provider::Msci => self.msci_id.clone(),
            Provider::Lseg => self.ric.clone(),
            Provider::Sp => self.sp_id.map(|id| id.to_string()),
            Provider::Sustainalytics => self.sustainalytics_id.clone(),
        };
        id.filter(|id| !id.trim().is_empty())
    }

    pub fn last_fetch(&self, provider: Provider) -> Option<DateTime<Utc>> {
        match provider {
            Provider::Morningstar => self.morningstar_last_fetch,
            Provider::MarketScreener => self.market_screener_last_fetch,
            Provider::Msci => self.msci_last_fetch,
            Provider::Lseg => self.lseg_last_fetch,
            Provider::Sp => self.sp_last_fetch,
            Provider::Sustainalytics => self.sustainalytics_last_fetch,
        }
    }

    pub fn set_last_fetch(&mut self, provider: Provider, at: Option<DateTime<Utc>>) {
        let slot = match provider {
            Provider::Morningstar => &mut self.morningstar_last_fetch,
            Provider::MarketScreener => &mut self.market_screener_last_fetch,
            Provider::Msci => &mut self.msci_last_fetch,
            Provider::Lseg => &mut self.lseg_last_fetch,
            Provider::Sp => &mut self.sp_last_fetch,
            Provider::Sustainalytics => &mut self.sustainalytics_last_fetch,
        };
        *slot = at;
    }

    /// Null every attribute owned by `provider`
    pub fn clear_provider_attributes(&mut self, provider: Provider) {
        let stock = self;
        with_owned_fields!(provider, clear_fields!(stock));
    }

    /// Merge the attributes of `patch` owned by `provider` into this stock.
    ///
    /// Returns the number of attributes written.
    pub fn merge_patch(&mut self, provider: Provider, patch: &StockPatch) -> usize {
        let stock = self;
        let mut written = 0;
        with_owned_fields!(provider, merge_fields!(stock, patch, written));
        written
    }
}

impl StockPatch {
    /// Number of reported attributes owned by `provider`
    pub fn owned_count(&self, provider: Provider) -> usize {
        let patch = self;
        let mut count = 0;
        with_owned_fields!(provider, count_fields!(patch, count));
        count
    }

    pub fn is_empty(&self) -> bool {
        Provider::ALL
            .into_iter()
            .all(|provider| self.owned_count(provider) == 0)
    }
}
