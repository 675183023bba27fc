//! External data providers
//!
//! Each provider is looked up by its own identifier stored on the stock
//! (`morningstarID`, `ric`, ...) and owns a fixed set of stock attributes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A data provider to fetch ratings from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    /// Morningstar star rating and fair value estimate
    Morningstar,
    /// MarketScreener analyst consensus and target price
    MarketScreener,
    /// MSCI ESG rating and implied temperature rise
    Msci,
    /// LSEG Data & Analytics (formerly Refinitiv) ESG and emissions scores
    Lseg,
    /// Standard & Poor's ESG score
    Sp,
    /// Morningstar Sustainalytics ESG risk
    Sustainalytics,
}

impl Provider {
    /// All providers, in the order they are usually fetched
    pub const ALL: [Provider; 6] = [
        Self::Morningstar,
        Self::MarketScreener,
        Self::Msci,
        Self::Lseg,
        Self::Sp,
        Self::Sustainalytics,
    ];

    /// Wire name used in paths, environment variables and JSON
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morningstar => "morningstar",
            Self::MarketScreener => "marketScreener",
            Self::Msci => "msci",
            Self::Lseg => "lseg",
            Self::Sp => "sp",
            Self::Sustainalytics => "sustainalytics",
        }
    }

    /// Human-readable name
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Morningstar => "Morningstar",
            Self::MarketScreener => "MarketScreener",
            Self::Msci => "MSCI",
            Self::Lseg => "LSEG Data & Analytics",
            Self::Sp => "Standard & Poor's",
            Self::Sustainalytics => "Sustainalytics",
        }
    }

    /// Name of the stock attribute holding this provider's identifier
    pub const fn id_attribute(self) -> &'static str {
        match self {
            Self::Morningstar => "morningstarID",
            Self::MarketScreener => "marketScreenerID",
            Self::Msci => "msciID",
            Self::Lseg => "ric",
            Self::Sp => "spID",
            Self::Sustainalytics => "sustainalyticsID",
        }
    }

    /// Name of the stock attribute holding the last successful fetch
    pub const fn last_fetch_attribute(self) -> &'static str {
        match self {
            Self::Morningstar => "morningstarLastFetch",
            Self::MarketScreener => "marketScreenerLastFetch",
            Self::Msci => "msciLastFetch",
            Self::Lseg => "lsegLastFetch",
            Self::Sp => "spLastFetch",
            Self::Sustainalytics => "sustainalyticsLastFetch",
        }
    }

    /// Stock attributes written by this provider and nulled by a `clear` fetch
    pub const fn attributes(self) -> &'static [&'static str] {
        match self {
            Self::Morningstar => &[
                "starRating",
                "morningstarFairValue",
                "lastClose",
                "dividendYieldPercent",
                "priceEarningRatio",
                "marketCap",
            ],
            Self::MarketScreener => &[
                "analystConsensus",
                "analystRatings",
                "analystCount",
                "analystTargetPrice",
            ],
            Self::Msci => &["msciESGRating", "msciTemperature"],
            Self::Lseg => &["lsegESGScore", "lsegEmissions"],
            Self::Sp => &["spESGScore"],
            Self::Sustainalytics => &["sustainalyticsESGRisk"],
        }
    }

    /// Path of the fetch-trigger endpoint
    pub fn endpoint_path(self) -> String {
        format!("/api/fetch/{}", self.as_str())
    }

    /// Prefix for this provider's environment variables, e.g. `RATING_MARKETSCREENER`
    pub fn env_prefix(self) -> String {
        format!("RATING_{}", self.as_str().to_ascii_uppercase())
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown data provider '{s}'")))
    }
}
