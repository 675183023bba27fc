//! Work scope for fetch and score operations

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Which stocks an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// A single stock, identified by its ticker
    Ticker(String),
    /// Every stock known to the store
    All,
}

impl Scope {
    /// Scope from an optional ticker, `None` meaning all stocks
    pub fn from_ticker(ticker: Option<String>) -> Self {
        ticker.map_or(Self::All, Self::Ticker)
    }

    pub fn ticker(&self) -> Option<&str> {
        match self {
            Self::Ticker(ticker) => Some(ticker),
            Self::All => None,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Ticker(_))
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticker(ticker) => write!(f, "stock {ticker}"),
            Self::All => f.write_str("all stocks"),
        }
    }
}
