//! Rating scales reported by providers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// An analyst rating, from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalystRating {
    Sell,
    Underperform,
    Hold,
    Outperform,
    Buy,
}

impl AnalystRating {
    /// All ratings, worst first
    pub const ALL: [AnalystRating; 5] = [
        Self::Sell,
        Self::Underperform,
        Self::Hold,
        Self::Outperform,
        Self::Buy,
    ];

    /// Position on the scale, 0 (Sell) to 4 (Buy)
    pub fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sell => "Sell",
            Self::Underperform => "Underperform",
            Self::Hold => "Hold",
            Self::Outperform => "Outperform",
            Self::Buy => "Buy",
        }
    }
}

impl Display for AnalystRating {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalystRating {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rating| rating.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("'{s}' is no valid analyst rating")))
    }
}

/// MSCI ESG rating, from best (AAA) to worst (CCC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MsciEsgRating {
    Aaa,
    Aa,
    A,
    Bbb,
    Bb,
    B,
    Ccc,
}

impl MsciEsgRating {
    /// All ratings, best first
    pub const ALL: [MsciEsgRating; 7] = [
        Self::Aaa,
        Self::Aa,
        Self::A,
        Self::Bbb,
        Self::Bb,
        Self::B,
        Self::Ccc,
    ];

    /// Position on the scale, 0 (AAA) to 6 (CCC)
    pub fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aaa => "AAA",
            Self::Aa => "AA",
            Self::A => "A",
            Self::Bbb => "BBB",
            Self::Bb => "BB",
            Self::B => "B",
            Self::Ccc => "CCC",
        }
    }
}

impl Display for MsciEsgRating {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MsciEsgRating {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rating| rating.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("'{s}' is no valid MSCI ESG rating")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyst_rating_scale() {
        assert_eq!(AnalystRating::Sell.index(), 0);
        assert_eq!(AnalystRating::Buy.index(), 4);
        assert_eq!("outperform".parse::<AnalystRating>().unwrap(), AnalystRating::Outperform);
        assert!("Strong Buy".parse::<AnalystRating>().is_err());
    }

    #[test]
    fn test_msci_rating_scale() {
        assert_eq!(MsciEsgRating::Aaa.index(), 0);
        assert_eq!(MsciEsgRating::Ccc.index(), 6);
        assert_eq!("bbb".parse::<MsciEsgRating>().unwrap(), MsciEsgRating::Bbb);
        assert!("D".parse::<MsciEsgRating>().is_err());
    }

    #[test]
    fn test_msci_rating_serde() {
        let json = serde_json::to_string(&MsciEsgRating::Bbb).unwrap();
        assert_eq!(json, "\"BBB\"");
    }
}
