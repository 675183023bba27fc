//! Score computation
//!
//! Every provider metric a stock holds is mapped to a sub-score in about
//! [-1, 1]. The financial and ESG scores are the averages of their sub-scores
//! scaled to [-100, 100], and the total score combines both so that a weak
//! result on either axis dominates.

use crate::config::ScoringConfig;
use crate::error::Result;
use crate::store::StockStore;
use rating_core::{Scope, Stock};
use std::sync::Arc;

/// Deviation of the last close from `value`, in percent
pub fn percentage_to_last_close(last_close: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (last_close, value) {
        (Some(last_close), Some(value)) if last_close != 0.0 && value != 0.0 => {
            Some(100.0 * (last_close / value - 1.0))
        }
        _ => None,
    }
}

/// Weight of analyst metrics, growing linearly up to the full-weight analyst count
fn analyst_weight(stock: &Stock, config: &ScoringConfig) -> Option<f64> {
    let count = stock.analyst_count.filter(|count| *count > 0)?;
    Some(f64::from(count.min(config.analyst_full_weight_count)) / f64::from(config.analyst_full_weight_count))
}

/// Sub-scores contributing to the financial score
pub fn financial_sub_scores(stock: &Stock, config: &ScoringConfig) -> Vec<f64> {
    let mut scores = Vec::with_capacity(4);

    if let Some(star_rating) = stock.star_rating {
        scores.push((f64::from(star_rating) - 3.0) / 2.0);
    }

    if let Some(pct) = percentage_to_last_close(stock.last_close, stock.morningstar_fair_value) {
        scores.push((-pct / config.price_deviation_scale).min(1.0));
    }

    if let Some(weight) = analyst_weight(stock, config) {
        if let Some(consensus) = stock.analyst_consensus {
            scores.push(weight * (0.5 * consensus.index() as f64 - 1.0));
        }
        if let Some(pct) = percentage_to_last_close(stock.last_close, stock.analyst_target_price) {
            scores.push(weight * (-pct / config.price_deviation_scale).min(1.0));
        }
    }

    scores
}

/// Sub-scores contributing to the ESG score
pub fn esg_sub_scores(stock: &Stock, config: &ScoringConfig) -> Vec<f64> {
    let midpoint = config.esg_score_midpoint;
    let mut scores = Vec::with_capacity(6);

    if let Some(rating) = stock.msci_esg_rating {
        scores.push(1.0 - 0.5 * rating.index() as f64);
    }
    if let Some(temperature) = stock.msci_temperature {
        scores.push((config.msci_temperature_neutral - temperature).min(1.0));
    }
    for score in [stock.lseg_esg_score, stock.lseg_emissions, stock.sp_esg_score]
        .into_iter()
        .flatten()
    {
        scores.push((score - midpoint) / midpoint);
    }
    if let Some(risk) = stock.sustainalytics_esg_risk {
        scores.push(1.0 - risk / config.sustainalytics_risk_scale);
    }

    scores
}

fn normalize(scores: &[f64], min_divisor: usize) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let divisor = scores.len().max(min_divisor) as f64;
    100.0 * (scores.iter().sum::<f64>() / divisor).max(-1.0)
}

pub fn financial_score(stock: &Stock, config: &ScoringConfig) -> f64 {
    normalize(&financial_sub_scores(stock, config), config.financial_min_divisor)
}

pub fn esg_score(stock: &Stock, config: &ScoringConfig) -> f64 {
    normalize(&esg_sub_scores(stock, config), config.esg_min_divisor)
}

/// Harmonic mean of both scores when both are positive, otherwise the lower one
pub fn total_score(financial_score: f64, esg_score: f64) -> f64 {
    if financial_score > 0.0 && esg_score > 0.0 {
        2.0 * financial_score * esg_score / (financial_score + esg_score)
    } else {
        financial_score.min(esg_score)
    }
}

/// Score as shown to users: negatives clamped to 0, rounded to two decimals
pub fn display_score(score: f64) -> f64 {
    (score.max(0.0) * 100.0).round() / 100.0
}

/// Recompute all derived attributes of a stock in place
pub fn compute(stock: &mut Stock, config: &ScoringConfig) {
    stock.morningstar_fair_value_percentage_to_last_close =
        percentage_to_last_close(stock.last_close, stock.morningstar_fair_value);
    stock.analyst_target_price_percentage_to_last_close =
        percentage_to_last_close(stock.last_close, stock.analyst_target_price);

    stock.financial_score = financial_score(stock, config);
    stock.esg_score = esg_score(stock, config);
    stock.total_score = total_score(stock.financial_score, stock.esg_score);
}

/// Recomputes and stores scores of stocks
#[derive(Clone)]
pub struct ScoreEngine {
    store: Arc<dyn StockStore>,
    config: ScoringConfig,
}

impl ScoreEngine {
    /// Create an engine, rejecting invalid calibration constants
    pub fn new(store: Arc<dyn StockStore>, config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Recompute the scores of one or all stocks, returning the number of stocks updated
    pub async fn recompute(&self, scope: &Scope) -> Result<usize> {
        let stocks = match scope {
            Scope::Ticker(ticker) => vec![self.store.read(ticker).await?],
            Scope::All => self.store.read_all().await?,
        };

        let mut updated = 0;
        for mut stock in stocks {
            compute(&mut stock, &self.config);
            self.store.update(&stock).await?;
            updated += 1;
        }

        tracing::info!(%scope, stocks = updated, "scores recomputed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStockStore;
    use rating_core::{AnalystRating, MsciEsgRating};

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn blank(ticker: &str) -> Stock {
        Stock::new(ticker, format!("{ticker} Inc."), "US0000000000", "US")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_total_score_harmonic_mean() {
        assert_close(total_score(80.0, 60.0), 2.0 * 80.0 * 60.0 / 140.0);
        assert_eq!(display_score(total_score(80.0, 60.0)), 68.57);
    }

    #[test]
    fn test_total_score_zero_and_equal() {
        assert_eq!(total_score(0.0, 75.0), 0.0);
        assert_eq!(total_score(42.0, 0.0), 0.0);
        assert_close(total_score(55.5, 55.5), 55.5);
        assert_eq!(total_score(-20.0, 50.0), -20.0);
    }

    #[test]
    fn test_display_score() {
        assert_eq!(display_score(-12.5), 0.0);
        assert_eq!(display_score(33.3333), 33.33);
    }

    #[test]
    fn test_no_metrics_scores_zero() {
        let mut stock = blank("NONE");
        compute(&mut stock, &config());
        assert_eq!(stock.financial_score, 0.0);
        assert_eq!(stock.esg_score, 0.0);
        assert_eq!(stock.total_score, 0.0);
    }

    #[test]
    fn test_financial_score() {
        let mut stock = blank("AAPL");
        stock.star_rating = Some(5);
        stock.last_close = Some(100.0);
        stock.morningstar_fair_value = Some(125.0);
        stock.analyst_consensus = Some(AnalystRating::Buy);
        stock.analyst_count = Some(5);

        // 1 + 0.4 + 0.5 * 1 over three metrics
        let expected = 100.0 * (1.0 + 0.4 + 0.5) / 3.0;
        assert_close(financial_score(&stock, &config()), expected);
    }

    #[test]
    fn test_analyst_metrics_need_analysts() {
        let mut stock = blank("AAPL");
        stock.analyst_consensus = Some(AnalystRating::Buy);
        stock.analyst_count = Some(0);
        assert!(financial_sub_scores(&stock, &config()).is_empty());
    }

    #[test]
    fn test_esg_score_is_floored() {
        let mut stock = blank("XOM");
        stock.msci_esg_rating = Some(MsciEsgRating::Ccc);
        stock.sustainalytics_esg_risk = Some(60.0);
        // (-2 - 2) / 4 = -1
        assert_close(esg_score(&stock, &config()), -100.0);
    }

    #[test]
    fn test_esg_score() {
        let mut stock = blank("MSFT");
        stock.msci_esg_rating = Some(MsciEsgRating::Aaa);
        stock.msci_temperature = Some(1.5);
        stock.lseg_esg_score = Some(75.0);
        stock.lseg_emissions = Some(100.0);
        stock.sp_esg_score = Some(50.0);
        stock.sustainalytics_esg_risk = Some(10.0);

        // 1 + 0.5 + 0.5 + 1 + 0 + 0.5 over 6 metrics
        assert_close(esg_score(&stock, &config()), 100.0 * 3.5 / 6.0);
    }

    #[test]
    fn test_percentage_to_last_close() {
        assert_close(percentage_to_last_close(Some(110.0), Some(100.0)).unwrap(), 10.0);
        assert_eq!(percentage_to_last_close(None, Some(100.0)), None);
        assert_eq!(percentage_to_last_close(Some(110.0), Some(0.0)), None);
    }

    #[tokio::test]
    async fn test_recompute_all() {
        let mut good = blank("GOOD");
        good.star_rating = Some(5);
        good.sustainalytics_esg_risk = Some(0.0);
        let store = Arc::new(InMemoryStockStore::with_stocks([good, blank("NONE")]));
        let engine = ScoreEngine::new(store.clone(), config()).unwrap();

        assert_eq!(engine.recompute(&Scope::All).await.unwrap(), 2);

        let good = store.read("GOOD").await.unwrap();
        // 1/3 and 1/4 of the way to the maximum
        assert_close(good.financial_score, 100.0 / 3.0);
        assert_close(good.esg_score, 25.0);
        assert_close(good.total_score, total_score(100.0 / 3.0, 25.0));
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = ScoringConfig {
            analyst_full_weight_count: 0,
            ..ScoringConfig::default()
        };
        let result = ScoreEngine::new(Arc::new(InMemoryStockStore::new()), config);
        assert!(matches!(result, Err(crate::error::FetchError::Config(_))));
    }

    #[tokio::test]
    async fn test_recompute_unknown_ticker() {
        let engine = ScoreEngine::new(Arc::new(InMemoryStockStore::new()), config()).unwrap();
        assert!(engine.recompute(&Scope::Ticker("NOPE".to_string())).await.is_err());
    }
}
