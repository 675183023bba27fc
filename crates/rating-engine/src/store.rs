//! Stock store seam
//!
//! The engine reads and writes stock records through [`StockStore`]; the
//! persistence layer behind it lives outside this crate.

use crate::error::{FetchError, Result};
use async_trait::async_trait;
use rating_core::{Provider, Stock};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Persistent collection of stock records keyed by ticker
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Read one stock, failing with `NotFound` for an unknown ticker
    async fn read(&self, ticker: &str) -> Result<Stock>;

    /// Read every stock, ordered by ticker
    async fn read_all(&self) -> Result<Vec<Stock>>;

    /// Replace an existing stock record
    async fn update(&self, stock: &Stock) -> Result<()>;

    /// Add a new stock record
    async fn create(&self, stock: Stock) -> Result<()>;

    /// Stocks with an identifier for `provider`, least recently fetched first
    ///
    /// Stocks never fetched from the provider come first.
    async fn read_fetchable(&self, provider: Provider) -> Result<Vec<Stock>> {
        let mut stocks: Vec<Stock> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|stock| stock.provider_id(provider).is_some())
            .collect();
        // `None` orders before `Some`, and the sort is stable
        stocks.sort_by_key(|stock| stock.last_fetch(provider));
        Ok(stocks)
    }
}

/// Store keeping all stocks in memory
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    stocks: RwLock<BTreeMap<String, Stock>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `stocks`
    pub fn with_stocks(stocks: impl IntoIterator<Item = Stock>) -> Self {
        Self {
            stocks: RwLock::new(
                stocks
                    .into_iter()
                    .map(|stock| (stock.ticker.clone(), stock))
                    .collect(),
            ),
        }
    }

    pub async fn len(&self) -> usize {
        self.stocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn read(&self, ticker: &str) -> Result<Stock> {
        self.stocks
            .read()
            .await
            .get(ticker)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("Stock {ticker} not found.")))
    }

    async fn read_all(&self) -> Result<Vec<Stock>> {
        Ok(self.stocks.read().await.values().cloned().collect())
    }

    async fn update(&self, stock: &Stock) -> Result<()> {
        let mut stocks = self.stocks.write().await;
        match stocks.get_mut(&stock.ticker) {
            Some(existing) => {
                *existing = stock.clone();
                Ok(())
            }
            None => Err(FetchError::NotFound(format!(
                "Stock {} not found.",
                stock.ticker
            ))),
        }
    }

    async fn create(&self, stock: Stock) -> Result<()> {
        let mut stocks = self.stocks.write().await;
        if stocks.contains_key(&stock.ticker) {
            return Err(FetchError::Store(format!(
                "Stock {} already exists.",
                stock.ticker
            )));
        }
        stocks.insert(stock.ticker.clone(), stock);
        Ok(())
    }
}
