//! Stock store backed by a JSON file

use async_trait::async_trait;
use rating_core::Stock;
use rating_engine::{FetchError, Result, StockStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Keeps all stocks in memory and rewrites the file on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    stocks: RwLock<BTreeMap<String, Stock>>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stocks: Vec<Stock> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(FetchError::Store(format!(
                    "unable to read {}: {e}",
                    path.display()
                )));
            }
        };

        tracing::debug!(path = %path.display(), stocks = stocks.len(), "stock file loaded");
        Ok(Self {
            path,
            stocks: RwLock::new(
                stocks
                    .into_iter()
                    .map(|stock| (stock.ticker.clone(), stock))
                    .collect(),
            ),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, stocks: &BTreeMap<String, Stock>) -> Result<()> {
        let list: Vec<&Stock> = stocks.values().collect();
        let json = serde_json::to_vec_pretty(&list)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            FetchError::Store(format!("unable to write {}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl StockStore for JsonFileStore {
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
        let Some(existing) = stocks.get_mut(&stock.ticker) else {
            return Err(FetchError::NotFound(format!(
                "Stock {} not found.",
                stock.ticker
            )));
        };
        *existing = stock.clone();
        self.persist(&stocks).await
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
        self.persist(&stocks).await
    }
}
