//! Multi-provider fetch and score-aggregation engine
//!
//! This crate fetches ratings and ESG metrics for stocks from six external
//! data providers, merges them into the stored stock records and derives the
//! composite scores used for ranking. It includes:
//!
//! - Provider adapters (Morningstar, MarketScreener, MSCI, LSEG, S&P, Sustainalytics)
//!   sharing a paced HTTP transport
//! - A fetch state tracker deciding which stocks need fetching
//! - A fetch orchestrator running a bounded worker pool per request
//! - A job dispatcher for synchronous and detached runs
//! - Score computation for one or all stocks
//! - A route table with access checks and an OpenAPI document
//!
//! # Example
//!
//! ```rust,ignore
//! use rating_engine::{
//!     AdapterRegistry, FetchConfig, FetchOrchestrator, InMemoryStockStore, JobDispatcher, Method,
//!     RouteRequest, RouteTable, ScoreEngine, ScoringConfig,
//! };
//! use rating_core::AccessRights;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FetchConfig::from_env()?;
//!     let scoring = ScoringConfig::from_env()?;
//!     let store = Arc::new(InMemoryStockStore::new());
//!     let registry = AdapterRegistry::from_config(&config)?;
//!
//!     let orchestrator = FetchOrchestrator::new(store.clone(), registry, config, scoring.clone())?;
//!     let dispatcher = JobDispatcher::new(Arc::new(orchestrator), ScoreEngine::new(store, scoring)?);
//!
//!     let request = RouteRequest::new(Method::Post, "/api/fetch/msci").query("ticker", "AAPL");
//!     let response = RouteTable::new()
//!         .handle(&dispatcher, &request, AccessRights::GENERAL | AccessRights::WRITE_STOCKS)
//!         .await;
//!     println!("{}", response.status);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod routes;
pub mod scoring;
pub mod store;
pub mod tracker;

// Re-export main types for convenience
pub use config::{FetchConfig, ProviderSettings, ScoringConfig};
pub use dispatcher::{DispatchResponse, JobDispatcher};
pub use error::{FetchError, Result};
pub use orchestrator::{
    FailureKind, FetchFailure, FetchJob, FetchOptions, FetchOrchestrator, FetchOutcome, FetchPlan,
    FetchStatus,
};
pub use providers::{AdapterRegistry, ProviderAdapter, ProviderResult};
pub use routes::{Method, RouteRequest, RouteResponse, RouteTable};
pub use scoring::ScoreEngine;
pub use store::{InMemoryStockStore, StockStore};
pub use tracker::FetchStateTracker;
