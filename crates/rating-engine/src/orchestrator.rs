//! Fetch orchestration
//!
//! A fetch run resolves its work list, drops stocks the skip policy rules out
//! and feeds the rest through a bounded pool of workers sharing one queue.
//! Each worker owns the stock it is processing until it has been written back.

use crate::config::{FetchConfig, ScoringConfig};
use crate::error::{FetchError, Result};
use crate::providers::{AdapterRegistry, ProviderAdapter, ProviderResult};
use crate::scoring;
use crate::store::StockStore;
use crate::tracker::{FetchStateTracker, SkipReason};
use chrono::Utc;
use rating_core::{Provider, Scope, Stock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Options of a fetch request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    /// Fetch even if the last fetch is recent
    pub no_skip: bool,
    /// Null the provider's attributes before merging new ones
    pub clear: bool,
    /// Acknowledge immediately and fetch in the background
    pub detach: bool,
    /// Worker pool size, defaulting to the provider's setting
    pub concurrency: Option<NonZeroUsize>,
}

/// A fetch request: which stocks, which provider, how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchJob {
    pub scope: Scope,
    pub provider: Provider,
    pub options: FetchOptions,
}

impl FetchJob {
    pub fn new(scope: Scope, provider: Provider) -> Self {
        Self {
            scope,
            provider,
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }
}

/// Why fetching a single stock failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "reason")]
pub enum FailureKind {
    RateLimited,
    Unreachable(String),
    NotFound,
    PremiumRequired,
}

impl FailureKind {
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::RateLimited => FetchStatus::RateLimited,
            Self::Unreachable(_) => FetchStatus::BadGateway,
            Self::NotFound => FetchStatus::NotFound,
            Self::PremiumRequired => FetchStatus::PremiumRequired,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited"),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            Self::NotFound => f.write_str("not found"),
            Self::PremiumRequired => f.write_str("premium required"),
        }
    }
}

/// A stock that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub ticker: String,
    pub kind: FailureKind,
}

/// Overall status of a fetch run, in increasing severity after `Success`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FetchStatus {
    Success,
    NoContent,
    PremiumRequired,
    NotFound,
    BadGateway,
    RateLimited,
}

/// Aggregated result of a fetch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub provider: Provider,
    /// Updated records of successfully fetched stocks
    pub successful: Vec<Stock>,
    /// Tickers skipped by the skip policy
    pub skipped: Vec<String>,
    pub failed: Vec<FetchFailure>,
    /// Tickers left unprocessed after the run was aborted
    pub aborted: Vec<String>,
    /// The provider rate-limited the run
    pub rate_limited: bool,
}

impl FetchOutcome {
    fn empty(provider: Provider) -> Self {
        Self {
            provider,
            successful: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            aborted: Vec::new(),
            rate_limited: false,
        }
    }

    /// Success when a stock succeeded and no rate limit was hit, otherwise the most severe outcome
    pub fn status(&self) -> FetchStatus {
        if self.rate_limited {
            return FetchStatus::RateLimited;
        }
        if !self.successful.is_empty() {
            return FetchStatus::Success;
        }
        self.failed
            .iter()
            .map(|failure| failure.kind.status())
            .max()
            .unwrap_or(FetchStatus::NoContent)
    }

    /// The error to surface for a failed run
    pub fn error(&self) -> Option<FetchError> {
        let name = self.provider.display_name();
        match self.status() {
            FetchStatus::Success | FetchStatus::NoContent => None,
            FetchStatus::RateLimited => Some(FetchError::RateLimited {
                provider: self.provider,
            }),
            FetchStatus::BadGateway => {
                let failures: Vec<String> = self
                    .failed
                    .iter()
                    .map(|failure| format!("{} ({})", failure.ticker, failure.kind))
                    .collect();
                Some(FetchError::BadGateway(format!(
                    "Unable to fetch {name} data for {}",
                    failures.join(", ")
                )))
            }
            FetchStatus::NotFound => {
                let tickers = self.tickers_with(&FailureKind::NotFound);
                Some(FetchError::NotFound(format!(
                    "{name} does not know {}",
                    tickers.join(", ")
                )))
            }
            FetchStatus::PremiumRequired => Some(FetchError::PremiumRequired {
                provider: self.provider,
                ticker: self.tickers_with(&FailureKind::PremiumRequired).join(", "),
            }),
        }
    }

    fn tickers_with(&self, kind: &FailureKind) -> Vec<String> {
        self.failed
            .iter()
            .filter(|failure| &failure.kind == kind)
            .map(|failure| failure.ticker.clone())
            .collect()
    }
}

/// Flags shared by the workers of one run
#[derive(Debug, Default)]
struct RunState {
    abort: AtomicBool,
    rate_limited: AtomicBool,
    failures: AtomicUsize,
}

#[derive(Debug, Default)]
struct WorkerReport {
    successful: Vec<Stock>,
    failed: Vec<FetchFailure>,
}

/// Everything a worker needs, owned so it can be moved into a task
#[derive(Clone)]
struct Worker {
    provider: Provider,
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn StockStore>,
    tracker: FetchStateTracker,
    scoring: ScoringConfig,
    clear: bool,
    max_failures: usize,
    queue: Arc<Mutex<VecDeque<Stock>>>,
    state: Arc<RunState>,
}

impl Worker {
    async fn run(self) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();

        while !self.state.abort.load(Ordering::SeqCst) {
            let Some(stock) = self.queue.lock().await.pop_front() else {
                break;
            };

            if let Err(e) = self.process(stock, &mut report).await {
                self.state.abort.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }

        Ok(report)
    }

    async fn process(&self, mut stock: Stock, report: &mut WorkerReport) -> Result<()> {
        let Some(provider_id) = stock.provider_id(self.provider) else {
            return Ok(());
        };

        let mut dirty = self.clear;
        if self.clear {
            stock.clear_provider_attributes(self.provider);
        }

        let result = self.adapter.fetch(&provider_id).await;
        let failure = match result {
            ProviderResult::Success(patch) => {
                let written = stock.merge_patch(self.provider, &patch);
                self.tracker.record_success(&mut stock, self.provider, Utc::now());
                tracing::debug!(provider = %self.provider, ticker = %stock.ticker, attributes = written, "fetched stock");
                dirty = true;
                None
            }
            ProviderResult::PremiumRequired => {
                // Permanent answer, so do not retry before the freshness window elapses
                stock.set_last_fetch(self.provider, Some(Utc::now()));
                dirty = true;
                Some(FailureKind::PremiumRequired)
            }
            ProviderResult::NotFound => Some(FailureKind::NotFound),
            ProviderResult::RateLimited => Some(FailureKind::RateLimited),
            ProviderResult::Unreachable(reason) => Some(FailureKind::Unreachable(reason)),
            ProviderResult::NotConfigured => Some(FailureKind::Unreachable(format!(
                "{} adapter is not configured",
                self.provider.display_name()
            ))),
        };

        if dirty {
            scoring::compute(&mut stock, &self.scoring);
            self.store.update(&stock).await?;
        }

        match failure {
            None => report.successful.push(stock),
            Some(kind) => self.record_failure(stock.ticker, kind, report),
        }
        Ok(())
    }

    fn record_failure(&self, ticker: String, kind: FailureKind, report: &mut WorkerReport) {
        if kind == FailureKind::RateLimited {
            tracing::error!(provider = %self.provider, ticker = %ticker, "rate limit exceeded, aborting fetch run");
            self.state.rate_limited.store(true, Ordering::SeqCst);
            self.state.abort.store(true, Ordering::SeqCst);
        } else {
            tracing::warn!(provider = %self.provider, ticker = %ticker, reason = %kind, "fetch failed");
            let failures = self.state.failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= self.max_failures && !self.state.abort.swap(true, Ordering::SeqCst) {
                tracing::error!(
                    provider = %self.provider,
                    failures,
                    "too many failures, aborting fetch run"
                );
            }
        }

        report.failed.push(FetchFailure { ticker, kind });
    }
}

/// A fetch run whose work list has been resolved but not yet processed
pub struct FetchPlan {
    provider: Provider,
    adapter: Arc<dyn ProviderAdapter>,
    options: FetchOptions,
    scope: Scope,
    queue: VecDeque<Stock>,
    outcome: FetchOutcome,
}

impl FetchPlan {
    /// Tickers that will be sent to the provider
    pub fn queued(&self) -> Vec<&str> {
        self.queue.iter().map(|stock| stock.ticker.as_str()).collect()
    }

    /// Tickers dropped by the skip policy
    pub fn skipped(&self) -> &[String] {
        &self.outcome.skipped
    }

    /// Whether the run would not call the provider at all
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for FetchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPlan")
            .field("provider", &self.provider)
            .field("scope", &self.scope)
            .field("queued", &self.queued())
            .field("skipped", &self.outcome.skipped)
            .finish_non_exhaustive()
    }
}

/// Runs fetch jobs against the registered provider adapters
#[derive(Clone)]
pub struct FetchOrchestrator {
    store: Arc<dyn StockStore>,
    registry: AdapterRegistry,
    config: FetchConfig,
    tracker: FetchStateTracker,
    scoring: ScoringConfig,
}

impl FetchOrchestrator {
    /// Create an orchestrator, rejecting invalid fetch or scoring configuration
    pub fn new(
        store: Arc<dyn StockStore>,
        registry: AdapterRegistry,
        config: FetchConfig,
        scoring: ScoringConfig,
    ) -> Result<Self> {
        config.validate()?;
        scoring.validate()?;

        let tracker = FetchStateTracker::new(&config);
        Ok(Self {
            store,
            registry,
            config,
            tracker,
            scoring,
        })
    }

    pub fn store(&self) -> &Arc<dyn StockStore> {
        &self.store
    }

    pub fn tracker(&self) -> &FetchStateTracker {
        &self.tracker
    }

    /// Run a fetch job to completion
    pub async fn run(&self, job: &FetchJob) -> Result<FetchOutcome> {
        self.run_fetch(&job.scope, job.provider, &job.options).await
    }

    /// Fetch `provider` data for the stocks in `scope`
    ///
    /// Fails with `NotConfigured` when no adapter is registered for the provider and
    /// with `NotFound` when a single requested stock does not exist or has no
    /// identifier for the provider. Per-stock failures are reported in the outcome.
    pub async fn run_fetch(
        &self,
        scope: &Scope,
        provider: Provider,
        options: &FetchOptions,
    ) -> Result<FetchOutcome> {
        let plan = self.prepare(scope, provider, options).await?;
        self.execute(plan).await
    }

    /// Resolve the work list of a run and apply the skip policy, without calling the provider
    pub async fn prepare(
        &self,
        scope: &Scope,
        provider: Provider,
        options: &FetchOptions,
    ) -> Result<FetchPlan> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or(FetchError::NotConfigured { provider })?;

        let candidates = match scope {
            Scope::Ticker(ticker) => {
                let stock = self.store.read(ticker).await?;
                if stock.provider_id(provider).is_none() {
                    return Err(FetchError::NotFound(format!(
                        "Stock {ticker} does not have a {} ID.",
                        provider.display_name()
                    )));
                }
                vec![stock]
            }
            Scope::All => self.store.read_fetchable(provider).await?,
        };

        let mut outcome = FetchOutcome::empty(provider);
        let now = Utc::now();
        let mut queue = VecDeque::with_capacity(candidates.len());
        for stock in candidates {
            match self.tracker.skip_reason(&stock, provider, options.no_skip, now) {
                None => queue.push_back(stock),
                Some(SkipReason::Fresh { last_fetch }) => {
                    tracing::debug!(provider = %provider, ticker = %stock.ticker, %last_fetch, "skipping, fetched recently");
                    outcome.skipped.push(stock.ticker);
                }
                Some(SkipReason::MissingIdentifier) => outcome.skipped.push(stock.ticker),
            }
        }

        Ok(FetchPlan {
            provider,
            adapter,
            options: options.clone(),
            scope: scope.clone(),
            queue,
            outcome,
        })
    }

    /// Process a prepared run through the worker pool
    pub async fn execute(&self, plan: FetchPlan) -> Result<FetchOutcome> {
        let FetchPlan {
            provider,
            adapter,
            options,
            scope,
            queue,
            mut outcome,
        } = plan;

        if queue.is_empty() {
            tracing::info!(provider = %provider, %scope, skipped = outcome.skipped.len(), "nothing to fetch");
            return Ok(outcome);
        }

        if options.no_skip {
            adapter.refresh().await;
        }

        let requested = options.concurrency.map(NonZeroUsize::get);
        let concurrency = self
            .config
            .concurrency(provider, requested)
            .min(queue.len());
        tracing::info!(provider = %provider, %scope, queued = queue.len(), concurrency, "starting fetch run");

        let queue = Arc::new(Mutex::new(queue));
        let state = Arc::new(RunState::default());
        let worker = Worker {
            provider,
            adapter,
            store: Arc::clone(&self.store),
            tracker: self.tracker.clone(),
            scoring: self.scoring.clone(),
            clear: options.clear,
            max_failures: self.config.max_failures_per_run,
            queue: Arc::clone(&queue),
            state: Arc::clone(&state),
        };

        let handles: Vec<_> = (0..concurrency)
            .map(|_| tokio::spawn(worker.clone().run()))
            .collect();
        let results = futures::future::join_all(handles).await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(Ok(report)) => {
                    outcome.successful.extend(report.successful);
                    outcome.failed.extend(report.failed);
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(FetchError::BadGateway(format!("fetch worker failed: {e}")));
                }
            }
        }
        if let Some(e) = first_error {
            tracing::error!(provider = %provider, error = %e, "fetch run failed");
            return Err(e);
        }

        outcome.aborted = queue.lock().await.drain(..).map(|stock| stock.ticker).collect();
        outcome.rate_limited = state.rate_limited.load(Ordering::SeqCst);
        outcome.successful.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        tracing::info!(
            provider = %provider,
            successful = outcome.successful.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            aborted = outcome.aborted.len(),
            status = ?outcome.status(),
            "fetch run finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProviderAdapter;
    use crate::store::InMemoryStockStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use rating_core::{MsciEsgRating, StockPatch};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn stock(ticker: &str) -> Stock {
        Stock::new(ticker, format!("{ticker} Inc."), "US0000000000", "US")
    }

    fn msci_stock(ticker: &str) -> Stock {
        stock(ticker)
            .with_provider_id(Provider::Msci, format!("IID-{ticker}"))
            .unwrap()
    }

    fn msci_patch() -> StockPatch {
        StockPatch {
            msci_esg_rating: Some(MsciEsgRating::Aa),
            ..StockPatch::default()
        }
    }

    fn orchestrator(
        store: Arc<InMemoryStockStore>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> FetchOrchestrator {
        FetchOrchestrator::new(
            store,
            AdapterRegistry::new().with(adapter),
            FetchConfig::default(),
            ScoringConfig::default(),
        )
        .unwrap()
    }

    /// Adapter answering from a script and observing calls
    struct ScriptedAdapter {
        provider: Provider,
        delay: Duration,
        answer: Box<dyn Fn(&str) -> ProviderResult + Send + Sync>,
        calls: StdMutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(
            provider: Provider,
            answer: impl Fn(&str) -> ProviderResult + Send + Sync + 'static,
        ) -> Self {
            Self {
                provider,
                delay: Duration::ZERO,
                answer: Box::new(answer),
                calls: StdMutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch(&self, provider_id: &str) -> ProviderResult {
            self.calls.lock().unwrap().push(provider_id.to_string());
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.answer)(provider_id)
        }
    }

    #[tokio::test]
    async fn test_fresh_stocks_cause_no_adapter_calls() {
        let now = Utc::now();
        let mut fresh = msci_stock("AAPL");
        fresh.msci_last_fetch = Some(now - ChronoDuration::hours(1));
        let store = Arc::new(InMemoryStockStore::with_stocks([fresh]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch().never();

        let outcome = orchestrator(store, Arc::new(mock))
            .run_fetch(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.skipped, vec!["AAPL".to_string()]);
        assert_eq!(outcome.status(), FetchStatus::NoContent);
    }

    #[tokio::test]
    async fn test_no_skip_fetches_fresh_stock() {
        let mut fresh = msci_stock("AAPL");
        fresh.msci_last_fetch = Some(Utc::now());
        let store = Arc::new(InMemoryStockStore::with_stocks([fresh]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_refresh().times(1).return_const(());
        mock.expect_fetch()
            .withf(|id| id == "IID-AAPL")
            .times(1)
            .returning(|_| ProviderResult::Success(msci_patch()));

        let options = FetchOptions {
            no_skip: true,
            ..FetchOptions::default()
        };
        let outcome = orchestrator(store.clone(), Arc::new(mock))
            .run_fetch(&Scope::Ticker("AAPL".to_string()), Provider::Msci, &options)
            .await
            .unwrap();

        assert_eq!(outcome.status(), FetchStatus::Success);
        assert_eq!(outcome.successful.len(), 1);
        let stored = store.read("AAPL").await.unwrap();
        assert_eq!(stored.msci_esg_rating, Some(MsciEsgRating::Aa));
        assert!(stored.esg_score > 0.0);
    }

    #[tokio::test]
    async fn test_clear_removes_omitted_attributes() {
        let mut apple = msci_stock("AAPL");
        apple.msci_esg_rating = Some(MsciEsgRating::Ccc);
        apple.msci_temperature = Some(3.2);
        let store = Arc::new(InMemoryStockStore::with_stocks([apple]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch()
            .returning(|_| ProviderResult::Success(msci_patch()));

        let options = FetchOptions {
            clear: true,
            ..FetchOptions::default()
        };
        orchestrator(store.clone(), Arc::new(mock))
            .run_fetch(&Scope::All, Provider::Msci, &options)
            .await
            .unwrap();

        let stored = store.read("AAPL").await.unwrap();
        assert_eq!(stored.msci_esg_rating, Some(MsciEsgRating::Aa));
        assert_eq!(stored.msci_temperature, None);
        assert!(stored.msci_last_fetch.is_some());
    }

    #[tokio::test]
    async fn test_without_clear_keeps_omitted_attributes() {
        let mut apple = msci_stock("AAPL");
        apple.msci_temperature = Some(3.2);
        let store = Arc::new(InMemoryStockStore::with_stocks([apple]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch()
            .returning(|_| ProviderResult::Success(msci_patch()));

        orchestrator(store.clone(), Arc::new(mock))
            .run_fetch(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(store.read("AAPL").await.unwrap().msci_temperature, Some(3.2));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let stocks: Vec<Stock> = (0..12).map(|i| msci_stock(&format!("S{i:02}"))).collect();
        let store = Arc::new(InMemoryStockStore::with_stocks(stocks));
        let adapter = Arc::new(
            ScriptedAdapter::new(Provider::Msci, |_| ProviderResult::Success(msci_patch()))
                .with_delay(Duration::from_millis(10)),
        );

        let options = FetchOptions {
            concurrency: NonZeroUsize::new(3),
            ..FetchOptions::default()
        };
        let outcome = orchestrator(store, adapter.clone())
            .run_fetch(&Scope::All, Provider::Msci, &options)
            .await
            .unwrap();

        assert_eq!(outcome.successful.len(), 12);
        assert_eq!(adapter.calls().len(), 12);
        let max = adapter.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "{max} calls in flight");
        assert!(max >= 2, "workers did not run concurrently");
    }

    #[tokio::test]
    async fn test_requested_concurrency_is_capped_by_maximum() {
        let stocks: Vec<Stock> = (0..40).map(|i| msci_stock(&format!("S{i:02}"))).collect();
        let store = Arc::new(InMemoryStockStore::with_stocks(stocks));
        let adapter = Arc::new(
            ScriptedAdapter::new(Provider::Msci, |_| ProviderResult::Success(msci_patch()))
                .with_delay(Duration::from_millis(5)),
        );

        let orchestrator = FetchOrchestrator::new(
            store,
            AdapterRegistry::new().with(adapter.clone()),
            FetchConfig::builder().max_concurrency(2).build().unwrap(),
            ScoringConfig::default(),
        )
        .unwrap();
        let options = FetchOptions {
            concurrency: NonZeroUsize::new(1000),
            ..FetchOptions::default()
        };
        let outcome = orchestrator
            .run_fetch(&Scope::All, Provider::Msci, &options)
            .await
            .unwrap();

        assert_eq!(outcome.successful.len(), 40);
        let max = adapter.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "{max} calls in flight");
    }

    #[tokio::test]
    async fn test_prepare_resolves_work_without_provider_calls() {
        let mut fresh = msci_stock("AAPL");
        fresh.msci_last_fetch = Some(Utc::now());
        let store = Arc::new(InMemoryStockStore::with_stocks([
            fresh,
            msci_stock("MSFT"),
            stock("NOID"),
        ]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch().never();

        let orchestrator = orchestrator(store, Arc::new(mock));
        let plan = orchestrator
            .prepare(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(plan.queued(), vec!["MSFT"]);
        assert_eq!(plan.skipped(), ["AAPL".to_string()]);
        assert!(!plan.is_empty());

        let missing = orchestrator
            .prepare(
                &Scope::Ticker("NOPE".to_string()),
                Provider::Msci,
                &FetchOptions::default(),
            )
            .await;
        assert!(matches!(missing, Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_invalid_scoring_config_is_rejected() {
        let scoring = ScoringConfig {
            analyst_full_weight_count: 0,
            ..ScoringConfig::default()
        };
        let result = FetchOrchestrator::new(
            Arc::new(InMemoryStockStore::new()),
            AdapterRegistry::new(),
            FetchConfig::default(),
            scoring,
        );
        assert!(matches!(result, Err(FetchError::Config(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_halts_remaining_stocks() {
        let stocks: Vec<Stock> = (1..=10).map(|i| msci_stock(&format!("S{i:02}"))).collect();
        let store = Arc::new(InMemoryStockStore::with_stocks(stocks));
        let adapter = Arc::new(ScriptedAdapter::new(Provider::Msci, |id| {
            if id == "IID-S03" {
                ProviderResult::RateLimited
            } else {
                ProviderResult::Success(msci_patch())
            }
        }));

        let options = FetchOptions {
            concurrency: NonZeroUsize::new(1),
            ..FetchOptions::default()
        };
        let outcome = orchestrator(store.clone(), adapter.clone())
            .run_fetch(&Scope::All, Provider::Msci, &options)
            .await
            .unwrap();

        assert_eq!(adapter.calls(), vec!["IID-S01", "IID-S02", "IID-S03"]);
        assert_eq!(outcome.status(), FetchStatus::RateLimited);
        assert!(matches!(outcome.error(), Some(FetchError::RateLimited { .. })));
        assert_eq!(outcome.successful.len(), 2);
        assert_eq!(outcome.aborted.len(), 7);

        for ticker in ["S01", "S02"] {
            let stored = store.read(ticker).await.unwrap();
            assert_eq!(stored.msci_esg_rating, Some(MsciEsgRating::Aa));
        }
        for ticker in ["S03", "S04", "S10"] {
            let stored = store.read(ticker).await.unwrap();
            assert_eq!(stored.msci_esg_rating, None);
            assert_eq!(stored.msci_last_fetch, None);
        }
    }

    #[tokio::test]
    async fn test_failure_budget_aborts_run() {
        let stocks: Vec<Stock> = (1..=5).map(|i| msci_stock(&format!("S{i:02}"))).collect();
        let store = Arc::new(InMemoryStockStore::with_stocks(stocks));
        let adapter = Arc::new(ScriptedAdapter::new(Provider::Msci, |_| {
            ProviderResult::Unreachable("connection reset".to_string())
        }));

        let orchestrator = FetchOrchestrator::new(
            store,
            AdapterRegistry::new().with(adapter.clone()),
            FetchConfig::builder().max_failures_per_run(2).build().unwrap(),
            ScoringConfig::default(),
        )
        .unwrap();
        let options = FetchOptions {
            concurrency: NonZeroUsize::new(1),
            ..FetchOptions::default()
        };
        let outcome = orchestrator
            .run_fetch(&Scope::All, Provider::Msci, &options)
            .await
            .unwrap();

        assert_eq!(adapter.calls().len(), 2);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.aborted.len(), 3);
        assert!(!outcome.rate_limited);
        assert_eq!(outcome.status(), FetchStatus::BadGateway);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_not_found_without_recompute() {
        let mut apple = stock("AAPL");
        apple.financial_score = 12.0;
        let store = Arc::new(InMemoryStockStore::with_stocks([apple]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch().never();

        let result = orchestrator(store.clone(), Arc::new(mock))
            .run_fetch(
                &Scope::Ticker("AAPL".to_string()),
                Provider::Msci,
                &FetchOptions::default(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
        // Scores untouched
        assert_eq!(store.read("AAPL").await.unwrap().financial_score, 12.0);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_not_found() {
        let store = Arc::new(InMemoryStockStore::new());
        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);

        let result = orchestrator(store, Arc::new(mock))
            .run_fetch(
                &Scope::Ticker("NOPE".to_string()),
                Provider::Msci,
                &FetchOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_premium_required_is_distinct_from_bad_gateway() {
        let apple = stock("AAPL").with_provider_id(Provider::Sp, "4004205").unwrap();
        let store = Arc::new(InMemoryStockStore::with_stocks([apple]));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Sp);
        mock.expect_fetch()
            .returning(|_| ProviderResult::PremiumRequired);

        let outcome = orchestrator(store.clone(), Arc::new(mock))
            .run_fetch(
                &Scope::Ticker("AAPL".to_string()),
                Provider::Sp,
                &FetchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status(), FetchStatus::PremiumRequired);
        let err = outcome.error().unwrap();
        assert!(matches!(err, FetchError::PremiumRequired { .. }));
        assert_ne!(err.status_code(), 502);

        let stored = store.read("AAPL").await.unwrap();
        assert!(stored.sp_last_fetch.is_some());
        assert_eq!(stored.sp_esg_score, None);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_bad_gateway() {
        let store = Arc::new(InMemoryStockStore::with_stocks([msci_stock("AAPL")]));
        let orchestrator = FetchOrchestrator::new(
            store,
            AdapterRegistry::new(),
            FetchConfig::default(),
            ScoringConfig::default(),
        )
        .unwrap();

        let err = orchestrator
            .run_fetch(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotConfigured { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_empty_store_is_no_content() {
        let store = Arc::new(InMemoryStockStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Provider::Msci, |_| {
            ProviderResult::NotFound
        }));

        let outcome = orchestrator(store, adapter)
            .run_fetch(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status(), FetchStatus::NoContent);
        assert!(outcome.error().is_none());
    }

    #[tokio::test]
    async fn test_partial_success_is_success() {
        let store = Arc::new(InMemoryStockStore::with_stocks([
            msci_stock("AAPL"),
            msci_stock("MSFT"),
        ]));
        let adapter = Arc::new(ScriptedAdapter::new(Provider::Msci, |id| {
            if id == "IID-AAPL" {
                ProviderResult::NotFound
            } else {
                ProviderResult::Success(msci_patch())
            }
        }));

        let outcome = orchestrator(store, adapter)
            .run_fetch(&Scope::All, Provider::Msci, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status(), FetchStatus::Success);
        assert_eq!(outcome.failed[0].ticker, "AAPL");
        assert_eq!(outcome.failed[0].kind, FailureKind::NotFound);
    }
}
