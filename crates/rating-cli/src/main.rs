//! Command-line interface for rating-tracker

mod store;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use rating_core::{AccessRights, Provider, Stock};
use rating_engine::routes::COMPUTE_PATH;
use rating_engine::scoring::display_score;
use rating_engine::{
    AdapterRegistry, FetchConfig, FetchOrchestrator, JobDispatcher, Method, RouteRequest,
    RouteResponse, RouteTable, ScoreEngine, ScoringConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use store::JsonFileStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rating-tracker")]
#[command(about = "Fetch stock ratings and compute scores", long_about = None)]
struct Cli {
    /// JSON file holding the stock list
    #[arg(long, default_value = "stocks.json", global = true)]
    stocks: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch data from a provider for one or all stocks
    Fetch(FetchArgs),
    /// Recompute the scores of all stocks
    Compute,
    /// List the available endpoints
    Routes,
    /// Print the OpenAPI document
    Openapi,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Data provider, e.g. morningstar or marketScreener
    provider: Provider,

    /// Fetch a single stock
    #[arg(short, long)]
    ticker: Option<String>,

    /// Run in the background and wait for completion before exiting
    #[arg(long)]
    detach: bool,

    /// Fetch even if the data is still fresh
    #[arg(long)]
    no_skip: bool,

    /// Clear the provider's attributes before fetching
    #[arg(long)]
    clear: bool,

    /// Number of parallel workers
    #[arg(long)]
    concurrency: Option<usize>,
}

impl FetchArgs {
    fn request(&self) -> RouteRequest {
        let mut request = RouteRequest::new(Method::Post, self.provider.endpoint_path());
        if let Some(ticker) = &self.ticker {
            request = request.query("ticker", ticker.as_str());
        }
        for (name, set) in [
            ("detach", self.detach),
            ("noSkip", self.no_skip),
            ("clear", self.clear),
        ] {
            if set {
                request = request.query(name, "true");
            }
        }
        if let Some(concurrency) = self.concurrency {
            request = request.query("concurrency", concurrency.to_string());
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = rating_utils::Config::from_env()?;
    rating_utils::init_tracing_from(&app_config);

    let routes = RouteTable::new();
    let request = match &cli.command {
        Commands::Routes => {
            print_routes(&routes);
            return Ok(());
        }
        Commands::Openapi => {
            println!("{}", serde_json::to_string_pretty(&routes.openapi())?);
            return Ok(());
        }
        Commands::Fetch(args) => args.request(),
        Commands::Compute => RouteRequest::new(Method::Post, COMPUTE_PATH),
    };

    info!(app = %app_config.app_name, environment = %app_config.environment, "Starting rating-tracker");

    let config = FetchConfig::from_env().context("invalid fetch configuration")?;
    let scoring = ScoringConfig::from_env().context("invalid scoring configuration")?;
    let registry = AdapterRegistry::from_config(&config)?;
    if registry.is_empty() {
        tracing::warn!("No provider base URLs configured, fetches will fail");
    }

    let store = Arc::new(
        JsonFileStore::open(&cli.stocks)
            .await
            .with_context(|| format!("unable to open {}", cli.stocks.display()))?,
    );
    let orchestrator = FetchOrchestrator::new(store.clone(), registry, config, scoring.clone())?;
    let dispatcher = JobDispatcher::new(Arc::new(orchestrator), ScoreEngine::new(store.clone(), scoring)?);

    // The operator running the CLI may write stocks
    let rights = AccessRights::GENERAL | AccessRights::WRITE_STOCKS;
    let response = routes.handle(&dispatcher, &request, rights).await;

    let waited = dispatcher.drain().await;
    if waited > 0 {
        info!(jobs = waited, "Detached jobs finished");
    }

    report(&response)?;
    info!(path = %store.path().display(), "Stocks saved");
    Ok(())
}

fn report(response: &RouteResponse) -> anyhow::Result<()> {
    if response.status >= 400 {
        let message = response
            .body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(|message| message.as_str())
            .unwrap_or("request failed");
        bail!("{} ({})", message, response.status);
    }

    match &response.body {
        Some(body) => {
            let stocks: Vec<Stock> = serde_json::from_value(body.clone())?;
            println!("{}", stock_table(&stocks));
        }
        None => println!("Done ({})", response.status),
    }
    Ok(())
}

fn stock_table(stocks: &[Stock]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Ticker", "Name", "Financial", "ESG", "Total"]);
    for stock in stocks {
        table.add_row(vec![
            stock.ticker.clone(),
            stock.name.clone(),
            format!("{:.2}", display_score(stock.financial_score)),
            format!("{:.2}", display_score(stock.esg_score)),
            format!("{:.2}", display_score(stock.total_score)),
        ]);
    }
    table
}

fn print_routes(routes: &RouteTable) {
    let mut table = Table::new();
    table.set_header(vec!["Method", "Path", "Required rights", "Summary"]);
    for route in routes.routes() {
        let summary = route
            .spec
            .get("summary")
            .and_then(|summary| summary.as_str())
            .unwrap_or_default();
        table.add_row(vec![
            route.method.to_string(),
            route.path.clone(),
            format!("{:#010b}", route.required.bits()),
            summary.to_string(),
        ]);
    }
    println!("{table}");
}
