//! Route table for the fetch and compute endpoints
//!
//! Maps `(method, path)` to a handler, the access rights the caller needs and
//! the OpenAPI operation describing the route. Built once at startup.

use crate::dispatcher::{DispatchResponse, JobDispatcher};
use crate::error::{FetchError, Result};
use crate::orchestrator::{FetchJob, FetchOptions};
use rating_core::{AccessRights, Provider, Scope};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::LazyLock;

/// Path of the score computation endpoint
pub const COMPUTE_PATH: &str = "/api/stocks/compute";

const MAX_TICKER_LENGTH: usize = 20;

static TICKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^_?[A-Z0-9-]+(\.[A-Z]+)?$").ok());

/// Whether `ticker` is a syntactically valid ticker
pub fn is_valid_ticker(ticker: &str) -> bool {
    ticker.len() <= MAX_TICKER_LENGTH
        && TICKER.as_ref().is_some_and(|regex| regex.is_match(ticker))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete]
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FetchError::MethodNotAllowed(s.to_string()))
    }
}

/// What a route does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Fetch(Provider),
    Compute,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub required: AccessRights,
    pub handler: Handler,
    /// OpenAPI operation object
    pub spec: Value,
}

/// An incoming request, already parsed by the HTTP layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteRequest {
    pub method: Option<Method>,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Query parameters overlaid with the fields of a JSON object body
    fn parameters(&self) -> Result<Map<String, Value>> {
        let mut params: Map<String, Value> = self
            .query
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        match &self.body {
            None | Some(Value::Null) => {}
            Some(Value::Object(body)) => params.extend(body.clone()),
            Some(_) => {
                return Err(FetchError::InvalidRequest(
                    "request body must be a JSON object".to_string(),
                ));
            }
        }

        Ok(params)
    }
}

/// Status code and optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl RouteResponse {
    fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    fn error(err: &FetchError) -> Self {
        let status = err.status_code();
        Self {
            status,
            body: Some(json!({ "message": err.to_string(), "status": status })),
        }
    }
}

impl From<DispatchResponse> for RouteResponse {
    fn from(response: DispatchResponse) -> Self {
        let status = response.status_code();
        match response {
            DispatchResponse::Stocks(stocks) => Self {
                status,
                body: serde_json::to_value(stocks).ok(),
            },
            DispatchResponse::NoContent | DispatchResponse::Accepted { .. } => Self::empty(status),
        }
    }
}

fn flag(params: &Map<String, Value>, name: &str) -> Result<bool> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(value)) => Ok(*value),
        Some(Value::String(value)) => match value.as_str() {
            "true" | "" => Ok(true),
            "false" => Ok(false),
            _ => Err(FetchError::InvalidRequest(format!(
                "parameter {name} must be a boolean"
            ))),
        },
        Some(_) => Err(FetchError::InvalidRequest(format!(
            "parameter {name} must be a boolean"
        ))),
    }
}

fn concurrency(params: &Map<String, Value>) -> Result<Option<NonZeroUsize>> {
    let invalid = || FetchError::InvalidRequest("concurrency must be a positive integer".to_string());
    let value = match params.get("concurrency") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number.as_u64().ok_or_else(invalid)?,
        Some(Value::String(value)) => value.trim().parse::<u64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    let value = usize::try_from(value).map_err(|_| invalid())?;
    NonZeroUsize::new(value).map(Some).ok_or_else(invalid)
}

fn ticker(params: &Map<String, Value>) -> Result<Option<String>> {
    match params.get("ticker") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(ticker)) if is_valid_ticker(ticker) => Ok(Some(ticker.clone())),
        Some(other) => Err(FetchError::InvalidRequest(format!("invalid ticker {other}"))),
    }
}

/// Parse the fetch parameters of a request
pub fn fetch_job(provider: Provider, request: &RouteRequest) -> Result<FetchJob> {
    let params = request.parameters()?;
    let options = FetchOptions {
        no_skip: flag(&params, "noSkip")?,
        clear: flag(&params, "clear")?,
        detach: flag(&params, "detach")?,
        concurrency: concurrency(&params)?,
    };
    Ok(FetchJob::new(Scope::from_ticker(ticker(&params)?), provider).with_options(options))
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Error" }
            }
        }
    })
}

fn operation_id(provider: Provider) -> String {
    let wire_name = provider.as_str();
    let mut chars = wire_name.chars();
    let capitalized: String = chars
        .next()
        .map(|first| first.to_ascii_uppercase())
        .into_iter()
        .chain(chars)
        .collect();
    format!("fetch{capitalized}Data")
}

fn fetch_spec(provider: Provider) -> Value {
    let name = provider.display_name();
    json!({
        "tags": ["Fetch API"],
        "operationId": operation_id(provider),
        "summary": format!("Fetch {name} data"),
        "description": format!("Fetches information from {name}."),
        "parameters": [
            {
                "in": "query",
                "name": "ticker",
                "description": "The ticker of a stock to fetch. If omitted, all stocks are fetched.",
                "schema": { "type": "string", "pattern": r"^_?[A-Z0-9-]+(\.[A-Z]+)?$", "maxLength": MAX_TICKER_LENGTH }
            },
            {
                "in": "query",
                "name": "detach",
                "description": "Whether to respond immediately and fetch in the background.",
                "schema": { "type": "boolean", "default": false }
            },
            {
                "in": "query",
                "name": "noSkip",
                "description": "Whether to fetch stocks that were fetched recently.",
                "schema": { "type": "boolean", "default": false }
            },
            {
                "in": "query",
                "name": "clear",
                "description": format!("Whether to clear all {name} attributes before fetching."),
                "schema": { "type": "boolean", "default": false }
            },
            {
                "in": "query",
                "name": "concurrency",
                "description": "The number of stocks fetched in parallel.",
                "schema": { "type": "integer", "minimum": 1 }
            }
        ],
        "responses": {
            "200": {
                "description": "OK",
                "content": {
                    "application/json": {
                        "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Stock" } }
                    }
                }
            },
            "202": { "description": "Accepted" },
            "204": { "description": "No Content" },
            "400": error_response("Bad Request"),
            "401": error_response("Unauthorized"),
            "402": error_response("Payment Required"),
            "403": error_response("Forbidden"),
            "404": error_response("Not Found"),
            "429": error_response("Too Many Requests"),
            "502": error_response("Bad Gateway")
        }
    })
}

fn compute_spec() -> Value {
    json!({
        "tags": ["Stocks API"],
        "operationId": "computeStocks",
        "summary": "Compute stock scores",
        "description": "Recomputes the scores of all stocks.",
        "responses": {
            "204": { "description": "No Content" },
            "401": error_response("Unauthorized"),
            "403": error_response("Forbidden")
        }
    })
}

/// All routes served by the engine
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        let write_stocks = AccessRights::GENERAL | AccessRights::WRITE_STOCKS;

        let mut routes: Vec<Route> = Provider::ALL
            .into_iter()
            .map(|provider| Route {
                method: Method::Post,
                path: provider.endpoint_path(),
                required: write_stocks,
                handler: Handler::Fetch(provider),
                spec: fetch_spec(provider),
            })
            .collect();

        routes.push(Route {
            method: Method::Post,
            path: COMPUTE_PATH.to_string(),
            required: write_stocks,
            handler: Handler::Compute,
            spec: compute_spec(),
        });

        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve the route for a request
    pub fn resolve(&self, method: Option<Method>, path: &str) -> Result<&Route> {
        let path = path.trim_end_matches('/');
        let mut candidates = self.routes.iter().filter(|route| route.path == path).peekable();
        if candidates.peek().is_none() {
            return Err(FetchError::NotFound(format!("No endpoint found at {path}")));
        }

        let method_name = method.map_or_else(|| "unknown".to_string(), |m| m.to_string());
        candidates
            .find(|route| Some(route.method) == method)
            .ok_or(FetchError::MethodNotAllowed(method_name))
    }

    /// Authorize and run a request
    pub async fn handle(
        &self,
        dispatcher: &JobDispatcher,
        request: &RouteRequest,
        rights: AccessRights,
    ) -> RouteResponse {
        match self.try_handle(dispatcher, request, rights).await {
            Ok(response) => response.into(),
            Err(e) => {
                tracing::debug!(path = %request.path, status = e.status_code(), error = %e, "request failed");
                RouteResponse::error(&e)
            }
        }
    }

    async fn try_handle(
        &self,
        dispatcher: &JobDispatcher,
        request: &RouteRequest,
        rights: AccessRights,
    ) -> Result<DispatchResponse> {
        let route = self.resolve(request.method, &request.path)?;

        if !rights.contains(route.required) {
            return Err(if rights.is_empty() {
                FetchError::Unauthorized
            } else {
                FetchError::Forbidden
            });
        }

        match route.handler {
            Handler::Fetch(provider) => dispatcher.dispatch(fetch_job(provider, request)?).await,
            Handler::Compute => dispatcher.compute(&Scope::All).await,
        }
    }

    /// OpenAPI document of all routes
    pub fn openapi(&self) -> Value {
        let mut paths = Map::new();
        for route in &self.routes {
            let operations = paths
                .entry(route.path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(operations) = operations {
                operations.insert(route.method.as_str().to_ascii_lowercase(), route.spec.clone());
            }
        }

        json!({
            "openapi": "3.0.3",
            "info": {
                "title": "Rating Tracker Fetch API",
                "version": env!("CARGO_PKG_VERSION")
            },
            "paths": paths,
            "components": {
                "schemas": {
                    "Error": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string" },
                            "status": { "type": "integer" }
                        },
                        "required": ["message", "status"]
                    },
                    "Stock": { "type": "object" }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, ScoringConfig};
    use crate::orchestrator::FetchOrchestrator;
    use crate::providers::{AdapterRegistry, MockProviderAdapter, ProviderResult};
    use crate::scoring::ScoreEngine;
    use crate::store::{InMemoryStockStore, StockStore};
    use rating_core::{MsciEsgRating, Stock, StockPatch};
    use std::sync::Arc;

    const WRITER: AccessRights = AccessRights::from_bits(0b11);

    fn setup(stocks: Vec<Stock>) -> (RouteTable, JobDispatcher, Arc<InMemoryStockStore>) {
        let store = Arc::new(InMemoryStockStore::with_stocks(stocks));

        let mut mock = MockProviderAdapter::new();
        mock.expect_provider().return_const(Provider::Msci);
        mock.expect_fetch().returning(|_| {
            ProviderResult::Success(StockPatch {
                msci_esg_rating: Some(MsciEsgRating::A),
                ..StockPatch::default()
            })
        });

        let orchestrator = FetchOrchestrator::new(
            store.clone(),
            AdapterRegistry::new().with(Arc::new(mock)),
            FetchConfig::default(),
            ScoringConfig::default(),
        )
        .unwrap();
        let dispatcher = JobDispatcher::new(
            Arc::new(orchestrator),
            ScoreEngine::new(store.clone(), ScoringConfig::default()).unwrap(),
        );
        (RouteTable::new(), dispatcher, store)
    }

    fn apple() -> Stock {
        Stock::new("AAPL", "Apple Inc.", "US0378331005", "US")
    }

    #[test]
    fn test_ticker_validation() {
        assert!(is_valid_ticker("AAPL"));
        assert!(is_valid_ticker("BRK-B"));
        assert!(is_valid_ticker("NESN.SW"));
        assert!(is_valid_ticker("_EXAMPLE"));
        assert!(!is_valid_ticker("aapl"));
        assert!(!is_valid_ticker("AAPL.sw"));
        assert!(!is_valid_ticker("A".repeat(21).as_str()));
    }

    #[test]
    fn test_route_table_contents() {
        let table = RouteTable::new();
        assert_eq!(table.routes().len(), Provider::ALL.len() + 1);

        let route = table.resolve(Some(Method::Post), "/api/fetch/msci").unwrap();
        assert_eq!(route.handler, Handler::Fetch(Provider::Msci));
        assert!(route.required.contains(AccessRights::WRITE_STOCKS));

        assert!(matches!(
            table.resolve(Some(Method::Get), "/api/fetch/msci"),
            Err(FetchError::MethodNotAllowed(_))
        ));
        assert!(matches!(
            table.resolve(Some(Method::Post), "/api/fetch/yahoo"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_fetch_job_parameters() {
        let request = RouteRequest::new(Method::Post, "/api/fetch/lseg")
            .query("ticker", "AAPL")
            .query("noSkip", "true")
            .body(json!({ "clear": true, "concurrency": 4 }));

        let job = fetch_job(Provider::Lseg, &request).unwrap();
        assert_eq!(job.scope, Scope::Ticker("AAPL".to_string()));
        assert!(job.options.no_skip);
        assert!(job.options.clear);
        assert!(!job.options.detach);
        assert_eq!(job.options.concurrency, NonZeroUsize::new(4));
    }

    #[test]
    fn test_fetch_job_rejects_invalid_parameters() {
        let bad = [
            RouteRequest::new(Method::Post, "/api/fetch/lseg").query("ticker", "not a ticker"),
            RouteRequest::new(Method::Post, "/api/fetch/lseg").query("detach", "maybe"),
            RouteRequest::new(Method::Post, "/api/fetch/lseg").query("concurrency", "0"),
            RouteRequest::new(Method::Post, "/api/fetch/lseg").body(json!({ "concurrency": -2 })),
            RouteRequest::new(Method::Post, "/api/fetch/lseg").body(json!([1])),
        ];
        for request in bad {
            let err = fetch_job(Provider::Lseg, &request).unwrap_err();
            assert_eq!(err.status_code(), 400, "{request:?}");
        }
    }

    #[tokio::test]
    async fn test_handle_requires_rights() {
        let (table, dispatcher, _) = setup(vec![]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/msci");

        let response = table.handle(&dispatcher, &request, AccessRights::NONE).await;
        assert_eq!(response.status, 401);

        let response = table.handle(&dispatcher, &request, AccessRights::GENERAL).await;
        assert_eq!(response.status, 403);
        assert_eq!(
            response.body.as_ref().and_then(|body| body.get("status")),
            Some(&json!(403))
        );
    }

    #[tokio::test]
    async fn test_handle_fetch_single_stock() {
        let stock = apple().with_provider_id(Provider::Msci, "IID1").unwrap();
        let (table, dispatcher, store) = setup(vec![stock]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/msci").query("ticker", "AAPL");

        let response = table.handle(&dispatcher, &request, WRITER).await;

        assert_eq!(response.status, 200);
        let body = response.body.unwrap();
        assert_eq!(body[0]["msciESGRating"], "A");
        assert_eq!(
            store.read("AAPL").await.unwrap().msci_esg_rating,
            Some(MsciEsgRating::A)
        );
    }

    #[tokio::test]
    async fn test_handle_fetch_without_identifier_is_404() {
        let (table, dispatcher, _) = setup(vec![apple()]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/msci").query("ticker", "AAPL");

        let response = table.handle(&dispatcher, &request, WRITER).await;
        assert_eq!(response.status, 404);
        let body = response.body.unwrap();
        assert!(body["message"].as_str().unwrap().contains("MSCI"));
    }

    #[tokio::test]
    async fn test_handle_unconfigured_provider_is_502() {
        let (table, dispatcher, _) = setup(vec![apple()]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/sp");

        let response = table.handle(&dispatcher, &request, WRITER).await;
        assert_eq!(response.status, 502);
    }

    #[tokio::test]
    async fn test_handle_detached_fetch() {
        let stock = apple().with_provider_id(Provider::Msci, "IID1").unwrap();
        let (table, dispatcher, _) = setup(vec![stock]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/msci").query("detach", "true");

        let response = table.handle(&dispatcher, &request, WRITER).await;
        assert_eq!(response.status, 202);
        assert!(response.body.is_none());
        dispatcher.drain().await;
    }

    #[tokio::test]
    async fn test_handle_detached_fetch_of_unknown_ticker() {
        let (table, dispatcher, _) = setup(vec![]);
        let request = RouteRequest::new(Method::Post, "/api/fetch/msci")
            .query("ticker", "NOPE")
            .query("detach", "true");

        let response = table.handle(&dispatcher, &request, WRITER).await;
        assert_eq!(response.status, 404);
        assert_eq!(dispatcher.drain().await, 0);
    }

    #[tokio::test]
    async fn test_handle_compute() {
        let mut stock = apple();
        stock.star_rating = Some(4);
        let (table, dispatcher, store) = setup(vec![stock]);
        let request = RouteRequest::new(Method::Post, COMPUTE_PATH);

        let response = table.handle(&dispatcher, &request, WRITER).await;
        assert_eq!(response.status, 204);
        assert!(store.read("AAPL").await.unwrap().financial_score > 0.0);
    }

    #[tokio::test]
    async fn test_handle_unknown_path_and_method() {
        let (table, dispatcher, _) = setup(vec![]);

        let response = table
            .handle(&dispatcher, &RouteRequest::new(Method::Post, "/api/nothing"), WRITER)
            .await;
        assert_eq!(response.status, 404);

        let response = table
            .handle(&dispatcher, &RouteRequest::new(Method::Delete, COMPUTE_PATH), WRITER)
            .await;
        assert_eq!(response.status, 405);
    }

    #[test]
    fn test_openapi_document() {
        let document = RouteTable::new().openapi();
        let paths = document["paths"].as_object().unwrap();
        assert_eq!(paths.len(), Provider::ALL.len() + 1);
        assert_eq!(
            document["paths"]["/api/fetch/marketScreener"]["post"]["operationId"],
            "fetchMarketScreenerData"
        );
        assert!(document["paths"][COMPUTE_PATH]["post"]["responses"]["204"].is_object());
    }
}
