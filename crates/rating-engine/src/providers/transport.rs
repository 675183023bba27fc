//! Shared HTTP transport for provider adapters

use super::ProviderResult;
use crate::error::{FetchError, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rating_core::Provider;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Paced HTTP client bound to one provider's base URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    provider: Provider,
    base_url: Url,
    rate_limiter: SharedRateLimiter,
}

/// Map a response status to a provider outcome, `None` for success
pub fn classify_status(status: StatusCode) -> Option<ProviderResult> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderResult::RateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderResult::NotFound,
        StatusCode::PAYMENT_REQUIRED => ProviderResult::PremiumRequired,
        other => ProviderResult::Unreachable(format!("HTTP error: {other}")),
    })
}

impl HttpTransport {
    /// Create a transport sending at most `requests_per_minute` requests
    pub fn new(
        provider: Provider,
        base_url: &str,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::Config(format!("invalid base URL for {provider}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::Config(format!(
                "base URL for {provider} cannot carry a path"
            )));
        }

        let per_minute = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            FetchError::Config(format!("requests per minute for {provider} must be greater than 0"))
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rating-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            provider,
            base_url,
            rate_limiter,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Absolute URL below the base URL; every segment is percent-encoded as a whole
    pub fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, ProviderResult> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderResult::Unreachable(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> std::result::Result<Response, ProviderResult> {
        let url = self.endpoint(segments)?;

        // Wait for rate limiter
        self.rate_limiter.until_ready().await;
        tracing::debug!(provider = %self.provider, %url, "sending provider request");

        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderResult::Unreachable(format!("request to {url} failed: {e}")))?;

        match classify_status(response.status()) {
            Some(outcome) => Err(outcome),
            None => Ok(response),
        }
    }

    /// GET a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> std::result::Result<T, ProviderResult> {
        self.send(segments, query)
            .await?
            .json()
            .await
            .map_err(|e| ProviderResult::Unreachable(format!("unable to decode response: {e}")))
    }

    /// GET a text body
    pub async fn get_text(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> std::result::Result<String, ProviderResult> {
        self.send(segments, query)
            .await?
            .text()
            .await
            .map_err(|e| ProviderResult::Unreachable(format!("unable to read response: {e}")))
    }
}
