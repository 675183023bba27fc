//! Standard & Poor's ESG score

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use rating_core::{Provider, StockPatch};
use serde::Deserialize;

const PREMIUM_NOTICE: &str = "available via our premium channels";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpScoreResponse {
    pub score: Option<f64>,
    #[serde(default)]
    pub locked: bool,
    pub lock_message: Option<String>,
}

impl SpScoreResponse {
    fn is_premium(&self) -> bool {
        self.locked
            || self
                .lock_message
                .as_deref()
                .is_some_and(|message| message.contains(PREMIUM_NOTICE))
    }

    pub fn into_result(self) -> ProviderResult {
        if self.is_premium() {
            return ProviderResult::PremiumRequired;
        }

        match self.score {
            Some(score) => ProviderResult::Success(StockPatch {
                sp_esg_score: Some(score),
                ..StockPatch::default()
            }),
            None => ProviderResult::Unreachable("no S&P ESG score in response".to_string()),
        }
    }
}

/// Adapter for Standard & Poor's
#[derive(Debug, Clone)]
pub struct SpAdapter {
    transport: HttpTransport,
}

impl SpAdapter {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for SpAdapter {
    fn provider(&self) -> Provider {
        Provider::Sp
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        match self
            .transport
            .get_json::<SpScoreResponse>(&["scores"], &[("cid", provider_id)])
            .await
        {
            Ok(response) => response.into_result(),
            Err(outcome) => outcome,
        }
    }
}
