//! MSCI ESG rating and implied temperature rise

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use rating_core::{MsciEsgRating, Provider, StockPatch};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsciEsgProfile {
    pub esg_rating: Option<String>,
    pub implied_temperature_rise: Option<f64>,
}

impl MsciEsgProfile {
    /// Fails with `Unreachable` when the reported rating is not on the MSCI scale
    pub fn into_result(self) -> ProviderResult {
        let msci_esg_rating = match self.esg_rating.as_deref() {
            Some(rating) => match rating.parse::<MsciEsgRating>() {
                Ok(rating) => Some(rating),
                Err(e) => return ProviderResult::Unreachable(e.to_string()),
            },
            None => None,
        };

        ProviderResult::Success(StockPatch {
            msci_esg_rating,
            msci_temperature: self.implied_temperature_rise,
            ..StockPatch::default()
        })
    }
}

/// Adapter for MSCI
#[derive(Debug, Clone)]
pub struct MsciAdapter {
    transport: HttpTransport,
}

impl MsciAdapter {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for MsciAdapter {
    fn provider(&self) -> Provider {
        Provider::Msci
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        match self
            .transport
            .get_json::<MsciEsgProfile>(&["issuers", provider_id, "esg"], &[])
            .await
        {
            Ok(profile) => profile.into_result(),
            Err(outcome) => outcome,
        }
    }
}
