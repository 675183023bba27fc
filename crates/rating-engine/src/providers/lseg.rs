//! LSEG Data & Analytics ESG and emissions scores

use super::{HttpTransport, ProviderAdapter, ProviderResult};
use async_trait::async_trait;
use rating_core::{Provider, StockPatch};
use serde_json::Value;

fn score(body: &Value, key: &str) -> Option<f64> {
    body.get("esgScore")?.get(key)?.get("score")?.as_f64()
}

/// Map an LSEG ESG response body
///
/// An empty object means LSEG does not know the RIC.
pub fn parse_esg_response(body: &Value) -> ProviderResult {
    let Some(object) = body.as_object() else {
        return ProviderResult::Unreachable("response is not a JSON object".to_string());
    };

    if object.is_empty() {
        return ProviderResult::NotFound;
    }

    let limit_exceeded = body
        .pointer("/status/limitExceeded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if limit_exceeded {
        return ProviderResult::RateLimited;
    }

    ProviderResult::Success(StockPatch {
        lseg_esg_score: score(body, "TR.TRESG"),
        lseg_emissions: score(body, "TR.TRESGEmissions"),
        ..StockPatch::default()
    })
}

/// Adapter for LSEG Data & Analytics
#[derive(Debug, Clone)]
pub struct LsegAdapter {
    transport: HttpTransport,
}

impl LsegAdapter {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for LsegAdapter {
    fn provider(&self) -> Provider {
        Provider::Lseg
    }

    async fn fetch(&self, provider_id: &str) -> ProviderResult {
        match self
            .transport
            .get_json::<Value>(&["esg"], &[("ricCode", provider_id)])
            .await
        {
            Ok(body) => parse_esg_response(&body),
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scores() {
        let body = json!({
            "esgScore": {
                "TR.TRESG": { "score": 71 },
                "TR.TRESGEmissions": { "score": 88.5 }
            }
        });

        let ProviderResult::Success(patch) = parse_esg_response(&body) else {
            panic!("Expected Success");
        };
        assert_eq!(patch.lseg_esg_score, Some(71.0));
        assert_eq!(patch.lseg_emissions, Some(88.5));
    }

    #[test]
    fn test_empty_body_is_not_found() {
        assert_eq!(parse_esg_response(&json!({})), ProviderResult::NotFound);
    }

    #[test]
    fn test_limit_exceeded_is_rate_limited() {
        let body = json!({ "status": { "limitExceeded": true } });
        assert_eq!(parse_esg_response(&body), ProviderResult::RateLimited);
    }

    #[test]
    fn test_non_object_is_unreachable() {
        assert!(matches!(
            parse_esg_response(&json!([1, 2])),
            ProviderResult::Unreachable(_)
        ));
    }
}
