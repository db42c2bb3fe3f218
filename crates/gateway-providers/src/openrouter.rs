use std::sync::Arc;

use bytes::Bytes;
use gateway_common::ProviderKey;
use gateway_provider_core::{
    header_set, usage_from_json, HttpMethod, ProviderConfig, ProviderError, ProviderResult,
    StreamObservation, UpstreamHttpRequest, UpstreamProvider, UsageExtractor,
};

use crate::sse::{is_done_sentinel, parse_event};
use crate::url::build_url;

const SUPPORTED_PATHS: &[&str] = &["/v1/chat/completions", "/v1/models"];

#[derive(Debug, Default)]
pub struct OpenRouterProvider;

impl UpstreamProvider for OpenRouterProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::OpenRouter
    }

    fn supported_paths(&self) -> &'static [&'static str] {
        SUPPORTED_PATHS
    }

    fn prepare_request_data(&self, body: &mut serde_json::Value, _is_stream: bool) {
        let Some(obj) = body.as_object_mut() else {
            return;
        };
        let usage = obj.entry("usage").or_insert_with(|| serde_json::json!({}));
        if let Some(usage) = usage.as_object_mut() {
            usage.insert("include".to_string(), serde_json::json!(true));
        }
    }

    fn build_upstream_request(
        &self,
        config: &ProviderConfig,
        path: &str,
        method: HttpMethod,
        body: Option<Bytes>,
        is_stream: bool,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidConfig("openrouter requires an api key".into()))?;

        let url = build_url(&config.base_url, path);
        let mut headers = Vec::new();
        header_set(&mut headers, "authorization", format!("Bearer {api_key}"));
        header_set(&mut headers, "content-type", "application/json");
        Ok(UpstreamHttpRequest {
            method,
            url,
            headers,
            body,
            is_stream,
        })
    }

    fn extract_provider_usage_usd(&self, body: &[u8]) -> Option<f64> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        value.get("usage")?.get("cost")?.as_f64()
    }

    fn create_usage_extractor(&self) -> Arc<dyn UsageExtractor> {
        Arc::new(OpenRouterUsageExtractor)
    }
}

struct OpenRouterUsageExtractor;

impl UsageExtractor for OpenRouterUsageExtractor {
    fn extract_non_stream(&self, body: &[u8]) -> Option<gateway_common::UsageInfo> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        usage_from_json(value.get("usage")?)
    }

    fn extract_stream_event(&self, event: &[u8]) -> StreamObservation {
        let (_, data) = parse_event(event);
        if is_done_sentinel(&data) {
            return StreamObservation {
                terminal: true,
                ..Default::default()
            };
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&data) else {
            return StreamObservation::default();
        };
        let usage_value = value.get("usage");
        let usage = usage_value.and_then(usage_from_json);
        let cost_usd = usage_value.and_then(|u| u.get("cost")).and_then(|c| c.as_f64());
        StreamObservation {
            usage,
            cost_usd,
            terminal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_common::UsageInfo;
    use serde_json::json;

    #[test]
    fn injects_usage_include_flag() {
        let provider = OpenRouterProvider;
        let mut body = json!({"model": "gpt-4"});
        provider.prepare_request_data(&mut body, false);
        assert_eq!(body["usage"]["include"], json!(true));
    }

    #[test]
    fn reads_native_cost_from_non_stream_body() {
        let provider = OpenRouterProvider;
        let body = json!({"usage": {"cost": 0.000025}});
        let cost = provider.extract_provider_usage_usd(&serde_json::to_vec(&body).unwrap());
        assert_eq!(cost, Some(0.000025));
    }

    #[test]
    fn stream_chunk_carries_usage_and_cost_together() {
        let extractor = OpenRouterUsageExtractor;
        let event = b"data: {\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15,\"cost\":0.000025}}\n\n";
        let observation = extractor.extract_stream_event(event);
        assert_eq!(observation.usage, Some(UsageInfo::new(10, 5, 15)));
        assert_eq!(observation.cost_usd, Some(0.000025));
    }
}
