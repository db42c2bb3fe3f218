use std::sync::Arc;

use bytes::Bytes;
use gateway_common::ProviderKey;
use gateway_provider_core::{
    header_get, header_set, usage_from_json, Headers, HttpMethod, ProviderConfig, ProviderError,
    ProviderResult, StreamObservation, UpstreamHttpRequest, UpstreamProvider, UsageExtractor,
};

use crate::sse::{is_done_sentinel, parse_event};
use crate::url::build_url;

const SUPPORTED_PATHS: &[&str] = &["/v1/chat/completions", "/v1/models"];

/// LiteLLM speaks the Chat Completions wire shape but reports its native
/// cost out-of-band on the `x-litellm-response-cost` response header rather
/// than in the body, so `extract_provider_usage_usd` (a body reader) always
/// returns `None` here; the pipeline reads that header separately and feeds
/// it in as the stream processor's initial provider cost.
#[derive(Debug, Default)]
pub struct LiteLlmProvider;

impl UpstreamProvider for LiteLlmProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::LiteLlm
    }

    fn supported_paths(&self) -> &'static [&'static str] {
        SUPPORTED_PATHS
    }

    fn prepare_request_data(&self, body: &mut serde_json::Value, is_stream: bool) {
        if !is_stream {
            return;
        }
        let Some(obj) = body.as_object_mut() else {
            return;
        };
        let options = obj
            .entry("stream_options")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(options) = options.as_object_mut() {
            options.insert("include_usage".to_string(), serde_json::json!(true));
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
            .ok_or_else(|| ProviderError::InvalidConfig("litellm requires an api key".into()))?;

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

    fn create_usage_extractor(&self) -> Arc<dyn UsageExtractor> {
        Arc::new(LiteLlmUsageExtractor)
    }

    fn extract_provider_usage_usd_from_headers(&self, headers: &Headers) -> Option<f64> {
        header_get(headers, "x-litellm-response-cost")?.parse::<f64>().ok()
    }
}

struct LiteLlmUsageExtractor;

impl UsageExtractor for LiteLlmUsageExtractor {
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
        let usage = value.get("usage").and_then(usage_from_json);
        StreamObservation {
            usage,
            cost_usd: None,
            terminal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cost_from_response_header() {
        let provider = LiteLlmProvider;
        let headers = vec![("x-litellm-response-cost".to_string(), "0.01".to_string())];
        assert_eq!(provider.extract_provider_usage_usd_from_headers(&headers), Some(0.01));
    }

    #[test]
    fn missing_header_yields_none() {
        let provider = LiteLlmProvider;
        assert_eq!(provider.extract_provider_usage_usd_from_headers(&vec![]), None);
    }

    #[test]
    fn body_never_carries_native_cost() {
        let provider = LiteLlmProvider;
        let cost = provider.extract_provider_usage_usd(b"{\"usage\":{\"cost\":1.0}}");
        assert_eq!(cost, None);
    }
}
