use std::sync::Arc;

use bytes::Bytes;
use gateway_common::ProviderKey;
use gateway_provider_core::{
    header_set, usage_from_json, HttpMethod, ProviderConfig, ProviderError, ProviderResult,
    StreamObservation, UpstreamHttpRequest, UpstreamProvider, UsageExtractor,
};

use crate::sse::{is_done_sentinel, parse_event};
use crate::url::build_url;

const SUPPORTED_PATHS: &[&str] = &[
    "/v1/chat/completions",
    "/v1/responses",
    "/v1/models",
    "/v1/models/{model}",
];

#[derive(Debug, Default)]
pub struct OpenAiProvider;

impl UpstreamProvider for OpenAiProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::OpenAI
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
            .ok_or_else(|| ProviderError::InvalidConfig("openai requires an api key".into()))?;

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
        Arc::new(OpenAiUsageExtractor)
    }
}

struct OpenAiUsageExtractor;

impl UsageExtractor for OpenAiUsageExtractor {
    fn extract_non_stream(&self, body: &[u8]) -> Option<gateway_common::UsageInfo> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        // Response API nests usage one level down under `response`.
        if let Some(usage) = value.get("usage") {
            return usage_from_json(usage);
        }
        usage_from_json(value.get("response")?.get("usage")?)
    }

    fn extract_stream_event(&self, event: &[u8]) -> StreamObservation {
        let (event_name, data) = parse_event(event);
        if is_done_sentinel(&data) {
            return StreamObservation {
                terminal: true,
                ..Default::default()
            };
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&data) else {
            return StreamObservation::default();
        };

        // Response API: `event: response.completed` / `data: {"response": {"usage": {...}}}`.
        if event_name == Some("response.completed") {
            let usage = value
                .get("response")
                .and_then(|r| r.get("usage"))
                .and_then(usage_from_json);
            return StreamObservation {
                usage,
                cost_usd: None,
                terminal: true,
            };
        }

        // Chat Completions: terminal chunk carries `usage` at the top level
        // only when `stream_options.include_usage` was set.
        let usage = value.get("usage").and_then(usage_from_json);
        StreamObservation {
            usage,
            cost_usd: None,
            terminal: false,
        }
    }
}
