use std::sync::Arc;

use bytes::Bytes;
use gateway_common::{ProviderKey, UsageInfo};
use gateway_provider_core::{
    HttpMethod, ProviderConfig, ProviderError, ProviderResult, StreamObservation,
    UpstreamHttpRequest, UpstreamProvider, UsageExtractor,
};
use serde_json::{json, Value};

use crate::url::build_url;

const SUPPORTED_PATHS: &[&str] = &[
    "/v1/models/{model}:generateContent",
    "/v1/models/{model}:streamGenerateContent",
    "/v1/models/{model}:countTokens",
];

#[derive(Debug, Default)]
pub struct GoogleProvider;

impl UpstreamProvider for GoogleProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Google
    }

    fn supported_paths(&self) -> &'static [&'static str] {
        SUPPORTED_PATHS
    }

    /// Translates an OpenAI-style chat body into Gemini's `generateContent`
    /// shape: `messages` become `contents`, any `system` message is pulled
    /// out into `systemInstruction`, and `max_tokens` becomes
    /// `generationConfig.maxOutputTokens`.
    fn prepare_request_data(&self, body: &mut Value, _is_stream: bool) {
        let Some(obj) = body.as_object_mut() else {
            return;
        };

        let Some(Value::Array(messages)) = obj.remove("messages") else {
            return;
        };

        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for message in messages {
            let Some(role) = message.get("role").and_then(Value::as_str) else {
                continue;
            };
            let text = message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if role == "system" {
                system_parts.push(json!({ "text": text }));
                continue;
            }

            let gemini_role = if role == "assistant" { "model" } else { "user" };
            contents.push(json!({
                "role": gemini_role,
                "parts": [{ "text": text }],
            }));
        }

        obj.insert("contents".to_string(), Value::Array(contents));
        if !system_parts.is_empty() {
            obj.insert(
                "systemInstruction".to_string(),
                json!({ "parts": system_parts }),
            );
        }

        if let Some(max_tokens) = obj.remove("max_tokens") {
            let generation_config = obj
                .entry("generationConfig")
                .or_insert_with(|| json!({}));
            if let Some(config) = generation_config.as_object_mut() {
                config.insert("maxOutputTokens".to_string(), max_tokens);
            }
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
            .ok_or_else(|| ProviderError::InvalidConfig("google requires an api key".into()))?;

        let separator = if path.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}key={api_key}", build_url(&config.base_url, path));
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        Ok(UpstreamHttpRequest {
            method,
            url,
            headers,
            body,
            is_stream,
        })
    }

    fn create_usage_extractor(&self) -> Arc<dyn UsageExtractor> {
        Arc::new(GoogleUsageExtractor)
    }

    fn cumulative_stream_usage(&self) -> bool {
        true
    }
}

struct GoogleUsageExtractor;

impl UsageExtractor for GoogleUsageExtractor {
    fn extract_non_stream(&self, body: &[u8]) -> Option<UsageInfo> {
        let value: Value = serde_json::from_slice(body).ok()?;
        usage_from_metadata(value.get("usageMetadata")?)
    }

    fn extract_stream_event(&self, event: &[u8]) -> StreamObservation {
        let Ok(text) = std::str::from_utf8(event) else {
            return StreamObservation::default();
        };
        let trimmed = text
            .trim()
            .strip_prefix("data:")
            .map(str::trim)
            .unwrap_or(text.trim());
        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            return StreamObservation::default();
        };
        let usage = value.get("usageMetadata").and_then(usage_from_metadata);
        StreamObservation {
            usage,
            cost_usd: None,
            terminal: false,
        }
    }
}

fn usage_from_metadata(metadata: &Value) -> Option<UsageInfo> {
    let prompt = metadata.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0);
    let completion = metadata
        .get("candidatesTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total = metadata
        .get("totalTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(prompt + completion);
    Some(UsageInfo::new(prompt, completion, total))
}
