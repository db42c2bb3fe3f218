use std::sync::Arc;

use bytes::Bytes;
use gateway_common::{ProviderKey, UsageInfo};
use gateway_provider_core::{
    header_set, HttpMethod, ProviderConfig, ProviderError, ProviderResult, StreamObservation,
    UpstreamHttpRequest, UpstreamProvider, UsageExtractor,
};

use crate::sse::parse_event;
use crate::url::build_url;

const SUPPORTED_PATHS: &[&str] = &["/v1/messages"];
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Default)]
pub struct ClaudeProvider;

impl UpstreamProvider for ClaudeProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Claude
    }

    fn supported_paths(&self) -> &'static [&'static str] {
        SUPPORTED_PATHS
    }

    fn prepare_request_data(&self, _body: &mut serde_json::Value, _is_stream: bool) {}

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
            .ok_or_else(|| ProviderError::InvalidConfig("claude requires an api key".into()))?;

        let url = build_url(&config.base_url, path);
        let mut headers = Vec::new();
        header_set(&mut headers, "x-api-key", api_key);
        header_set(&mut headers, "anthropic-version", ANTHROPIC_VERSION);
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
        Arc::new(ClaudeUsageExtractor)
    }

    fn cumulative_stream_usage(&self) -> bool {
        true
    }
}

struct ClaudeUsageExtractor;

impl UsageExtractor for ClaudeUsageExtractor {
    fn extract_non_stream(&self, body: &[u8]) -> Option<UsageInfo> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        let usage = value.get("usage")?;
        let prompt = usage.get("input_tokens")?.as_u64()?;
        let completion = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        Some(UsageInfo::new(prompt, completion, prompt + completion))
    }

    fn extract_stream_event(&self, event: &[u8]) -> StreamObservation {
        let (event_name, data) = parse_event(event);
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&data) else {
            return StreamObservation::default();
        };

        match event_name {
            Some("message_start") => {
                let usage = value
                    .get("message")
                    .and_then(|m| m.get("usage"))
                    .and_then(|u| {
                        let prompt = u.get("input_tokens")?.as_u64()?;
                        let completion = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                        Some(UsageInfo::new(prompt, completion, prompt + completion))
                    });
                StreamObservation {
                    usage,
                    cost_usd: None,
                    terminal: false,
                }
            }
            Some("message_delta") => {
                let completion = value
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64());
                let usage = completion.map(|completion| UsageInfo::new(0, completion, completion));
                StreamObservation {
                    usage,
                    cost_usd: None,
                    terminal: false,
                }
            }
            Some("message_stop") => StreamObservation {
                usage: None,
                cost_usd: None,
                terminal: true,
            },
            _ => StreamObservation::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_reports_initial_usage() {
        let extractor = ClaudeUsageExtractor;
        let event =
            b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":100,\"output_tokens\":0}}}\n\n";
        let observation = extractor.extract_stream_event(event);
        assert_eq!(observation.usage, Some(UsageInfo::new(100, 0, 100)));
        assert!(!observation.terminal);
    }

    #[test]
    fn message_delta_reports_only_output_tokens() {
        let extractor = ClaudeUsageExtractor;
        let event = b"event: message_delta\ndata: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":40}}\n\n";
        let observation = extractor.extract_stream_event(event);
        assert_eq!(observation.usage, Some(UsageInfo::new(0, 40, 40)));
    }

    #[test]
    fn message_stop_is_terminal_without_usage() {
        let extractor = ClaudeUsageExtractor;
        let event = b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
        let observation = extractor.extract_stream_event(event);
        assert!(observation.terminal);
        assert!(observation.usage.is_none());
    }
}
