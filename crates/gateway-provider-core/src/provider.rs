use std::sync::Arc;

use bytes::Bytes;

use crate::config::ProviderConfig;
use crate::errors::ProviderResult;
use crate::headers::Headers;
use crate::http::{HttpMethod, UpstreamHttpRequest};
use crate::stream::StreamProcessor;
use crate::usage::UsageExtractor;
use gateway_common::ProviderKey;

/// The contract every upstream driver implements.
///
/// Drivers are IO-free: they shape a request and hand back the wire form
/// (`UpstreamHttpRequest`); a higher layer (`gateway-core`'s upstream
/// client) performs the actual network call. This mirrors the layering the
/// teacher codebase uses to keep provider logic testable without a live
/// socket.
pub trait UpstreamProvider: Send + Sync {
    fn key(&self) -> ProviderKey;

    fn name(&self) -> &'static str {
        self.key().as_str()
    }

    /// Paths this driver knows how to serve. The provider registry rejects
    /// anything outside this set before an upstream call is ever attempted,
    /// regardless of what a misconfigured `ProviderConfig::allowed_paths`
    /// says — the config's allow-list narrows this set further, it never
    /// widens it.
    fn supported_paths(&self) -> &'static [&'static str];

    /// Idempotent request shaping applied before the request is sent:
    /// injecting `stream_options.include_usage` / `usage.include`,
    /// translating message shapes for providers whose wire format differs
    /// from the inbound OpenAI-style body (Google).
    fn prepare_request_data(&self, body: &mut serde_json::Value, is_stream: bool);

    /// Builds the outbound HTTP request: target URL, auth headers, and the
    /// (already-shaped) body.
    fn build_upstream_request(
        &self,
        config: &ProviderConfig,
        path: &str,
        method: HttpMethod,
        body: Option<Bytes>,
        is_stream: bool,
    ) -> ProviderResult<UpstreamHttpRequest>;

    /// Reads a native USD cost straight off a completed non-stream response
    /// (OpenRouter: `usage.cost` in the body; LiteLLM: read by the caller
    /// from the `x-litellm-response-cost` header, so this returns `None`
    /// for LiteLLM and the pipeline supplies the header value separately).
    fn extract_provider_usage_usd(&self, _body: &[u8]) -> Option<f64> {
        None
    }

    /// LiteLLM reports its native cost on the `x-litellm-response-cost`
    /// response header rather than in the body; every other driver leaves
    /// this at the default.
    fn extract_provider_usage_usd_from_headers(&self, _headers: &Headers) -> Option<f64> {
        None
    }

    fn create_usage_extractor(&self) -> Arc<dyn UsageExtractor>;

    /// Whether this provider streams cumulative running totals (Claude,
    /// Google) rather than a single terminal usage object.
    fn cumulative_stream_usage(&self) -> bool {
        false
    }

    fn create_stream_processor(&self, model: String, initial_cost_usd: Option<f64>) -> StreamProcessor {
        StreamProcessor::new(
            self.create_usage_extractor(),
            self.cumulative_stream_usage(),
            self.key(),
            model,
            initial_cost_usd,
        )
    }
}
