use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use gateway_common::{DidInfo, UsageInfo};
use gateway_pricing::{PricingRegistry, PricingResult};
use gateway_provider_core::{header_get, Headers, StreamProcessor};
use uuid::Uuid;

/// Per-request state, owned exclusively by the task handling that request.
/// Nothing here is shared across requests; the only process-wide state is
/// the provider and pricing registries the pipeline is handed.
pub struct RequestContext {
    pub request_id: String,
    pub client_tx_ref: Option<String>,
    pub server_tx_ref: Option<String>,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub request_body_size: usize,
    pub did: Option<DidInfo>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub is_stream: bool,
    started: Instant,
    finalized: AtomicBool,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>, headers: &Headers) -> Self {
        let client_tx_ref = header_get(headers, "x-client-tx-ref").map(str::to_string);
        let request_id = client_tx_ref.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            request_id,
            client_tx_ref,
            server_tx_ref: None,
            method: method.into(),
            path: path.into(),
            query: None,
            client_ip: None,
            user_agent: header_get(headers, "user-agent").map(str::to_string),
            referer: header_get(headers, "referer").map(str::to_string),
            request_body_size: 0,
            did: None,
            provider: None,
            model: None,
            is_stream: false,
            started: Instant::now(),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Outcome of running a request through the pipeline: the cost (if any) and
/// the bits needed to finish the access log.
#[derive(Debug, Default)]
pub struct FinalizedBilling {
    pub usage: Option<UsageInfo>,
    pub cost: Option<PricingResult>,
    pub billing_pico_usd: i128,
}

/// Folds a completed `StreamProcessor` (or a non-stream extraction) into the
/// billing amount the response-locals handoff expects. `finalize` on
/// `RequestContext` guards against running this twice for the same request.
pub fn finalize_billing(
    ctx: &RequestContext,
    usage: Option<UsageInfo>,
    cost: Option<PricingResult>,
) -> FinalizedBilling {
    if ctx.finalized.swap(true, Ordering::SeqCst) {
        return FinalizedBilling::default();
    }
    let billing_pico_usd = cost
        .as_ref()
        .map(|c| gateway_pricing::usd_to_pico(c.cost_usd))
        .unwrap_or(0);
    FinalizedBilling {
        usage,
        cost,
        billing_pico_usd,
    }
}

pub fn finalize_stream_billing(
    ctx: &RequestContext,
    processor: &mut StreamProcessor,
    pricing: &PricingRegistry,
) -> FinalizedBilling {
    let cost = processor.finalize(pricing);
    finalize_billing(ctx, processor.accumulated_usage(), cost)
}

/// One JSON-serializable record per request, emitted exactly once via a
/// single structured `tracing::info!` call. No prompt or completion text
/// ever enters this record.
pub fn emit_access_log(
    ctx: &RequestContext,
    status_code: u16,
    billing: &FinalizedBilling,
    error_message: Option<&str>,
) {
    let (input_tokens, output_tokens, total_tokens) = billing
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
        .unwrap_or_default();
    let (pricing_source, pricing_version) = billing
        .cost
        .as_ref()
        .map(|c| (Some(c.source.as_str()), c.pricing_version.clone()))
        .unwrap_or((None, None));

    tracing::info!(
        target: "gateway::access_log",
        request_id = %ctx.request_id,
        client_tx_ref = ctx.client_tx_ref.as_deref(),
        server_tx_ref = ctx.server_tx_ref.as_deref(),
        did = ctx.did.as_ref().map(|d| d.did.as_str()),
        method = %ctx.method,
        path = %ctx.path,
        query = ctx.query.as_deref(),
        is_stream = ctx.is_stream,
        model = ctx.model.as_deref(),
        provider = ctx.provider.as_deref(),
        input_tokens,
        output_tokens,
        total_tokens,
        total_cost_usd = billing.cost.as_ref().map(|c| c.cost_usd),
        billing_pico_usd = billing.billing_pico_usd,
        pricing_source,
        pricing_version,
        status_code,
        duration_ms = ctx.elapsed_ms() as u64,
        client_ip = ctx.client_ip.as_deref(),
        user_agent = ctx.user_agent.as_deref(),
        referer = ctx.referer.as_deref(),
        request_body_size = ctx.request_body_size,
        error_message,
        "request completed",
    );
}
