use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;

use gateway_pricing::PricingRegistry;
use gateway_provider_core::{
    header_get, ByteStream, HttpMethod, ResolveError, StreamProcessor, UpstreamBody,
    UpstreamFailure,
};

use crate::headers::{headers_to_vec, is_hop_by_hop_or_framing, RESPONSE_HEADER_ALLOWLIST};
use crate::state::GatewayState;
use gateway_core::{emit_access_log, finalize_billing, finalize_stream_billing, RequestContext};

pub async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound_headers = headers_to_vec(&headers);
    let raw_path = uri.path().strip_prefix("/api/v1").unwrap_or(uri.path());
    let mut ctx = RequestContext::new(method.as_str(), raw_path, &inbound_headers);
    ctx.query = uri.query().map(str::to_string);
    ctx.request_body_size = body.len();

    let did = match state.auth.authenticate(&inbound_headers) {
        Ok(did) => did,
        Err(err) => return fail(&ctx, err.status, &err.message),
    };
    ctx.did = Some(did);

    let header_provider = header_get(&inbound_headers, "x-llm-provider");
    let path_prefix_provider = raw_path.trim_start_matches('/').split('/').next();
    let default_provider = state.default_provider.map(|p| p.as_str());

    let registered = match state.providers.resolve(
        header_provider,
        path_prefix_provider,
        default_provider,
        raw_path,
    ) {
        Ok(r) => r,
        Err(ResolveError::ProviderNotEnabled) => return fail(&ctx, 503, "provider not enabled"),
        Err(ResolveError::PathNotAllowed) => return fail(&ctx, 404, "path not allowed for provider"),
    };
    ctx.provider = Some(registered.config.name.clone());

    let mut body_value: serde_json::Value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => serde_json::Value::Null,
        }
    };
    let is_stream = body_value.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);
    ctx.is_stream = is_stream;
    ctx.model = body_value
        .get("model")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    registered.driver.prepare_request_data(&mut body_value, is_stream);
    let outbound_body = if body_value.is_null() {
        None
    } else {
        serde_json::to_vec(&body_value).ok().map(Bytes::from)
    };

    let Some(method_enum) = HttpMethod::parse(method.as_str()) else {
        return fail(&ctx, 500, "unsupported method");
    };

    let request_path = match &ctx.query {
        Some(q) => format!("{raw_path}?{q}"),
        None => raw_path.to_string(),
    };

    let upstream_request = match registered.driver.build_upstream_request(
        &registered.config,
        &request_path,
        method_enum,
        outbound_body,
        is_stream,
    ) {
        Ok(r) => r,
        Err(err) => return fail(&ctx, 500, &err.to_string()),
    };

    let request_id = ctx.request_id.clone();
    let response = match state.upstream.send(upstream_request).await {
        Ok(resp) if is_stream => handle_stream_response(state, ctx, registered, resp).await,
        Ok(resp) => handle_non_stream_response(state, ctx, registered, resp).await,
        Err(UpstreamFailure::Http { status, headers, body }) => {
            let response = upstream_passthrough(status, headers, UpstreamBody::Bytes(body));
            finish_and_log(&ctx, None, None, status, None);
            response
        }
        Err(UpstreamFailure::Transport { message, .. }) => fail(&ctx, 502, &message),
    };
    with_request_id(response, &request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn handle_non_stream_response(
    state: Arc<GatewayState>,
    ctx: RequestContext,
    registered: gateway_provider_core::RegisteredProvider,
    resp: gateway_provider_core::UpstreamHttpResponse,
) -> Response {
    let UpstreamBody::Bytes(body) = resp.body else {
        return fail(&ctx, 500, "expected a buffered upstream body");
    };

    let extractor = registered.driver.create_usage_extractor();
    let usage = extractor.extract_non_stream(&body);
    let provider_cost = registered
        .driver
        .extract_provider_usage_usd(&body)
        .or_else(|| registered.driver.extract_provider_usage_usd_from_headers(&resp.headers));

    let model = ctx.model.clone().unwrap_or_default();
    let cost = state
        .pricing
        .calculate_request_cost(registered.driver.key(), &model, provider_cost, usage);
    let billing = finalize_billing(&ctx, usage, cost);

    let response = upstream_passthrough(resp.status, resp.headers, UpstreamBody::Bytes(body));
    emit_access_log(&ctx, resp.status, &billing, None);
    response
}

async fn handle_stream_response(
    state: Arc<GatewayState>,
    ctx: RequestContext,
    registered: gateway_provider_core::RegisteredProvider,
    resp: gateway_provider_core::UpstreamHttpResponse,
) -> Response {
    let UpstreamBody::Stream(mut upstream_rx) = resp.body else {
        return fail(&ctx, 500, "expected a streamed upstream body");
    };

    let model = ctx.model.clone().unwrap_or_default();
    let initial_cost = registered
        .driver
        .extract_provider_usage_usd_from_headers(&resp.headers);
    let processor = registered.driver.create_stream_processor(model, initial_cost);

    let stream = BillingStream {
        inner: upstream_rx,
        pending: Vec::new(),
        status: resp.status,
        ctx: Some(ctx),
        processor: Some(processor),
        pricing: Arc::clone(&state.pricing),
    };

    let mut builder = Response::builder().status(resp.status);
    if let Some(h) = builder.headers_mut() {
        h.insert("content-type", HeaderValue::from_static("text/event-stream"));
        h.insert("cache-control", HeaderValue::from_static("no-cache"));
        h.insert("connection", HeaderValue::from_static("keep-alive"));
        h.insert("transfer-encoding", HeaderValue::from_static("chunked"));
    }
    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response())
}

/// SSE events are delimited by a blank line (`\n\n`). Byte identity to the
/// client is preserved regardless — this only peeks into a copy of the
/// bytes to feed the usage extractor, it never rewrites what's forwarded.
fn find_event_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

/// The response body axum actually drains to the client socket. Bytes are
/// forwarded unchanged as they're polled; the billing/access-log
/// finalization happens exactly once, gated on this stream's own lifetime
/// rather than on how fast the upstream side produced bytes — natural
/// end-of-stream finalizes from `poll_next`, a client disconnect (the body
/// dropped mid-stream, before a `None` was ever produced) finalizes from
/// `Drop` with the usage accumulated so far.
struct BillingStream {
    inner: ByteStream,
    pending: Vec<u8>,
    status: u16,
    ctx: Option<RequestContext>,
    processor: Option<StreamProcessor>,
    pricing: Arc<PricingRegistry>,
}

impl BillingStream {
    fn finalize(&mut self, error_message: Option<&str>) {
        let (Some(ctx), Some(mut processor)) = (self.ctx.take(), self.processor.take()) else {
            return;
        };
        let billing = finalize_stream_billing(&ctx, &mut processor, &self.pricing);
        emit_access_log(&ctx, self.status, &billing, error_message);
    }
}

impl Stream for BillingStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                this.pending.extend_from_slice(&chunk);
                while let Some(pos) = find_event_boundary(&this.pending) {
                    let event: Vec<u8> = this.pending.drain(..pos).collect();
                    if let Some(processor) = this.processor.as_mut() {
                        processor.observe_event(&event);
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                if !this.pending.is_empty() {
                    if let Some(processor) = this.processor.as_mut() {
                        processor.observe_event(&this.pending);
                    }
                    this.pending.clear();
                }
                this.finalize(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for BillingStream {
    fn drop(&mut self) {
        if let Some(processor) = self.processor.as_mut() {
            processor.mark_truncated();
        }
        self.finalize(Some("client disconnected"));
    }
}

fn upstream_passthrough(status: u16, headers: gateway_provider_core::Headers, body: UpstreamBody) -> Response {
    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        for (name, value) in &headers {
            if is_hop_by_hop_or_framing(name) {
                continue;
            }
            if !RESPONSE_HEADER_ALLOWLIST.iter().any(|allowed| allowed.eq_ignore_ascii_case(name)) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                h.append(name, value);
            }
        }
    }
    let body = match body {
        UpstreamBody::Bytes(b) => Body::from(b),
        UpstreamBody::Stream(_) => Body::empty(),
    };
    builder
        .body(body)
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response())
}

fn error_response(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "success": false, "error": message }).to_string();
    (status, [("content-type", "application/json")], body).into_response()
}

/// Builds the error response, access-logs it, and hands the response back —
/// every rejection path (auth, routing, transport) goes through here so none
/// of them forgets to finalize the billing latch exactly once.
fn fail(ctx: &RequestContext, status: u16, message: &str) -> Response {
    finish_and_log(ctx, None, None, status, Some(message));
    with_request_id(error_response(status, message), &ctx.request_id)
}

fn finish_and_log(
    ctx: &RequestContext,
    usage: Option<gateway_common::UsageInfo>,
    cost: Option<gateway_pricing::PricingResult>,
    status: u16,
    error_message: Option<&str>,
) {
    let billing = finalize_billing(ctx, usage, cost);
    emit_access_log(ctx, status, &billing, error_message);
}
