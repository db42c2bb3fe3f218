use axum::http::HeaderMap;
use gateway_provider_core::Headers;

pub fn headers_to_vec(headers: &HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.push((name.as_str().to_string(), v.to_string()));
        }
    }
    out
}

pub fn is_hop_by_hop_or_framing(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
}

/// Upstream headers the client is allowed to see on a non-stream response.
/// Everything else is dropped — this is an allow-list, not a block-list, so
/// an upstream can't leak something unexpected through the proxy.
pub const RESPONSE_HEADER_ALLOWLIST: &[&str] = &[
    "content-type",
    "cache-control",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
];
