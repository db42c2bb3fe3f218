use bytes::Bytes;

use crate::headers::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Some(HttpMethod::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Some(HttpMethod::Post)
        } else if method.eq_ignore_ascii_case("PUT") {
            Some(HttpMethod::Put)
        } else if method.eq_ignore_ascii_case("PATCH") {
            Some(HttpMethod::Patch)
        } else if method.eq_ignore_ascii_case("DELETE") {
            Some(HttpMethod::Delete)
        } else {
            None
        }
    }
}

/// A streamed upstream body: chunks arrive on this channel in the order the
/// upstream emitted them. The sending half lives on whatever task is reading
/// off the wire; dropping the receiver (client disconnect) lets that task's
/// next `send` fail and wind itself down.
pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub is_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

#[derive(Debug, Clone)]
pub enum UpstreamFailure {
    /// Transport-level failure: no HTTP response was ever received.
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
    /// An HTTP response was received but carried a non-2xx status.
    Http {
        status: u16,
        headers: Headers,
        body: Bytes,
    },
}
