mod config;
mod errors;
mod headers;
mod http;
mod provider;
mod registry;
mod stream;
mod usage;

pub use config::ProviderConfig;
pub use errors::{ProviderError, ProviderResult};
pub use headers::{header_get, header_set, Headers};
pub use http::{
    ByteStream, HttpMethod, UpstreamBody, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamTransportErrorKind,
};
pub use provider::UpstreamProvider;
pub use registry::{ProviderRegistry, RegisteredProvider, ResolveError};
pub use stream::{StreamProcessor, StreamState};
pub use usage::{usage_from_json, StreamObservation, UsageExtractor};
