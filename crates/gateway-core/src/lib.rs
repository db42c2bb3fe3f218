mod auth;
mod pipeline;
mod upstream_client;

pub use auth::{AuthAdapter, AuthError, DidHeaderAuth};
pub use pipeline::{emit_access_log, finalize_billing, finalize_stream_billing, FinalizedBilling, RequestContext};
pub use upstream_client::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};
