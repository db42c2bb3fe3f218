mod admin;
mod headers;
mod proxy;
mod state;

pub use state::GatewayState;

use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;

/// Assembles the full HTTP surface: the catch-all LLM proxy under
/// `/api/v1/*` and the admin routes alongside it.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/v1/admin/health", get(admin::health))
        .route("/api/v1/admin/billing/cleanup", post(admin::billing_cleanup))
        .route("/api/v1/admin/billing/{*rest}", get(admin::billing_status))
        .route("/api/v1/admin/config", get(admin::config))
        .route("/api/v1/{*rest}", any(proxy::proxy_handler))
        .with_state(state)
}
