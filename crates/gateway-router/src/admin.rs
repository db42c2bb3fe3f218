use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use time::OffsetDateTime;

use crate::headers::headers_to_vec;
use crate::state::GatewayState;
use gateway_provider_core::header_get;

pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
        "paymentKitEnabled": state.admin_api_key.is_some(),
    }))
}

pub async fn billing_status(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let Some(_) = require_admin(&state, &headers) else {
        return unauthorized();
    };
    Json(json!({
        "success": true,
        "pricingVersion": state.pricing.current_version(),
    }))
    .into_response()
}

pub async fn billing_cleanup(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let Some(_) = require_admin(&state, &headers) else {
        return unauthorized();
    };
    Json(json!({ "success": true, "cleaned": 0 })).into_response()
}

pub async fn config(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let Some(_) = require_admin(&state, &headers) else {
        return unauthorized();
    };
    Json(json!({
        "success": true,
        "providers": state.providers.list(),
        "defaultProvider": state.default_provider.map(|p| p.as_str()),
    }))
    .into_response()
}

fn require_admin(state: &GatewayState, headers: &HeaderMap) -> Option<()> {
    let expected = state.admin_api_key.as_deref()?;
    let header_list = headers_to_vec(headers);
    let provided = header_get(&header_list, "x-admin-key")?;
    if provided == expected {
        Some(())
    } else {
        None
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "error": "unauthorized" }))).into_response()
}
