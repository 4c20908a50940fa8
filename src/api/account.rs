//! Entitlement, billing webhook and payment-return endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::wizard::controller::EntitlementView;

use super::AppState;
use super::error::ApiError;
use super::identity::caller;

pub const BILLING_TOKEN_HEADER: &str = "x-billing-token";

/// GET /api/entitlement
///
/// Cached snapshot plus the caller's usage and the plan catalog.
pub(super) async fn entitlement(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers).ok_or_else(ApiError::unauthorized)?;
    let services = state.drafts.services();

    let resolver = services.entitlements.resolver_for(&user).await;
    let snapshot = services.cache.get_or_resolve(&resolver, &user).await;
    let used = services.db.count_requests(&user.id).await.map_err(|e| {
        warn!(user_id = %user.id, error = %e, "Failed to count requests");
        ApiError::internal("Could not load usage")
    })?;

    Ok(Json(json!({
        "entitlement": EntitlementView::new(&resolver, &snapshot, used),
        "plans": services.entitlements.catalog().plans(),
    })))
}

#[derive(Deserialize)]
pub(super) struct BillingEvent {
    user_id: String,
    #[serde(default)]
    event: Option<String>,
}

/// POST /api/billing/events
///
/// Drops the cached snapshot so the next read hits billing.
pub(super) async fn billing_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<BillingEvent>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(expected) = &state.billing_events_token {
        let presented = headers
            .get(BILLING_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if presented != expected.expose_secret() {
            return Err(ApiError::unauthorized());
        }
    }

    let invalidated = state
        .drafts
        .services()
        .cache
        .invalidate(&event.user_id)
        .await;
    info!(
        user_id = %event.user_id,
        event = event.event.as_deref().unwrap_or("unspecified"),
        invalidated,
        "Billing event received"
    );
    Ok(Json(json!({"invalidated": invalidated})))
}

/// POST /api/payment/return
///
/// Files the caller's parked draft, if any. Reloading is harmless.
pub(super) async fn payment_return(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers).ok_or_else(ApiError::unauthorized)?;
    let services = state.drafts.services();

    services.cache.invalidate(&user.id).await;
    let receipt = services.pipeline.consume_pending(&user).await?;

    Ok(Json(match receipt {
        Some(receipt) => json!({"submitted": true, "request_id": receipt.request_id()}),
        None => json!({"submitted": false}),
    }))
}
