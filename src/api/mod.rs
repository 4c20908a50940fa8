//! HTTP API: wizard sessions, entitlement and payment return.

mod account;
pub mod error;
pub mod identity;
mod wizard;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::wizard::DraftStore;

pub use account::BILLING_TOKEN_HEADER;
pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub drafts: Arc<DraftStore>,
    /// Required on billing webhooks when set.
    pub billing_events_token: Option<Arc<SecretString>>,
}

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/wizard", post(wizard::open))
        .route("/api/wizard/{id}", get(wizard::view).delete(wizard::close))
        .route("/api/wizard/{id}/step", put(wizard::update_step))
        .route("/api/wizard/{id}/next", post(wizard::advance))
        .route("/api/wizard/{id}/back", post(wizard::back))
        .route("/api/wizard/{id}/skip", post(wizard::skip))
        .route("/api/wizard/{id}/generate", post(wizard::generate))
        .route("/api/wizard/{id}/letter", put(wizard::edit_letter))
        .route("/api/wizard/{id}/submit", post(wizard::submit))
        .route("/api/wizard/{id}/plan", post(wizard::select_plan))
        .route("/api/wizard/{id}/auth", post(wizard::authenticate))
        .route("/api/entitlement", get(account::entitlement))
        .route("/api/billing/events", post(account::billing_event))
        .route("/api/payment/return", post(account::payment_return))
        .with_state(state)
}

/// CORS for the browser client. Any origin unless one is configured.
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid CORS origin, allowing any");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "records-request"
    }))
}
