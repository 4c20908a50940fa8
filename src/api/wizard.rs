//! Wizard session endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::entitlement::plans::PlanTier;
use crate::error::WizardError;
use crate::wizard::{SessionHandle, StepInput, WizardController, WizardView};

use super::AppState;
use super::error::ApiError;
use super::identity::caller;

type ViewResult = Result<Json<WizardView>, ApiError>;

/// Turn a controller result into a response. Errors carry the view.
fn respond<T>(wizard: &WizardController, result: Result<T, WizardError>) -> ViewResult {
    match result {
        Ok(_) => Ok(Json(wizard.view())),
        Err(e) => Err(ApiError::from(e).with_view(wizard.view())),
    }
}

/// A session with a user only answers to that user. Anonymous sessions are
/// open to anyone holding the id.
fn check_owner(owner: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(owner) = owner else {
        return Ok(());
    };
    match caller(headers) {
        None => Err(ApiError::unauthorized()),
        Some(caller) if caller.id != owner => {
            Err(ApiError::forbidden("Session belongs to another user"))
        }
        Some(_) => Ok(()),
    }
}

/// Look up a session, refusing callers who are not its user.
async fn session(state: &AppState, id: Uuid, headers: &HeaderMap) -> Result<SessionHandle, ApiError> {
    let handle = state.drafts.get(id).await?;
    check_owner(handle.lock().await.user().map(|u| u.id.as_str()), headers)?;
    Ok(handle)
}

/// POST /api/wizard
pub(super) async fn open(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (session_id, view) = state.drafts.create(caller(&headers)).await;
    info!(%session_id, "Wizard session created");
    (
        StatusCode::CREATED,
        Json(json!({"session_id": session_id, "view": view})),
    )
}

/// GET /api/wizard/{id}
pub(super) async fn view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let wizard = handle.lock().await;
    Ok(Json(wizard.view()))
}

/// PUT /api/wizard/{id}/step
pub(super) async fn update_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<StepInput>,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.update(input);
    respond(&wizard, result)
}

/// POST /api/wizard/{id}/next
pub(super) async fn advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.advance().await;
    respond(&wizard, result)
}

/// POST /api/wizard/{id}/back
pub(super) async fn back(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.back();
    respond(&wizard, result)
}

/// POST /api/wizard/{id}/skip
pub(super) async fn skip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.skip().await;
    respond(&wizard, result)
}

/// POST /api/wizard/{id}/generate
pub(super) async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.generate().await;
    respond(&wizard, result)
}

#[derive(Deserialize)]
pub(super) struct LetterEdit {
    letter: String,
}

/// PUT /api/wizard/{id}/letter
pub(super) async fn edit_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LetterEdit>,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.edit_letter(body.letter);
    respond(&wizard, result)
}

/// POST /api/wizard/{id}/submit
pub(super) async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let result = wizard.submit().await;
    respond(&wizard, result)
}

#[derive(Deserialize)]
pub(super) struct PlanChoice {
    tier: PlanTier,
}

/// POST /api/wizard/{id}/plan
pub(super) async fn select_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<PlanChoice>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    match wizard.select_plan(body.tier).await {
        Ok(redirect) => Ok(Json(json!({"url": redirect.url, "tier": redirect.tier}))),
        Err(e) => Err(ApiError::from(e).with_view(wizard.view())),
    }
}

/// POST /api/wizard/{id}/auth
pub(super) async fn authenticate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ViewResult {
    let Some(user) = caller(&headers) else {
        return Err(ApiError::unauthorized());
    };
    let handle = session(&state, id, &headers).await?;
    let mut wizard = handle.lock().await;
    let user_id = user.id.clone();
    let result = wizard.authenticate(user).await;
    if result.is_ok() {
        state.drafts.set_owner(id, &user_id).await?;
    }
    respond(&wizard, result)
}

/// DELETE /api/wizard/{id}
pub(super) async fn close(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner = state.drafts.owner(id).await?;
    check_owner(owner.as_deref(), &headers)?;
    state.drafts.close(id).await?;
    Ok(Json(json!({"status": "closed"})))
}
