//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{SubmissionError, WizardError};
use crate::wizard::WizardView;

/// An error response, optionally carrying the session's view so the client
/// can re-render and retry.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
    view: Option<Box<WizardView>>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    view: Option<&'a WizardView>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
            view: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "auth_required", "Sign in required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_view(mut self, view: WizardView) -> Self {
        self.view = Some(Box::new(view));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<WizardError> for ApiError {
    fn from(err: WizardError) -> Self {
        let message = err.to_string();
        let (status, error) = match &err {
            WizardError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            WizardError::InvalidTransition { .. } | WizardError::NotAvailable { .. } => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            WizardError::AuthRequired => (StatusCode::UNAUTHORIZED, "auth_required"),
            WizardError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            WizardError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            WizardError::Submission(SubmissionError::Persistence(_)) => {
                (StatusCode::BAD_GATEWAY, "submission_failed")
            }
            WizardError::Submission(SubmissionError::Checkout(_)) => {
                (StatusCode::BAD_GATEWAY, "checkout_failed")
            }
        };
        Self::new(status, error, message)
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        WizardError::Submission(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: &self.message,
            view: self.view.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}
