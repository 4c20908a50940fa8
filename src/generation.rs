//! Letter generation.
//!
//! The generation service turns a complete `WizardState` into a request
//! letter. It only ever borrows the state, so a failed call cannot leave the
//! wizard half-modified.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::GenerationError;
use crate::remote::{FunctionsClient, RemoteError};
use crate::user::AuthenticatedUser;
use crate::wizard::model::{GeneratedRequest, WizardState};

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        state: &WizardState,
        user: &AuthenticatedUser,
    ) -> Result<GeneratedRequest, GenerationError>;
}

/// Generation via the hosted `generate-request` function.
pub struct HttpGenerationService {
    client: FunctionsClient,
}

impl HttpGenerationService {
    pub fn new(client: FunctionsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(
        &self,
        state: &WizardState,
        user: &AuthenticatedUser,
    ) -> Result<GeneratedRequest, GenerationError> {
        debug!(user_id = %user.id, agency = %state.agency.name, "Requesting letter generation");

        let generated: GeneratedRequest = self
            .client
            .post_json("generate-request", user, state)
            .await
            .map_err(|e| match e {
                RemoteError::Request(reason) => GenerationError::RequestFailed { reason },
                RemoteError::Status { status, body } => {
                    GenerationError::ServiceStatus { status, body }
                }
                RemoteError::Decode(reason) => GenerationError::InvalidResponse { reason },
            })?;

        if generated.letter.trim().is_empty() {
            return Err(GenerationError::InvalidResponse {
                reason: "empty letter".to_string(),
            });
        }

        info!(
            user_id = %user.id,
            letter_chars = generated.letter.chars().count(),
            tips = generated.tips.len(),
            "Letter generated"
        );
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::wizard::model::{AgencyDetails, JurisdictionLevel};

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new("u1", "u1@example.com", "tok")
    }

    fn state() -> WizardState {
        WizardState {
            agency: AgencyDetails {
                name: "Springfield PD".into(),
                jurisdiction: Some(JurisdictionLevel::Municipal),
                ..Default::default()
            },
            records_description: "Incident reports for March 2024".into(),
            ..Default::default()
        }
    }

    async fn service_with(response: ResponseTemplate) -> (MockServer, HttpGenerationService) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-request"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "agency": {"name": "Springfield PD", "jurisdiction": "municipal"},
                "recordsDescription": "Incident reports for March 2024"
            })))
            .respond_with(response)
            .mount(&server)
            .await;
        let client = FunctionsClient::new(server.uri(), None, Duration::from_secs(5));
        (server, HttpGenerationService::new(client))
    }

    #[tokio::test]
    async fn returns_generated_letter() {
        let (_server, service) = service_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({
                "letter": "To the Records Custodian...",
                "estimatedResponseTime": "10 business days",
                "tips": ["Keep a copy", "Follow up after 10 days"]
            }),
        ))
        .await;

        let generated = service.generate(&state(), &user()).await.unwrap();
        assert_eq!(generated.letter, "To the Records Custodian...");
        assert_eq!(generated.tips.len(), 2);
    }

    #[tokio::test]
    async fn empty_letter_is_a_failure() {
        let (_server, service) = service_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"letter": "  "})),
        )
        .await;

        let err = service.generate(&state(), &user()).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn service_error_is_reported() {
        let (_server, service) =
            service_with(ResponseTemplate::new(500).set_body_string("model overloaded")).await;

        let err = service.generate(&state(), &user()).await.unwrap_err();
        match err {
            GenerationError::ServiceStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
