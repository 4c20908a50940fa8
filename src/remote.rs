//! Shared HTTP client for the hosted functions (generation, billing status,
//! checkout).

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::user::AuthenticatedUser;

/// Transport-level failure, mapped by each caller into its own error type.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Base URL + credentials for the hosted functions.
#[derive(Clone)]
pub struct FunctionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl FunctionsClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, function: &str) -> String {
        format!("{}/{function}", self.base_url)
    }

    /// POST `body` as JSON to `function` on behalf of `user` and decode the
    /// JSON response.
    pub async fn post_json<B, R>(
        &self,
        function: &str,
        user: &AuthenticatedUser,
        body: &B,
    ) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.url(function))
            .bearer_auth(user.bearer_token())
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(function, status = status.as_u16(), "Function call failed");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for FunctionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
