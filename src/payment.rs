//! Payment handoff: create a checkout session for a plan and hand the
//! caller a redirect URL.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entitlement::plans::{CheckoutMode, PlanCatalog, PlanTier};
use crate::error::CheckoutError;
use crate::remote::{FunctionsClient, RemoteError};
use crate::user::AuthenticatedUser;

/// Checkout parameters for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: String,
    pub mode: CheckoutMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait CheckoutSessionService: Send + Sync {
    async fn create_checkout(
        &self,
        user: &AuthenticatedUser,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError>;
}

/// Checkout via the hosted `create-checkout` function.
pub struct HttpCheckoutService {
    client: FunctionsClient,
}

impl HttpCheckoutService {
    pub fn new(client: FunctionsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckoutSessionService for HttpCheckoutService {
    async fn create_checkout(
        &self,
        user: &AuthenticatedUser,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        self.client
            .post_json("create-checkout", user, request)
            .await
            .map_err(|e| match e {
                RemoteError::Request(reason) => CheckoutError::RequestFailed { reason },
                RemoteError::Status { status, body } => CheckoutError::ServiceStatus { status, body },
                RemoteError::Decode(reason) => CheckoutError::InvalidResponse { reason },
            })
    }
}

/// Where to send the user to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
    pub tier: PlanTier,
}

/// Turns a plan choice into a checkout redirect.
#[derive(Clone)]
pub struct PaymentHandoff {
    checkout: Arc<dyn CheckoutSessionService>,
    catalog: Arc<PlanCatalog>,
}

impl PaymentHandoff {
    pub fn new(checkout: Arc<dyn CheckoutSessionService>, catalog: Arc<PlanCatalog>) -> Self {
        Self { checkout, catalog }
    }

    pub async fn begin(
        &self,
        user: &AuthenticatedUser,
        tier: PlanTier,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        let plan = self.catalog.plan(tier);
        let request = CheckoutRequest {
            price_id: plan.price_id.clone(),
            mode: plan.mode,
        };

        let session = self.checkout.create_checkout(user, &request).await?;
        let url = session
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CheckoutError::InvalidResponse {
                reason: "checkout session has no url".to_string(),
            })?;

        info!(user_id = %user.id, %tier, price_id = %plan.price_id, "Checkout session created");
        Ok(CheckoutRedirect { url, tier })
    }
}
