//! Billing status lookup.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::BillingError;
use crate::remote::{FunctionsClient, RemoteError};
use crate::user::AuthenticatedUser;

/// Subscription status as reported by billing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BillingStatus {
    pub subscribed: bool,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub subscription_end: Option<String>,
}

impl BillingStatus {
    /// Subscription end as a timestamp. Unparseable values are dropped.
    pub fn subscription_end_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.subscription_end.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(ndt.and_utc());
        }
        warn!(value = raw, "Ignoring unparseable subscription end date");
        None
    }
}

/// Source of truth for whether a user is subscribed.
#[async_trait]
pub trait BillingStatusService: Send + Sync {
    async fn check_subscription(&self, user: &AuthenticatedUser)
        -> Result<BillingStatus, BillingError>;
}

/// Billing status from the hosted `check-subscription` function.
pub struct HttpBillingService {
    client: FunctionsClient,
}

impl HttpBillingService {
    pub fn new(client: FunctionsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BillingStatusService for HttpBillingService {
    async fn check_subscription(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<BillingStatus, BillingError> {
        self.client
            .post_json("check-subscription", user, &serde_json::json!({}))
            .await
            .map_err(|e| match e {
                RemoteError::Request(reason) => BillingError::RequestFailed { reason },
                RemoteError::Status { status, body } => BillingError::ServiceStatus { status, body },
                RemoteError::Decode(reason) => BillingError::InvalidResponse { reason },
            })
    }
}
