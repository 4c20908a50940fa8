//! `Database` trait: single async interface for request records and
//! per-user settings slots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entitlement::plans::RequestLimit;
use crate::error::DatabaseError;

/// Lifecycle status of a persisted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Sent,
    Completed,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "completed" => Self::Completed,
            "denied" => Self::Denied,
            _ => Self::Pending,
        }
    }
}

/// Fields for inserting a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub user_id: String,
    pub agency_name: String,
    pub agency_type: String,
    pub record_type: String,
    pub record_description: String,
    pub letter: Option<String>,
}

/// A persisted request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub user_id: String,
    pub agency_name: String,
    pub agency_type: String,
    pub record_type: String,
    pub record_description: String,
    pub letter: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a quota-guarded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedInsert {
    Inserted(Uuid),
    /// The user already has as many requests as the limit allows.
    QuotaExhausted,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Requests ────────────────────────────────────────────────────

    /// Insert a request unconditionally. Returns the generated id.
    async fn insert_request(&self, request: &NewRequest) -> Result<Uuid, DatabaseError>;

    /// Insert a request only if the user's existing request count is below
    /// `limit`. The count and the insert happen in one statement.
    async fn insert_request_within_limit(
        &self,
        request: &NewRequest,
        limit: RequestLimit,
    ) -> Result<GuardedInsert, DatabaseError>;

    /// Number of requests the user has persisted.
    async fn count_requests(&self, user_id: &str) -> Result<u64, DatabaseError>;

    /// Get a request by id.
    async fn get_request(&self, id: Uuid) -> Result<Option<RequestRecord>, DatabaseError>;

    /// A user's requests, newest first.
    async fn list_requests(&self, user_id: &str) -> Result<Vec<RequestRecord>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Raw value of a settings slot. Callers validate the contents.
    async fn get_setting(&self, user_id: &str, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Overwrite a settings slot.
    async fn set_setting(&self, user_id: &str, key: &str, value: &str)
        -> Result<(), DatabaseError>;

    /// Delete a settings slot. Returns whether it existed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;

    /// Delete a settings slot and return what it held, in one statement.
    async fn take_setting(&self, user_id: &str, key: &str)
        -> Result<Option<String>, DatabaseError>;
}
