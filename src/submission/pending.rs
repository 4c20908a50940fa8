//! Pending submission slot.
//!
//! A draft deferred behind payment is parked in the user's
//! `pending_submission` settings slot until the payment return consumes it.
//! Reads are defensive: anything that does not parse is dropped and treated
//! as "nothing pending".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DatabaseError;
use crate::store::{Database, NewRequest};
use crate::wizard::model::WizardState;

/// Settings key for the deferred draft.
pub const PENDING_SUBMISSION_KEY: &str = "pending_submission";

/// The fields needed to file a deferred request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub agency_name: String,
    pub agency_type: String,
    pub record_type: String,
    pub record_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PendingSubmission {
    pub fn from_draft(state: &WizardState, letter: Option<&str>) -> Self {
        Self {
            agency_name: state.agency.name.trim().to_string(),
            agency_type: state.agency_type(),
            record_type: state.record_type(),
            record_description: state.records_description.trim().to_string(),
            letter: letter.map(str::to_string),
            created_at: Some(Utc::now()),
        }
    }

    /// Parse a raw slot value. Missing required fields or a blank agency
    /// name count as malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<PendingSubmission>(raw) {
            Ok(p) if !p.agency_name.trim().is_empty() => Some(p),
            Ok(_) => {
                warn!("Ignoring pending submission with no agency name");
                None
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed pending submission");
                None
            }
        }
    }

    pub fn to_new_request(&self, user_id: &str) -> NewRequest {
        NewRequest {
            user_id: user_id.to_string(),
            agency_name: self.agency_name.clone(),
            agency_type: self.agency_type.clone(),
            record_type: self.record_type.clone(),
            record_description: self.record_description.clone(),
            letter: self.letter.clone(),
        }
    }
}

/// Overwrite the user's pending slot.
pub async fn write_pending(
    db: &dyn Database,
    user_id: &str,
    pending: &PendingSubmission,
) -> Result<(), DatabaseError> {
    let raw =
        serde_json::to_string(pending).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    db.set_setting(user_id, PENDING_SUBMISSION_KEY, &raw).await
}

/// Read the user's pending slot without consuming it. A malformed value is
/// deleted.
pub async fn read_pending(
    db: &dyn Database,
    user_id: &str,
) -> Result<Option<PendingSubmission>, DatabaseError> {
    let Some(raw) = db.get_setting(user_id, PENDING_SUBMISSION_KEY).await? else {
        return Ok(None);
    };
    match PendingSubmission::parse(&raw) {
        Some(pending) => Ok(Some(pending)),
        None => {
            db.delete_setting(user_id, PENDING_SUBMISSION_KEY).await?;
            Ok(None)
        }
    }
}

/// Claim the user's pending slot. The slot is empty afterwards whether or
/// not it held a valid payload.
pub async fn take_pending(
    db: &dyn Database,
    user_id: &str,
) -> Result<Option<PendingSubmission>, DatabaseError> {
    Ok(db
        .take_setting(user_id, PENDING_SUBMISSION_KEY)
        .await?
        .as_deref()
        .and_then(PendingSubmission::parse))
}

/// Clear the user's pending slot.
pub async fn clear_pending(db: &dyn Database, user_id: &str) -> Result<bool, DatabaseError> {
    db.delete_setting(user_id, PENDING_SUBMISSION_KEY).await
}
