//! Submission pipeline: file the request now, or park it behind payment.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::entitlement::plans::{PlanCatalog, PlanTier};
use crate::entitlement::resolver::{EntitlementSnapshot, can_submit};
use crate::error::SubmissionError;
use crate::notify::{Confirmation, ConfirmationNotifier};
use crate::payment::{CheckoutRedirect, PaymentHandoff};
use crate::store::{Database, GuardedInsert, NewRequest};
use crate::user::AuthenticatedUser;
use crate::wizard::model::WizardState;

use super::pending::{PendingSubmission, clear_pending, take_pending, write_pending};

/// Proof that a request was persisted. Only the pipeline can issue one, and
/// the wizard needs one to reach `success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    request_id: Uuid,
}

impl SubmissionReceipt {
    fn issued(request_id: Uuid) -> Self {
        Self { request_id }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Result of a submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Persisted; the wizard may show success.
    Submitted(SubmissionReceipt),
    /// Not entitled (or the quota ran out). The draft is in the pending slot
    /// and the user must pick a plan.
    Deferred,
}

pub struct SubmissionPipeline {
    db: Arc<dyn Database>,
    catalog: Arc<PlanCatalog>,
    notifier: Arc<dyn ConfirmationNotifier>,
    handoff: PaymentHandoff,
}

impl SubmissionPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        catalog: Arc<PlanCatalog>,
        notifier: Arc<dyn ConfirmationNotifier>,
        handoff: PaymentHandoff,
    ) -> Self {
        Self {
            db,
            catalog,
            notifier,
            handoff,
        }
    }

    /// Submit the draft if the snapshot allows it, otherwise defer it.
    pub async fn attempt_submit(
        &self,
        user: &AuthenticatedUser,
        state: &WizardState,
        letter: Option<&str>,
        snapshot: &EntitlementSnapshot,
        used: u64,
    ) -> Result<SubmitOutcome, SubmissionError> {
        let limit = self.catalog.limit_for(snapshot.product_id.as_deref());

        if can_submit(limit, snapshot, used) {
            let request = NewRequest {
                user_id: user.id.clone(),
                agency_name: state.agency.name.trim().to_string(),
                agency_type: state.agency_type(),
                record_type: state.record_type(),
                record_description: state.records_description.trim().to_string(),
                letter: letter.map(str::to_string),
            };
            match self.db.insert_request_within_limit(&request, limit).await? {
                GuardedInsert::Inserted(id) => {
                    info!(user_id = %user.id, request_id = %id, "Request submitted");
                    // An earlier deferral of this draft must not be filed
                    // again on payment return.
                    if let Err(e) = clear_pending(self.db.as_ref(), &user.id).await {
                        warn!(user_id = %user.id, error = %e, "Failed to clear pending submission");
                    }
                    self.notify(user, &request, id);
                    return Ok(SubmitOutcome::Submitted(SubmissionReceipt::issued(id)));
                }
                GuardedInsert::QuotaExhausted => {
                    warn!(user_id = %user.id, "Quota used up by a concurrent submission, deferring");
                }
            }
        }

        let pending = PendingSubmission::from_draft(state, letter);
        write_pending(self.db.as_ref(), &user.id, &pending).await?;
        info!(
            user_id = %user.id,
            subscribed = snapshot.subscribed,
            used,
            "Submission deferred until payment"
        );
        Ok(SubmitOutcome::Deferred)
    }

    /// Payment-return entry point. Files the parked draft, if any. Safe to
    /// call repeatedly: only the first call after a deferral inserts.
    pub async fn consume_pending(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Option<SubmissionReceipt>, SubmissionError> {
        let Some(pending) = take_pending(self.db.as_ref(), &user.id).await? else {
            return Ok(None);
        };

        let request = pending.to_new_request(&user.id);
        match self.db.insert_request(&request).await {
            Ok(id) => {
                info!(user_id = %user.id, request_id = %id, "Pending submission filed after payment");
                self.notify(user, &request, id);
                Ok(Some(SubmissionReceipt::issued(id)))
            }
            Err(e) => {
                if let Err(restore) = write_pending(self.db.as_ref(), &user.id, &pending).await {
                    warn!(user_id = %user.id, error = %restore, "Failed to restore pending submission");
                }
                Err(e.into())
            }
        }
    }

    /// Start checkout for `tier`. Returns the redirect URL.
    pub async fn hand_off(
        &self,
        user: &AuthenticatedUser,
        tier: PlanTier,
    ) -> Result<CheckoutRedirect, SubmissionError> {
        Ok(self.handoff.begin(user, tier).await?)
    }

    /// Fire-and-forget confirmation.
    fn notify(&self, user: &AuthenticatedUser, request: &NewRequest, request_id: Uuid) {
        let confirmation = Confirmation {
            recipient: user.email.clone(),
            name: user.greeting_name().to_string(),
            agency_name: request.agency_name.clone(),
            record_type: request.record_type.clone(),
            request_id,
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send_confirmation(&confirmation).await {
                warn!(request_id = %confirmation.request_id, error = %e, "Confirmation not sent");
            }
        });
    }
}
