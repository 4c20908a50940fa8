//! WizardController: one request session: collects answers step by step,
//! generates the letter, and submits or defers it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entitlement::plans::{PlanTier, Remaining, RequestLimit};
use crate::entitlement::resolver::{
    EntitlementResolver, EntitlementSnapshot, Entitlements, SnapshotSource, remaining,
};
use crate::entitlement::EntitlementCache;
use crate::error::{GenerationError, ValidationError, WizardError};
use crate::generation::GenerationService;
use crate::payment::CheckoutRedirect;
use crate::store::Database;
use crate::submission::{SubmissionPipeline, SubmissionReceipt, SubmitOutcome};
use crate::user::AuthenticatedUser;

use super::model::{GeneratedRequest, Identifiers, StepInput, WizardState};
use super::state::WizardPhase;
use super::validate::{is_valid, validate_all, validate_step};

/// Collaborators shared by every wizard session.
pub struct WizardServices {
    pub db: Arc<dyn Database>,
    pub generation: Arc<dyn GenerationService>,
    pub entitlements: Entitlements,
    pub cache: Arc<EntitlementCache>,
    pub pipeline: Arc<SubmissionPipeline>,
}

/// Serialisable snapshot of a session for clients.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub session_id: Uuid,
    pub phase: WizardPhase,
    /// Phase the auth gate will return to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_phase: Option<WizardPhase>,
    pub state: WizardState,
    pub can_advance: bool,
    pub can_skip: bool,
    pub generated: Option<GeneratedRequest>,
    pub user: Option<UserView>,
    pub entitlement: Option<EntitlementView>,
    pub error: Option<String>,
    pub request_id: Option<Uuid>,
    pub checkout_tier: Option<PlanTier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementView {
    pub subscribed: bool,
    pub product_id: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub source: SnapshotSource,
    pub limit: RequestLimit,
    pub used: u64,
    pub remaining: Remaining,
    pub can_submit: bool,
}

impl EntitlementView {
    pub fn new(resolver: &EntitlementResolver, snapshot: &EntitlementSnapshot, used: u64) -> Self {
        let limit = resolver.plan_limit(snapshot.product_id.as_deref());
        Self {
            subscribed: snapshot.subscribed,
            product_id: snapshot.product_id.clone(),
            subscription_end: snapshot.subscription_end,
            source: snapshot.source,
            limit,
            used,
            remaining: remaining(limit, used),
            can_submit: resolver.can_submit(snapshot, used),
        }
    }
}

struct SessionEntitlement {
    snapshot: EntitlementSnapshot,
    used: u64,
}

pub struct WizardController {
    id: Uuid,
    phase: WizardPhase,
    state: WizardState,
    generated: Option<GeneratedRequest>,
    user: Option<AuthenticatedUser>,
    resolver: Option<EntitlementResolver>,
    entitlement: Option<SessionEntitlement>,
    gate_return: Option<WizardPhase>,
    last_error: Option<String>,
    receipt: Option<SubmissionReceipt>,
    checkout_tier: Option<PlanTier>,
    closed: bool,
    cancel: CancellationToken,
    services: Arc<WizardServices>,
}

impl WizardController {
    /// Open a session with empty answers. A signed-in caller gets their
    /// entitlement resolved up front.
    pub async fn open(
        id: Uuid,
        services: Arc<WizardServices>,
        user: Option<AuthenticatedUser>,
        cancel: CancellationToken,
    ) -> Self {
        let mut controller = Self {
            id,
            phase: WizardPhase::default(),
            state: WizardState::default(),
            generated: None,
            user: None,
            resolver: None,
            entitlement: None,
            gate_return: None,
            last_error: None,
            receipt: None,
            checkout_tier: None,
            closed: false,
            cancel,
            services,
        };
        if let Some(user) = user {
            controller.attach_user(user).await;
        }
        info!(session_id = %id, signed_in = controller.user.is_some(), "Wizard opened");
        controller
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn generated(&self) -> Option<&GeneratedRequest> {
        self.generated.as_ref()
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }

    // ── Steps ───────────────────────────────────────────────────────

    /// Apply form data for the current step.
    pub fn update(&mut self, input: StepInput) -> Result<(), WizardError> {
        self.ensure_open()?;
        if !self.phase.is_input_step() {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        let target = input.phase();
        if target != self.phase {
            return Err(WizardError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }
        self.state.apply(input);
        Ok(())
    }

    /// Move to the next step if the current one validates. Advancing past
    /// `context` starts generation.
    pub async fn advance(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        if !self.phase.is_input_step() {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        validate_step(self.phase, &self.state)?;
        match self.phase.next_step() {
            Some(next) => self.transition(next),
            None => self.generate().await,
        }
    }

    /// Step back. Answers are kept; leaving `preview` drops the letter.
    pub fn back(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        let Some(previous) = self.phase.previous() else {
            return Err(WizardError::NotAvailable { phase: self.phase });
        };
        if self.phase == WizardPhase::Preview {
            self.generated = None;
        }
        self.last_error = None;
        self.transition(previous)
    }

    /// Skip an optional step: clear its answers, then continue.
    pub async fn skip(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        match self.phase {
            WizardPhase::Identifiers => self.state.identifiers = Identifiers::default(),
            WizardPhase::Context => self.state.context = None,
            phase => return Err(WizardError::NotAvailable { phase }),
        }
        self.advance().await
    }

    // ── Generation ──────────────────────────────────────────────────

    /// Generate the letter from the collected answers.
    ///
    /// On failure the session returns to `context` with its answers
    /// untouched and the error recorded for display; generation can be
    /// retried.
    pub async fn generate(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        if !self.phase.can_transition_to(WizardPhase::Generating) {
            return Err(WizardError::InvalidTransition {
                from: self.phase,
                to: WizardPhase::Generating,
            });
        }
        validate_all(&self.state)?;
        let Some(user) = self.user.clone() else {
            self.enter_auth_gate()?;
            return Err(WizardError::AuthRequired);
        };

        self.last_error = None;
        self.transition(WizardPhase::Generating)?;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            r = self.services.generation.generate(&self.state, &user) => r,
        };

        match result {
            Ok(generated) => {
                self.generated = Some(generated);
                self.transition(WizardPhase::Preview)
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Letter generation failed");
                self.last_error = Some(e.to_string());
                self.transition(WizardPhase::Context)?;
                Err(e.into())
            }
        }
    }

    /// Replace the generated letter with the user's edit.
    pub fn edit_letter(&mut self, letter: String) -> Result<(), WizardError> {
        self.ensure_open()?;
        if self.phase != WizardPhase::Preview {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        if letter.trim().is_empty() {
            return Err(ValidationError::new(WizardPhase::Preview, "The letter cannot be empty").into());
        }
        let Some(generated) = self.generated.as_mut() else {
            return Err(WizardError::NotAvailable { phase: self.phase });
        };
        generated.letter = letter;
        Ok(())
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Submit the previewed letter. Ends in `success` when the user is
    /// entitled, otherwise in `plan_selection` with the draft parked.
    pub async fn submit(&mut self) -> Result<WizardPhase, WizardError> {
        self.ensure_open()?;
        if self.phase != WizardPhase::Preview {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        let Some(user) = self.user.clone() else {
            self.enter_auth_gate()?;
            return Err(WizardError::AuthRequired);
        };
        let letter = self
            .generated
            .as_ref()
            .map(|g| g.letter.clone())
            .ok_or(WizardError::NotAvailable { phase: self.phase })?;

        self.last_error = None;
        self.refresh_entitlement().await?;
        let (snapshot, used) = match &self.entitlement {
            Some(e) => (e.snapshot.clone(), e.used),
            None => (EntitlementSnapshot::unsubscribed(SnapshotSource::Billing), 0),
        };

        let outcome = self
            .services
            .pipeline
            .attempt_submit(&user, &self.state, Some(&letter), &snapshot, used)
            .await;

        match outcome {
            Ok(SubmitOutcome::Submitted(receipt)) => {
                self.succeed(receipt)?;
                // Counts changed; make the next dashboard read refetch.
                self.services.cache.invalidate(&user.id).await;
            }
            Ok(SubmitOutcome::Deferred) => self.transition(WizardPhase::PlanSelection)?,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Submission failed");
                self.last_error = Some(e.to_string());
                return Err(e.into());
            }
        }
        Ok(self.phase)
    }

    /// Start checkout for the chosen plan. The session stays in
    /// `plan_selection`; the payment return files the parked draft.
    pub async fn select_plan(&mut self, tier: PlanTier) -> Result<CheckoutRedirect, WizardError> {
        self.ensure_open()?;
        if self.phase != WizardPhase::PlanSelection {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        let Some(user) = self.user.clone() else {
            self.enter_auth_gate()?;
            return Err(WizardError::AuthRequired);
        };

        match self.services.pipeline.hand_off(&user, tier).await {
            Ok(redirect) => {
                self.checkout_tier = Some(tier);
                Ok(redirect)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn succeed(&mut self, receipt: SubmissionReceipt) -> Result<(), WizardError> {
        self.transition(WizardPhase::Success)?;
        info!(session_id = %self.id, request_id = %receipt.request_id(), "Wizard completed");
        self.receipt = Some(receipt);
        Ok(())
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Attach a signed-in user. Leaves the auth gate if it was showing.
    pub async fn authenticate(&mut self, user: AuthenticatedUser) -> Result<(), WizardError> {
        self.ensure_open()?;
        self.attach_user(user).await;
        if self.phase == WizardPhase::AuthGate {
            let resume = self.gate_return.take().unwrap_or_default();
            debug!(session_id = %self.id, phase = %resume, "Leaving auth gate");
            self.phase = resume;
        }
        Ok(())
    }

    /// Drop the user. Answers are kept behind the auth gate.
    pub fn sign_out(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        self.user = None;
        self.resolver = None;
        self.entitlement = None;
        if self.phase.can_enter_auth_gate() {
            self.enter_auth_gate()?;
        }
        Ok(())
    }

    async fn attach_user(&mut self, user: AuthenticatedUser) {
        let switching = self.user.as_ref().is_some_and(|u| u.id != user.id);
        if switching || self.resolver.is_none() {
            self.resolver = Some(self.services.entitlements.resolver_for(&user).await);
        }
        self.user = Some(user);
        if let Err(e) = self.refresh_entitlement().await {
            warn!(session_id = %self.id, error = %e, "Entitlement refresh failed");
        }
    }

    /// Re-resolve entitlement and the user's request count. A failed count
    /// fails closed.
    pub async fn refresh_entitlement(&mut self) -> Result<(), WizardError> {
        let Some(user) = self.user.clone() else {
            return Err(WizardError::AuthRequired);
        };
        let resolver = match &self.resolver {
            Some(r) => r.clone(),
            None => {
                let r = self.services.entitlements.resolver_for(&user).await;
                self.resolver = Some(r.clone());
                r
            }
        };

        let resolved = resolver.resolve(&user).await;
        // The cache holds what billing said; a count failure only closes
        // this session.
        self.services.cache.insert(&user.id, resolved.clone()).await;
        let (snapshot, used) = match self.services.db.count_requests(&user.id).await {
            Ok(n) => (resolved, n),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to count requests, treating as unsubscribed");
                (EntitlementSnapshot::unsubscribed(resolved.source), 0)
            }
        };
        debug!(
            session_id = %self.id,
            subscribed = snapshot.subscribed,
            used,
            "Entitlement refreshed"
        );
        self.entitlement = Some(SessionEntitlement { snapshot, used });
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Close the session and cancel anything in flight.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.closed = true;
        debug!(session_id = %self.id, phase = %self.phase, "Wizard closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            session_id: self.id,
            phase: self.phase,
            resume_phase: self.gate_return,
            state: self.state.clone(),
            can_advance: self.phase.is_input_step() && is_valid(self.phase, &self.state),
            can_skip: self.phase.is_optional(),
            generated: self.generated.clone(),
            user: self.user.as_ref().map(|u| UserView {
                id: u.id.clone(),
                email: u.email.clone(),
                name: u.greeting_name().to_string(),
            }),
            entitlement: match (&self.resolver, &self.entitlement) {
                (Some(resolver), Some(e)) => {
                    Some(EntitlementView::new(resolver, &e.snapshot, e.used))
                }
                _ => None,
            },
            error: self.last_error.clone(),
            request_id: self.receipt.as_ref().map(SubmissionReceipt::request_id),
            checkout_tier: self.checkout_tier,
        }
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.closed || self.phase.is_terminal() {
            return Err(WizardError::NotAvailable { phase: self.phase });
        }
        Ok(())
    }

    fn transition(&mut self, to: WizardPhase) -> Result<(), WizardError> {
        if !self.phase.can_transition_to(to) {
            return Err(WizardError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!(session_id = %self.id, from = %self.phase, to = %to, "Wizard transition");
        self.phase = to;
        Ok(())
    }

    fn enter_auth_gate(&mut self) -> Result<(), WizardError> {
        if !self.phase.can_enter_auth_gate() {
            return Err(WizardError::InvalidTransition {
                from: self.phase,
                to: WizardPhase::AuthGate,
            });
        }
        debug!(session_id = %self.id, from = %self.phase, "Entering auth gate");
        self.gate_return = Some(self.phase);
        self.phase = WizardPhase::AuthGate;
        Ok(())
    }
}
