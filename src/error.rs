//! Error types for the records request service.

use crate::wizard::state::WizardPhase;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Letter generation failures. All of them are retryable from `context`.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Generation service returned status {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("Invalid response from generation service: {reason}")]
    InvalidResponse { reason: String },

    #[error("Generation cancelled")]
    Cancelled,
}

/// Billing status lookup failures. Callers fail closed on any of these.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Billing request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Billing service returned status {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("Invalid response from billing service: {reason}")]
    InvalidResponse { reason: String },
}

/// Checkout session creation failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Checkout request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Checkout service returned status {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("Invalid response from checkout service: {reason}")]
    InvalidResponse { reason: String },
}

/// Confirmation notification failures. Logged, never shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to send notification: {0}")]
    SendFailed(String),
}

/// A step's data is not complete enough to advance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step}: {message}")]
pub struct ValidationError {
    pub step: WizardPhase,
    pub message: String,
}

impl ValidationError {
    pub fn new(step: WizardPhase, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Errors raised by the wizard controller.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: WizardPhase, to: WizardPhase },

    #[error("Operation not available in phase {phase}")]
    NotAvailable { phase: WizardPhase },

    #[error("Sign in required")]
    AuthRequired,

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Wizard session {0} not found")]
    SessionNotFound(uuid::Uuid),
}

/// Errors raised by the submission pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Failed to persist request: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Payment handoff failed: {0}")]
    Checkout(#[from] CheckoutError),
}
