//! Request submission and the deferred-behind-payment path.

pub mod pending;
pub mod pipeline;

pub use pending::{PENDING_SUBMISSION_KEY, PendingSubmission};
pub use pipeline::{SubmissionPipeline, SubmissionReceipt, SubmitOutcome};
