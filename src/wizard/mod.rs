//! Request wizard: step model, validation, the session controller and the
//! store of live sessions.

pub mod controller;
pub mod draft;
pub mod model;
pub mod state;
pub mod validate;

pub use controller::{WizardController, WizardServices, WizardView};
pub use draft::{DraftStore, SessionHandle};
pub use model::{GeneratedRequest, StepInput, WizardState};
pub use state::WizardPhase;
