//! Wizard state machine: the phases a request session moves through.

use serde::{Deserialize, Serialize};

/// The phases of the request wizard.
///
/// Forward order: Agency → Records → Timeframe → Identifiers → Format →
/// Context → Generating → Preview → (PlanSelection | Success).
/// `AuthGate` is entered from any editable phase when the session has no
/// signed-in user, and returns to the phase it was entered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    #[default]
    Agency,
    Records,
    Timeframe,
    Identifiers,
    Format,
    Context,
    Generating,
    Preview,
    PlanSelection,
    Success,
    AuthGate,
}

impl WizardPhase {
    /// The input steps, in order.
    pub const STEPS: [WizardPhase; 6] = [
        WizardPhase::Agency,
        WizardPhase::Records,
        WizardPhase::Timeframe,
        WizardPhase::Identifiers,
        WizardPhase::Format,
        WizardPhase::Context,
    ];

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Auth-gate transitions are not listed here; they are checked with
    /// [`WizardPhase::can_enter_auth_gate`] since the gate returns to
    /// whichever phase it was entered from.
    pub fn can_transition_to(&self, target: WizardPhase) -> bool {
        use WizardPhase::*;
        matches!(
            (self, target),
            // forward
            (Agency, Records)
                | (Records, Timeframe)
                | (Timeframe, Identifiers)
                | (Identifiers, Format)
                | (Format, Context)
                | (Format, Generating)
                | (Context, Generating)
                | (Generating, Preview)
                | (Preview, PlanSelection)
                | (Preview, Success)
                // back
                | (Records, Agency)
                | (Timeframe, Records)
                | (Identifiers, Timeframe)
                | (Format, Identifiers)
                | (Context, Format)
                | (Preview, Context)
                | (PlanSelection, Preview)
                // generation failure
                | (Generating, Context)
        )
    }

    /// Phases the auth gate may interrupt (and later resume).
    pub fn can_enter_auth_gate(&self) -> bool {
        self.is_input_step() || matches!(self, Self::Preview | Self::PlanSelection)
    }

    /// Whether this phase collects wizard input.
    pub fn is_input_step(&self) -> bool {
        Self::STEPS.contains(self)
    }

    /// Optional steps are always valid and can be skipped.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Identifiers | Self::Context)
    }

    /// Whether this phase is terminal (the controller's lifecycle is over).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Next input step in the linear progression, if any.
    pub fn next_step(&self) -> Option<WizardPhase> {
        use WizardPhase::*;
        match self {
            Agency => Some(Records),
            Records => Some(Timeframe),
            Timeframe => Some(Identifiers),
            Identifiers => Some(Format),
            Format => Some(Context),
            _ => None,
        }
    }

    /// Previous phase when navigating back, if any.
    pub fn previous(&self) -> Option<WizardPhase> {
        use WizardPhase::*;
        match self {
            Records => Some(Agency),
            Timeframe => Some(Records),
            Identifiers => Some(Timeframe),
            Format => Some(Identifiers),
            Context => Some(Format),
            Preview => Some(Context),
            PlanSelection => Some(Preview),
            _ => None,
        }
    }
}

impl std::fmt::Display for WizardPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Agency => "agency",
            Self::Records => "records",
            Self::Timeframe => "timeframe",
            Self::Identifiers => "identifiers",
            Self::Format => "format",
            Self::Context => "context",
            Self::Generating => "generating",
            Self::Preview => "preview",
            Self::PlanSelection => "plan_selection",
            Self::Success => "success",
            Self::AuthGate => "auth_gate",
        };
        write!(f, "{s}")
    }
}
