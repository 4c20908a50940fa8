//! Wizard answers and the generated letter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Government level the target agency belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionLevel {
    Federal,
    State,
    County,
    Municipal,
}

impl std::fmt::Display for JurisdictionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Federal => write!(f, "federal"),
            Self::State => write!(f, "state"),
            Self::County => write!(f, "county"),
            Self::Municipal => write!(f, "municipal"),
        }
    }
}

/// Who the request is addressed to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgencyDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<JurisdictionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// When the requested records were created.
///
/// Each variant carries only its own date fields, so switching the kind
/// drops whatever the previous kind held.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timeframe {
    Exact {
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    Range {
        #[serde(default)]
        start: Option<NaiveDate>,
        #[serde(default)]
        end: Option<NaiveDate>,
    },
    Unsure,
}

impl Timeframe {
    /// Re-selecting the same kind keeps the dates already entered; a
    /// different kind replaces them.
    fn merge(self, incoming: Self) -> Self {
        match (self, incoming) {
            (Self::Exact { date: old }, Self::Exact { date }) => Self::Exact { date: date.or(old) },
            (Self::Range { start: s0, end: e0 }, Self::Range { start, end }) => Self::Range {
                start: start.or(s0),
                end: end.or(e0),
            },
            (_, incoming) => incoming,
        }
    }
}

/// Optional details that help the agency locate records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// How the requester wants to receive the records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatPreference {
    Electronic {
        #[serde(default, rename = "fileType")]
        file_type: Option<String>,
    },
    Paper {
        #[serde(default, rename = "mailingAddress")]
        mailing_address: Option<String>,
    },
    Inspection,
}

impl FormatPreference {
    fn merge(self, incoming: Self) -> Self {
        match (self, incoming) {
            (Self::Electronic { file_type: old }, Self::Electronic { file_type }) => {
                Self::Electronic {
                    file_type: file_type.or(old),
                }
            }
            (Self::Paper { mailing_address: old }, Self::Paper { mailing_address }) => {
                Self::Paper {
                    mailing_address: mailing_address.or(old),
                }
            }
            (_, incoming) => incoming,
        }
    }
}

/// Accumulated wizard answers.
///
/// This is also the request body sent to the generation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub agency: AgencyDetails,
    pub records_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    #[serde(default)]
    pub identifiers: Identifiers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Max characters of the description kept as the record type label.
const RECORD_TYPE_MAX_CHARS: usize = 80;

impl WizardState {
    /// Agency type as stored on the request record.
    pub fn agency_type(&self) -> String {
        self.agency
            .jurisdiction
            .map(|j| j.to_string())
            .unwrap_or_default()
    }

    /// Short label for the requested records: the first line of the
    /// description, cut to a bounded length.
    pub fn record_type(&self) -> String {
        let first_line = self
            .records_description
            .trim()
            .lines()
            .next()
            .unwrap_or_default()
            .trim();
        if first_line.chars().count() <= RECORD_TYPE_MAX_CHARS {
            return first_line.to_string();
        }
        let cut: String = first_line.chars().take(RECORD_TYPE_MAX_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    }

    /// Apply one step's input. The caller is responsible for checking that
    /// the input belongs to the current step.
    pub fn apply(&mut self, input: StepInput) {
        match input {
            StepInput::Agency(agency) => self.agency = agency,
            StepInput::Records { description } => self.records_description = description,
            StepInput::Timeframe { timeframe } => {
                self.timeframe = match (self.timeframe.take(), timeframe) {
                    (Some(current), Some(incoming)) => Some(current.merge(incoming)),
                    (_, incoming) => incoming,
                }
            }
            StepInput::Identifiers(identifiers) => self.identifiers = identifiers,
            StepInput::Format { format } => {
                self.format = match (self.format.take(), format) {
                    (Some(current), Some(incoming)) => Some(current.merge(incoming)),
                    (_, incoming) => incoming,
                }
            }
            StepInput::Context { context } => {
                self.context = context.filter(|c| !c.trim().is_empty())
            }
        }
    }
}

/// One step's form data, as posted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepInput {
    Agency(AgencyDetails),
    Records {
        description: String,
    },
    Timeframe {
        #[serde(default)]
        timeframe: Option<Timeframe>,
    },
    Identifiers(Identifiers),
    Format {
        #[serde(default)]
        format: Option<FormatPreference>,
    },
    Context {
        #[serde(default)]
        context: Option<String>,
    },
}

impl StepInput {
    /// The wizard phase this input belongs to.
    pub fn phase(&self) -> super::state::WizardPhase {
        use super::state::WizardPhase;
        match self {
            Self::Agency(_) => WizardPhase::Agency,
            Self::Records { .. } => WizardPhase::Records,
            Self::Timeframe { .. } => WizardPhase::Timeframe,
            Self::Identifiers(_) => WizardPhase::Identifiers,
            Self::Format { .. } => WizardPhase::Format,
            Self::Context { .. } => WizardPhase::Context,
        }
    }
}

/// The letter produced by the generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRequest {
    pub letter: String,
    #[serde(default)]
    pub estimated_response_time: String,
    #[serde(default)]
    pub tips: Vec<String>,
}
