//! Per-step validation. Pure checks over the current `WizardState`.

use crate::error::ValidationError;

use super::model::{Timeframe, WizardState};
use super::state::WizardPhase;

/// Minimum agency name length, in characters.
pub const MIN_AGENCY_NAME_CHARS: usize = 2;
/// Minimum records description length, in characters.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Validate the data for `step`. Non-input phases and optional steps are
/// always valid.
pub fn validate_step(step: WizardPhase, state: &WizardState) -> Result<(), ValidationError> {
    match step {
        WizardPhase::Agency => validate_agency(state),
        WizardPhase::Records => validate_records(state),
        WizardPhase::Timeframe => validate_timeframe(state),
        WizardPhase::Format => validate_format(state),
        _ => Ok(()),
    }
}

/// Whether `step` has enough data to advance.
pub fn is_valid(step: WizardPhase, state: &WizardState) -> bool {
    validate_step(step, state).is_ok()
}

/// Validate every required step, returning the first failure.
pub fn validate_all(state: &WizardState) -> Result<(), ValidationError> {
    WizardPhase::STEPS
        .iter()
        .try_for_each(|step| validate_step(*step, state))
}

fn validate_agency(state: &WizardState) -> Result<(), ValidationError> {
    if state.agency.jurisdiction.is_none() {
        return Err(ValidationError::new(
            WizardPhase::Agency,
            "Select the agency's jurisdiction level",
        ));
    }
    if state.agency.name.trim().chars().count() < MIN_AGENCY_NAME_CHARS {
        return Err(ValidationError::new(
            WizardPhase::Agency,
            format!("Agency name must be at least {MIN_AGENCY_NAME_CHARS} characters"),
        ));
    }
    Ok(())
}

fn validate_records(state: &WizardState) -> Result<(), ValidationError> {
    if state.records_description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(ValidationError::new(
            WizardPhase::Records,
            format!("Describe the records in at least {MIN_DESCRIPTION_CHARS} characters"),
        ));
    }
    Ok(())
}

fn validate_timeframe(state: &WizardState) -> Result<(), ValidationError> {
    match &state.timeframe {
        None => Err(ValidationError::new(
            WizardPhase::Timeframe,
            "Choose an exact date, a date range, or unsure",
        )),
        Some(Timeframe::Exact { date: None }) => Err(ValidationError::new(
            WizardPhase::Timeframe,
            "Enter the date of the records",
        )),
        Some(Timeframe::Range { start, end }) if start.is_none() || end.is_none() => Err(
            ValidationError::new(WizardPhase::Timeframe, "Enter both a start and an end date"),
        ),
        Some(_) => Ok(()),
    }
}

fn validate_format(state: &WizardState) -> Result<(), ValidationError> {
    if state.format.is_none() {
        return Err(ValidationError::new(
            WizardPhase::Format,
            "Choose how you want to receive the records",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::wizard::model::{FormatPreference, Identifiers, JurisdictionLevel};

    fn date(s: &str) -> Option<NaiveDate> {
        Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    fn complete_state() -> WizardState {
        let mut state = WizardState::default();
        state.agency.name = "State Police".into();
        state.agency.jurisdiction = Some(JurisdictionLevel::State);
        state.records_description = "Incident reports from March".into();
        state.timeframe = Some(Timeframe::Unsure);
        state.format = Some(FormatPreference::Electronic { file_type: None });
        state
    }

    #[test]
    fn agency_requires_jurisdiction() {
        let mut state = complete_state();
        state.agency.jurisdiction = None;
        let err = validate_step(WizardPhase::Agency, &state).unwrap_err();
        assert_eq!(err.step, WizardPhase::Agency);
    }

    #[test]
    fn agency_name_length_boundary() {
        let mut state = complete_state();
        state.agency.name = "A".into();
        assert!(!is_valid(WizardPhase::Agency, &state));
        state.agency.name = " A ".into();
        assert!(!is_valid(WizardPhase::Agency, &state));
        state.agency.name = "AB".into();
        assert!(is_valid(WizardPhase::Agency, &state));
    }

    #[test]
    fn records_description_boundary() {
        let mut state = complete_state();
        state.records_description = "123456789".into();
        assert!(!is_valid(WizardPhase::Records, &state));
        state.records_description = "1234567890".into();
        assert!(is_valid(WizardPhase::Records, &state));
    }

    #[test]
    fn timeframe_requires_selection() {
        let mut state = complete_state();
        state.timeframe = None;
        assert!(!is_valid(WizardPhase::Timeframe, &state));
        state.timeframe = Some(Timeframe::Unsure);
        assert!(is_valid(WizardPhase::Timeframe, &state));
    }

    #[test]
    fn exact_timeframe_requires_date() {
        let mut state = complete_state();
        state.timeframe = Some(Timeframe::Exact { date: None });
        assert!(!is_valid(WizardPhase::Timeframe, &state));
        state.timeframe = Some(Timeframe::Exact {
            date: date("2023-06-01"),
        });
        assert!(is_valid(WizardPhase::Timeframe, &state));
    }

    #[test]
    fn range_timeframe_requires_both_dates() {
        let mut state = complete_state();
        state.timeframe = Some(Timeframe::Range {
            start: date("2023-01-01"),
            end: None,
        });
        assert!(!is_valid(WizardPhase::Timeframe, &state));
        state.timeframe = Some(Timeframe::Range {
            start: None,
            end: date("2023-01-01"),
        });
        assert!(!is_valid(WizardPhase::Timeframe, &state));
        state.timeframe = Some(Timeframe::Range {
            start: date("2023-01-01"),
            end: date("2023-12-31"),
        });
        assert!(is_valid(WizardPhase::Timeframe, &state));
    }

    #[test]
    fn format_requires_selection() {
        let mut state = complete_state();
        state.format = None;
        assert!(!is_valid(WizardPhase::Format, &state));
    }

    #[test]
    fn optional_steps_always_valid() {
        let state = WizardState::default();
        assert!(is_valid(WizardPhase::Identifiers, &state));
        assert!(is_valid(WizardPhase::Context, &state));

        let mut with_data = state.clone();
        with_data.identifiers = Identifiers {
            case_number: Some("CR-1".into()),
            ..Default::default()
        };
        assert!(is_valid(WizardPhase::Identifiers, &with_data));
    }

    #[test]
    fn validate_all_reports_first_failure() {
        assert!(validate_all(&complete_state()).is_ok());

        let mut state = complete_state();
        state.records_description.clear();
        state.format = None;
        let err = validate_all(&state).unwrap_err();
        assert_eq!(err.step, WizardPhase::Records);
    }
}
