//! Pure predicate functions over `WorkflowState`. Centralizing the
//! "what phase comes next" / "should we retry" logic here keeps agent code
//! a thin dispatch layer rather than a tangle of per-agent if/else chains
//! (§9's re-architecture rationale).

use crate::config::OrchestratorConfig;
use crate::schema::missing_required_fields;
use crate::state::WorkflowState;
use crate::types::{ConversationPhase, ConversionStatus, MetadataPromptStyle, MetadataRequestPolicy, ValidationStatus};

/// Whether every `Required` schema field has a value.
#[must_use]
pub fn is_metadata_complete(state: &WorkflowState) -> bool {
    missing_required_fields(&state.metadata).is_empty()
}

/// How the Conversation Agent should render its next outstanding-fields
/// prompt: everything at once for a fresh conversation, one field at a time
/// once a back-and-forth is already underway. A pure function of turn
/// count, not of [`MetadataRequestPolicy`] (§9 — conflating "what to ask
/// next" with "what's happened so far" was the bug this split fixes).
#[must_use]
pub fn next_prompt_style(state: &WorkflowState) -> MetadataPromptStyle {
    if state.conversation_history.is_empty() {
        MetadataPromptStyle::AskAll
    } else {
        MetadataPromptStyle::AskOneAtATime
    }
}

/// Single dispatch point for "what phase should we be in, given the
/// current state" — used by `ConversationAgent::chat` so the match-by-phase
/// logic reads as data-driven rather than a hand-rolled if/else chain.
/// Returns `None` when the current phase is already correct.
#[must_use]
pub fn next_phase_hint(state: &WorkflowState) -> Option<ConversationPhase> {
    match state.phase {
        ConversationPhase::Greeting => Some(ConversationPhase::CollectingMetadata),
        ConversationPhase::CollectingMetadata if is_metadata_complete(state) => {
            Some(ConversationPhase::ConfirmingMetadata)
        }
        ConversationPhase::Converting if state.conversion_status == ConversionStatus::Validating => {
            Some(ConversationPhase::Validating)
        }
        ConversationPhase::Converting if state.conversion_status == ConversionStatus::Failed => {
            Some(ConversationPhase::Failed)
        }
        ConversationPhase::Validating => match state.validation_status {
            ValidationStatus::Passed if state.validation_errors.is_empty() => {
                Some(ConversationPhase::Complete)
            }
            ValidationStatus::Passed => Some(ConversationPhase::ImprovementDecision),
            ValidationStatus::Failed => Some(ConversationPhase::AwaitingCorrectionApproval),
            _ => None,
        },
        ConversationPhase::ApplyingCorrections if state.conversion_status == ConversionStatus::Validating => {
            Some(ConversationPhase::Validating)
        }
        _ => None,
    }
}

/// Whether the Conversation Agent should (re-)enter `CollectingMetadata` on
/// its next turn. A simplified form of `spec.md` §4.3's predicate: our
/// `MetadataRequestPolicy` doesn't carry a `not_asked`/history-lookback
/// distinction (see `DESIGN.md`), so this reduces to "required fields are
/// still missing and we're not already in that phase".
#[must_use]
pub fn should_request_metadata(state: &WorkflowState) -> bool {
    !is_metadata_complete(state) && state.phase != ConversationPhase::CollectingMetadata
}

/// Whether conversion may be dispatched: a source file is staged, and
/// either every required field is present or the user has explicitly opted
/// to proceed without them (`user_declined`/`proceeding_minimal`, §4.3).
#[must_use]
pub fn can_start_conversion(state: &WorkflowState) -> bool {
    state.source_path.is_some()
        && (is_metadata_complete(state)
            || matches!(
                state.metadata_request_policy,
                MetadataRequestPolicy::UserDeclined | MetadataRequestPolicy::ProceedingMinimal
            ))
}

/// Whether another correction retry is allowed under the configured cap.
#[must_use]
pub fn should_retry(state: &WorkflowState, config: &OrchestratorConfig) -> bool {
    state.validation_status == ValidationStatus::Failed
        && state.correction_attempt < config.max_retry_attempts
}

/// Whether the session has exhausted its retries and must be failed out.
#[must_use]
pub fn retries_exhausted(state: &WorkflowState, config: &OrchestratorConfig) -> bool {
    state.validation_status == ValidationStatus::Failed
        && state.correction_attempt >= config.max_retry_attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::provenance::ProvenanceRecord;
    use serde_json::json;

    fn complete_metadata_state() -> WorkflowState {
        let mut state = WorkflowState::new();
        for name in [
            "session_description",
            "identifier",
            "session_start_time",
            "subject_id",
            "subject_species",
        ] {
            state.set_metadata_field(name, json!("x"), ProvenanceRecord::user_provided());
        }
        state
    }

    #[test]
    fn greeting_always_advances_to_collecting_metadata() {
        let state = WorkflowState::new();
        assert_eq!(
            next_phase_hint(&state),
            Some(ConversationPhase::CollectingMetadata)
        );
    }

    #[test]
    fn collecting_metadata_advances_once_all_required_fields_present() {
        let mut state = complete_metadata_state();
        state.phase = ConversationPhase::CollectingMetadata;
        assert_eq!(
            next_phase_hint(&state),
            Some(ConversationPhase::ConfirmingMetadata)
        );
    }

    #[test]
    fn collecting_metadata_stays_put_while_fields_are_missing() {
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::CollectingMetadata;
        assert_eq!(next_phase_hint(&state), None);
    }

    #[test]
    fn retry_cap_is_enforced() {
        let config = OrchestratorConfig::default();
        let mut state = WorkflowState::new();
        state.validation_status = ValidationStatus::Failed;
        state.correction_attempt = config.max_retry_attempts - 1;
        assert!(should_retry(&state, &config));
        assert!(!retries_exhausted(&state, &config));

        state.correction_attempt = config.max_retry_attempts;
        assert!(!should_retry(&state, &config));
        assert!(retries_exhausted(&state, &config));
    }

    #[test]
    fn validating_with_issues_routes_to_improvement_decision() {
        let mut state = complete_metadata_state();
        state.phase = ConversationPhase::Validating;
        state.validation_status = ValidationStatus::Passed;
        state.validation_errors.push(crate::inspector::Finding {
            severity: crate::types::Severity::BestPracticeSuggestion,
            message: "keywords recommended".to_string(),
            check_name: "check_keywords".to_string(),
            auto_fixable: true,
            field: Some("keywords".to_string()),
        });
        assert_eq!(next_phase_hint(&state), Some(ConversationPhase::ImprovementDecision));
    }

    #[test]
    fn validating_clean_pass_completes_directly() {
        let mut state = complete_metadata_state();
        state.phase = ConversationPhase::Validating;
        state.validation_status = ValidationStatus::Passed;
        assert_eq!(next_phase_hint(&state), Some(ConversationPhase::Complete));
    }

    #[test]
    fn cannot_start_conversion_without_a_source_path() {
        let state = complete_metadata_state();
        assert!(!can_start_conversion(&state));
    }

    #[test]
    fn can_start_conversion_once_source_staged_and_metadata_complete() {
        let mut state = complete_metadata_state();
        state.source_path = Some("/tmp/recording.dat".into());
        assert!(can_start_conversion(&state));
    }

    #[test]
    fn should_request_metadata_while_fields_missing_and_not_already_collecting() {
        let state = WorkflowState::new();
        assert!(should_request_metadata(&state));
        let mut collecting = WorkflowState::new();
        collecting.phase = ConversationPhase::CollectingMetadata;
        assert!(!should_request_metadata(&collecting));
    }

    #[test]
    fn next_prompt_style_asks_all_on_a_fresh_conversation_then_one_at_a_time() {
        let fresh = WorkflowState::new();
        assert_eq!(next_prompt_style(&fresh), MetadataPromptStyle::AskAll);

        let mut underway = WorkflowState::new();
        underway.push_turn(crate::state::Turn::user("mouse042"));
        assert_eq!(next_prompt_style(&underway), MetadataPromptStyle::AskOneAtATime);
    }

    #[test]
    fn cannot_start_conversion_with_missing_fields_and_not_asked_policy() {
        let mut state = WorkflowState::new();
        state.source_path = Some("/tmp/recording.dat".into());
        assert!(!can_start_conversion(&state));
    }

    #[test]
    fn can_start_conversion_with_missing_fields_once_user_declined() {
        let mut state = WorkflowState::new();
        state.source_path = Some("/tmp/recording.dat".into());
        state.record_user_declined(["lab".to_string()]);
        assert!(can_start_conversion(&state));
    }

    #[test]
    fn can_start_conversion_with_missing_fields_once_proceeding_minimal() {
        let mut state = WorkflowState::new();
        state.source_path = Some("/tmp/recording.dat".into());
        state.record_proceeding_minimal();
        assert!(can_start_conversion(&state));
    }
}
