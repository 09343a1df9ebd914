//! Enumerations shared across the orchestrator's state, schema, and agent
//! layers.
//!
//! These replace the scattered booleans an earlier design carried
//! (`is_converting`, `ask_again`, `passed`) with named states, so a `match`
//! at each call site stays exhaustive as new states are added. See
//! `workflow::next_phase_hint` for the single dispatch point that consumes
//! [`ConversationPhase`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a session currently sits in the metadata-collection / conversion /
/// validation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Session just opened; no turns exchanged yet.
    Greeting,
    /// Gathering required/recommended NWB-DANDI fields from the user.
    CollectingMetadata,
    /// All required fields are present; asking the user to confirm before
    /// conversion starts.
    ConfirmingMetadata,
    /// Conversion Agent is running the external converter.
    Converting,
    /// Evaluation Agent is running the inspector and summarizing results.
    Validating,
    /// Validation passed with issues; awaiting the user's accept/improve
    /// decision (§4.4 `on_improvement_decision`, §4.7).
    ImprovementDecision,
    /// Validation failed outright; waiting on user approval to retry.
    AwaitingCorrectionApproval,
    /// A correction retry is in flight.
    ApplyingCorrections,
    /// Validation passed with only auto-fixable issues and the user chose
    /// "improve"; awaiting the apply/show-details/cancel decision (§4.7).
    AutoFixApproval,
    /// Validation passed (with or without informational issues); session done.
    Complete,
    /// An unrecoverable error ended the session.
    Failed,
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Greeting => "greeting",
            Self::CollectingMetadata => "collecting_metadata",
            Self::ConfirmingMetadata => "confirming_metadata",
            Self::Converting => "converting",
            Self::Validating => "validating",
            Self::ImprovementDecision => "improvement_decision",
            Self::AwaitingCorrectionApproval => "awaiting_correction_approval",
            Self::ApplyingCorrections => "applying_corrections",
            Self::AutoFixApproval => "auto_fix_approval",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How far the metadata-request conversation has gotten, independent of
/// `ConversationPhase` (§3.2). Transitions are monotonic —
/// `NotAsked -> AskedOnce -> (UserProvided | UserDeclined | ProceedingMinimal)`
/// — and only `WorkflowState::reset()` moves the value backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRequestPolicy {
    /// No metadata request has been made yet.
    NotAsked,
    /// The Conversation Agent has asked for outstanding fields at least
    /// once; no user reply has been folded in yet.
    AskedOnce,
    /// The user supplied at least one field in response to a request.
    UserProvided,
    /// The user explicitly declined to provide one or more fields
    /// (`WorkflowState::record_user_declined`).
    UserDeclined,
    /// The user chose to proceed with whatever metadata is already on
    /// hand rather than keep answering requests.
    ProceedingMinimal,
}

/// Purely a prompt-rendering concern (how many outstanding fields to ask
/// about in one LLM turn), recomputed fresh every turn from how much
/// conversation has happened so far. Distinct from [`MetadataRequestPolicy`],
/// which tracks the request/response history itself — conflating the two
/// was the exact "scattered state" problem §9 calls out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPromptStyle {
    /// Ask about every outstanding required field in one turn.
    AskAll,
    /// Ask about a single field at a time, once the user has started
    /// answering, to keep turns short.
    AskOneAtATime,
}

/// Coarse result of a single inspector run, independent of individual
/// finding severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    PassedWithIssues,
    Failed,
}

/// Lifecycle status of validation for the current session, tracked on
/// `WorkflowState` independently of the outcome of any one run (a session
/// can be `InProgress` before any outcome exists).
///
/// `spec.md` §3.2 lists this enum without a `passed_with_issues` member,
/// distinct from `ValidationOutcome`: a fresh `run_validation` outcome of
/// `PassedWithIssues` is recorded here as plain `Passed` (the issue list
/// itself lives on `WorkflowState::validation_errors`; whether the user has
/// already been asked to decide is the `ConversationPhase`, not this enum).
/// `PassedAccepted`/`PassedImproved`/`FailedAccepted` are the three outcomes
/// of §4.6/§4.7's accept/improve decision, reached only from a prior
/// `Passed`-with-issues or `Failed` status — see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    NotRun,
    InProgress,
    Passed,
    /// User chose "accept as-is" on a `passed_with_issues` result (§4.7 cancel branch).
    PassedAccepted,
    /// A correction retry triggered by "improve" subsequently passed.
    PassedImproved,
    /// Retries were exhausted on a `failed` result and the user accepted it as-is (§7).
    FailedAccepted,
    Failed,
}

impl From<ValidationOutcome> for ValidationStatus {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Passed | ValidationOutcome::PassedWithIssues => Self::Passed,
            ValidationOutcome::Failed => Self::Failed,
        }
    }
}

/// Status of the conversion step, tracked independently of validation.
/// Named exactly as `spec.md` §3.1 lists it rather than collapsed to a
/// coarser in-progress/done pair, since the Conversation Agent's upload and
/// pre-conversion handlers each set a distinct member of this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Idle,
    Uploading,
    UploadAcknowledged,
    DetectingFormat,
    AwaitingMetadata,
    Converting,
    Validating,
    AwaitingUserInput,
    Completed,
    Failed,
}

impl ConversionStatus {
    /// Whether the conversion step itself finished, successfully or not —
    /// distinct from `Completed`, which also implies validation finished.
    #[must_use]
    pub fn conversion_finished(self) -> bool {
        matches!(
            self,
            Self::Validating | Self::AwaitingUserInput | Self::Completed | Self::Failed
        )
    }
}

/// How strongly the schema catalog wants a given field filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRequirementLevel {
    Required,
    Recommended,
    Optional,
}

/// Primitive shape the schema catalog expects a field's value to take,
/// used by `schema::validate` and `schema::normalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Date,
    Boolean,
    Enum { allowed: Vec<String> },
}

/// Severity of a single inspector finding, mirroring the NWB Inspector's own
/// levels. `Info` findings never fail validation on their own (§7 / §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    BestPracticeSuggestion,
    BestPracticeViolation,
    Critical,
}

impl Severity {
    /// Whether a finding at this severity alone should fail validation.
    /// Only `Critical` is blocking (§4.6): `BestPracticeViolation` still
    /// lands in `passed_with_issues` alongside `Info`/`BestPracticeSuggestion`.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_outcome_maps_onto_status() {
        assert_eq!(
            ValidationStatus::from(ValidationOutcome::PassedWithIssues),
            ValidationStatus::Passed
        );
    }

    #[test]
    fn only_critical_blocks() {
        assert!(!Severity::Info.is_blocking());
        assert!(Severity::Critical.is_blocking());
        assert!(!Severity::BestPracticeViolation.is_blocking());
        assert!(!Severity::BestPracticeSuggestion.is_blocking());
    }

    #[test]
    fn phase_display_is_snake_case() {
        assert_eq!(ConversationPhase::CollectingMetadata.to_string(), "collecting_metadata");
    }
}
