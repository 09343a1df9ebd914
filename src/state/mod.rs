//! The single owned `WorkflowState` for a session, and the `StateStore`
//! that enforces "only the owning agent mutates, everyone else reads a
//! snapshot" (§5).
//!
//! Grounded in the teacher's `VersionedState`/`StateSnapshot` split, but
//! simplified: the teacher's version is a multi-channel container built for
//! parallel barrier merges across many graph nodes running the same step.
//! This orchestrator runs a fixed three-agent pipeline with one active
//! mutator at a time, so a single `state_version` counter (bumped only when
//! a mutation actually changes something, exactly like the teacher's
//! per-channel bump) is enough to let callers detect staleness without the
//! channel/reducer machinery a generic graph executor needs.

pub mod provenance;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::evaluation::CorrectionContext;
use crate::inspector::Finding;
use crate::message::Message;
use crate::session::SessionId;
use crate::state::provenance::ProvenanceRecord;
use crate::types::{ConversationPhase, ConversionStatus, MetadataRequestPolicy, ValidationStatus};

/// A single turn of conversation, pairing a [`Message`] with when it
/// happened. `spec.md` §3.1 requires a timestamp per turn that the plain
/// `Message` (role + content only) doesn't carry, so `Turn` wraps it rather
/// than duplicating role/content handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub message: Message,
    pub timestamp: DateTime<Utc>,
}

/// A single field→value guess from the one-shot metadata-inference pass
/// `on_start_conversion` runs over the file summary (§3.1 `inference_result`),
/// kept alongside `metadata` so the auto-fill step (§4.4) can later pick up
/// a low-confidence field nobody has confirmed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredValue {
    pub value: Value,
    /// 0-100.
    pub confidence: u8,
}

impl Turn {
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Message {
            role: Message::USER.to_string(),
            content: text.into(),
        })
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Message {
            role: Message::ASSISTANT.to_string(),
            content: text.into(),
        })
    }
}

/// The complete state of one conversion session. Exactly one agent mutates
/// this at a time; every other reader sees a cloned [`WorkflowStateSnapshot`]
/// (§5 "only the owning agent mutates").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: SessionId,
    pub phase: ConversationPhase,
    pub conversation_history: Vec<Turn>,
    pub metadata: FxHashMap<String, Value>,
    pub metadata_provenance: FxHashMap<String, ProvenanceRecord>,
    /// Format identifier guessed by `on_start_conversion`'s LLM-assisted
    /// detection pass (§4.4); `None` until detection has run.
    pub detected_format: Option<String>,
    /// The one-shot LLM inference pass's raw output, kept even for fields
    /// below the merge threshold so the auto-fill step can still use them
    /// (§3.1, §4.4).
    pub inference_result: FxHashMap<String, InferredValue>,
    pub metadata_request_policy: MetadataRequestPolicy,
    pub validation_status: ValidationStatus,
    pub validation_errors: Vec<Finding>,
    pub conversion_status: ConversionStatus,
    /// Source recording path the Conversion Agent will read from.
    pub source_path: Option<PathBuf>,
    /// NWB file the Conversion Agent wrote, once conversion succeeds.
    pub output_path: Option<PathBuf>,
    pub evaluation_report_path: Option<PathBuf>,
    pub inspection_report_path: Option<PathBuf>,
    /// Number of correction retries driven so far; the sole cross-retry
    /// counter per `spec.md` §9 (no per-field rewrite history is modeled).
    pub correction_attempt: u32,
    /// Fields the user explicitly declined to provide (§3.1); consulted by
    /// `should_request_metadata` so the Conversation Agent doesn't keep
    /// re-asking for something the user already refused.
    pub user_declined_fields: FxHashSet<String>,
    /// Categorization of the most recent validation's issues, kept only
    /// across a single `auto_fix_approval` turn (§3.1, §4.7). Cleared on
    /// every transition out of that phase and on `reset()`.
    pub correction_context: Option<CorrectionContext>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every mutation that actually changes the state, mirroring
    /// the teacher's channel-version-bump-on-change rule.
    pub state_version: u64,
}

impl WorkflowState {
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            phase: ConversationPhase::Greeting,
            conversation_history: Vec::new(),
            metadata: FxHashMap::default(),
            metadata_provenance: FxHashMap::default(),
            detected_format: None,
            inference_result: FxHashMap::default(),
            metadata_request_policy: MetadataRequestPolicy::NotAsked,
            validation_status: ValidationStatus::NotRun,
            validation_errors: Vec::new(),
            conversion_status: ConversionStatus::Idle,
            source_path: None,
            output_path: None,
            evaluation_report_path: None,
            inspection_report_path: None,
            correction_attempt: 0,
            user_declined_fields: FxHashSet::default(),
            correction_context: None,
            created_at: now,
            updated_at: now,
            state_version: 1,
        }
    }

    /// Inserts or overwrites a metadata field, recording its provenance.
    /// Returns `true` if the value actually changed.
    pub fn set_metadata_field(&mut self, name: impl Into<String>, value: Value, provenance: ProvenanceRecord) -> bool {
        let name = name.into();
        let changed = self.metadata.get(&name) != Some(&value);
        if changed {
            self.metadata.insert(name.clone(), value);
            self.metadata_provenance.insert(name, provenance);
        }
        changed
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.conversation_history.push(turn);
    }

    /// Unions `fields` into `user_declined_fields` and advances
    /// `metadata_request_policy` to `UserDeclined` (§4.2). Terminal and
    /// monotonic — a field already declined stays declined, and this never
    /// moves the policy back to `NotAsked`/`AskedOnce`.
    pub fn record_user_declined(&mut self, fields: impl IntoIterator<Item = String>) {
        self.user_declined_fields.extend(fields);
        self.metadata_request_policy = MetadataRequestPolicy::UserDeclined;
    }

    /// Advances `NotAsked -> AskedOnce` the first time the Conversation
    /// Agent asks the user for outstanding metadata. A no-op once the
    /// policy has moved past `NotAsked` (§3.2 monotonic transitions).
    pub fn record_metadata_requested(&mut self) {
        if self.metadata_request_policy == MetadataRequestPolicy::NotAsked {
            self.metadata_request_policy = MetadataRequestPolicy::AskedOnce;
        }
    }

    /// Advances to `UserProvided` once the user has supplied at least one
    /// field in reply to a request. A no-op past `UserDeclined`/
    /// `ProceedingMinimal` — those are terminal for the session (§3.2).
    pub fn record_user_provided_metadata(&mut self) {
        if matches!(
            self.metadata_request_policy,
            MetadataRequestPolicy::NotAsked | MetadataRequestPolicy::AskedOnce
        ) {
            self.metadata_request_policy = MetadataRequestPolicy::UserProvided;
        }
    }

    /// Advances to `ProceedingMinimal`: the user chose to start conversion
    /// without completing every required field. Terminal, like
    /// `UserDeclined` (§3.2, §4.3 `can_start_conversion`).
    pub fn record_proceeding_minimal(&mut self) {
        self.metadata_request_policy = MetadataRequestPolicy::ProceedingMinimal;
    }

    /// Sets `overall_status`/`validation_status`/the issue list together in
    /// one step, so no observer ever sees one updated without the others
    /// (§4.2, §8 invariant 5).
    pub fn set_validation_result(
        &mut self,
        outcome: crate::types::ValidationOutcome,
        issues: Vec<Finding>,
    ) {
        self.validation_status = ValidationStatus::from(outcome);
        self.validation_errors = issues;
    }

    /// Bumps `correction_attempt` and reports whether another retry is
    /// still allowed under `max_retry_attempts` (§4.2, §8 invariant 3).
    pub fn increment_retry(&mut self, max_retry_attempts: u32) -> (u32, bool) {
        self.correction_attempt = (self.correction_attempt + 1).min(max_retry_attempts);
        (self.correction_attempt, self.correction_attempt < max_retry_attempts)
    }

    /// Resets every field to its default except `session_id`/`created_at`
    /// identity, per `spec.md` §3.3: a new upload clears derived caches
    /// (provenance, correction context, ephemeral flags) and replaces
    /// `input_path`. `metadata_policy` returns to its starting member.
    pub fn reset(&mut self, source_path: PathBuf) {
        let session_id = self.session_id;
        let created_at = Utc::now();
        *self = Self {
            session_id,
            created_at,
            ..Self::new()
        };
        self.source_path = Some(source_path);
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, cloned view of [`WorkflowState`] handed to read-only
/// callers — the `/api/status` projection of §6 and the general-query
/// handler of §4.4. Keeps "only the owning agent mutates" (§5) enforceable
/// since nothing outside the store ever sees a mutable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStateSnapshot(pub WorkflowState);

impl std::ops::Deref for WorkflowStateSnapshot {
    type Target = WorkflowState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Owns the live `WorkflowState` for one session behind a lock, exposing
/// `snapshot()` for readers and `mutate()` for the single owning agent.
#[derive(Debug, Clone)]
pub struct StateStore {
    inner: Arc<RwLock<WorkflowState>>,
}

impl StateStore {
    #[must_use]
    pub fn new(state: WorkflowState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> WorkflowStateSnapshot {
        WorkflowStateSnapshot(self.inner.read().clone())
    }

    /// Applies `f` to the live state. Bumps `state_version`/`updated_at`
    /// only if `f` reports the state actually changed, matching the
    /// teacher's version-bump-on-change discipline.
    pub fn mutate(&self, f: impl FnOnce(&mut WorkflowState) -> bool) {
        let mut guard = self.inner.write();
        let changed = f(&mut guard);
        if changed {
            guard.state_version += 1;
            guard.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::provenance::ProvenanceRecord;
    use serde_json::json;

    #[test]
    fn new_state_starts_in_greeting_phase() {
        let state = WorkflowState::new();
        assert_eq!(state.phase, ConversationPhase::Greeting);
        assert_eq!(state.state_version, 1);
    }

    #[test]
    fn setting_same_value_twice_reports_no_change() {
        let mut state = WorkflowState::new();
        let changed_once = state.set_metadata_field("identifier", json!("x"), ProvenanceRecord::user_provided());
        let changed_twice = state.set_metadata_field("identifier", json!("x"), ProvenanceRecord::user_provided());
        assert!(changed_once);
        assert!(!changed_twice);
    }

    #[test]
    fn store_only_bumps_version_on_real_change() {
        let store = StateStore::new(WorkflowState::new());
        let before = store.snapshot().state_version;

        store.mutate(|s| s.set_metadata_field("identifier", json!("a"), ProvenanceRecord::user_provided()));
        let after_change = store.snapshot().state_version;
        assert_eq!(after_change, before + 1);

        store.mutate(|s| s.set_metadata_field("identifier", json!("a"), ProvenanceRecord::user_provided()));
        let after_noop = store.snapshot().state_version;
        assert_eq!(after_noop, after_change);
    }

    #[test]
    fn new_state_starts_not_asked() {
        assert_eq!(WorkflowState::new().metadata_request_policy, MetadataRequestPolicy::NotAsked);
    }

    #[test]
    fn metadata_request_policy_advances_not_asked_then_asked_once_then_user_provided() {
        let mut state = WorkflowState::new();
        state.record_metadata_requested();
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::AskedOnce);

        state.record_user_provided_metadata();
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::UserProvided);

        // Idempotent / monotonic: a second request doesn't move it backward.
        state.record_metadata_requested();
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::UserProvided);
    }

    #[test]
    fn record_user_declined_is_terminal_and_unions_fields() {
        let mut state = WorkflowState::new();
        state.record_metadata_requested();
        state.record_user_declined(["lab".to_string()]);
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::UserDeclined);
        assert!(state.user_declined_fields.contains("lab"));

        // Monotonic: a later "user provided" call can't move it back.
        state.record_user_provided_metadata();
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::UserDeclined);
    }

    #[test]
    fn reset_restores_not_asked_policy() {
        let mut state = WorkflowState::new();
        state.record_user_declined(["lab".to_string()]);
        state.reset(PathBuf::from("/data/new.dat"));
        assert_eq!(state.metadata_request_policy, MetadataRequestPolicy::NotAsked);
        assert!(state.user_declined_fields.is_empty());
    }
}
