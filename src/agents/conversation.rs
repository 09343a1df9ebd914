//! The Conversation Agent (§4.4): the only agent that owns `WorkflowState`
//! and talks to the user. Every HTTP handler in §6 is a thin wrapper over
//! one of this agent's methods; the state machine itself lives here and in
//! `workflow::next_phase_hint`.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::conversion::ConversionAgent;
use crate::agents::evaluation::{CorrectionContext, EvaluationAgent};
use crate::bus::MessageBus;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::inspector::Finding;
use crate::schema::{self, generate_llm_extraction_prompt, normalize_field};
use crate::state::provenance::ProvenanceRecord;
use crate::state::{InferredValue, StateStore, Turn};
use crate::types::{
    ConversationPhase, ConversionStatus, MetadataPromptStyle, MetadataRequestPolicy, ValidationOutcome,
};
use crate::workflow;
use tracing::{info, instrument};

/// Coarse machine-readable outcome of a single `on_chat` turn, surfaced
/// alongside `message` so a UI can decide whether to keep the input box
/// open (§6 chat response shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    ConversationContinues,
    ReadyToConvert,
    ConversationComplete,
    Busy,
    Error,
}

/// Response returned by every `on_chat`/`on_start_conversion` turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub status: ChatStatus,
    pub ready_to_proceed: bool,
    pub needs_more_info: bool,
    /// What kind of turn this was — `metadata_collection`, `metadata_review`,
    /// `conversion`, `validation`, `improvement_decision`,
    /// `validation_failed`, `auto_fix_approval`, or `general_query` (§6).
    pub conversation_type: String,
}

impl ChatResponse {
    fn busy() -> Self {
        Self {
            message: "I'm still working on your previous message — one moment.".to_string(),
            status: ChatStatus::Busy,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "busy".to_string(),
        }
    }
}

/// Acknowledgement returned by `on_upload` (§6 `/api/upload` response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAck {
    pub status: String,
    pub filename: String,
    pub size: u64,
    /// SHA-256 of the uploaded bytes, surfaced so a client can verify
    /// nothing was corrupted in transit.
    pub checksum: String,
}

/// The user's reply to a `passed_with_issues`/`failed` validation summary
/// (§4.6/§4.7): accept the file as reported, or ask the orchestrator to try
/// to improve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Improve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementDecisionResponse {
    pub accepted: bool,
    pub message: String,
    pub validation_status: crate::types::ValidationStatus,
}

/// Response for the §6 `/api/chat/smart` operation: out-of-band Q&A that
/// "works in any phase", unlike `ChatResponse`'s phase-dispatched turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartChatResponse {
    pub answer: String,
    pub suggestions: Vec<String>,
    pub suggested_action: Option<String>,
}

/// The stateful orchestrator entry point. One instance is shared by every
/// HTTP handler for a session; all mutation happens through the
/// `StateStore` handed to each method, never on `self`.
pub struct ConversationAgent {
    bus: std::sync::Arc<MessageBus>,
    conversion: ConversionAgent,
    evaluation: EvaluationAgent,
    config: OrchestratorConfig,
}

impl ConversationAgent {
    #[must_use]
    pub fn new(bus: std::sync::Arc<MessageBus>, config: OrchestratorConfig) -> Self {
        let conversion = ConversionAgent::new(std::sync::Arc::clone(&bus));
        let evaluation = EvaluationAgent::new(std::sync::Arc::clone(&bus));
        Self {
            bus,
            conversion,
            evaluation,
            config,
        }
    }

    /// Stages an uploaded recording: resets the session's derived state
    /// (§3.3), records the source path, and runs the one-shot LLM format
    /// detection + metadata inference pass described by §4.4.
    #[instrument(skip(self, state, bytes), fields(filename, size = bytes.len()))]
    pub async fn on_upload(
        &self,
        state: &StateStore,
        source_path: PathBuf,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadAck, OrchestratorError> {
        use sha2::{Digest, Sha256};
        info!("staging upload");

        state.mutate(|s| {
            s.reset(source_path.clone());
            s.conversion_status = ConversionStatus::Uploading;
            true
        });

        let header_sample = &bytes[..bytes.len().min(4096)];
        let detection = self.bus.detect_format(filename, header_sample).await;

        state.mutate(|s| {
            if let Ok((format, confidence)) = &detection {
                if *confidence >= self.config.confidence.format_detection {
                    s.detected_format = Some(format.clone());
                }
            }
            s.conversion_status = ConversionStatus::DetectingFormat;
            true
        });

        self.run_metadata_inference(state, filename).await;

        state.mutate(|s| {
            s.conversion_status = ConversionStatus::AwaitingMetadata;
            s.phase = ConversationPhase::CollectingMetadata;
            true
        });

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let checksum = format!("{:x}", hasher.finalize());

        Ok(UploadAck {
            status: "uploaded".to_string(),
            filename: filename.to_string(),
            size: bytes.len() as u64,
            checksum,
        })
    }

    /// Runs the LLM's one-shot metadata-inference pass over the filename
    /// (§3.1 `inference_result`). Every field is kept in `inference_result`
    /// regardless of confidence so the later auto-fill step can still use
    /// it; fields clearing `metadata_merge` confidence are additionally
    /// merged straight into `metadata` here (§4.4 `on_start_conversion`:
    /// "merge fields with confidence ≥80% into `auto_extracted_metadata`"),
    /// so a confidently-identified field short-circuits the
    /// `should_request_metadata` prompt instead of always round-tripping
    /// through chat.
    async fn run_metadata_inference(&self, state: &StateStore, filename: &str) {
        let prompt = generate_llm_extraction_prompt(&[], MetadataPromptStyle::AskAll);
        let Ok(extraction) = self
            .bus
            .extract_metadata(&prompt, &format!("filename: {filename}"))
            .await
        else {
            return;
        };
        let Value::Object(map) = extraction.extracted_metadata else {
            return;
        };
        let merge_threshold = self.config.confidence.metadata_merge;
        let confidence = extraction.confidence;
        state.mutate(|s| {
            for (field, value) in map {
                if confidence >= merge_threshold {
                    let normalized = normalize_field(&field, value.clone());
                    s.set_metadata_field(field.clone(), normalized, ProvenanceRecord::llm_inferred(confidence));
                }
                s.inference_result.insert(field, InferredValue { value, confidence });
            }
            true
        });
    }

    /// Writes the session to `sessions/session_<timestamp>.json` (§6
    /// "Persisted state") whenever `set_validation_result` commits. A write
    /// failure degrades silently — it's logged and never surfaces to the
    /// user, matching §7's "Inspector failure: degrade" policy for
    /// ambient persistence that the conversation outcome doesn't depend on.
    async fn persist_session(&self, state: &StateStore) {
        let snapshot = state.snapshot();
        if let Err(err) = crate::persistence::save(&self.config.session_dir, &snapshot).await {
            tracing::warn!(error = %err, "failed to persist session after validation result");
        }
    }

    /// Starts (or resumes) the conversation proper: if metadata is already
    /// complete this dispatches conversion directly; otherwise it asks for
    /// what's missing (§4.4).
    pub async fn on_start_conversion(&self, state: &StateStore) -> Result<ChatResponse, OrchestratorError> {
        if self.bus.llm_busy() {
            return Ok(ChatResponse::busy());
        }
        let snapshot = state.snapshot();
        if workflow::can_start_conversion(&snapshot) {
            return self.dispatch_conversion(state).await;
        }
        let missing = schema::missing_required_fields(&snapshot.metadata);
        let message = build_missing_fields_message(&missing, &snapshot.inference_result);
        state.mutate(|s| {
            s.phase = ConversationPhase::CollectingMetadata;
            s.push_turn(Turn::assistant(message.clone()));
            true
        });
        Ok(ChatResponse {
            message,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: true,
            conversation_type: "metadata_collection".to_string(),
        })
    }

    /// Single dispatch point for every chat turn, routed by the session's
    /// current `ConversationPhase` (§4.4). The LLM-busy check happens here
    /// rather than per-branch so every phase gets the same "one in-flight
    /// call at a time" guarantee.
    pub async fn on_chat(&self, state: &StateStore, user_message: &str) -> Result<ChatResponse, OrchestratorError> {
        if self.bus.llm_busy() {
            return Ok(ChatResponse::busy());
        }
        let phase = state.snapshot().phase;
        match phase {
            ConversationPhase::CollectingMetadata => self.handle_metadata_collection(state, user_message).await,
            ConversationPhase::ConfirmingMetadata => self.handle_metadata_review(state, user_message).await,
            ConversationPhase::AutoFixApproval => self.handle_auto_fix_approval(state, user_message).await,
            ConversationPhase::ImprovementDecision => self.handle_improvement_decision_text(state, user_message).await,
            ConversationPhase::AwaitingCorrectionApproval => {
                self.handle_correction_retry_consent(state, user_message).await
            }
            _ => self.handle_general_query(state, user_message).await,
        }
    }

    async fn handle_metadata_collection(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });

        let snapshot = state.snapshot();
        let missing_before = schema::missing_required_fields(&snapshot.metadata);

        // Scenario 1 (§8): a bare readiness phrase with nothing new to merge
        // and required fields still missing asks specifically, rather than
        // dispatching the LLM on an empty message or silently proceeding.
        if !missing_before.is_empty() && is_bare_readiness_phrase(user_message) {
            let message = build_missing_fields_message(&missing_before, &snapshot.inference_result);
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationContinues,
                ready_to_proceed: false,
                needs_more_info: true,
                conversation_type: "metadata_collection".to_string(),
            });
        }

        let style = workflow::next_prompt_style(&snapshot);
        let prompt = generate_llm_extraction_prompt(&missing_before, style);
        state.mutate(|s| {
            s.record_metadata_requested();
            true
        });
        let extraction = self.bus.extract_metadata(&prompt, user_message).await?;

        // Extracted fields are merged unconditionally (§4.1, §8 invariant 2
        // — "incremental accumulation never regresses"), independent of
        // whether this turn's `ready_to_proceed` ends up true.
        merge_extracted_metadata(state, &extraction.extracted_metadata);

        let snapshot = state.snapshot();
        let missing_now = schema::missing_required_fields(&snapshot.metadata);

        if extraction.ready_to_proceed && missing_now.is_empty() {
            state.mutate(|s| {
                s.phase = ConversationPhase::ConfirmingMetadata;
                true
            });
            let summary = build_review_summary(&snapshot);
            state.mutate(|s| {
                s.push_turn(Turn::assistant(summary.clone()));
                true
            });
            return Ok(ChatResponse {
                message: summary,
                status: ChatStatus::ReadyToConvert,
                ready_to_proceed: true,
                needs_more_info: false,
                conversation_type: "metadata_review".to_string(),
            });
        }

        let message = if missing_now.is_empty() {
            "Thanks — I have everything required. Type \"proceed\" when you're ready to convert.".to_string()
        } else if !extraction.follow_up_message.is_empty() {
            extraction.follow_up_message.clone()
        } else {
            build_missing_fields_message(&missing_now, &snapshot.inference_result)
        };
        state.mutate(|s| {
            s.push_turn(Turn::assistant(message.clone()));
            true
        });
        Ok(ChatResponse {
            message,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: !missing_now.is_empty() || extraction.needs_more_info,
            conversation_type: "metadata_collection".to_string(),
        })
    }

    async fn handle_metadata_review(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });
        let normalized = user_message.trim().trim_end_matches(['.', '!']).to_lowercase();

        if matches!(normalized.as_str(), "proceed" | "yes" | "go" | "start" | "continue" | "convert") {
            return self.dispatch_conversion(state).await;
        }

        if matches!(normalized.as_str(), "no" | "cancel" | "wait") {
            state.mutate(|s| {
                s.phase = ConversationPhase::CollectingMetadata;
                true
            });
            let message = "No problem — what would you like to change?".to_string();
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationContinues,
                ready_to_proceed: false,
                needs_more_info: true,
                conversation_type: "metadata_review".to_string(),
            });
        }

        // Anything else is treated as a correction/addition to the metadata
        // already collected, re-extracted and folded back in before the
        // review summary is shown again (§4.1 scenario 2's "incremental
        // accumulation" also applies after the first review).
        let snapshot = state.snapshot();
        let prompt = generate_llm_extraction_prompt(&[], MetadataPromptStyle::AskAll);
        let extraction = self.bus.extract_metadata(&prompt, user_message).await?;
        merge_extracted_metadata(state, &extraction.extracted_metadata);

        let snapshot = state.snapshot();
        let summary = build_review_summary(&snapshot);
        state.mutate(|s| {
            s.push_turn(Turn::assistant(summary.clone()));
            true
        });
        Ok(ChatResponse {
            message: summary,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "metadata_review".to_string(),
        })
    }

    /// The §4.7 auto-fix approval loop: apply the auto-fixable rewrites and
    /// reconvert, show what would change without applying it, or cancel and
    /// accept the file as-is.
    async fn handle_auto_fix_approval(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });
        let normalized = user_message.trim().to_lowercase();
        let snapshot = state.snapshot();
        let Some(correction_context) = snapshot.correction_context.clone() else {
            return Err(OrchestratorError::IllegalTransition {
                from: "auto_fix_approval".to_string(),
                to: "auto_fix_approval".to_string(),
            });
        };

        if contains_any(&normalized, &["show", "detail", "what", "list"]) {
            let message = build_issue_detail_message(&correction_context);
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationContinues,
                ready_to_proceed: false,
                needs_more_info: false,
                conversation_type: "auto_fix_approval".to_string(),
            });
        }

        if contains_any(&normalized, &["cancel", "no", "keep", "skip"]) {
            state.mutate(|s| {
                s.validation_status = crate::types::ValidationStatus::PassedAccepted;
                s.phase = ConversationPhase::Complete;
                s.conversion_status = ConversionStatus::Completed;
                s.correction_context = None;
                true
            });
            let message = "Understood — keeping the file as converted, issues and all.".to_string();
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationComplete,
                ready_to_proceed: false,
                needs_more_info: false,
                conversation_type: "auto_fix_approval".to_string(),
            });
        }

        if contains_any(&normalized, &["apply", "yes", "fix", "proceed", "go ahead", "do it"]) {
            return self.apply_auto_fix_and_reconvert(state, &correction_context).await;
        }

        let message =
            "I didn't catch that — reply \"apply\" to fix the issues automatically, \"show details\" to see \
             what would change, or \"cancel\" to keep the file as-is."
                .to_string();
        state.mutate(|s| {
            s.push_turn(Turn::assistant(message.clone()));
            true
        });
        Ok(ChatResponse {
            message,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "auto_fix_approval".to_string(),
        })
    }

    /// Free-text accept/improve reply to a `passed_with_issues` summary
    /// (§4.4, §4.7), routed through the same [`Self::on_improvement_decision`]
    /// logic a dedicated endpoint would use.
    async fn handle_improvement_decision_text(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });
        let normalized = user_message.trim().to_lowercase();

        let decision = if contains_any(&normalized, &["improve", "fix", "retry"]) {
            Decision::Improve
        } else if contains_any(&normalized, &["accept", "keep", "as-is", "as is", "no", "skip"]) {
            Decision::Accept
        } else {
            let message =
                "Reply \"accept\" to keep the file as-is, or \"improve\" to let me try fixing what I can \
                 automatically."
                    .to_string();
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationContinues,
                ready_to_proceed: false,
                needs_more_info: false,
                conversation_type: "improvement_decision".to_string(),
            });
        };

        let decision_response = self.on_improvement_decision(state, decision).await?;
        state.mutate(|s| {
            s.push_turn(Turn::assistant(decision_response.message.clone()));
            true
        });
        let status = if decision_response.accepted {
            ChatStatus::ConversationComplete
        } else {
            ChatStatus::ConversationContinues
        };
        Ok(ChatResponse {
            message: decision_response.message,
            status,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "improvement_decision".to_string(),
        })
    }

    /// Consent step for a `failed` validation's retry (distinct from
    /// `AutoFixApproval`, which only ever follows a `passed_with_issues`
    /// result per §4.7).
    async fn handle_correction_retry_consent(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });
        let normalized = user_message.trim().to_lowercase();
        let snapshot = state.snapshot();

        if contains_any(&normalized, &["retry", "yes", "fix", "try again"]) {
            if !workflow::should_retry(&snapshot, &self.config) {
                return self.finish_with_retries_exhausted(state).await;
            }
            let Some(correction_context) = snapshot.correction_context.clone() else {
                return Err(OrchestratorError::IllegalTransition {
                    from: "awaiting_correction_approval".to_string(),
                    to: "applying_corrections".to_string(),
                });
            };
            state.mutate(|s| {
                let (_, allowed) = s.increment_retry(self.config.max_retry_attempts);
                s.phase = ConversationPhase::ApplyingCorrections;
                s.conversion_status = ConversionStatus::Converting;
                let _ = allowed;
                true
            });
            return self.apply_correction_and_revalidate(state, &correction_context).await;
        }

        if contains_any(&normalized, &["decline", "no", "accept", "keep"]) {
            state.mutate(|s| {
                s.validation_status = crate::types::ValidationStatus::FailedAccepted;
                s.phase = ConversationPhase::Complete;
                s.conversion_status = ConversionStatus::Completed;
                true
            });
            let message =
                "Understood — I'll leave the file as converted even though validation reported failures."
                    .to_string();
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationComplete,
                ready_to_proceed: false,
                needs_more_info: false,
                conversation_type: "validation_failed".to_string(),
            });
        }

        let message = "Reply \"retry\" to attempt a correction, or \"decline\" to accept the file as-is.".to_string();
        state.mutate(|s| {
            s.push_turn(Turn::assistant(message.clone()));
            true
        });
        Ok(ChatResponse {
            message,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "validation_failed".to_string(),
        })
    }

    /// §4.4 "any other state": a free-form question answered without
    /// mutating the workflow phase.
    async fn handle_general_query(
        &self,
        state: &StateStore,
        user_message: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.push_turn(Turn::user(user_message));
            false
        });
        let snapshot = state.snapshot();
        let context = serde_json::json!({
            "phase": snapshot.phase.to_string(),
            "conversion_status": snapshot.conversion_status,
            "validation_status": snapshot.validation_status,
        });
        let answer = self.bus.answer_general_query(user_message, &context).await?;
        state.mutate(|s| {
            s.push_turn(Turn::assistant(answer.clone()));
            true
        });
        Ok(ChatResponse {
            message: answer,
            status: ChatStatus::ConversationContinues,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "general_query".to_string(),
        })
    }

    /// §6 `/api/chat/smart`: answers a free-form question about NWB,
    /// conversion, or status without going through `on_chat`'s phase
    /// dispatch, so it works identically in `CollectingMetadata`,
    /// `AutoFixApproval`, or any other phase — unlike `handle_general_query`,
    /// which is reachable only as `on_chat`'s catch-all arm. Doesn't push
    /// onto `conversation_history`: this is an out-of-band side channel, not
    /// a turn of the main metadata conversation.
    pub async fn chat_smart(&self, state: &StateStore, question: &str) -> Result<SmartChatResponse, OrchestratorError> {
        if self.bus.llm_busy() {
            return Ok(SmartChatResponse {
                answer: "I'm still working on your previous message — one moment.".to_string(),
                suggestions: Vec::new(),
                suggested_action: None,
            });
        }
        let snapshot = state.snapshot();
        let context = serde_json::json!({
            "phase": snapshot.phase.to_string(),
            "conversion_status": snapshot.conversion_status,
            "validation_status": snapshot.validation_status,
        });
        let answer = self.bus.answer_general_query(question, &context).await?;
        let (suggestions, suggested_action) = Self::phase_suggestions(snapshot.phase);
        Ok(SmartChatResponse {
            answer,
            suggestions,
            suggested_action,
        })
    }

    /// Deterministic next-step suggestions for the current phase, carried
    /// alongside `chat_smart`'s LLM answer (§6 `suggestions[]`/`suggested_action`).
    fn phase_suggestions(phase: ConversationPhase) -> (Vec<String>, Option<String>) {
        match phase {
            ConversationPhase::CollectingMetadata => (
                vec!["Tell me the experimenter, institution, and subject species".to_string()],
                Some("provide_metadata".to_string()),
            ),
            ConversationPhase::ConfirmingMetadata => (
                vec!["Reply \"proceed\" to start conversion".to_string()],
                Some("confirm_metadata".to_string()),
            ),
            ConversationPhase::ImprovementDecision => (
                vec!["Reply \"accept\" or \"improve\"".to_string()],
                Some("improvement_decision".to_string()),
            ),
            ConversationPhase::AutoFixApproval => (
                vec!["Reply \"apply\", \"show details\", or \"cancel\"".to_string()],
                Some("auto_fix_approval".to_string()),
            ),
            ConversationPhase::AwaitingCorrectionApproval => (
                vec!["Reply \"retry\" or \"decline\"".to_string()],
                Some("correction_retry".to_string()),
            ),
            _ => (Vec::new(), None),
        }
    }

    /// The user's explicit accept/improve reply to a `passed_with_issues`
    /// summary, reachable either through `on_chat`'s free-form parsing or
    /// directly from a dedicated endpoint (§4.4, §6).
    pub async fn on_improvement_decision(
        &self,
        state: &StateStore,
        decision: Decision,
    ) -> Result<ImprovementDecisionResponse, OrchestratorError> {
        let snapshot = state.snapshot();
        match decision {
            Decision::Accept => {
                state.mutate(|s| {
                    s.validation_status = crate::types::ValidationStatus::PassedAccepted;
                    s.phase = ConversationPhase::Complete;
                    s.conversion_status = ConversionStatus::Completed;
                    s.correction_context = None;
                    true
                });
                Ok(ImprovementDecisionResponse {
                    accepted: true,
                    message: "Accepted as-is. Your NWB file is ready to download.".to_string(),
                    validation_status: crate::types::ValidationStatus::PassedAccepted,
                })
            }
            Decision::Improve => {
                let correction_context = self.evaluation.categorize_issues(&snapshot.validation_errors);
                state.mutate(|s| {
                    s.phase = ConversationPhase::AutoFixApproval;
                    s.correction_context = Some(correction_context.clone());
                    true
                });
                let message = build_issue_detail_message(&correction_context);
                Ok(ImprovementDecisionResponse {
                    accepted: false,
                    message,
                    validation_status: snapshot.validation_status,
                })
            }
        }
    }

    /// Applies the auto-fixable rewrites from §4.7's approval loop and
    /// reconverts, without consuming a correction-retry attempt — this is
    /// a deterministic metadata fix, not the §4.2 failed-validation retry.
    async fn apply_auto_fix_and_reconvert(
        &self,
        state: &StateStore,
        correction_context: &CorrectionContext,
    ) -> Result<ChatResponse, OrchestratorError> {
        let snapshot = state.snapshot();
        let Some(input_path) = snapshot.source_path.clone() else {
            return Err(OrchestratorError::MissingRequiredField {
                field: "input_path".to_string(),
            });
        };
        state.mutate(|s| {
            s.phase = ConversationPhase::ApplyingCorrections;
            s.conversion_status = ConversionStatus::Converting;
            true
        });
        let result = self
            .conversion
            .apply_corrections(&input_path, correction_context, &snapshot.metadata)
            .await;
        self.handle_conversion_result(state, result).await
    }

    /// Same as [`Self::apply_auto_fix_and_reconvert`] but for a `failed`
    /// validation's retry path, which has already bumped `correction_attempt`.
    async fn apply_correction_and_revalidate(
        &self,
        state: &StateStore,
        correction_context: &CorrectionContext,
    ) -> Result<ChatResponse, OrchestratorError> {
        let snapshot = state.snapshot();
        let Some(input_path) = snapshot.source_path.clone() else {
            return Err(OrchestratorError::MissingRequiredField {
                field: "input_path".to_string(),
            });
        };
        let result = self
            .conversion
            .apply_corrections(&input_path, correction_context, &snapshot.metadata)
            .await;
        self.handle_conversion_result(state, result).await
    }

    async fn finish_with_retries_exhausted(&self, state: &StateStore) -> Result<ChatResponse, OrchestratorError> {
        state.mutate(|s| {
            s.validation_status = crate::types::ValidationStatus::FailedAccepted;
            s.phase = ConversationPhase::Complete;
            s.conversion_status = ConversionStatus::Completed;
            true
        });
        let message = format!(
            "I've tried {} correction attempt(s), which is the most I'll attempt automatically. Keeping the file \
             as last converted.",
            self.config.max_retry_attempts
        );
        state.mutate(|s| {
            s.push_turn(Turn::assistant(message.clone()));
            true
        });
        Ok(ChatResponse {
            message,
            status: ChatStatus::ConversationComplete,
            ready_to_proceed: false,
            needs_more_info: false,
            conversation_type: "validation_failed".to_string(),
        })
    }

    /// Pre-conversion validation short-circuit, optional-field auto-fill,
    /// and the conversion dispatch itself (§4.4). Shared by `on_start_conversion`
    /// and the "proceed" branch of `handle_metadata_review`.
    async fn dispatch_conversion(&self, state: &StateStore) -> Result<ChatResponse, OrchestratorError> {
        let snapshot = state.snapshot();
        let missing_required = schema::missing_required_fields(&snapshot.metadata);
        let policy_allows_proceeding = matches!(
            snapshot.metadata_request_policy,
            MetadataRequestPolicy::UserDeclined | MetadataRequestPolicy::ProceedingMinimal
        );

        if !missing_required.is_empty() && !policy_allows_proceeding {
            state.mutate(|s| {
                s.phase = ConversationPhase::CollectingMetadata;
                true
            });
            let message = build_missing_fields_message(&missing_required, &snapshot.inference_result);
            state.mutate(|s| {
                s.push_turn(Turn::assistant(message.clone()));
                true
            });
            return Ok(ChatResponse {
                message,
                status: ChatStatus::ConversationContinues,
                ready_to_proceed: false,
                needs_more_info: true,
                conversation_type: "metadata_collection".to_string(),
            });
        }

        self.auto_fill_optional_fields(state);

        let snapshot = state.snapshot();
        let Some(input_path) = snapshot.source_path.clone() else {
            return Err(OrchestratorError::MissingRequiredField {
                field: "input_path".to_string(),
            });
        };

        state.mutate(|s| {
            s.phase = ConversationPhase::Converting;
            s.conversion_status = ConversionStatus::Converting;
            true
        });

        info!(session = %snapshot.session_id, "dispatching conversion");
        let snapshot = state.snapshot();
        let result = self.conversion.convert(&input_path, &snapshot.metadata).await;
        self.handle_conversion_result(state, result).await
    }

    /// Fields eligible for the §4.4 "Auto-fill" step — exactly the three
    /// the spec names, never the catalog's full `Recommended`/`Optional`
    /// tier. Scenario 5 (§8) expects fields like `subject_sex` to come only
    /// from explicit user chat, so this set must stay narrow.
    const AUTO_FILL_FIELDS: [&'static str; 3] = ["keywords", "experiment_description", "session_description"];

    /// Fills in low-confidence guesses for `AUTO_FILL_FIELDS` from the
    /// upload-time inference pass that the user never confirmed, provided
    /// their confidence clears `auto_fill` (§4.4).
    fn auto_fill_optional_fields(&self, state: &StateStore) {
        let snapshot = state.snapshot();
        let threshold = self.config.confidence.auto_fill;
        let mut to_fill: Vec<(String, Value, u8)> = Vec::new();
        for field in Self::AUTO_FILL_FIELDS {
            let Some(inferred) = snapshot.inference_result.get(field) else {
                continue;
            };
            if snapshot.metadata.contains_key(field) {
                continue;
            }
            if snapshot.user_declined_fields.contains(field) {
                continue;
            }
            if inferred.confidence >= threshold {
                to_fill.push((field.to_string(), inferred.value.clone(), inferred.confidence));
            }
        }
        if to_fill.is_empty() {
            return;
        }
        state.mutate(|s| {
            let mut changed = false;
            for (field, value, confidence) in to_fill {
                let normalized = normalize_field(&field, value);
                if s.set_metadata_field(field, normalized, ProvenanceRecord::auto_filled(confidence)) {
                    changed = true;
                }
            }
            changed
        });
    }

    async fn handle_conversion_result(
        &self,
        state: &StateStore,
        result: Result<crate::converter::ConversionResult, OrchestratorError>,
    ) -> Result<ChatResponse, OrchestratorError> {
        match result {
            Ok(conversion_result) if conversion_result.ok => {
                let output_path = conversion_result.nwb_path.clone();
                state.mutate(|s| {
                    s.output_path = output_path.clone();
                    s.conversion_status = ConversionStatus::Validating;
                    s.phase = ConversationPhase::Validating;
                    true
                });
                self.run_validation_and_build_response(state, output_path.as_deref()).await
            }
            Ok(conversion_result) => {
                let message = format!(
                    "Conversion failed: {}",
                    conversion_result.error.unwrap_or_else(|| "unknown error".to_string())
                );
                state.mutate(|s| {
                    s.conversion_status = ConversionStatus::Failed;
                    s.phase = ConversationPhase::Failed;
                    s.push_turn(Turn::assistant(message.clone()));
                    true
                });
                Ok(ChatResponse {
                    message,
                    status: ChatStatus::Error,
                    ready_to_proceed: false,
                    needs_more_info: false,
                    conversation_type: "conversion".to_string(),
                })
            }
            Err(err) => {
                let message = format!("Conversion failed: {err}");
                state.mutate(|s| {
                    s.conversion_status = ConversionStatus::Failed;
                    s.phase = ConversationPhase::Failed;
                    s.push_turn(Turn::assistant(message.clone()));
                    true
                });
                Ok(ChatResponse {
                    message,
                    status: ChatStatus::Error,
                    ready_to_proceed: false,
                    needs_more_info: false,
                    conversation_type: "conversion".to_string(),
                })
            }
        }
    }

    async fn run_validation_and_build_response(
        &self,
        state: &StateStore,
        output_path: Option<&Path>,
    ) -> Result<ChatResponse, OrchestratorError> {
        let Some(path) = output_path else {
            return Err(OrchestratorError::ConverterFailure {
                message: "converter reported success with no output path".to_string(),
            });
        };
        let report = self.evaluation.run_validation(path).await;
        state.mutate(|s| {
            s.set_validation_result(report.outcome, report.issues.clone());
            true
        });
        self.persist_session(state).await;

        match report.outcome {
            ValidationOutcome::Passed => {
                state.mutate(|s| {
                    s.conversion_status = ConversionStatus::Completed;
                    s.phase = ConversationPhase::Complete;
                    true
                });
                let message = "Validation passed with no issues. Your NWB file is ready to download.".to_string();
                state.mutate(|s| {
                    s.push_turn(Turn::assistant(message.clone()));
                    true
                });
                Ok(ChatResponse {
                    message,
                    status: ChatStatus::ConversationComplete,
                    ready_to_proceed: false,
                    needs_more_info: false,
                    conversation_type: "validation".to_string(),
                })
            }
            ValidationOutcome::PassedWithIssues => {
                state.mutate(|s| {
                    s.conversion_status = ConversionStatus::AwaitingUserInput;
                    s.phase = ConversationPhase::ImprovementDecision;
                    true
                });
                let message = build_issue_summary_message(&report.issues);
                state.mutate(|s| {
                    s.push_turn(Turn::assistant(message.clone()));
                    true
                });
                Ok(ChatResponse {
                    message,
                    status: ChatStatus::ConversationContinues,
                    ready_to_proceed: false,
                    needs_more_info: false,
                    conversation_type: "improvement_decision".to_string(),
                })
            }
            ValidationOutcome::Failed => {
                let correction_context = self.evaluation.categorize_issues(&report.issues);
                state.mutate(|s| {
                    s.conversion_status = ConversionStatus::AwaitingUserInput;
                    s.phase = ConversationPhase::AwaitingCorrectionApproval;
                    s.correction_context = Some(correction_context);
                    true
                });
                let message = format!(
                    "Validation failed with {} issue(s) that need fixing. Reply \"retry\" to attempt a \
                     correction, or \"decline\" to accept the file as-is.",
                    report.issues.len()
                );
                state.mutate(|s| {
                    s.push_turn(Turn::assistant(message.clone()));
                    true
                });
                Ok(ChatResponse {
                    message,
                    status: ChatStatus::ConversationContinues,
                    ready_to_proceed: false,
                    needs_more_info: false,
                    conversation_type: "validation_failed".to_string(),
                })
            }
        }
    }
}

/// Merges an LLM extraction's raw JSON object into `state`'s metadata,
/// running each value through `schema::normalize` first (§4.1). Silently
/// ignores a non-object payload — a malformed extraction degrades to "no
/// fields merged", never a panic or a propagated error.
fn merge_extracted_metadata(state: &StateStore, extracted: &Value) {
    let Value::Object(map) = extracted else {
        return;
    };
    if map.is_empty() {
        return;
    }
    state.mutate(|s| {
        let mut changed = false;
        for (field, value) in map {
            let normalized = normalize_field(field, value.clone());
            if s.set_metadata_field(field.clone(), normalized, ProvenanceRecord::user_provided()) {
                changed = true;
            }
        }
        if changed {
            s.record_user_provided_metadata();
        }
        changed
    });
}

/// A trimmed, lowercase "is this just the user saying they're ready"
/// check. Deliberately exact-match rather than substring: a longer message
/// that happens to contain "ready" (e.g. "the mouse was ready for surgery")
/// should still go through normal extraction.
fn is_bare_readiness_phrase(message: &str) -> bool {
    let normalized = message.trim().trim_end_matches(['.', '!']).to_lowercase();
    matches!(
        normalized.as_str(),
        "i am ready" | "i'm ready" | "ready" | "start" | "proceed" | "go ahead" | "lets go" | "let's go"
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Builds the "here's what's still missing" message, folding in any
/// upload-time inference guess for context (§4.4).
fn build_missing_fields_message(missing: &[&str], inference_result: &FxHashMap<String, InferredValue>) -> String {
    let mut lines = Vec::with_capacity(missing.len());
    for name in missing {
        let Some(summary) = schema::field_summary(name) else {
            continue;
        };
        if let Some(guess) = inference_result.get(*name) {
            lines.push(format!(
                "- {} (e.g. \"{}\"; I guessed `{}` from the file but want you to confirm it)",
                summary.display_name, summary.example, guess.value
            ));
        } else {
            lines.push(format!("- {} (e.g. \"{}\")", summary.display_name, summary.example));
        }
    }
    format!(
        "I still need a few required details before I can convert this file:\n{}",
        lines.join("\n")
    )
}

/// Builds the pre-conversion confirmation summary shown once all required
/// fields are present (§4.4's `ConfirmingMetadata` phase).
fn build_review_summary(state: &crate::state::WorkflowState) -> String {
    let mut keys: Vec<&String> = state.metadata.keys().collect();
    keys.sort();
    let lines: Vec<String> = keys
        .into_iter()
        .map(|k| format!("- {}: {}", k, state.metadata[k]))
        .collect();
    format!(
        "Here's what I have so far:\n{}\n\nType \"proceed\" to start conversion, or tell me anything you'd like to \
         add or change.",
        lines.join("\n")
    )
}

/// Builds the `passed_with_issues` summary shown before asking accept/improve.
fn build_issue_summary_message(issues: &[Finding]) -> String {
    let mut lines: Vec<String> = issues
        .iter()
        .map(|f| format!("- [{:?}] {} ({})", f.severity, f.message, f.check_name))
        .collect();
    lines.sort();
    format!(
        "Conversion succeeded, but the NWB Inspector flagged {} issue(s):\n{}\n\nReply \"accept\" to keep the \
         file as-is, or \"improve\" to let me try fixing what I can automatically.",
        issues.len(),
        lines.join("\n")
    )
}

/// Builds the §4.7 "show details" / auto-fix-approval detail message.
fn build_issue_detail_message(context: &CorrectionContext) -> String {
    let auto_lines: Vec<String> = context
        .auto_fixable
        .iter()
        .map(|f| format!("- {} (will be normalized automatically)", f.message))
        .collect();
    let manual_lines: Vec<String> = context
        .user_input_required
        .iter()
        .map(|f| format!("- {} (needs your input, not auto-fixable)", f.message))
        .collect();

    let mut message = String::new();
    if !auto_lines.is_empty() {
        message.push_str(&format!(
            "I can automatically fix {} issue(s):\n{}\n\n",
            context.auto_fixable.len(),
            auto_lines.join("\n")
        ));
    }
    if !manual_lines.is_empty() {
        message.push_str(&format!(
            "{} issue(s) need your input and won't be touched automatically:\n{}\n\n",
            context.user_input_required.len(),
            manual_lines.join("\n")
        ));
    }
    message.push_str("Reply \"apply\" to fix what I can and reconvert, or \"cancel\" to keep the file as-is.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::converter::MockConverter;
    use crate::inspector::MockInspector;
    use crate::llm::{ExtractionResponse, MockLlmClient};
    use crate::state::WorkflowState;
    use crate::types::Severity;
    use serde_json::json;
    use std::sync::Arc;

    fn agent_with(llm: MockLlmClient, inspector: MockInspector) -> ConversationAgent {
        let config = OrchestratorConfig::default();
        let bus = Arc::new(MessageBus::new(
            Arc::new(llm),
            Arc::new(MockConverter::new()),
            Arc::new(inspector),
            &config,
        ));
        ConversationAgent::new(bus, config)
    }

    fn complete_metadata_store(source_path: &str) -> StateStore {
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::ConfirmingMetadata;
        state.source_path = Some(PathBuf::from(source_path));
        for (name, value) in [
            ("session_description", json!("A session")),
            ("identifier", json!("mouse042_session03")),
            ("session_start_time", json!("2024-03-14T09:30:00Z")),
            ("subject_id", json!("mouse042")),
            ("subject_species", json!("Mus musculus")),
        ] {
            state.set_metadata_field(name, value, ProvenanceRecord::user_provided());
        }
        StateStore::new(state)
    }

    #[tokio::test]
    async fn bare_readiness_phrase_with_missing_fields_asks_specifically_instead_of_proceeding() {
        let agent = agent_with(MockLlmClient::new(), MockInspector::new());
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::CollectingMetadata;
        let store = StateStore::new(state);

        let response = agent.on_chat(&store, "I am ready").await.unwrap();
        assert_eq!(response.status, ChatStatus::ConversationContinues);
        assert!(response.needs_more_info);
        assert!(response.message.contains("still need"));
    }

    #[tokio::test]
    async fn extracted_metadata_merges_even_when_not_yet_ready_to_proceed() {
        let llm = MockLlmClient::new().with_response(ExtractionResponse {
            extracted_metadata: json!({"subject_id": "mouse042"}),
            needs_more_info: true,
            follow_up_message: "What species?".to_string(),
            ready_to_proceed: false,
            confidence: 80,
        });
        let agent = agent_with(llm, MockInspector::new());
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::CollectingMetadata;
        let store = StateStore::new(state);

        agent.on_chat(&store, "it's mouse042").await.unwrap();
        assert_eq!(store.snapshot().metadata.get("subject_id"), Some(&json!("mouse042")));
    }

    #[tokio::test]
    async fn upload_time_inference_at_or_above_merge_confidence_is_merged_into_metadata() {
        let llm = MockLlmClient::new().with_response(ExtractionResponse {
            extracted_metadata: json!({"subject_species": "Mus musculus"}),
            needs_more_info: false,
            follow_up_message: String::new(),
            ready_to_proceed: false,
            confidence: 85,
        });
        let agent = agent_with(llm, MockInspector::new());
        let state = StateStore::new(WorkflowState::new());

        agent
            .on_upload(&state, PathBuf::from("/data/recording.bin"), "recording.bin", b"header bytes")
            .await
            .unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.metadata.get("subject_species"), Some(&json!("Mus musculus")));
        assert_eq!(
            snapshot.metadata_provenance.get("subject_species").map(|p| p.confidence),
            Some(85)
        );
    }

    #[tokio::test]
    async fn upload_time_inference_below_merge_confidence_is_not_merged() {
        let llm = MockLlmClient::new().with_response(ExtractionResponse {
            extracted_metadata: json!({"subject_species": "Mus musculus"}),
            needs_more_info: false,
            follow_up_message: String::new(),
            ready_to_proceed: false,
            confidence: 50,
        });
        let agent = agent_with(llm, MockInspector::new());
        let state = StateStore::new(WorkflowState::new());

        agent
            .on_upload(&state, PathBuf::from("/data/recording.bin"), "recording.bin", b"header bytes")
            .await
            .unwrap();

        let snapshot = state.snapshot();
        assert!(!snapshot.metadata.contains_key("subject_species"));
        assert!(snapshot.inference_result.contains_key("subject_species"));
    }

    #[tokio::test]
    async fn proceeding_from_metadata_review_runs_conversion_and_validation() {
        let store = complete_metadata_store("/data/recording.dat");
        let agent = agent_with(MockLlmClient::new(), MockInspector::new());

        let response = agent.on_chat(&store, "proceed").await.unwrap();
        assert_eq!(response.status, ChatStatus::ConversationComplete);
        assert_eq!(store.snapshot().phase, ConversationPhase::Complete);
        assert_eq!(store.snapshot().conversion_status, ConversionStatus::Completed);
    }

    #[tokio::test]
    async fn chat_smart_answers_mid_metadata_collection_without_touching_the_phase() {
        let agent = agent_with(MockLlmClient::new(), MockInspector::new());
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::CollectingMetadata;
        let store = StateStore::new(state);

        let response = agent.chat_smart(&store, "what is NWB?").await.unwrap();
        assert!(!response.answer.is_empty());
        assert_eq!(response.suggested_action.as_deref(), Some("provide_metadata"));
        assert_eq!(store.snapshot().phase, ConversationPhase::CollectingMetadata);
        assert!(store.snapshot().conversation_history.is_empty());
    }

    #[tokio::test]
    async fn passed_with_issues_routes_to_improvement_decision() {
        let finding = Finding {
            severity: Severity::BestPracticeSuggestion,
            message: "keywords recommended".to_string(),
            check_name: "check_keywords".to_string(),
            auto_fixable: true,
            field: Some("keywords".to_string()),
        };
        let inspector = MockInspector::new().with_findings(vec![finding]);
        let store = complete_metadata_store("/data/recording.dat");
        let agent = agent_with(MockLlmClient::new(), inspector);

        let response = agent.on_chat(&store, "proceed").await.unwrap();
        assert_eq!(response.conversation_type, "improvement_decision");
        assert_eq!(store.snapshot().phase, ConversationPhase::ImprovementDecision);
    }

    #[tokio::test]
    async fn improve_decision_enters_auto_fix_approval_and_apply_completes_the_session() {
        let finding = Finding {
            severity: Severity::BestPracticeSuggestion,
            message: "keywords recommended".to_string(),
            check_name: "check_keywords".to_string(),
            auto_fixable: true,
            field: Some("keywords".to_string()),
        };
        let inspector = MockInspector::new().with_findings(vec![finding]);
        let store = complete_metadata_store("/data/recording.dat");
        let agent = agent_with(MockLlmClient::new(), inspector);

        agent.on_chat(&store, "proceed").await.unwrap();
        let decision_response = agent
            .on_improvement_decision(&store, Decision::Improve)
            .await
            .unwrap();
        assert!(!decision_response.accepted);
        assert_eq!(store.snapshot().phase, ConversationPhase::AutoFixApproval);

        let response = agent.on_chat(&store, "apply").await.unwrap();
        assert_eq!(response.status, ChatStatus::ConversationComplete);
        assert_eq!(store.snapshot().phase, ConversationPhase::Complete);
    }

    #[tokio::test]
    async fn auto_fix_approval_cancel_accepts_file_as_is() {
        let finding = Finding {
            severity: Severity::BestPracticeSuggestion,
            message: "keywords recommended".to_string(),
            check_name: "check_keywords".to_string(),
            auto_fixable: true,
            field: Some("keywords".to_string()),
        };
        let inspector = MockInspector::new().with_findings(vec![finding]);
        let store = complete_metadata_store("/data/recording.dat");
        let agent = agent_with(MockLlmClient::new(), inspector);

        agent.on_chat(&store, "proceed").await.unwrap();
        agent.on_improvement_decision(&store, Decision::Improve).await.unwrap();
        let response = agent.on_chat(&store, "cancel").await.unwrap();
        assert_eq!(response.status, ChatStatus::ConversationComplete);
        assert_eq!(
            store.snapshot().validation_status,
            crate::types::ValidationStatus::PassedAccepted
        );
    }

    #[tokio::test]
    async fn retries_are_bounded_by_max_retry_attempts() {
        let finding = Finding {
            severity: Severity::Critical,
            message: "missing required field".to_string(),
            check_name: "check_identifier".to_string(),
            auto_fixable: false,
            field: Some("identifier".to_string()),
        };
        let inspector = MockInspector::new().with_findings(vec![finding]);
        let mut state_seed = WorkflowState::new();
        state_seed.source_path = Some(PathBuf::from("/data/recording.dat"));
        state_seed.phase = ConversationPhase::AwaitingCorrectionApproval;
        state_seed.validation_status = crate::types::ValidationStatus::Failed;
        state_seed.correction_attempt = crate::config::MAX_RETRY_ATTEMPTS - 1;
        state_seed.correction_context = Some(CorrectionContext {
            auto_fixable: Vec::new(),
            user_input_required: vec![Finding {
                severity: Severity::Critical,
                message: "missing required field".to_string(),
                check_name: "check_identifier".to_string(),
                auto_fixable: false,
                field: Some("identifier".to_string()),
            }],
        });
        let store = StateStore::new(state_seed);
        let agent = agent_with(MockLlmClient::new(), inspector);

        let response = agent.on_chat(&store, "retry").await.unwrap();
        assert_eq!(store.snapshot().correction_attempt, crate::config::MAX_RETRY_ATTEMPTS);

        // A further retry request, now that the cap is hit, ends the session
        // instead of attempting another correction.
        let mut state_seed2 = WorkflowState::new();
        state_seed2.source_path = Some(PathBuf::from("/data/recording.dat"));
        state_seed2.phase = ConversationPhase::AwaitingCorrectionApproval;
        state_seed2.correction_attempt = crate::config::MAX_RETRY_ATTEMPTS;
        let store2 = StateStore::new(state_seed2);
        let agent2 = agent_with(MockLlmClient::new(), MockInspector::new());
        let response2 = agent2.on_chat(&store2, "retry").await.unwrap();
        assert_eq!(response2.status, ChatStatus::ConversationComplete);
        let _ = response;
    }

    #[tokio::test]
    async fn male_mouse_phrase_normalizes_sex_to_m() {
        let llm = MockLlmClient::new().with_response(ExtractionResponse {
            extracted_metadata: json!({"subject_sex": "male"}),
            needs_more_info: false,
            follow_up_message: String::new(),
            ready_to_proceed: false,
            confidence: 90,
        });
        let agent = agent_with(llm, MockInspector::new());
        let mut state = WorkflowState::new();
        state.phase = ConversationPhase::CollectingMetadata;
        let store = StateStore::new(state);

        agent.on_chat(&store, "it was a male mouse").await.unwrap();
        assert_eq!(store.snapshot().metadata.get("subject_sex"), Some(&json!("M")));
    }
}
