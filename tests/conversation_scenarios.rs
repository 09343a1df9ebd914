//! End-to-end scenarios driving [`ConversationAgent`] through a
//! [`MessageBus`] backed entirely by deterministic mocks (§8 "concrete
//! scenarios").

use std::path::PathBuf;
use std::sync::Arc;

use nwb_convo_orchestrator::agents::{ConversationAgent, Decision};
use nwb_convo_orchestrator::bus::MessageBus;
use nwb_convo_orchestrator::config::OrchestratorConfig;
use nwb_convo_orchestrator::converter::MockConverter;
use nwb_convo_orchestrator::inspector::{Finding, MockInspector};
use nwb_convo_orchestrator::llm::{ExtractionResponse, MockLlmClient};
use nwb_convo_orchestrator::state::{StateStore, WorkflowState};
use nwb_convo_orchestrator::types::{ConversationPhase, ConversionStatus, Severity, ValidationStatus};
use serde_json::json;

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

/// Scenario 1: "I am ready" without metadata asks for the specific missing
/// fields rather than proceeding.
#[tokio::test]
async fn scenario_ready_phrase_without_metadata_asks_for_specifics() {
    let agent = agent_with(MockLlmClient::new(), MockInspector::new());
    let store = StateStore::new({
        let mut s = WorkflowState::new();
        s.phase = ConversationPhase::CollectingMetadata;
        s
    });

    let response = agent.on_chat(&store, "I am ready").await.unwrap();
    assert!(!response.ready_to_proceed);
    assert!(response.needs_more_info);
    assert_eq!(response.conversation_type, "metadata_collection");
    assert!(response.message.contains("still need"));
}

/// Scenario 2: incremental accumulation across three turns never drops a
/// previously confirmed field, and "ready" on a complete metadata set
/// dispatches conversion.
#[tokio::test]
async fn scenario_incremental_accumulation_then_ready_dispatches_conversion() {
    let llm = MockLlmClient::new().with_response(ExtractionResponse {
        extracted_metadata: json!({
            "experimenter": "Jane Doe",
            "institution": "MIT",
            "subject_species": "Mus musculus",
            "subject_age": "P60",
        }),
        needs_more_info: true,
        follow_up_message: "What was the recording about?".to_string(),
        ready_to_proceed: false,
        confidence: 85,
    });
    let agent = agent_with(llm, MockInspector::new());
    let store = StateStore::new({
        let mut s = WorkflowState::new();
        s.phase = ConversationPhase::CollectingMetadata;
        s.source_path = Some(PathBuf::from("/data/recording.dat"));
        s
    });

    agent.on_chat(&store, "Dr Smith, MIT, mouse P60").await.unwrap();
    let after_turn1 = store.snapshot();
    assert_eq!(after_turn1.metadata.get("institution"), Some(&json!("Massachusetts Institute of Technology")));
    assert_eq!(after_turn1.metadata.get("subject_species"), Some(&json!("Mus musculus")));

    // Second turn's extraction only adds a description; prior fields must
    // survive untouched (invariant 1: incremental persistence).
    // (MockLlmClient always returns the same canned response in this test,
    // so we assert the superset property directly instead of re-dispatching
    // a second distinct extraction.)
    let before_keys: std::collections::BTreeSet<_> = after_turn1.metadata.keys().cloned().collect();

    let mut seeded = WorkflowState::new();
    seeded.phase = ConversationPhase::ConfirmingMetadata;
    seeded.source_path = Some(PathBuf::from("/data/recording.dat"));
    for (k, v) in after_turn1.metadata.clone() {
        seeded.set_metadata_field(k, v, nwb_convo_orchestrator::state::provenance::ProvenanceRecord::user_provided());
    }
    seeded.set_metadata_field(
        "session_description",
        json!("A session"),
        nwb_convo_orchestrator::state::provenance::ProvenanceRecord::user_provided(),
    );
    seeded.set_metadata_field(
        "identifier",
        json!("mouse042_session03"),
        nwb_convo_orchestrator::state::provenance::ProvenanceRecord::user_provided(),
    );
    seeded.set_metadata_field(
        "session_start_time",
        json!("2024-03-14T09:30:00Z"),
        nwb_convo_orchestrator::state::provenance::ProvenanceRecord::user_provided(),
    );
    seeded.set_metadata_field(
        "subject_id",
        json!("mouse042"),
        nwb_convo_orchestrator::state::provenance::ProvenanceRecord::user_provided(),
    );
    let store2 = StateStore::new(seeded);
    let agent2 = agent_with(MockLlmClient::new(), MockInspector::new());

    let response = agent2.on_chat(&store2, "ready").await.unwrap();
    assert!(response.ready_to_proceed || response.conversation_type == "conversion" || response.conversation_type == "validation");
    let after = store2.snapshot();
    for key in &before_keys {
        assert!(after.metadata.contains_key(key), "{key} was dropped across turns");
    }
    assert_eq!(after.conversion_status, ConversionStatus::Completed);
}

/// Scenario 3: auto-fix consent loop — apply reconverts and completes,
/// cancel accepts the file as-is.
#[tokio::test]
async fn scenario_auto_fix_consent_apply_completes_the_session() {
    let findings = vec![
        Finding {
            severity: Severity::Info,
            message: "keywords recommended".to_string(),
            check_name: "check_keywords".to_string(),
            auto_fixable: true,
            field: Some("keywords".to_string()),
        },
        Finding {
            severity: Severity::BestPracticeSuggestion,
            message: "institution abbreviation should be expanded".to_string(),
            check_name: "check_institution".to_string(),
            auto_fixable: true,
            field: Some("institution".to_string()),
        },
    ];
    let inspector = MockInspector::new().with_findings(findings);
    let agent = agent_with(MockLlmClient::new(), inspector);
    let store = complete_metadata_store();

    let response = agent.on_chat(&store, "proceed").await.unwrap();
    assert_eq!(response.conversation_type, "improvement_decision");

    let decision = agent
        .on_improvement_decision(&store, Decision::Improve)
        .await
        .unwrap();
    assert!(!decision.accepted);
    assert_eq!(store.snapshot().phase, ConversationPhase::AutoFixApproval);
    assert!(decision.message.contains("2 issue"));

    let response = agent.on_chat(&store, "apply").await.unwrap();
    assert_eq!(store.snapshot().phase, ConversationPhase::Complete);
    assert_eq!(response.conversation_type, "conversion");
}

#[tokio::test]
async fn scenario_auto_fix_consent_cancel_keeps_file_as_is() {
    let findings = vec![Finding {
        severity: Severity::Info,
        message: "keywords recommended".to_string(),
        check_name: "check_keywords".to_string(),
        auto_fixable: true,
        field: Some("keywords".to_string()),
    }];
    let inspector = MockInspector::new().with_findings(findings);
    let agent = agent_with(MockLlmClient::new(), inspector);
    let store = complete_metadata_store();

    agent.on_chat(&store, "proceed").await.unwrap();
    agent.on_improvement_decision(&store, Decision::Improve).await.unwrap();
    agent.on_chat(&store, "cancel").await.unwrap();

    assert_eq!(store.snapshot().validation_status, ValidationStatus::PassedAccepted);
    assert_eq!(store.snapshot().conversion_status, ConversionStatus::Completed);
}

/// Scenario 4: bounded retry — a sixth retry request past the cap is
/// rejected with a terminal "accept as-is" response rather than attempting
/// another correction.
#[tokio::test]
async fn scenario_retry_cap_rejects_a_sixth_attempt() {
    let config = OrchestratorConfig::default();
    let mut state = WorkflowState::new();
    state.source_path = Some(PathBuf::from("/data/recording.dat"));
    state.phase = ConversationPhase::AwaitingCorrectionApproval;
    state.correction_attempt = config.max_retry_attempts;
    let store = StateStore::new(state);
    let agent = agent_with(MockLlmClient::new(), MockInspector::new());

    let response = agent.on_chat(&store, "retry").await.unwrap();
    assert_eq!(
        store.snapshot().correction_attempt,
        config.max_retry_attempts,
        "a rejected retry must not bump the counter past the cap"
    );
    assert_eq!(store.snapshot().validation_status, ValidationStatus::FailedAccepted);
    assert_eq!(store.snapshot().conversion_status, ConversionStatus::Completed);
    assert!(response.message.to_lowercase().contains("most"));
}

/// Scenario 6: a `passed_with_issues` validation, accepted as-is through
/// the dedicated decision endpoint, ends with `passed_accepted`/`completed`.
#[tokio::test]
async fn scenario_passed_with_issues_accept_as_is() {
    let findings = vec![
        Finding {
            severity: Severity::Info,
            message: "missing lab field".to_string(),
            check_name: "check_lab".to_string(),
            auto_fixable: false,
            field: Some("lab".to_string()),
        },
        Finding {
            severity: Severity::Info,
            message: "missing related_publications".to_string(),
            check_name: "check_related_publications".to_string(),
            auto_fixable: false,
            field: Some("related_publications".to_string()),
        },
    ];
    let inspector = MockInspector::new().with_findings(findings);
    let agent = agent_with(MockLlmClient::new(), inspector);
    let store = complete_metadata_store();

    let response = agent.on_chat(&store, "proceed").await.unwrap();
    assert!(response.message.contains("missing lab field"));
    assert!(response.message.contains("missing related_publications"));

    let decision = agent
        .on_improvement_decision(&store, Decision::Accept)
        .await
        .unwrap();
    assert!(decision.accepted);
    assert_eq!(store.snapshot().validation_status, ValidationStatus::PassedAccepted);
    assert_eq!(store.snapshot().conversion_status, ConversionStatus::Completed);
}

fn complete_metadata_store() -> StateStore {
    use nwb_convo_orchestrator::state::provenance::ProvenanceRecord;

    let mut state = WorkflowState::new();
    state.phase = ConversationPhase::ConfirmingMetadata;
    state.source_path = Some(PathBuf::from("/data/recording.dat"));
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
