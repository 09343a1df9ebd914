//! Crate-wide error taxonomy.
//!
//! Every error that can surface from an agent operation is a variant of
//! [`OrchestratorError`]. External-boundary failures (LLM, converter,
//! inspector, filesystem, bus) are wrapped into this taxonomy at the point
//! they cross into the orchestrator; callers of the agent API never see a
//! raw `io::Error` or `serde_json::Error`.

use miette::Diagnostic;
use thiserror::Error;

use crate::event_bus::EmitterError;
use crate::persistence::PersistenceError;

/// The single error type returned by agent, bus, and workflow operations.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("{stage} timed out")]
    #[diagnostic(
        code(orchestrator::timeout),
        help("The external call exceeded its configured timeout; retry or raise the timeout in OrchestratorConfig.")
    )]
    Timeout { stage: &'static str },

    #[error("required field `{field}` is missing")]
    #[diagnostic(
        code(orchestrator::missing_required_field),
        help("Ask the user for this field before advancing past metadata collection.")
    )]
    MissingRequiredField { field: String },

    #[error("could not parse structured output from the LLM: {reason}")]
    #[diagnostic(code(orchestrator::llm_parse_failure))]
    LlmParseFailure { reason: String },

    #[error("conversion failed: {message}")]
    #[diagnostic(
        code(orchestrator::converter_failure),
        help("Inspect the converter's stderr in `message` for the underlying cause.")
    )]
    ConverterFailure { message: String },

    /// Non-fatal by convention: the Evaluation Agent degrades to a partial
    /// report and emits a diagnostic event rather than propagating this
    /// variant. It exists so tests and future callers can represent the
    /// failure explicitly if they choose not to degrade.
    #[error("inspector failed: {message}")]
    #[diagnostic(code(orchestrator::inspector_failure))]
    InspectorFailure { message: String },

    #[error("the LLM is busy with another request")]
    #[diagnostic(
        code(orchestrator::busy),
        help("Wait for the in-flight LLM call to finish before dispatching another.")
    )]
    Busy,

    #[error("illegal transition from `{from}` to `{to}`")]
    #[diagnostic(
        code(orchestrator::illegal_transition),
        help("This indicates an internal invariant violation, not a user-correctable error.")
    )]
    IllegalTransition { from: String, to: String },

    #[error(transparent)]
    #[diagnostic(code(orchestrator::persistence))]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    #[diagnostic(code(orchestrator::event_bus))]
    EventBus(#[from] EmitterError),

    #[error("io error: {0}")]
    #[diagnostic(code(orchestrator::io))]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    #[diagnostic(code(orchestrator::serde))]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
