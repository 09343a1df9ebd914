use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{FormatterMode, PlainFormatter, TelemetryFormatter};

/// Represents an error event with scope, error details, tags, and context.
///
/// This is the structured-logging ladder used for diagnostics the bus emits
/// alongside a session transcript — distinct from [`crate::error::OrchestratorError`],
/// which is the typed `Result` error every agent operation returns. An
/// `ErrorEvent` records *that* something went wrong for the session log;
/// `OrchestratorError` is what a caller pattern-matches on.
///
/// # JSON Serialization Format
///
/// ```json
/// {
///   "when": "2025-11-02T10:30:00Z",
///   "scope": {
///     "scope": "agent",
///     "agent": "conversation",
///     "step": 1
///   },
///   "error": {
///     "message": "could not parse LLM output",
///     "cause": {
///       "message": "invalid JSON syntax",
///       "cause": null,
///       "details": {"line": 3, "column": 15}
///     },
///     "details": {"input_length": 1024}
///   },
///   "tags": ["llm", "retryable"],
///   "context": {
///     "session_id": "3f8c...",
///     "phase": "collecting_metadata"
///   }
/// }
/// ```
///
/// The `scope` field uses a tagged union format with a discriminator field named `"scope"`.
/// Supported scope variants are:
/// - `"agent"`: Requires `agent` (string) and `step` (u64)
/// - `"bus"`: Requires `step` (u64)
/// - `"session"`: Requires `session` (string) and `step` (u64)
/// - `"orchestrator"`: No additional fields
///
/// # Examples
///
/// ```
/// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
/// use serde_json::json;
///
/// let event = ErrorEvent::agent("conversation", 1, LadderError::msg("LLM timed out"))
///     .with_tag("retryable")
///     .with_context(json!({"phase": "collecting_metadata"}));
///
/// let json_str = serde_json::to_string(&event).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: LadderError,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Create an agent-scoped error event (Conversation/Conversion/Evaluation).
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::agent("evaluation", 1, LadderError::msg("inspector crashed"));
    /// ```
    pub fn agent<S: Into<String>>(agent: S, step: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Agent {
                agent: agent.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a bus-scoped error event (dispatch/correlation failures).
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::bus(5, LadderError::msg("request dropped: no reply"));
    /// ```
    pub fn bus(step: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Bus { step },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a session-scoped error event.
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::session("3f8c-session", 10, LadderError::msg("persistence write failed"));
    /// ```
    pub fn session<S: Into<String>>(session: S, step: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Session {
                session: session.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an orchestrator-scoped (process-wide) error event.
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::orchestrator(LadderError::msg("startup failed"));
    /// ```
    pub fn orchestrator(error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Orchestrator,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Add multiple tags to this error event.
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::agent("conversation", 1, LadderError::msg("invalid input"))
    ///     .with_tags(vec!["validation".to_string(), "critical".to_string()]);
    /// ```
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Add a single tag to this error event.
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    ///
    /// let err = ErrorEvent::agent("conversation", 1, LadderError::msg("invalid input"))
    ///     .with_tag("validation");
    /// ```
    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add context metadata to this error event.
    ///
    /// # Example
    /// ```
    /// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError};
    /// use serde_json::json;
    ///
    /// let err = ErrorEvent::agent("conversation", 1, LadderError::msg("invalid input"))
    ///     .with_context(json!({"field": "subject_id", "value": ""}));
    /// ```
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Where, within the orchestrator, an [`ErrorEvent`] originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    /// One of the three message-handler agents (`"conversation"`, `"conversion"`,
    /// `"evaluation"`); `step` is that agent's turn counter.
    Agent {
        agent: String,
        step: u64,
    },
    /// The in-process request/response bus itself (dispatch or timeout failure).
    Bus {
        step: u64,
    },
    /// A specific session's persistence/lifecycle error.
    Session {
        session: String,
        step: u64,
    },
    #[default]
    Orchestrator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LadderError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<LadderError>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for LadderError {
    fn default() -> Self {
        LadderError {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for LadderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LadderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl LadderError {
    pub fn msg<M: Into<String>>(m: M) -> Self {
        LadderError {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_cause(mut self, cause: LadderError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Format error events with explicit color mode control.
///
/// # Examples
///
/// ```
/// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError, pretty_print_with_mode};
/// use nwb_convo_orchestrator::telemetry::FormatterMode;
///
/// let events = vec![
///     ErrorEvent::agent("conversion", 1, LadderError::msg("converter crashed"))
/// ];
///
/// let plain = pretty_print_with_mode(&events, FormatterMode::Plain);
/// assert!(!plain.contains("\x1b[")); // No ANSI codes
///
/// let colored = pretty_print_with_mode(&events, FormatterMode::Colored);
/// assert!(colored.contains("\x1b["));
/// ```
pub fn pretty_print_with_mode(events: &[ErrorEvent], mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    let renders = formatter.render_errors(events);
    let mut out = String::new();
    for (idx, render) in renders.into_iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        for line in render.lines {
            out.push_str(&line);
        }
    }
    out
}

/// Format error events as human-readable text with auto-detected color support.
///
/// Colors are automatically enabled when stderr is a TTY and disabled otherwise.
/// For explicit control over color output, use [`pretty_print_with_mode`].
///
/// # Examples
///
/// ```
/// use nwb_convo_orchestrator::channels::errors::{ErrorEvent, LadderError, pretty_print};
///
/// let events = vec![
///     ErrorEvent::agent("conversion", 1, LadderError::msg("converter crashed"))
/// ];
///
/// let output = pretty_print(&events);
/// assert!(output.contains("converter crashed"));
/// ```
pub fn pretty_print(events: &[ErrorEvent]) -> String {
    pretty_print_with_mode(events, FormatterMode::Auto)
}
