//! # nwb-convo-orchestrator: Conversational NWB Conversion Orchestrator
//!
//! A stateful, three-agent pipeline that turns a raw neurophysiology
//! recording (SpikeGLX, OpenEphys, ...) into a standards-compliant NWB
//! file through conversation rather than a config file: the Conversation
//! Agent collects and confirms metadata with the user, the Conversion
//! Agent drives the external converter, and the Evaluation Agent runs the
//! NWB Inspector and classifies the result, looping back through a bounded
//! correction retry when validation doesn't pass clean.
//!
//! ## Core Concepts
//!
//! - **Agents** ([`agents`]): the three cooperating roles — Conversation,
//!   Conversion, Evaluation — each owning one external boundary.
//! - **State** ([`state`]): a single owned [`state::WorkflowState`] per
//!   session, mutated only by its owning agent and read everywhere else
//!   through [`state::StateStore::snapshot`].
//! - **Schema** ([`schema`]): the declarative NWB/DANDI field catalog that
//!   drives prompt generation, validation, and normalization from one
//!   source of truth.
//! - **Bus** ([`bus`]): the bounded request/response fabric the agents use
//!   to call the LLM, converter, and inspector adapters.
//! - **Workflow** ([`workflow`]): pure phase-transition predicates shared
//!   by the agents and their tests.
//!
//! ## Quick Start
//!
//! ```
//! use nwb_convo_orchestrator::message::Message;
//!
//! let user_msg = Message::user("What's the weather like?");
//! let assistant_msg = Message::assistant("It's sunny and 75°F!");
//! let system_msg = Message::system("You are a helpful assistant.");
//!
//! assert!(user_msg.has_role(Message::USER));
//! assert!(!user_msg.has_role(Message::ASSISTANT));
//! let _ = (assistant_msg, system_msg);
//! ```
//!
//! ```
//! use nwb_convo_orchestrator::config::OrchestratorConfig;
//! use nwb_convo_orchestrator::state::{StateStore, WorkflowState};
//!
//! let config = OrchestratorConfig::default();
//! let store = StateStore::new(WorkflowState::new());
//! assert_eq!(config.max_retry_attempts, nwb_convo_orchestrator::config::MAX_RETRY_ATTEMPTS);
//! assert_eq!(store.snapshot().phase, nwb_convo_orchestrator::types::ConversationPhase::Greeting);
//! ```
//!
//! ## Module Guide
//!
//! - [`agents`] - Conversation, Conversion, and Evaluation agents
//! - [`bus`] - In-process request/response fabric to the LLM/converter/inspector
//! - [`channels`] - Error event taxonomy shared with the diagnostics bus
//! - [`config`] - Orchestrator-wide configuration and confidence thresholds
//! - [`converter`] - The `Converter` contract and its deterministic mock
//! - [`error`] - The crate-wide `OrchestratorError` taxonomy
//! - [`event_bus`] - Fire-and-forget diagnostics/observability bus
//! - [`inspector`] - The `Inspector` contract and its deterministic mock
//! - [`llm`] - The `LlmClient` contract and its deterministic mock
//! - [`message`] - Message types and construction utilities
//! - [`persistence`] - Session JSON persistence
//! - [`schema`] - The declarative NWB/DANDI field catalog
//! - [`session`] - Session identity
//! - [`state`] - `WorkflowState`/`StateStore` and per-field provenance
//! - [`telemetry`] - Structured logging/tracing setup
//! - [`types`] - Shared enums (phases, statuses, severities)
//! - [`utils`] - Generic JSON helpers
//! - [`workflow`] - Pure phase-transition predicates

pub mod agents;
pub mod bus;
pub mod channels;
pub mod config;
pub mod converter;
pub mod error;
pub mod event_bus;
pub mod inspector;
pub mod llm;
pub mod message;
pub mod persistence;
pub mod schema;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workflow;
