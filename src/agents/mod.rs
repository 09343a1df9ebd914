//! The three-agent pipeline (§4): Conversation, Conversion, and Evaluation.
//! Each agent owns one external boundary and talks to the others only
//! through [`crate::bus::MessageBus`] — none of them reach into another
//! agent's internals.

pub mod conversation;
pub mod conversion;
pub mod evaluation;

pub use conversation::{ChatResponse, ChatStatus, ConversationAgent, Decision, ImprovementDecisionResponse, UploadAck};
pub use conversion::ConversionAgent;
pub use evaluation::{CorrectionContext, EvaluationAgent, ValidationReport};
