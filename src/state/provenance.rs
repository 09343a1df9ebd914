//! Provenance tracking for collected metadata: where a value came from and
//! how confident the orchestrator is in it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a metadata value originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    /// The user typed or confirmed this value directly.
    UserProvided,
    /// The LLM extracted this value from free-form conversation text.
    LlmInferred,
    /// Auto-filled from a default or a recommended-field heuristic, never
    /// shown to the user for confirmation.
    AutoFilled,
    /// Read out of the source recording's own file metadata.
    FileMetadata,
}

/// A single provenance entry kept alongside each metadata field, per
/// `spec.md` §3.1's per-field provenance requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source: ProvenanceSource,
    /// 0-100 confidence the value is correct, only meaningful for
    /// `LlmInferred`/`AutoFilled` sources.
    pub confidence: u8,
    /// Whether this value was inserted without direct user confirmation and
    /// should be flagged for review in a metadata summary (§4.4 auto-fill).
    pub needs_review: bool,
    pub recorded_at: DateTime<Utc>,
}

impl ProvenanceRecord {
    #[must_use]
    pub fn user_provided() -> Self {
        Self {
            source: ProvenanceSource::UserProvided,
            confidence: 100,
            needs_review: false,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn llm_inferred(confidence: u8) -> Self {
        Self {
            source: ProvenanceSource::LlmInferred,
            confidence,
            needs_review: false,
            recorded_at: Utc::now(),
        }
    }

    /// An optional field filled in from a low-confidence inference without
    /// ever having been shown to the user (§4.4 "Auto-fill"); always marked
    /// `needs_review`.
    #[must_use]
    pub fn auto_filled(confidence: u8) -> Self {
        Self {
            source: ProvenanceSource::AutoFilled,
            confidence,
            needs_review: true,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn file_metadata() -> Self {
        Self {
            source: ProvenanceSource::FileMetadata,
            confidence: 100,
            needs_review: false,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_provided_is_always_fully_confident() {
        assert_eq!(ProvenanceRecord::user_provided().confidence, 100);
    }
}
