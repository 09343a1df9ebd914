//! Orchestrator-wide configuration: retry/confidence thresholds, external
//! call timeouts, and event bus sink wiring.
//!
//! Grounded in the teacher's `RuntimeConfig`/`EventBusConfig` shape: a
//! `Default` impl gives sane out-of-the-box values, and `with_*` builder
//! methods let a host override pieces of it without naming every field.

use std::time::Duration;

/// Maximum number of correction retries the Evaluation Agent will drive
/// before giving up and marking the session `Failed`.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub buffer_capacity: usize,
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new(buffer_capacity: usize, sinks: Vec<SinkConfig>) -> Self {
        Self {
            buffer_capacity: if buffer_capacity == 0 {
                Self::DEFAULT_BUFFER_CAPACITY
            } else {
                buffer_capacity
            },
            sinks,
        }
    }

    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(Self::DEFAULT_BUFFER_CAPACITY, vec![SinkConfig::StdOut])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(
            Self::DEFAULT_BUFFER_CAPACITY,
            vec![SinkConfig::StdOut, SinkConfig::Memory],
        )
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}

/// Confidence thresholds (0-100) the orchestrator applies when deciding
/// whether to trust an LLM's suggestion without asking the user to confirm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfidenceThresholds {
    /// Minimum confidence to accept an LLM's file-format guess outright.
    pub format_detection: u8,
    /// Minimum confidence to merge an LLM-proposed metadata value without
    /// asking the user to confirm it.
    pub metadata_merge: u8,
    /// Minimum confidence to auto-fill a recommended (non-required) field
    /// the user never mentioned.
    pub auto_fill: u8,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            format_detection: 80,
            metadata_merge: 80,
            auto_fill: 60,
        }
    }
}

/// Top-level configuration for an orchestrator instance.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_retry_attempts: u32,
    pub confidence: ConfidenceThresholds,
    pub llm_timeout: Duration,
    pub converter_timeout: Duration,
    pub inspector_timeout: Duration,
    pub event_bus: EventBusConfig,
    pub session_dir: std::path::PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        Self {
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            confidence: ConfidenceThresholds::default(),
            llm_timeout: Duration::from_secs(30),
            converter_timeout: Duration::from_secs(300),
            inspector_timeout: Duration::from_secs(60),
            event_bus: EventBusConfig::default(),
            session_dir: std::path::PathBuf::from("sessions"),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_session_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_spec() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.confidence.format_detection, 80);
        assert_eq!(cfg.confidence.metadata_merge, 80);
        assert_eq!(cfg.confidence.auto_fill, 60);
        assert_eq!(cfg.max_retry_attempts, MAX_RETRY_ATTEMPTS);
    }

    #[test]
    fn zero_buffer_capacity_falls_back_to_default() {
        let cfg = EventBusConfig::new(0, vec![SinkConfig::StdOut]);
        assert_eq!(cfg.buffer_capacity, EventBusConfig::DEFAULT_BUFFER_CAPACITY);
    }
}
