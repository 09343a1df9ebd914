//! In-process request/response fabric for the three external-boundary
//! adapters (`LlmClient`, `Converter`, `Inspector`), distinct from
//! [`crate::event_bus`]'s fan-out observability bus (§2 budgets this
//! component at 8%).
//!
//! Grounded in the teacher's `event_bus::bus::EventBus`/`event_bus::hub::EventHub`
//! machinery: every dispatch mints a correlation ID the way the hub tags a
//! subscriber stream, and replies travel over a `tokio::sync::oneshot`
//! channel the way the teacher's `SinkWorker` shuts itself down. Unlike the
//! event bus (fire-and-forget broadcast), every call here is a bounded
//! request/response: a `tokio::time::timeout` wraps the dispatch (§5 "every
//! LLM/converter/inspector call is bounded"), and LLM calls additionally
//! serialize through a `tokio::sync::Mutex` guard so two concurrent chat
//! requests never corrupt shared conversation context (§5 "LLM mutual
//! exclusion").

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::converter::{ConversionResult, Converter};
use crate::error::OrchestratorError;
use crate::inspector::{FileInfo, Inspector, InspectorRun};
use crate::llm::{ExtractionResponse, LlmClient};

/// A correlation ID minted per dispatch, mirroring the hub's per-subscriber
/// tagging. Not currently surfaced outside this module, but kept as a
/// distinct type so a future cross-process bus can thread it through
/// without a signature change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Holds the LLM lock for the duration of one dispatch and clears
/// `llm_processing` on drop, so a call that returns early (error, timeout,
/// panic-unwind) never leaves the bus permanently reporting `busy` (§5).
struct LlmGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
    processing: &'a AtomicBool,
}

impl Drop for LlmGuard<'_> {
    fn drop(&mut self) {
        self.processing.store(false, Ordering::SeqCst);
    }
}

/// Owns the external adapters and mediates every call to them. One
/// `MessageBus` per running orchestrator; cheap to clone (everything inside
/// is `Arc`-backed) so each session's agents can hold their own handle.
#[derive(Clone)]
pub struct MessageBus {
    llm: Arc<dyn LlmClient>,
    llm_lock: Arc<AsyncMutex<()>>,
    llm_processing: Arc<AtomicBool>,
    converter: Arc<dyn Converter>,
    inspector: Arc<dyn Inspector>,
    llm_timeout: std::time::Duration,
    converter_timeout: std::time::Duration,
    inspector_timeout: std::time::Duration,
}

impl MessageBus {
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        converter: Arc<dyn Converter>,
        inspector: Arc<dyn Inspector>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            llm,
            llm_lock: Arc::new(AsyncMutex::new(())),
            llm_processing: Arc::new(AtomicBool::new(false)),
            converter,
            inspector,
            llm_timeout: config.llm_timeout,
            converter_timeout: config.converter_timeout,
            inspector_timeout: config.inspector_timeout,
        }
    }

    /// Non-blocking check surfaced to callers so a second concurrent chat
    /// request returns `busy` rather than queuing behind the lock (§5).
    #[must_use]
    pub fn llm_busy(&self) -> bool {
        self.llm_processing.load(Ordering::SeqCst)
    }

    /// Dispatches a metadata-extraction call through the LLM lock with a
    /// bounded timeout. Returns [`OrchestratorError::Busy`] immediately
    /// (without waiting on the lock) if another call is already in flight.
    #[instrument(skip(self, prompt, user_message))]
    pub async fn extract_metadata(&self, prompt: &str, user_message: &str) -> Result<ExtractionResponse, OrchestratorError> {
        let _guard = self.acquire_llm()?;
        let (tx, rx) = oneshot::channel();
        let llm = Arc::clone(&self.llm);
        let prompt = prompt.to_string();
        let user_message = user_message.to_string();
        tokio::spawn(async move {
            let _ = tx.send(llm.extract_metadata(&prompt, &user_message).await);
        });
        self.await_llm_reply(rx).await
    }

    pub async fn detect_format(&self, filename: &str, header_sample: &[u8]) -> Result<(String, u8), OrchestratorError> {
        let _guard = self.acquire_llm()?;
        let (tx, rx) = oneshot::channel();
        let llm = Arc::clone(&self.llm);
        let filename = filename.to_string();
        let header_sample = header_sample.to_vec();
        tokio::spawn(async move {
            let _ = tx.send(llm.detect_format(&filename, &header_sample).await);
        });
        self.await_llm_reply(rx).await
    }

    pub async fn answer_general_query(&self, question: &str, context: &Value) -> Result<String, OrchestratorError> {
        let _guard = self.acquire_llm()?;
        let (tx, rx) = oneshot::channel();
        let llm = Arc::clone(&self.llm);
        let question = question.to_string();
        let context = context.clone();
        tokio::spawn(async move {
            let _ = tx.send(llm.answer_general_query(&question, &context).await);
        });
        self.await_llm_reply(rx).await
    }

    /// Acquires the LLM lock without waiting, flips `llm_processing` on,
    /// and mints a correlation ID for the call about to be dispatched.
    /// Fails fast with `Busy` instead of queuing (§5 "second concurrent
    /// chat request returns busy").
    fn acquire_llm(&self) -> Result<LlmGuard<'_>, OrchestratorError> {
        let guard = self.llm_lock.try_lock().map_err(|_| OrchestratorError::Busy)?;
        self.llm_processing.store(true, Ordering::SeqCst);
        let _correlation = CorrelationId::new();
        Ok(LlmGuard {
            _guard: guard,
            processing: &self.llm_processing,
        })
    }

    /// Awaits a dispatched LLM call's oneshot reply, bounded by `llm_timeout`.
    async fn await_llm_reply<T>(&self, rx: oneshot::Receiver<Result<T, OrchestratorError>>) -> Result<T, OrchestratorError> {
        match timeout(self.llm_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                warn!(stage = "llm", "bus dispatch timed out or sender dropped");
                Err(OrchestratorError::Timeout { stage: "llm" })
            }
        }
    }

    /// Dispatches a conversion call bounded by `converter_timeout`.
    #[instrument(skip(self, metadata))]
    pub async fn convert(&self, input_path: &Path, metadata: &FxHashMap<String, Value>) -> Result<ConversionResult, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        let converter = Arc::clone(&self.converter);
        let input_path = input_path.to_path_buf();
        let metadata = metadata.clone();
        tokio::spawn(async move {
            let result = converter.convert(&input_path, &metadata).await;
            let _ = tx.send(result);
        });
        match timeout(self.converter_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                warn!(stage = "converter", "conversion timed out or sender dropped");
                Err(OrchestratorError::Timeout { stage: "converter" })
            }
        }
    }

    /// Dispatches a correction-apply call bounded by `converter_timeout`.
    pub async fn apply_corrections(
        &self,
        input_path: &Path,
        correction_context: &Value,
        metadata: &FxHashMap<String, Value>,
    ) -> Result<ConversionResult, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        let converter = Arc::clone(&self.converter);
        let input_path = input_path.to_path_buf();
        let correction_context = correction_context.clone();
        let metadata = metadata.clone();
        tokio::spawn(async move {
            let result = converter.apply_corrections(&input_path, &correction_context, &metadata).await;
            let _ = tx.send(result);
        });
        match timeout(self.converter_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => Err(OrchestratorError::Timeout { stage: "converter" }),
        }
    }

    /// Runs the inspector, bounded by `inspector_timeout`. A timeout
    /// degrades to an empty run rather than propagating an error — §7's
    /// "inspector failures never abort the report pipeline" applies to
    /// bus-level timeouts too, not just inspector-internal failures.
    pub async fn run_validation(&self, nwb_path: &Path) -> InspectorRun {
        let (tx, rx) = oneshot::channel();
        let inspector = Arc::clone(&self.inspector);
        let nwb_path = nwb_path.to_path_buf();
        tokio::spawn(async move {
            let run = inspector.run_validation(&nwb_path).await;
            let _ = tx.send(run);
        });
        timeout(self.inspector_timeout, rx).await.ok().and_then(Result::ok).unwrap_or_default()
    }

    /// Runs `extract_file_info`, degrading to a default (all-unknown)
    /// [`FileInfo`] on timeout for the same reason as [`Self::run_validation`].
    pub async fn extract_file_info(&self, nwb_path: &Path) -> FileInfo {
        let (tx, rx) = oneshot::channel();
        let inspector = Arc::clone(&self.inspector);
        let nwb_path = nwb_path.to_path_buf();
        tokio::spawn(async move {
            let info = inspector.extract_file_info(&nwb_path).await;
            let _ = tx.send(info);
        });
        timeout(self.inspector_timeout, rx).await.ok().and_then(Result::ok).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::MockConverter;
    use crate::inspector::MockInspector;
    use crate::llm::MockLlmClient;

    fn test_bus() -> MessageBus {
        let config = OrchestratorConfig::default();
        MessageBus::new(
            Arc::new(MockLlmClient::new()),
            Arc::new(MockConverter::new()),
            Arc::new(MockInspector::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn llm_is_not_busy_before_any_call() {
        let bus = test_bus();
        assert!(!bus.llm_busy());
    }

    #[tokio::test]
    async fn second_concurrent_llm_call_returns_busy() {
        let bus = test_bus();
        let guard = bus.llm_lock.clone().try_lock_owned().unwrap();
        let err = bus.extract_metadata("prompt", "hi").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Busy));
        drop(guard);
    }

    #[tokio::test]
    async fn convert_round_trips_through_the_mock() {
        let bus = test_bus();
        let metadata = FxHashMap::default();
        let result = bus.convert(Path::new("/data/x.dat"), &metadata).await.unwrap();
        assert!(result.ok);
    }

    #[tokio::test]
    async fn run_validation_returns_empty_run_for_a_clean_mock() {
        let bus = test_bus();
        let run = bus.run_validation(Path::new("/tmp/x.nwb")).await;
        assert!(run.findings.is_empty());
    }
}
