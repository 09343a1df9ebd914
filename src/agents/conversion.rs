//! The Conversion Agent (§4.5): invokes the external converter and, on a
//! correction retry, applies the auto-fixable rewrites a prior validation
//! pass identified before re-running it.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::agents::evaluation::CorrectionContext;
use crate::bus::MessageBus;
use crate::converter::ConversionResult;
use crate::error::OrchestratorError;
use crate::schema::normalize_field;

pub struct ConversionAgent {
    bus: Arc<MessageBus>,
}

impl ConversionAgent {
    #[must_use]
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    /// Plain conversion path: detect (redundant check already happened in
    /// the Conversation Agent) is not repeated here — this agent trusts the
    /// metadata dictionary it's handed and simply dispatches the external
    /// converter (§4.5).
    pub async fn convert(
        &self,
        input_path: &Path,
        metadata: &FxHashMap<String, Value>,
    ) -> Result<ConversionResult, OrchestratorError> {
        self.bus.convert(input_path, metadata).await
    }

    /// Applies the auto-fix transforms named in `correction_context` to
    /// `metadata` (field normalization via the schema catalog's rules; a
    /// finding with no attributable field is left for the converter to
    /// surface again) and re-runs conversion with the rewritten metadata
    /// (§4.5).
    pub async fn apply_corrections(
        &self,
        input_path: &Path,
        correction_context: &CorrectionContext,
        metadata: &FxHashMap<String, Value>,
    ) -> Result<ConversionResult, OrchestratorError> {
        let rewritten = apply_auto_fixes(correction_context, metadata.clone());
        let context_json = correction_context.as_json();
        self.bus
            .apply_corrections(input_path, &context_json, &rewritten)
            .await
    }
}

/// Re-normalizes every field named by an auto-fixable finding. This is the
/// crate's only metadata rewrite in the retry path — `spec.md` §9's open
/// question about idempotence across retries is resolved in `DESIGN.md`:
/// re-normalizing an already-canonical value is a no-op (`normalize_field`
/// is idempotent, §8), so repeated retries are safe even without a
/// per-field rewrite history.
fn apply_auto_fixes(
    correction_context: &CorrectionContext,
    mut metadata: FxHashMap<String, Value>,
) -> FxHashMap<String, Value> {
    for finding in &correction_context.auto_fixable {
        let Some(field_name) = &finding.field else {
            continue;
        };
        if let Some(value) = metadata.remove(field_name) {
            metadata.insert(field_name.clone(), normalize_field(field_name, value));
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::Finding;
    use crate::types::Severity;
    use serde_json::json;

    fn test_agent() -> ConversionAgent {
        ConversionAgent::new(Arc::new(MessageBus::new(
            Arc::new(crate::llm::MockLlmClient::new()),
            Arc::new(crate::converter::MockConverter::new()),
            Arc::new(crate::inspector::MockInspector::new()),
            &crate::config::OrchestratorConfig::default(),
        )))
    }

    #[tokio::test]
    async fn convert_round_trips_through_the_bus() {
        let agent = test_agent();
        let metadata = FxHashMap::default();
        let result = agent.convert(Path::new("/data/x.dat"), &metadata).await.unwrap();
        assert!(result.ok);
    }

    #[test]
    fn apply_auto_fixes_normalizes_only_named_fields() {
        let mut metadata = FxHashMap::default();
        metadata.insert("subject_sex".to_string(), json!("m"));
        metadata.insert("institution".to_string(), json!("  Acme  "));

        let context = CorrectionContext {
            auto_fixable: vec![Finding {
                severity: Severity::BestPracticeSuggestion,
                message: "sex should be canonical".to_string(),
                check_name: "check_subject_sex".to_string(),
                auto_fixable: true,
                field: Some("subject_sex".to_string()),
            }],
            user_input_required: Vec::new(),
        };

        let rewritten = apply_auto_fixes(&context, metadata);
        assert_eq!(rewritten.get("subject_sex"), Some(&json!("M")));
        // Untouched field (no finding named it) stays as-is.
        assert_eq!(rewritten.get("institution"), Some(&json!("  Acme  ")));
    }

    #[tokio::test]
    async fn apply_corrections_reconverts_with_rewritten_metadata() {
        let agent = test_agent();
        let mut metadata = FxHashMap::default();
        metadata.insert("subject_sex".to_string(), json!("female"));
        let context = CorrectionContext {
            auto_fixable: vec![Finding {
                severity: Severity::Info,
                message: "normalize sex".to_string(),
                check_name: "check_subject_sex".to_string(),
                auto_fixable: true,
                field: Some("subject_sex".to_string()),
            }],
            user_input_required: Vec::new(),
        };
        let result = agent
            .apply_corrections(Path::new("/data/x.dat"), &context, &metadata)
            .await
            .unwrap();
        assert!(result.ok);
    }
}
