//! The Evaluation Agent (§4.6): runs the NWB Inspector over a converted
//! file, classifies the outcome, and categorizes any issues into
//! auto-fixable metadata rewrites vs. ones that need user input.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bus::MessageBus;
use crate::inspector::{FileInfo, Finding};
use crate::types::{Severity, ValidationOutcome};

/// The categorization `spec.md` §4.6/§4.7 drives the auto-fix approval loop
/// from: every finding lands in exactly one bucket. Kept on `WorkflowState`
/// for the single turn between "improve" and the user's apply/cancel reply
/// (§3.1 `correction_context`); not persisted across sessions (§3.3 lists it
/// among the derived caches a reset clears).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionContext {
    pub auto_fixable: Vec<Finding>,
    pub user_input_required: Vec<Finding>,
}

impl CorrectionContext {
    #[must_use]
    pub fn user_input_needed(&self) -> bool {
        !self.user_input_required.is_empty()
    }

    /// The JSON correction context `spec.md` §4.6/§6 calls for on a failed
    /// validation — the same shape this struct already carries, rendered
    /// for persistence or for a `failed` result's side-channel report.
    #[must_use]
    pub fn as_json(&self) -> Value {
        json!({
            "auto_fixable": self.auto_fixable,
            "user_input_required": self.user_input_required,
        })
    }
}

/// Result of one `run_validation` pass, before any user decision is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub issues: Vec<Finding>,
    pub summary: BTreeMap<Severity, u32>,
    pub file_info: FileInfo,
}

/// Classifies a set of findings into a [`ValidationOutcome`] per §4.6:
/// `failed` iff any finding is blocking (`Critical` only), `passed_with_issues`
/// iff clean of blocking findings but not empty, `passed` iff empty.
/// `BestPracticeViolation`/`Info` findings alone never fail validation — they
/// land in `passed_with_issues` so DANDI recommendations still reach the
/// user, per the spec's explicit rationale.
#[must_use]
pub fn classify_outcome(findings: &[Finding]) -> ValidationOutcome {
    if findings.is_empty() {
        ValidationOutcome::Passed
    } else if findings.iter().any(|f| f.severity.is_blocking()) {
        ValidationOutcome::Failed
    } else {
        ValidationOutcome::PassedWithIssues
    }
}

fn summarize(findings: &[Finding]) -> BTreeMap<Severity, u32> {
    let mut summary = BTreeMap::new();
    for finding in findings {
        *summary.entry(finding.severity).or_insert(0) += 1;
    }
    summary
}

pub struct EvaluationAgent {
    bus: Arc<MessageBus>,
}

impl EvaluationAgent {
    #[must_use]
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }

    /// Runs the inspector and reads the file's metadata back out, bounded
    /// by the bus's inspector timeout in both cases (§4.6, §7 — a timeout
    /// degrades rather than propagating).
    pub async fn run_validation(&self, nwb_path: &Path) -> ValidationReport {
        let run = self.bus.run_validation(nwb_path).await;
        let file_info = self.bus.extract_file_info(nwb_path).await;
        let outcome = classify_outcome(&run.findings);
        let summary = summarize(&run.findings);
        ValidationReport {
            outcome,
            issues: run.findings,
            summary,
            file_info,
        }
    }

    /// Splits `issues` into auto-fixable and user-input-required buckets
    /// (§4.6). Pure and synchronous: the classification itself needs no
    /// external call, only the `auto_fixable` flag the inspector already
    /// attached to each finding.
    #[must_use]
    pub fn categorize_issues(&self, issues: &[Finding]) -> CorrectionContext {
        let mut auto_fixable = Vec::new();
        let mut user_input_required = Vec::new();
        for issue in issues {
            if issue.auto_fixable {
                auto_fixable.push(issue.clone());
            } else {
                user_input_required.push(issue.clone());
            }
        }
        CorrectionContext {
            auto_fixable,
            user_input_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity, auto_fixable: bool) -> Finding {
        Finding {
            severity,
            message: "test finding".to_string(),
            check_name: "check_test".to_string(),
            auto_fixable,
            field: None,
        }
    }

    #[test]
    fn empty_findings_classify_as_passed() {
        assert_eq!(classify_outcome(&[]), ValidationOutcome::Passed);
    }

    #[test]
    fn info_only_findings_classify_as_passed_with_issues() {
        let findings = vec![finding(Severity::Info, true)];
        assert_eq!(classify_outcome(&findings), ValidationOutcome::PassedWithIssues);
    }

    #[test]
    fn a_single_critical_finding_fails_validation() {
        let findings = vec![
            finding(Severity::Info, true),
            finding(Severity::Critical, false),
        ];
        assert_eq!(classify_outcome(&findings), ValidationOutcome::Failed);
    }

    #[test]
    fn best_practice_violation_only_passes_with_issues() {
        let findings = vec![
            finding(Severity::BestPracticeViolation, true),
            finding(Severity::BestPracticeViolation, false),
        ];
        assert_eq!(classify_outcome(&findings), ValidationOutcome::PassedWithIssues);
    }

    #[test]
    fn categorize_splits_by_auto_fixable_flag() {
        let agent = EvaluationAgent::new(Arc::new(MessageBus::new(
            Arc::new(crate::llm::MockLlmClient::new()),
            Arc::new(crate::converter::MockConverter::new()),
            Arc::new(crate::inspector::MockInspector::new()),
            &crate::config::OrchestratorConfig::default(),
        )));
        let issues = vec![finding(Severity::Info, true), finding(Severity::BestPracticeViolation, false)];
        let context = agent.categorize_issues(&issues);
        assert_eq!(context.auto_fixable.len(), 1);
        assert_eq!(context.user_input_required.len(), 1);
        assert!(context.user_input_needed());
    }
}
