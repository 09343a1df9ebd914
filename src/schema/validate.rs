//! Schema-level metadata validation — distinct from inspector-level NWB
//! validation (§4.6). This checks that collected values match the
//! catalog's declared `FieldType` and that all `Required` fields are
//! present, before the Conversion Agent ever runs.

use chrono::DateTime;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::catalog::{field, SCHEMA_CATALOG};
use crate::types::{FieldRequirementLevel, FieldType};

/// A single schema-validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    #[must_use]
    pub fn missing_required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("`{field}` is required but missing"),
            field,
        }
    }
}

/// Validates collected metadata against the schema catalog. Returns one
/// [`ValidationIssue`] per missing required field or per-field type
/// mismatch; an empty vec means the metadata is internally consistent
/// (this does not guarantee the NWB Inspector will pass it — that is a
/// separate, file-level check).
#[must_use]
pub fn validate_metadata(metadata: &FxHashMap<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for def in SCHEMA_CATALOG {
        let value = metadata.get(def.name);
        match (def.requirement_level, value) {
            (FieldRequirementLevel::Required, None) => {
                issues.push(ValidationIssue {
                    field: def.name.to_string(),
                    message: format!("`{}` is required but missing", def.display_name),
                });
            }
            (_, None) => {}
            (_, Some(v)) => {
                if let Some(message) = type_mismatch(&def.field_type_owned(), v) {
                    issues.push(ValidationIssue {
                        field: def.name.to_string(),
                        message,
                    });
                } else if def.name == "experimenter" {
                    if let Some(s) = v.as_str() {
                        if !s.contains(',') {
                            issues.push(ValidationIssue {
                                field: def.name.to_string(),
                                message: format!("`{s}` should be in \"Lastname, Firstname\" format"),
                            });
                        }
                    }
                }
            }
        }
    }

    issues
}

fn type_mismatch(expected: &FieldType, value: &Value) -> Option<String> {
    match expected {
        FieldType::String => {
            if value.is_string() {
                None
            } else {
                Some(format!("expected a string, got {value}"))
            }
        }
        FieldType::Integer => {
            if value.is_i64() || value.is_u64() {
                None
            } else {
                Some(format!("expected an integer, got {value}"))
            }
        }
        FieldType::Float => {
            if value.is_number() {
                None
            } else {
                Some(format!("expected a number, got {value}"))
            }
        }
        FieldType::Boolean => {
            if value.is_boolean() {
                None
            } else {
                Some(format!("expected a boolean, got {value}"))
            }
        }
        FieldType::Date => match value.as_str() {
            Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => None,
            Some(s) => Some(format!("`{s}` is not a valid RFC3339 timestamp")),
            None => Some(format!("expected an RFC3339 timestamp string, got {value}")),
        },
        FieldType::Enum { allowed } => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => None,
            Some(s) => Some(format!("`{s}` is not one of {allowed:?}")),
            None => Some(format!("expected one of {allowed:?}, got {value}")),
        },
    }
}

/// Names of every catalogued field still missing from `metadata`, in
/// catalog order. Used by `schema::prompt` and the Conversation Agent.
#[must_use]
pub fn missing_fields(metadata: &FxHashMap<String, Value>) -> Vec<&'static str> {
    field_missing_by(metadata, |_| true)
}

/// Names of missing fields at or above `Required`.
#[must_use]
pub fn missing_required_fields(metadata: &FxHashMap<String, Value>) -> Vec<&'static str> {
    field_missing_by(metadata, |f| f.requirement_level == FieldRequirementLevel::Required)
}

fn field_missing_by(
    metadata: &FxHashMap<String, Value>,
    keep: impl Fn(&crate::schema::catalog::FieldDefinition) -> bool,
) -> Vec<&'static str> {
    SCHEMA_CATALOG
        .iter()
        .filter(|f| keep(f) && !metadata.contains_key(f.name))
        .map(|f| field(f.name).map(|d| d.name).unwrap_or(f.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_flagged() {
        let metadata = FxHashMap::default();
        let issues = validate_metadata(&metadata);
        assert!(issues.iter().any(|i| i.field == "identifier"));
    }

    #[test]
    fn type_mismatch_is_flagged() {
        let mut metadata = FxHashMap::default();
        metadata.insert("session_start_time".to_string(), json!("not-a-date"));
        let issues = validate_metadata(&metadata);
        assert!(issues.iter().any(|i| i.field == "session_start_time"));
    }

    #[test]
    fn well_formed_required_fields_produce_no_issue_for_that_field() {
        let mut metadata = FxHashMap::default();
        metadata.insert("identifier".to_string(), json!("mouse042_session03"));
        let issues = validate_metadata(&metadata);
        assert!(!issues.iter().any(|i| i.field == "identifier"));
    }

    #[test]
    fn experimenter_without_a_comma_is_flagged() {
        let mut metadata = FxHashMap::default();
        metadata.insert("experimenter".to_string(), json!("Jane Doe"));
        let issues = validate_metadata(&metadata);
        assert!(issues.iter().any(|i| i.field == "experimenter"));
    }

    #[test]
    fn experimenter_in_lastname_firstname_form_is_not_flagged() {
        let mut metadata = FxHashMap::default();
        metadata.insert("experimenter".to_string(), json!("Doe, Jane"));
        let issues = validate_metadata(&metadata);
        assert!(!issues.iter().any(|i| i.field == "experimenter"));
    }

    #[test]
    fn enum_field_rejects_unknown_variant() {
        let mut metadata = FxHashMap::default();
        metadata.insert("subject_sex".to_string(), json!("X"));
        let issues = validate_metadata(&metadata);
        assert!(issues.iter().any(|i| i.field == "subject_sex"));
    }
}
