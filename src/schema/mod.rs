//! The declarative NWB/DANDI schema catalog: field registry, prompt
//! generation, validation, and normalization.

pub mod catalog;
pub mod normalize;
pub mod prompt;
pub mod validate;

pub use catalog::{field, field_summary, required_fields, FieldDefinition, FieldSummary, SCHEMA_CATALOG};
pub use normalize::normalize_field;
pub use prompt::generate_llm_extraction_prompt;
pub use validate::{missing_fields, missing_required_fields, validate_metadata, ValidationIssue};
