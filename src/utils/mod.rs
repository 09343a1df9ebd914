//! Generic helpers shared across the schema, state, and agent modules.

pub mod json_ext;
