//! Structured error ladder for session diagnostics (see [`errors::ErrorEvent`]).

pub mod errors;
