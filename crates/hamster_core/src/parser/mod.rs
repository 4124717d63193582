//! Free-form fact grammar.
//!
//! # Responsibility
//! - Parse single-line fact entries into structured fields.
//! - Expose time token helpers reused by entry validation.
//!
//! # Invariants
//! - Parsers are pure: no I/O, no shared mutable state.

pub mod fact_parser;
pub mod time_tokens;
