//! Core use-case services.
//!
//! # Responsibility
//! - Validate, persist and announce fact/activity/tag changes.
//! - Keep callers decoupled from storage details.

pub mod clock;
pub mod fact_store;
pub mod notify;
