//! Persistence contract and implementations.
//!
//! # Responsibility
//! - Define the backend capability the fact store depends on.
//! - Keep SQL details out of validation and notification logic.
//!
//! # Invariants
//! - Backends return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod fact_backend;
pub mod sqlite_backend;
