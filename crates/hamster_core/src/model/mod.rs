//! Time tracking domain model.
//!
//! # Responsibility
//! - Define the `Fact` record and its canonical text form.
//! - Define hamster day arithmetic shared by parser, model and store.
//!
//! # Invariants
//! - A committed fact has a start time and a non-empty activity.
//! - Fact identity (`id`) never takes part in equality.

pub mod fact;
pub mod hamster_day;
