//! Core domain logic for the hamster time tracker.
//! Owns the fact grammar, the fact record and the fact store contract.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod service;

pub use config::{ConfigError, TrackingSettings};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::fact::{Fact, FactError, FactFields, FactId};
pub use model::hamster_day::DayBoundary;
pub use parser::fact_parser::{FactParser, ParsePhase, ParsedFact};
pub use repo::fact_backend::{
    Activity, ActivityId, Category, CategoryId, FactBackend, RepoError, RepoResult, Tag, TagId,
    TransactionOutcome,
};
pub use repo::sqlite_backend::SqliteFactBackend;
pub use service::clock::{Clock, FixedClock, SystemClock};
pub use service::fact_store::{FactStore, StoreError, StoreResult};
pub use service::notify::{StoreEvent, SubscriptionId};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
