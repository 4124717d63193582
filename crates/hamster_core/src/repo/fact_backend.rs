//! Persistence backend contract for the fact store.
//!
//! # Responsibility
//! - Define the primitive CRUD operations a physical storage engine offers
//!   for facts, categories, activities and tags.
//! - Define the transaction demarcation hooks the store drives.
//!
//! # Invariants
//! - Backends never validate domain rules; the store validates first.
//! - Every call reports success or failure so the store can decide whether
//!   to emit change notifications.
//! - Transactions do not nest.

use crate::db::DbError;
use crate::model::fact::{Fact, FactId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CategoryId = i64;
pub type ActivityId = i64;
pub type TagId = i64;

pub type RepoResult<T> = Result<T, RepoError>;

/// Backend-level failure.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: i64 },
    InvalidData(String),
    /// The connection was not migrated to the schema this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// `start_transaction` was called while a transaction was open.
    TransactionActive,
    /// `end_transaction` was called without an open transaction.
    NoActiveTransaction,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::TransactionActive => write!(f, "a transaction is already open"),
            Self::NoActiveTransaction => write!(f, "no transaction is open"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub category: Option<String>,
    /// Hidden from suggestions; kept because facts still reference it.
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Offered by tag autocompletion.
    pub autocomplete: bool,
}

/// Primitive storage operations under the fact store.
pub trait FactBackend {
    fn start_transaction(&mut self) -> RepoResult<()>;
    fn end_transaction(&mut self, outcome: TransactionOutcome) -> RepoResult<()>;

    /// Persists a fact. `Ok(None)` means the backend declined to store it.
    fn add_fact(&mut self, fact: &Fact, temporary: bool) -> RepoResult<Option<FactId>>;
    fn get_fact(&self, id: FactId) -> RepoResult<Option<Fact>>;
    fn remove_fact(&mut self, id: FactId) -> RepoResult<()>;
    /// Closes a fact at `end_time`.
    fn touch_fact(&mut self, id: FactId, end_time: NaiveDateTime) -> RepoResult<()>;
    /// Facts starting in `[from, to)`, ordered by start time. Every
    /// whitespace-separated search term must match.
    fn get_facts(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        search_terms: &str,
    ) -> RepoResult<Vec<Fact>>;

    fn add_category(&mut self, name: &str) -> RepoResult<CategoryId>;
    fn get_category_id(&self, name: &str) -> RepoResult<Option<CategoryId>>;
    fn update_category(&mut self, id: CategoryId, name: &str) -> RepoResult<()>;
    fn remove_category(&mut self, id: CategoryId) -> RepoResult<()>;
    fn get_categories(&self) -> RepoResult<Vec<Category>>;

    fn add_activity(&mut self, name: &str, category_id: Option<CategoryId>)
        -> RepoResult<ActivityId>;
    fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<()>;
    fn remove_activity(&mut self, id: ActivityId) -> RepoResult<()>;
    /// Activities of one category; `None` lists uncategorized ones.
    fn get_category_activities(&self, category_id: Option<CategoryId>)
        -> RepoResult<Vec<Activity>>;
    /// Non-deleted activities whose name contains `search`.
    fn get_activities(&self, search: &str) -> RepoResult<Vec<Activity>>;
    /// Moves an activity to another category. Returns whether it moved.
    fn change_category(&mut self, id: ActivityId, category_id: Option<CategoryId>)
        -> RepoResult<bool>;
    /// Looks an activity up by name within a category; with `resurrect`, a
    /// deleted match is restored.
    fn get_activity_by_name(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
        resurrect: bool,
    ) -> RepoResult<Option<Activity>>;

    fn get_tags(&self, only_autocomplete: bool) -> RepoResult<Vec<Tag>>;
    /// Resolves tag names, creating the missing ones. The flag reports
    /// whether any tag was created.
    fn get_tag_ids(&mut self, names: &[String]) -> RepoResult<(Vec<Tag>, bool)>;
    /// Makes exactly `names` autocomplete tags. Returns whether anything
    /// changed.
    fn update_autocomplete_tags(&mut self, names: &[String]) -> RepoResult<bool>;
}
