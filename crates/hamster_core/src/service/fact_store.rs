//! Fact store use-case service.
//!
//! # Responsibility
//! - Validate facts before any persistence call.
//! - Wrap every mutation in exactly one backend transaction.
//! - Announce successful changes to subscribers.
//!
//! # Invariants
//! - A fact rejected by `check_fact` never reaches the backend.
//! - Notifications are emitted only after the transaction ended successfully.
//! - `update_fact` is all-or-nothing: a failed insert rolls the removal back.
//! - Transactions are never nested.

use crate::model::fact::{Fact, FactError, FactId};
use crate::model::hamster_day::DayBoundary;
use crate::parser::fact_parser::FactParser;
use crate::repo::fact_backend::{
    Activity, ActivityId, Category, CategoryId, FactBackend, RepoError, RepoResult, Tag,
    TransactionOutcome,
};
use crate::service::clock::{Clock, SystemClock};
use crate::service::notify::{ChangeNotifier, StoreEvent, SubscriptionId};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Fact store failure: a refused fact or a backend error.
#[derive(Debug)]
pub enum StoreError {
    Validation(FactError),
    Repo(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<FactError> for StoreError {
    fn from(value: FactError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Validation, transactions and notifications over a `FactBackend`.
pub struct FactStore<B: FactBackend> {
    backend: B,
    boundary: DayBoundary,
    clock: Arc<dyn Clock>,
    notifier: ChangeNotifier,
}

impl<B: FactBackend> FactStore<B> {
    /// Creates a store reading "now" from the system clock.
    pub fn new(backend: B, boundary: DayBoundary) -> Self {
        Self::with_clock(backend, boundary, Arc::new(SystemClock))
    }

    /// Creates a store reading "now" from `clock`.
    pub fn with_clock(backend: B, boundary: DayBoundary, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            boundary,
            clock,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Read access to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Day boundary used for parsing and day ranges.
    pub fn day_boundary(&self) -> DayBoundary {
        self.boundary
    }

    /// Parser bound to this store's day boundary and the current time.
    pub fn parser(&self) -> FactParser {
        FactParser::new(self.boundary, self.clock.now())
    }

    /// Current hamster day.
    pub fn today(&self) -> NaiveDate {
        self.boundary.day_of(self.clock.now())
    }

    /// Registers `callback` for `event`.
    pub fn subscribe(
        &mut self,
        event: StoreEvent,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.notifier.subscribe(event, callback)
    }

    /// Drops a subscription; returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Emits every change notification, for callers that replaced the data
    /// behind the store's back.
    pub fn dispatch_overwrite(&self) {
        self.notifier.emit(StoreEvent::TagsChanged);
        self.notifier.emit(StoreEvent::FactsChanged);
        self.notifier.emit(StoreEvent::ActivitiesChanged);
    }

    /// Checks that `fact` may be committed.
    ///
    /// `default_day` is the hamster day the caller displays; see
    /// `Fact::validate`.
    pub fn check_fact(&self, fact: &Fact, default_day: Option<NaiveDate>) -> Result<(), FactError> {
        fact.validate(self.boundary, default_day).inspect_err(|err| {
            debug!(
                "event=fact_check module=service status=rejected reason={}",
                rejection_code(err)
            );
        })
    }

    /// Validates and persists a new fact.
    ///
    /// Returns the new id, or `None` when the backend declined the fact.
    pub fn add_fact(&mut self, fact: &Fact, temporary: bool) -> StoreResult<Option<FactId>> {
        self.check_fact(fact, None)?;

        let fact_id = self.in_transaction(|backend| {
            let fact_id = backend.add_fact(fact, temporary)?;
            Ok((fact_id, TransactionOutcome::Commit))
        })?;

        match fact_id {
            Some(id) => {
                info!("event=fact_add module=service status=ok fact_id={id} temporary={temporary}");
                self.notifier.emit(StoreEvent::FactsChanged);
            }
            None => warn!("event=fact_add module=service status=declined temporary={temporary}"),
        }
        Ok(fact_id)
    }

    /// Stored fact `id`, if any.
    pub fn get_fact(&self, id: FactId) -> StoreResult<Option<Fact>> {
        Ok(self.backend.get_fact(id)?)
    }

    /// Replaces fact `id` with `fact`.
    ///
    /// Removal and insertion share one transaction; when the insertion is
    /// declined or fails, the removal is rolled back and the old fact stays.
    pub fn update_fact(
        &mut self,
        id: FactId,
        fact: &Fact,
        temporary: bool,
    ) -> StoreResult<Option<FactId>> {
        self.check_fact(fact, None)?;

        let outcome = self.in_transaction(|backend| {
            backend.remove_fact(id)?;
            match backend.add_fact(fact, temporary)? {
                Some(new_id) => Ok((Some(new_id), TransactionOutcome::Commit)),
                None => Ok((None, TransactionOutcome::Rollback)),
            }
        });

        match outcome {
            Ok(Some(new_id)) => {
                info!("event=fact_update module=service status=ok fact_id={id} new_fact_id={new_id}");
                self.notifier.emit(StoreEvent::FactsChanged);
                Ok(Some(new_id))
            }
            Ok(None) => {
                warn!("event=fact_update module=service status=error fact_id={id} error_code=insert_declined");
                Ok(None)
            }
            Err(err) => {
                warn!("event=fact_update module=service status=error fact_id={id} error={err}");
                Err(err.into())
            }
        }
    }

    /// Removes fact `id`. Returns `false` (and stays silent) when it does
    /// not exist.
    pub fn remove_fact(&mut self, id: FactId) -> StoreResult<bool> {
        let removed = self.in_transaction(|backend| {
            if backend.get_fact(id)?.is_none() {
                return Ok((false, TransactionOutcome::Commit));
            }
            backend.remove_fact(id)?;
            Ok((true, TransactionOutcome::Commit))
        })?;

        if removed {
            info!("event=fact_remove module=service status=ok fact_id={id}");
            self.notifier.emit(StoreEvent::FactsChanged);
        }
        Ok(removed)
    }

    /// Closes today's ongoing fact at `end_time` (default: now).
    ///
    /// Finding the last fact and closing it share one transaction. Returns
    /// whether a fact was closed.
    pub fn stop_tracking(&mut self, end_time: Option<NaiveDateTime>) -> StoreResult<bool> {
        let (from, to) = self.boundary.day_bounds(self.today());
        let end_time = end_time.unwrap_or_else(|| self.clock.now());

        let stopped = self.in_transaction(|backend| {
            let facts = backend.get_facts(from, to, "")?;
            let Some(last) = facts.last().filter(|fact| fact.end_time.is_none()) else {
                return Ok((None, TransactionOutcome::Commit));
            };
            let Some(fact_id) = last.id else {
                return Err(RepoError::InvalidData("stored fact without id".to_string()));
            };
            backend.touch_fact(fact_id, end_time)?;
            Ok((Some(fact_id), TransactionOutcome::Commit))
        })?;

        let Some(fact_id) = stopped else {
            return Ok(false);
        };
        info!("event=fact_stop module=service status=ok fact_id={fact_id}");
        self.notifier.emit(StoreEvent::FactsChanged);
        Ok(true)
    }

    /// Facts of hamster days `first_day..=last_day` (default: just
    /// `first_day`), filtered by free-text `search_terms`.
    pub fn get_facts(
        &self,
        first_day: NaiveDate,
        last_day: Option<NaiveDate>,
        search_terms: &str,
    ) -> StoreResult<Vec<Fact>> {
        let (from, to) = self
            .boundary
            .range_bounds(first_day, last_day.unwrap_or(first_day));
        Ok(self.backend.get_facts(from, to, search_terms)?)
    }

    /// Facts of the current hamster day, ordered by start time.
    pub fn get_todays_facts(&self) -> StoreResult<Vec<Fact>> {
        self.get_facts(self.today(), None, "")
    }

    /// Creates a category, or returns the id of the existing one.
    pub fn add_category(&mut self, name: &str) -> StoreResult<CategoryId> {
        let id = self.in_transaction(|backend| {
            Ok((backend.add_category(name)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(id)
    }

    /// Id of the category named `name`, matched case-insensitively.
    pub fn get_category_id(&self, name: &str) -> StoreResult<Option<CategoryId>> {
        Ok(self.backend.get_category_id(name)?)
    }

    /// Renames category `id`.
    pub fn update_category(&mut self, id: CategoryId, name: &str) -> StoreResult<()> {
        self.in_transaction(|backend| {
            Ok((backend.update_category(id, name)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(())
    }

    /// Removes category `id`; its activities become uncategorized.
    pub fn remove_category(&mut self, id: CategoryId) -> StoreResult<()> {
        self.in_transaction(|backend| {
            Ok((backend.remove_category(id)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(())
    }

    /// Every category, ordered by name.
    pub fn get_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.backend.get_categories()?)
    }

    /// Creates an activity in `category_id`.
    pub fn add_activity(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> StoreResult<ActivityId> {
        let id = self.in_transaction(|backend| {
            Ok((backend.add_activity(name, category_id)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(id)
    }

    /// Renames activity `id` and moves it to `category_id`.
    pub fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> StoreResult<()> {
        self.in_transaction(|backend| {
            Ok((backend.update_activity(id, name, category_id)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(())
    }

    /// Removes activity `id`, soft-deleting it while facts refer to it.
    pub fn remove_activity(&mut self, id: ActivityId) -> StoreResult<()> {
        self.in_transaction(|backend| {
            Ok((backend.remove_activity(id)?, TransactionOutcome::Commit))
        })?;
        self.notifier.emit(StoreEvent::ActivitiesChanged);
        Ok(())
    }

    /// Live activities of `category_id` (`None`: uncategorized).
    pub fn get_category_activities(
        &self,
        category_id: Option<CategoryId>,
    ) -> StoreResult<Vec<Activity>> {
        Ok(self.backend.get_category_activities(category_id)?)
    }

    /// Live activities whose name matches `search`.
    pub fn get_activities(&self, search: &str) -> StoreResult<Vec<Activity>> {
        Ok(self.backend.get_activities(search)?)
    }

    /// Moves an activity to another category; notifies only on change.
    pub fn change_category(
        &mut self,
        id: ActivityId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<bool> {
        let changed = self.in_transaction(|backend| {
            Ok((backend.change_category(id, category_id)?, TransactionOutcome::Commit))
        })?;
        if changed {
            self.notifier.emit(StoreEvent::ActivitiesChanged);
        }
        Ok(changed)
    }

    /// Looks an activity up by name; an empty name finds nothing.
    pub fn get_activity_by_name(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
        resurrect: bool,
    ) -> StoreResult<Option<Activity>> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        Ok(self
            .backend
            .get_activity_by_name(name, category_id, resurrect)?)
    }

    /// Every tag, or only the autocomplete ones.
    pub fn get_tags(&self, only_autocomplete: bool) -> StoreResult<Vec<Tag>> {
        Ok(self.backend.get_tags(only_autocomplete)?)
    }

    /// Resolves tag names to tags, creating missing ones; notifies only when
    /// a tag was created.
    pub fn get_tag_ids(&mut self, names: &[String]) -> StoreResult<Vec<Tag>> {
        let (tags, created) = self.in_transaction(|backend| {
            Ok((backend.get_tag_ids(names)?, TransactionOutcome::Commit))
        })?;
        if created {
            self.notifier.emit(StoreEvent::TagsChanged);
        }
        Ok(tags)
    }

    /// Sets the autocomplete tag list; notifies only on change.
    pub fn update_autocomplete_tags(&mut self, names: &[String]) -> StoreResult<bool> {
        let changed = self.in_transaction(|backend| {
            Ok((backend.update_autocomplete_tags(names)?, TransactionOutcome::Commit))
        })?;
        if changed {
            self.notifier.emit(StoreEvent::TagsChanged);
        }
        Ok(changed)
    }

    /// Runs `op` between `start_transaction` and `end_transaction`.
    ///
    /// The transaction always ends: with `op`'s outcome on success, rolled
    /// back when `op` fails.
    fn in_transaction<T>(
        &mut self,
        op: impl FnOnce(&mut B) -> RepoResult<(T, TransactionOutcome)>,
    ) -> RepoResult<T> {
        self.backend.start_transaction()?;
        match op(&mut self.backend) {
            Ok((value, outcome)) => {
                self.backend.end_transaction(outcome)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(end_err) = self.backend.end_transaction(TransactionOutcome::Rollback) {
                    warn!(
                        "event=store_transaction module=service status=error error_code=rollback_failed error={end_err}"
                    );
                }
                Err(err)
            }
        }
    }
}

fn rejection_code(err: &FactError) -> &'static str {
    match err {
        FactError::MissingStartTime => "missing_start_time",
        FactError::MissingActivity => "missing_activity",
        FactError::ForbiddenCategorySeparator { .. } => "forbidden_category_separator",
        FactError::NegativeDuration { .. } => "negative_duration",
    }
}
