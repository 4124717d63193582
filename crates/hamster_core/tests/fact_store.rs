use chrono::{NaiveDate, NaiveDateTime};
use hamster_core::db::open_db_in_memory;
use hamster_core::{
    Activity, ActivityId, Category, CategoryId, DayBoundary, Fact, FactBackend, FactError,
    FactFields, FactId, FactStore, FixedClock, RepoResult, SqliteFactBackend, StoreError,
    StoreEvent, Tag, TransactionOutcome,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn store_at(conn: &Connection, now: NaiveDateTime) -> FactStore<SqliteFactBackend<'_>> {
    let backend = SqliteFactBackend::try_new(conn).unwrap();
    FactStore::with_clock(backend, DayBoundary::midnight(), Arc::new(FixedClock::new(now)))
}

fn count_events<B: FactBackend>(store: &mut FactStore<B>, event: StoreEvent) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    store.subscribe(event, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

fn parse<B: FactBackend>(store: &FactStore<B>, line: &str) -> Fact {
    Fact::parse(line, &store.parser())
}

#[test]
fn add_fact_emits_exactly_one_notification() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);
    let tags_changed = count_events(&mut store, StoreEvent::TagsChanged);

    let fact = parse(&store, "09:00-10:00 coding@work #rust");
    let id = store.add_fact(&fact, false).unwrap().unwrap();

    assert_eq!(facts_changed.load(Ordering::SeqCst), 1);
    assert_eq!(tags_changed.load(Ordering::SeqCst), 0);
    assert_eq!(store.get_fact(id).unwrap().unwrap(), fact);
}

#[test]
fn invalid_fact_never_reaches_storage() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    let mut fact = parse(&store, "09:00 coding");
    fact.category = Some("a,b".to_string());
    let err = store.add_fact(&fact, false).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(FactError::ForbiddenCategorySeparator { .. })
    ));
    assert_eq!(facts_changed.load(Ordering::SeqCst), 0);
    assert!(store.get_todays_facts().unwrap().is_empty());
    assert!(store.get_categories().unwrap().is_empty());
}

#[test]
fn check_fact_reports_missing_start_first() {
    let conn = open_db_in_memory().unwrap();
    let store = store_at(&conn, at(15, 12, 0));
    assert_eq!(
        store.check_fact(&Fact::default(), None),
        Err(FactError::MissingStartTime)
    );
    assert_eq!(
        store.check_fact(&parse(&store, "09:00"), None),
        Err(FactError::MissingActivity)
    );
}

#[test]
fn remove_missing_fact_is_silent() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    assert!(!store.remove_fact(4242).unwrap());
    assert_eq!(facts_changed.load(Ordering::SeqCst), 0);

    let id = store
        .add_fact(&parse(&store, "09:00-10:00 coding"), false)
        .unwrap()
        .unwrap();
    assert!(store.remove_fact(id).unwrap());
    assert_eq!(facts_changed.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_fact(id).unwrap(), None);
}

#[test]
fn stop_tracking_closes_only_the_ongoing_fact_once() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 30));

    store.add_fact(&parse(&store, "10:00-11:00 a"), false).unwrap();
    store.add_fact(&parse(&store, "11:00 b"), false).unwrap();
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    assert!(store.stop_tracking(Some(at(15, 12, 0))).unwrap());
    assert_eq!(facts_changed.load(Ordering::SeqCst), 1);

    let today = store.get_todays_facts().unwrap();
    assert_eq!(today.len(), 2);
    assert_eq!(today[0].end_time, Some(at(15, 11, 0)));
    assert_eq!(today[1].end_time, Some(at(15, 12, 0)));

    assert!(!store.stop_tracking(None).unwrap());
    assert_eq!(facts_changed.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_tracking_defaults_to_now() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 30));
    store.add_fact(&parse(&store, "11:00 b"), false).unwrap();

    assert!(store.stop_tracking(None).unwrap());
    assert_eq!(store.get_todays_facts().unwrap()[0].end_time, Some(at(15, 12, 30)));
}

#[test]
fn stop_tracking_reads_and_closes_inside_one_transaction() {
    let conn = open_db_in_memory().unwrap();
    let backend = ObservedBackend::new(&conn);
    let calls = Arc::clone(&backend.calls);
    let mut store = FactStore::with_clock(
        backend,
        DayBoundary::midnight(),
        Arc::new(FixedClock::new(at(15, 12, 30))),
    );
    store.add_fact(&parse(&store, "11:00 b"), false).unwrap();
    calls.lock().unwrap().clear();

    assert!(store.stop_tracking(Some(at(15, 12, 0))).unwrap());

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls, ["begin", "get_facts", "touch_fact", "end"]);
}

#[test]
fn stop_tracking_without_ongoing_fact_still_ends_its_transaction() {
    let conn = open_db_in_memory().unwrap();
    let backend = ObservedBackend::new(&conn);
    let calls = Arc::clone(&backend.calls);
    let mut store = FactStore::with_clock(
        backend,
        DayBoundary::midnight(),
        Arc::new(FixedClock::new(at(15, 12, 30))),
    );
    store.add_fact(&parse(&store, "10:00-11:00 a"), false).unwrap();
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);
    calls.lock().unwrap().clear();

    assert!(!store.stop_tracking(None).unwrap());

    assert_eq!(facts_changed.load(Ordering::SeqCst), 0);
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls, ["begin", "get_facts", "end"]);
}

#[test]
fn update_fact_replaces_the_old_fact() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let id = store
        .add_fact(&parse(&store, "09:00-10:00 coding"), false)
        .unwrap()
        .unwrap();
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    let replacement = parse(&store, "09:00-10:30 coding, longer");
    let new_id = store.update_fact(id, &replacement, false).unwrap().unwrap();

    assert_eq!(facts_changed.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_fact(id).unwrap(), None);
    assert_eq!(store.get_fact(new_id).unwrap().unwrap(), replacement);
}

#[test]
fn update_of_missing_fact_fails_without_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    let err = store
        .update_fact(99, &parse(&store, "09:00-10:00 coding"), false)
        .unwrap_err();

    assert!(matches!(err, StoreError::Repo(_)));
    assert_eq!(facts_changed.load(Ordering::SeqCst), 0);
    assert!(store.get_todays_facts().unwrap().is_empty());
}

#[test]
fn declined_update_rolls_back_the_removal() {
    let conn = open_db_in_memory().unwrap();
    let backend = ObservedBackend::new(&conn);
    let decline = Arc::clone(&backend.decline);
    let mut store = FactStore::with_clock(
        backend,
        DayBoundary::midnight(),
        Arc::new(FixedClock::new(at(15, 12, 0))),
    );

    let original = parse(&store, "09:00-10:00 coding");
    let id = store.add_fact(&original, false).unwrap().unwrap();
    let facts_changed = count_events(&mut store, StoreEvent::FactsChanged);

    decline.store(true, Ordering::SeqCst);
    let replacement = parse(&store, "09:00-11:00 coding");
    assert_eq!(store.update_fact(id, &replacement, false).unwrap(), None);

    assert_eq!(facts_changed.load(Ordering::SeqCst), 0);
    assert_eq!(store.get_fact(id).unwrap().unwrap(), original);
}

#[test]
fn get_facts_spans_hamster_days() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    for line in [
        "13-03-2024 09:00-10:00 coding",
        "14-03-2024 09:00-10:00 coding",
        "15-03-2024 09:00-10:00 reading",
    ] {
        let fact = parse(&store, line);
        store.add_fact(&fact, false).unwrap();
    }

    let first = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
    let last = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    assert_eq!(store.get_facts(first, Some(last), "").unwrap().len(), 2);
    assert_eq!(store.get_facts(first, None, "").unwrap().len(), 1);
    assert_eq!(store.get_facts(first, Some(last), "reading").unwrap().len(), 1);
    assert_eq!(store.get_todays_facts().unwrap().len(), 1);
}

#[test]
fn category_and_activity_changes_notify() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let activities_changed = count_events(&mut store, StoreEvent::ActivitiesChanged);

    let work = store.add_category("work").unwrap();
    let coding = store.add_activity("coding", None).unwrap();
    store.update_activity(coding, "Coding", None).unwrap();
    assert_eq!(activities_changed.load(Ordering::SeqCst), 3);

    assert!(store.change_category(coding, Some(work)).unwrap());
    assert!(!store.change_category(coding, Some(work)).unwrap());
    assert_eq!(activities_changed.load(Ordering::SeqCst), 4);

    assert_eq!(store.get_category_id("WORK").unwrap(), Some(work));
    let found = store.get_activity_by_name("coding", Some(work), false).unwrap();
    assert_eq!(found.map(|activity| activity.id), Some(coding));
    assert_eq!(store.get_activity_by_name("  ", Some(work), false).unwrap(), None);

    store.remove_activity(coding).unwrap();
    store.remove_category(work).unwrap();
    assert_eq!(activities_changed.load(Ordering::SeqCst), 6);
    assert!(store.get_categories().unwrap().is_empty());
}

#[test]
fn tag_changes_notify_only_when_something_changed() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let tags_changed = count_events(&mut store, StoreEvent::TagsChanged);

    let names = vec!["rust".to_string(), "review".to_string()];
    assert_eq!(store.get_tag_ids(&names).unwrap().len(), 2);
    store.get_tag_ids(&names).unwrap();
    assert_eq!(tags_changed.load(Ordering::SeqCst), 1);

    assert!(store.update_autocomplete_tags(&names[..1]).unwrap());
    assert!(!store.update_autocomplete_tags(&names[..1]).unwrap());
    assert_eq!(tags_changed.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_tags(true).unwrap().len(), 1);
}

#[test]
fn dispatch_overwrite_emits_every_event_and_unsubscribe_stops_it() {
    let conn = open_db_in_memory().unwrap();
    let mut store = store_at(&conn, at(15, 12, 0));
    let facts = count_events(&mut store, StoreEvent::FactsChanged);
    let activities = count_events(&mut store, StoreEvent::ActivitiesChanged);
    let tags_hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&tags_hits);
    let subscription = store.subscribe(StoreEvent::TagsChanged, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.dispatch_overwrite();
    assert!(store.unsubscribe(subscription));
    store.dispatch_overwrite();

    assert_eq!(facts.load(Ordering::SeqCst), 2);
    assert_eq!(activities.load(Ordering::SeqCst), 2);
    assert_eq!(tags_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn copy_via_store_parser_keeps_the_day() {
    let conn = open_db_in_memory().unwrap();
    let store = store_at(&conn, at(15, 12, 0));
    let fact = parse(&store, "09:00-10:00 coding");
    let copy = fact.copy(FactFields::default(), &store.parser());
    assert_eq!(copy, fact);
    assert_eq!(fact.date(store.day_boundary()), Some(store.today()));
}

/// Delegates to SQLite, logs the transaction and fact calls it sees and can
/// be told to decline every insert.
struct ObservedBackend<'conn> {
    inner: SqliteFactBackend<'conn>,
    decline: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl<'conn> ObservedBackend<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteFactBackend::try_new(conn).unwrap(),
            decline: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FactBackend for ObservedBackend<'_> {
    fn start_transaction(&mut self) -> RepoResult<()> {
        self.record("begin");
        self.inner.start_transaction()
    }

    fn end_transaction(&mut self, outcome: TransactionOutcome) -> RepoResult<()> {
        self.record("end");
        self.inner.end_transaction(outcome)
    }

    fn add_fact(&mut self, fact: &Fact, temporary: bool) -> RepoResult<Option<FactId>> {
        self.record("add_fact");
        if self.decline.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.add_fact(fact, temporary)
    }

    fn get_fact(&self, id: FactId) -> RepoResult<Option<Fact>> {
        self.record("get_fact");
        self.inner.get_fact(id)
    }

    fn remove_fact(&mut self, id: FactId) -> RepoResult<()> {
        self.record("remove_fact");
        self.inner.remove_fact(id)
    }

    fn touch_fact(&mut self, id: FactId, end_time: NaiveDateTime) -> RepoResult<()> {
        self.record("touch_fact");
        self.inner.touch_fact(id, end_time)
    }

    fn get_facts(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        search_terms: &str,
    ) -> RepoResult<Vec<Fact>> {
        self.record("get_facts");
        self.inner.get_facts(from, to, search_terms)
    }

    fn add_category(&mut self, name: &str) -> RepoResult<CategoryId> {
        self.inner.add_category(name)
    }

    fn get_category_id(&self, name: &str) -> RepoResult<Option<CategoryId>> {
        self.inner.get_category_id(name)
    }

    fn update_category(&mut self, id: CategoryId, name: &str) -> RepoResult<()> {
        self.inner.update_category(id, name)
    }

    fn remove_category(&mut self, id: CategoryId) -> RepoResult<()> {
        self.inner.remove_category(id)
    }

    fn get_categories(&self) -> RepoResult<Vec<Category>> {
        self.inner.get_categories()
    }

    fn add_activity(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<ActivityId> {
        self.inner.add_activity(name, category_id)
    }

    fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<()> {
        self.inner.update_activity(id, name, category_id)
    }

    fn remove_activity(&mut self, id: ActivityId) -> RepoResult<()> {
        self.inner.remove_activity(id)
    }

    fn get_category_activities(
        &self,
        category_id: Option<CategoryId>,
    ) -> RepoResult<Vec<Activity>> {
        self.inner.get_category_activities(category_id)
    }

    fn get_activities(&self, search: &str) -> RepoResult<Vec<Activity>> {
        self.inner.get_activities(search)
    }

    fn change_category(
        &mut self,
        id: ActivityId,
        category_id: Option<CategoryId>,
    ) -> RepoResult<bool> {
        self.inner.change_category(id, category_id)
    }

    fn get_activity_by_name(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
        resurrect: bool,
    ) -> RepoResult<Option<Activity>> {
        self.inner.get_activity_by_name(name, category_id, resurrect)
    }

    fn get_tags(&self, only_autocomplete: bool) -> RepoResult<Vec<Tag>> {
        self.inner.get_tags(only_autocomplete)
    }

    fn get_tag_ids(&mut self, names: &[String]) -> RepoResult<(Vec<Tag>, bool)> {
        self.inner.get_tag_ids(names)
    }

    fn update_autocomplete_tags(&mut self, names: &[String]) -> RepoResult<bool> {
        self.inner.update_autocomplete_tags(names)
    }
}
