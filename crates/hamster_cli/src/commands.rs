//! Subcommand bodies.
//!
//! Every command returns a printable error message; `main` owns the exit
//! code.

use chrono::{NaiveDate, TimeDelta};
use hamster_core::db::open_db;
use hamster_core::parser::time_tokens::figure_time;
use hamster_core::{
    Clock, Fact, FactParser, FactStore, SqliteFactBackend, StoreError, SystemClock,
    TrackingSettings,
};
use std::path::Path;

pub fn parse(settings: &TrackingSettings, line: &str, json_output: bool) -> Result<(), String> {
    let boundary = settings.day_boundary();
    let parser = FactParser::new(boundary, SystemClock.now());
    let fact = Fact::parse(line, &parser);

    if json_output {
        let payload = serde_json::to_string_pretty(&fact).map_err(|err| err.to_string())?;
        println!("{payload}");
        return Ok(());
    }

    println!("{}", fact.serialized(boundary));
    print_field("Activity", fact.activity.as_deref());
    print_field("Category", fact.category.as_deref());
    print_field("Description", fact.description.as_deref());
    if !fact.tags.is_empty() {
        println!("  Tags: {}", fact.tags.join(", "));
    }
    if let Some(start) = fact.start_time {
        println!("  Start: {start}");
    }
    if let Some(end) = fact.end_time {
        println!("  End: {end}");
    }
    let today = boundary.day_of(parser.now());
    if let Err(err) = fact.validate(boundary, Some(today)) {
        println!("  Not storable: {err}");
    }
    Ok(())
}

pub fn add(
    db: &Path,
    settings: &TrackingSettings,
    line: &str,
    temporary: bool,
) -> Result<(), String> {
    with_store(db, settings, |store| {
        let fact = Fact::parse(line, &store.parser());
        match store.add_fact(&fact, temporary)? {
            Some(id) => println!("Added #{id}: {}", fact.serialized(store.day_boundary())),
            None => println!("Nothing stored"),
        }
        Ok(())
    })
}

pub fn stop(db: &Path, settings: &TrackingSettings, at: Option<&str>) -> Result<(), String> {
    let end_time = at
        .map(|text| {
            figure_time(text, SystemClock.now()).ok_or_else(|| format!("cannot read time `{text}`"))
        })
        .transpose()?;

    let stopped = with_store(db, settings, |store| store.stop_tracking(end_time))?;
    if stopped {
        println!("Stopped");
    } else {
        println!("No ongoing activity");
    }
    Ok(())
}

pub fn today(
    db: &Path,
    settings: &TrackingSettings,
    search: &str,
    json_output: bool,
) -> Result<(), String> {
    let (day, facts) = with_store(db, settings, |store| {
        let day = store.today();
        Ok((day, store.get_facts(day, None, search)?))
    })?;

    if json_output {
        let payload = serde_json::to_string_pretty(&facts).map_err(|err| err.to_string())?;
        println!("{payload}");
        return Ok(());
    }

    print_day(day, &facts);
    Ok(())
}

pub fn remove(db: &Path, settings: &TrackingSettings, id: i64) -> Result<(), String> {
    if with_store(db, settings, |store| store.remove_fact(id))? {
        println!("Removed #{id}");
        Ok(())
    } else {
        Err(format!("no fact #{id}"))
    }
}

fn with_store<T>(
    db: &Path,
    settings: &TrackingSettings,
    op: impl FnOnce(&mut FactStore<SqliteFactBackend<'_>>) -> Result<T, StoreError>,
) -> Result<T, String> {
    let conn = open_db(db).map_err(|err| format!("cannot open `{}`: {err}", db.display()))?;
    let backend = SqliteFactBackend::try_new(&conn).map_err(|err| err.to_string())?;
    let mut store = FactStore::new(backend, settings.day_boundary());
    op(&mut store).map_err(|err| err.to_string())
}

fn print_day(day: NaiveDate, facts: &[Fact]) {
    println!("{}", day.format("%A %d %B %Y"));
    if facts.is_empty() {
        println!("  (no facts)");
        return;
    }

    let now = SystemClock.now();
    let mut total = TimeDelta::zero();
    for fact in facts {
        let id = fact.id.map(|id| id.to_string()).unwrap_or_default();
        let span = match (fact.start_time, fact.end_time) {
            (Some(start), Some(end)) => {
                format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
            }
            (Some(start), None) => format!("{}-     ", start.format("%H:%M")),
            _ => String::new(),
        };
        let delta = fact.delta(now).unwrap_or_else(TimeDelta::zero);
        total += delta;
        println!(
            "  #{id:<5} {span}  {:>8}  {}",
            format_duration(delta),
            fact.serialized_name()
        );
    }
    println!("  Total: {}", format_duration(total));
}

fn format_duration(delta: TimeDelta) -> String {
    let minutes = delta.num_minutes().max(0);
    match (minutes / 60, minutes % 60) {
        (0, minutes) => format!("{minutes}min"),
        (hours, 0) => format!("{hours}h"),
        (hours, minutes) => format!("{hours}h {minutes}min"),
    }
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {label}: {value}");
    }
}
