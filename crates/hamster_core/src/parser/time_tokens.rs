//! Time token recognition shared by the fact parser and entry widgets.
//!
//! # Responsibility
//! - Recognize complete time tokens (`13:45`, `13.45`, `13,45`, `1345`).
//! - Recognize partial, still-being-typed time fragments.
//! - Provide the lenient `figure_time` helper for free time entry.
//!
//! # Invariants
//! - Hours are 0-23, minutes are two digits 00-59 for complete tokens.

use chrono::{NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<hour>[0-1]?[0-9]|2[0-3])[:,.]?(?P<minute>[0-5][0-9])$")
        .expect("valid time regex")
});

static DELTA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-[0-9]{1,3}$").expect("valid delta regex"));

// Shapes accepted while a time (or time range) is still being typed.
static TIME_FRAGMENT_RES: Lazy<[Regex; 5]> = Lazy::new(|| {
    [
        Regex::new(r"^-$").expect("valid fragment regex"),
        Regex::new(r"^([0-1]?[0-9]?|2?[0-3]?)$").expect("valid fragment regex"),
        Regex::new(r"^([0-1]?[0-9]|2[0-3]):?([0-5]?[0-9]?)$").expect("valid fragment regex"),
        Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])-?([0-1]?[0-9]?|2?[0-3]?)$")
            .expect("valid fragment regex"),
        Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])-([0-1]?[0-9]|2[0-3]):?([0-5]?[0-9]?)$")
            .expect("valid fragment regex"),
    ]
});

/// Parses one complete time token such as `01:32`, `13.56`, `14,10` or `0116`.
pub fn parse_time(token: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(token)?;
    let hour = caps.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = caps.name("minute")?.as_str().parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parses a relative `-N` token into signed minutes (`-15` -> `-15`).
pub fn parse_minutes_delta(token: &str) -> Option<i64> {
    if !DELTA_RE.is_match(token) {
        return None;
    }
    token.parse::<i64>().ok()
}

/// Returns whether `fragment` is a time or time range, possibly incomplete.
///
/// Matches partial input such as `-`, `13`, `13:4` or `13:45-1`.
/// An empty fragment never looks like a time.
pub fn looks_like_time(fragment: &str) -> bool {
    if fragment.is_empty() {
        return false;
    }
    TIME_FRAGMENT_RES.iter().any(|re| re.is_match(fragment))
}

/// Lenient time-of-day entry.
///
/// Every run of digits is a number: the first is hours, the second minutes.
/// A lone four-digit run is read as `HHMM`. Returns `now` moved to that time
/// of day (seconds cleared), or `None` when nothing usable was typed.
pub fn figure_time(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if input.trim().is_empty() {
        return None;
    }

    let numbers: Vec<&str> = input
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .collect();

    let (hours, minutes) = match numbers.as_slice() {
        [single] if single.len() == 4 => (
            single[..2].parse::<u32>().ok()?,
            single[2..].parse::<u32>().ok()?,
        ),
        [hours, minutes, ..] => (hours.parse::<u32>().ok()?, minutes.parse::<u32>().ok()?),
        _ => return None,
    };

    let time = NaiveTime::from_hms_opt(hours, minutes, 0)?;
    Some(now.date().and_time(time))
}
