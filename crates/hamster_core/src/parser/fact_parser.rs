//! Free-form fact line parser.
//!
//! # Responsibility
//! - Turn `[DD-MM-YYYY] start[-end] activity[@category][, description] #tags`
//!   into structured fields.
//! - Let the user omit any prefix of the grammar without failing.
//!
//! # Invariants
//! - Parsing never fails: malformed input leaves fields unset.
//! - Phases run in the fixed order of `ParsePhase`; a phase that does not
//!   match consumes nothing and hands the text to a later phase.
//! - Tags keep their input order.

use crate::model::hamster_day::DayBoundary;
use crate::parser::time_tokens::{looks_like_time, parse_minutes_delta, parse_time};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;

/// `strftime` format of the day token (`31-12-2024`).
pub const DAY_FORMAT: &str = "%d-%m-%Y";
/// `strftime` format of time tokens in canonical output.
pub const TIME_FORMAT: &str = "%H:%M";

// One trailing `#tag`, with the separators around it.
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s,]*#([^#\s]+)[\s#,]*$").expect("valid tag regex"));

/// Grammar phases in parse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParsePhase {
    Date,
    StartTime,
    EndTime,
    Tags,
    Activity,
    Category,
}

impl ParsePhase {
    fn next(self) -> Self {
        match self {
            Self::Date => Self::StartTime,
            Self::StartTime => Self::EndTime,
            Self::EndTime => Self::Tags,
            Self::Tags => Self::Activity,
            Self::Activity | Self::Category => Self::Category,
        }
    }
}

/// Fields collected by the parser. Unset fields were not found in the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFact {
    pub activity: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    /// `Some` once the tags phase ran, even when no tag was found.
    pub tags: Option<Vec<String>>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// Fact line parser bound to a day boundary and a fixed "now".
///
/// "Now" is captured at construction so a parse is deterministic; relative
/// `-N` tokens and the default day are both derived from it.
#[derive(Debug, Clone, Copy)]
pub struct FactParser {
    boundary: DayBoundary,
    now: NaiveDateTime,
}

impl FactParser {
    pub fn new(boundary: DayBoundary, now: NaiveDateTime) -> Self {
        Self { boundary, now }
    }

    pub fn boundary(&self) -> DayBoundary {
        self.boundary
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Parses a whole fact line, starting with the date phase.
    pub fn parse(&self, text: &str) -> ParsedFact {
        self.parse_from(text, ParsePhase::Date, ParsedFact::default(), None)
    }

    /// Parses `text` starting at `start_phase`, extending `partial`.
    ///
    /// `reference_date` is the hamster day used by time tokens when the date
    /// phase is skipped; it defaults to the hamster day of "now".
    pub fn parse_from(
        &self,
        text: &str,
        start_phase: ParsePhase,
        partial: ParsedFact,
        reference_date: Option<NaiveDate>,
    ) -> ParsedFact {
        let mut result = partial;
        let mut phase = start_phase;
        let mut day = reference_date;
        let mut remaining = text;

        loop {
            let text = remaining.trim();
            if text.is_empty() {
                return result;
            }
            let fragment = leading_fragment(text);

            match phase {
                ParsePhase::Date => {
                    match NaiveDate::parse_from_str(fragment, DAY_FORMAT) {
                        Ok(parsed) => {
                            day = Some(parsed);
                            remaining = &text[fragment.len()..];
                        }
                        Err(_) => {
                            day = Some(self.today());
                            remaining = text;
                        }
                    }
                    phase = ParsePhase::StartTime;
                }
                ParsePhase::StartTime | ParsePhase::EndTime => {
                    let reference = *day.get_or_insert_with(|| self.today());
                    match self.take_time(text, fragment, phase, reference, &mut result) {
                        Some((next_phase, consumed)) => {
                            remaining = &text[consumed..];
                            phase = next_phase;
                        }
                        None => {
                            remaining = text;
                            phase = ParsePhase::Tags;
                        }
                    }
                }
                ParsePhase::Tags => {
                    // Scan from the end: descriptions may hold `#` themselves.
                    let mut tags = Vec::new();
                    let mut rest = text;
                    while let Some(caps) = TAG_RE.captures(rest) {
                        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
                            break;
                        };
                        tags.push(tag.as_str().to_string());
                        rest = &rest[..whole.start()];
                    }
                    tags.reverse();
                    result.tags = Some(tags);
                    remaining = rest;
                    phase = ParsePhase::Activity;
                }
                ParsePhase::Activity => {
                    let end = text
                        .find(|c: char| matches!(c, '@' | '#' | ','))
                        .unwrap_or(text.len());
                    let candidate = &text[..end];
                    if looks_like_time(candidate) {
                        // A time fragment nobody consumed is not an activity.
                        return result;
                    }
                    result.activity = non_empty(candidate);
                    remaining = &text[end..];
                    phase = ParsePhase::Category;
                }
                ParsePhase::Category => {
                    let (category, description) = text.split_once(',').unwrap_or((text, ""));
                    result.category = non_empty(category.trim_start_matches('@'));
                    result.description = non_empty(description);
                    return result;
                }
            }
        }
    }

    /// Tries the time sub-patterns on the leading token, in priority order.
    ///
    /// Returns the next phase and the number of bytes of `text` consumed.
    fn take_time(
        &self,
        text: &str,
        fragment: &str,
        phase: ParsePhase,
        day: NaiveDate,
        result: &mut ParsedFact,
    ) -> Option<(ParsePhase, usize)> {
        if phase == ParsePhase::EndTime {
            if let Some((end_time, consumed)) = self.take_dated_end(text, fragment) {
                result.end_time = Some(end_time);
                return Some((phase.next(), consumed));
            }
        }

        if let Some(minutes) = parse_minutes_delta(fragment) {
            set_time(result, phase, self.now + TimeDelta::minutes(minutes));
            return Some((phase.next(), fragment.len()));
        }

        if let Some(time) = parse_time(fragment) {
            set_time(result, phase, self.boundary.combine(day, time));
            return Some((phase.next(), fragment.len()));
        }

        let (start, end) = fragment.split_once('-')?;
        let (start, end) = (parse_time(start)?, parse_time(end)?);
        result.start_time = Some(self.boundary.combine(day, start));
        result.end_time = Some(self.boundary.combine(day, end));
        Some((ParsePhase::Tags, fragment.len()))
    }

    /// `DD-MM-YYYY HH:MM` in end position: an end on another hamster day.
    fn take_dated_end(&self, text: &str, fragment: &str) -> Option<(NaiveDateTime, usize)> {
        let end_day = NaiveDate::parse_from_str(fragment, DAY_FORMAT).ok()?;
        let after_day = &text[fragment.len()..];
        let time_text = after_day.trim_start();
        let time_token = leading_fragment(time_text);
        let time = parse_time(time_token)?;
        let consumed = text.len() - time_text.len() + time_token.len();
        Some((self.boundary.combine(end_day, time), consumed))
    }

    fn today(&self) -> NaiveDate {
        self.boundary.day_of(self.now)
    }
}

fn set_time(result: &mut ParsedFact, phase: ParsePhase, value: NaiveDateTime) {
    if phase == ParsePhase::EndTime {
        result.end_time = Some(value);
    } else {
        result.start_time = Some(value);
    }
}

fn leading_fragment(text: &str) -> &str {
    text.split(|c: char| c.is_whitespace() || c == '#')
        .next()
        .unwrap_or("")
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
