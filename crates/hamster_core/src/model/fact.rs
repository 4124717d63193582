//! Fact domain model.
//!
//! # Responsibility
//! - Define the `Fact` record: one contiguous span of tracked activity.
//! - Build facts from text, explicit fields, or another fact.
//! - Produce the canonical text form understood by the fact parser.
//! - Validate facts before they are committed to storage.
//!
//! # Invariants
//! - Explicit non-empty fields take precedence over parsed ones.
//! - `category` of a committed fact never contains a comma.
//! - A closed fact never ends before it starts.
//! - Equality ignores `id`.

use crate::model::hamster_day::DayBoundary;
use crate::parser::fact_parser::{FactParser, ParsePhase, ParsedFact, DAY_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage identity of a fact.
pub type FactId = i64;

/// One homogeneous span of activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fact {
    /// Assigned by the store; `None` for an unsaved fact.
    pub id: Option<FactId>,
    pub activity: Option<String>,
    /// Never contains a comma once committed.
    pub category: Option<String>,
    pub description: Option<String>,
    /// Input order is preserved.
    pub tags: Vec<String>,
    pub start_time: Option<NaiveDateTime>,
    /// `None` while the activity is still ongoing.
    pub end_time: Option<NaiveDateTime>,
}

/// Explicit field values for `Fact::build` and `Fact::copy`.
///
/// `None`, empty strings and empty tag lists mean "keep the parsed value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactFields {
    pub id: Option<FactId>,
    pub activity: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// Reasons a fact is refused by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactError {
    MissingStartTime,
    MissingActivity,
    ForbiddenCategorySeparator {
        category: String,
    },
    /// The end precedes the start.
    NegativeDuration {
        /// Same fact with the end moved one day later.
        suggestion: Box<Fact>,
        /// Canonical line for `suggestion`, ready to be entered again.
        suggested_line: String,
        /// Hamster day start from tracking settings.
        day_start: NaiveTime,
    },
}

impl Display for FactError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStartTime => write!(f, "Missing start time"),
            Self::MissingActivity => write!(f, "Missing activity"),
            Self::ForbiddenCategorySeparator { category } => write!(
                f,
                "Forbidden comma in category: '{category}'\n\
                 A comma separates the category from the description."
            ),
            Self::NegativeDuration {
                suggested_line,
                day_start,
                ..
            } => write!(
                f,
                "Duration would be negative.\n\
                 Working late?\n\
                 This happens when the activity crosses the\n\
                 hamster day start time ({}, from tracking settings).\n\
                 \n\
                 Suggestion: move the end to the next day; the fact would become:\n\
                 {suggested_line}",
                day_start.format(TIME_FORMAT)
            ),
        }
    }
}

impl Error for FactError {}

impl Fact {
    /// Creates an unsaved fact with only an activity set.
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: explicit(Some(activity.into())),
            ..Self::default()
        }
    }

    /// Parses a fact line such as `9:00-10:30 coding@work, notes #tag`.
    pub fn parse(text: &str, parser: &FactParser) -> Self {
        Self::build(text, None, FactFields::default(), parser)
    }

    /// Builds a fact from a (possibly empty) line and explicit fields.
    ///
    /// With `date`, the line is parsed from its time tokens on that hamster
    /// day instead of looking for a leading day token.
    pub fn build(
        text: &str,
        date: Option<NaiveDate>,
        fields: FactFields,
        parser: &FactParser,
    ) -> Self {
        let phase = if date.is_some() {
            ParsePhase::StartTime
        } else {
            ParsePhase::Date
        };
        let parsed = parser.parse_from(text, phase, ParsedFact::default(), date);
        Self::from_parsed(parsed, fields)
    }

    /// Merges parser output with explicit fields.
    pub fn from_parsed(parsed: ParsedFact, fields: FactFields) -> Self {
        Self {
            id: fields.id,
            activity: explicit(fields.activity).or_else(|| explicit(parsed.activity)),
            category: explicit(fields.category).or_else(|| explicit(parsed.category)),
            description: explicit(fields.description).or_else(|| explicit(parsed.description)),
            tags: fields
                .tags
                .filter(|tags| !tags.is_empty())
                .or(parsed.tags)
                .unwrap_or_default(),
            start_time: fields.start_time.or(parsed.start_time),
            end_time: fields.end_time.or(parsed.end_time),
        }
    }

    /// Returns an independent copy with `fields` applied on top.
    ///
    /// The copy goes through the canonical text form, so it carries no `id`
    /// unless `fields.id` is set.
    pub fn copy(&self, fields: FactFields, parser: &FactParser) -> Self {
        let text = self.serialized(parser.boundary());
        Self::build(&text, None, fields, parser)
    }

    /// Hamster day containing `start_time`.
    pub fn date(&self, boundary: DayBoundary) -> Option<NaiveDate> {
        self.start_time.map(|start| boundary.day_of(start))
    }

    /// Moves start and end onto hamster day `day`, keeping their times of day.
    ///
    /// One-shot: later edits of `start_time` may change `date()` again.
    pub fn set_date(&mut self, boundary: DayBoundary, day: NaiveDate) {
        if let Some(start) = self.start_time {
            self.start_time = Some(boundary.combine(day, start.time()));
        }
        if let Some(end) = self.end_time {
            self.end_time = Some(boundary.combine(day, end.time()));
        }
    }

    /// Duration up to `end_time`, or up to `now` for an ongoing fact.
    pub fn delta(&self, now: NaiveDateTime) -> Option<TimeDelta> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }

    /// `activity[@category][, description][ #tag #tag]`
    pub fn serialized_name(&self) -> String {
        let mut name = self.activity.clone().unwrap_or_default();
        if let Some(category) = &self.category {
            name.push('@');
            name.push_str(category);
        }
        if let Some(description) = &self.description {
            name.push_str(", ");
            name.push_str(description);
        }
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|tag| format!("#{tag}")).collect();
            name.push(' ');
            name.push_str(&tags.join(" "));
        }
        name
    }

    /// `[DD-MM-YYYY ]HH:MM[-HH:MM]`
    ///
    /// An end on a later hamster day than the start is written as
    /// ` DD-MM-YYYY HH:MM` so the parser restores it on that day.
    pub fn serialized_time(&self, boundary: DayBoundary, prepend_date: bool) -> String {
        let mut time = String::new();
        if let Some(start) = self.start_time {
            if prepend_date {
                time.push_str(&format!("{} ", boundary.day_of(start).format(DAY_FORMAT)));
            }
            time.push_str(&start.format(TIME_FORMAT).to_string());
        }
        if let Some(end) = self.end_time {
            let end_day = boundary.day_of(end);
            match self.date(boundary) {
                Some(start_day) if end_day > start_day => time.push_str(&format!(
                    " {} {}",
                    end_day.format(DAY_FORMAT),
                    end.format(TIME_FORMAT)
                )),
                _ => time.push_str(&format!("-{}", end.format(TIME_FORMAT))),
            }
        }
        time
    }

    /// Canonical one-line form, inverse of `Fact::parse`.
    pub fn serialized(&self, boundary: DayBoundary) -> String {
        self.serialized_with(boundary, true)
    }

    pub fn serialized_with(&self, boundary: DayBoundary, prepend_date: bool) -> String {
        let time = self.serialized_time(boundary, prepend_date);
        let name = self.serialized_name();
        if time.is_empty() {
            name
        } else {
            format!("{time} {name}")
        }
    }

    /// Checks the fact can be committed to storage.
    ///
    /// `default_day` is the day the user is looking at; the suggested line of
    /// a `NegativeDuration` omits the day token when it matches.
    ///
    /// # Errors
    /// - `MissingStartTime`, `MissingActivity`, `ForbiddenCategorySeparator`
    ///   and `NegativeDuration`, checked in that order.
    ///
    /// The span is checked last: a suggestion is only offered for a fact that
    /// is otherwise storable, so an inverted fact missing its activity reports
    /// `MissingActivity` rather than a fix that cannot be committed either.
    pub fn validate(
        &self,
        boundary: DayBoundary,
        default_day: Option<NaiveDate>,
    ) -> Result<(), FactError> {
        let Some(start) = self.start_time else {
            return Err(FactError::MissingStartTime);
        };

        if self.activity.as_deref().map_or(true, str::is_empty) {
            return Err(FactError::MissingActivity);
        }

        if let Some(category) = self.category.as_deref().filter(|c| c.contains(',')) {
            return Err(FactError::ForbiddenCategorySeparator {
                category: category.to_string(),
            });
        }

        if let Some(end) = self.end_time.filter(|end| *end < start) {
            let mut suggestion = self.clone();
            suggestion.id = None;
            suggestion.end_time = Some(end + TimeDelta::days(1));
            let prepend_date = default_day != Some(boundary.day_of(start));
            let suggested_line = suggestion.serialized_with(boundary, prepend_date);
            return Err(FactError::NegativeDuration {
                suggestion: Box::new(suggestion),
                suggested_line,
                day_start: boundary.day_start(),
            });
        }

        Ok(())
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.activity == other.activity
                && self.category == other.category
                && self.description == other.description
                && self.start_time == other.start_time
                && self.end_time == other.end_time
                && self.tags == other.tags)
    }
}

impl Eq for Fact {}

fn explicit(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Fact, FactError};
    use crate::model::hamster_day::DayBoundary;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Fact {
        Fact {
            start_time: Some(start),
            end_time: Some(end),
            ..Fact::new("coding")
        }
    }

    #[test]
    fn new_trims_and_drops_blank_activity() {
        assert_eq!(Fact::new("  reading ").activity.as_deref(), Some("reading"));
        assert_eq!(Fact::new("   ").activity, None);
    }

    #[test]
    fn serialized_name_orders_parts() {
        let fact = Fact {
            category: Some("work".to_string()),
            description: Some("fixed bug".to_string()),
            tags: vec!["b".to_string(), "a".to_string()],
            ..Fact::new("coding")
        };
        assert_eq!(fact.serialized_name(), "coding@work, fixed bug #b #a");
    }

    #[test]
    fn serialized_time_without_date() {
        let fact = closed(at(5, 9, 0), at(5, 10, 30));
        assert_eq!(fact.serialized_time(DayBoundary::midnight(), false), "09:00-10:30");
        assert_eq!(
            fact.serialized_time(DayBoundary::midnight(), true),
            "05-03-2024 09:00-10:30"
        );
    }

    #[test]
    fn validate_reports_missing_fields_in_order() {
        let boundary = DayBoundary::midnight();
        assert_eq!(
            Fact::default().validate(boundary, None),
            Err(FactError::MissingStartTime)
        );

        let no_activity = Fact {
            start_time: Some(at(5, 9, 0)),
            ..Fact::default()
        };
        assert_eq!(
            no_activity.validate(boundary, None),
            Err(FactError::MissingActivity)
        );
    }

    #[test]
    fn negative_duration_message_contains_suggested_line() {
        let fact = closed(at(5, 10, 0), at(5, 9, 0));
        let err = fact.validate(DayBoundary::midnight(), None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Duration would be negative"));
        assert!(message.contains("05-03-2024 10:00 06-03-2024 09:00 coding"));
    }

    #[test]
    fn equality_ignores_id() {
        let mut left = closed(at(5, 9, 0), at(5, 10, 0));
        let right = left.clone();
        left.id = Some(42);
        assert_eq!(left, right);
    }
}
