//! Hamster day boundary arithmetic.
//!
//! # Responsibility
//! - Map a civil point in time to the logical "hamster day" containing it.
//! - Map a hamster day plus a time-of-day back to a civil point in time.
//!
//! # Invariants
//! - A hamster day spans `[day + day_start, day + 1 + day_start)`.
//! - `day_of(combine(day, time)) == day` for every `time`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Logical day boundary used to group facts into hamster days.
///
/// With `day_start = 05:30`, `02:00` on the 2nd belongs to the hamster day
/// of the 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayBoundary {
    day_start: NaiveTime,
}

impl DayBoundary {
    pub fn new(day_start: NaiveTime) -> Self {
        Self { day_start }
    }

    /// Boundary where hamster days coincide with civil days.
    pub fn midnight() -> Self {
        Self::new(NaiveTime::MIN)
    }

    pub fn day_start(&self) -> NaiveTime {
        self.day_start
    }

    /// Returns the hamster day containing `at`.
    pub fn day_of(&self, at: NaiveDateTime) -> NaiveDate {
        let civil_day = at.date();
        if at.time() < self.day_start {
            civil_day.pred_opt().unwrap_or(civil_day)
        } else {
            civil_day
        }
    }

    /// Returns the civil point in time for `time` within hamster day `day`.
    ///
    /// Times earlier than `day_start` belong to the next civil day.
    pub fn combine(&self, day: NaiveDate, time: NaiveTime) -> NaiveDateTime {
        if time < self.day_start {
            day.succ_opt().unwrap_or(day).and_time(time)
        } else {
            day.and_time(time)
        }
    }

    /// Returns the half-open civil interval `[start, end)` of hamster day `day`.
    pub fn day_bounds(&self, day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        self.range_bounds(day, day)
    }

    /// Returns the half-open civil interval covering `first..=last` hamster days.
    pub fn range_bounds(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> (NaiveDateTime, NaiveDateTime) {
        let start = first.and_time(self.day_start);
        let end = last.succ_opt().unwrap_or(last).and_time(self.day_start);
        (start, end)
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::midnight()
    }
}
