// Calendar primitives: date ranges and weekend windows
// All arithmetic is on proleptic Gregorian dates in UTC; host locale and
// timezone never leak in.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::TripError;

// Inclusive span of calendar days. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TripError> {
        if start > end {
            return Err(TripError::InvalidArgument(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    // Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub(crate) fn extend_to(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.min(self.start),
            end: end.max(self.end),
        }
    }
}

// None when the result falls outside the representable calendar
pub fn checked_add_days(date: NaiveDate, delta: i64) -> Option<NaiveDate> {
    let days = Days::new(delta.unsigned_abs());
    if delta >= 0 {
        date.checked_add_days(days)
    } else {
        date.checked_sub_days(days)
    }
}

// Saturates at NaiveDate::MIN / NaiveDate::MAX instead of panicking
pub fn add_days(date: NaiveDate, delta: i64) -> NaiveDate {
    checked_add_days(date, delta).unwrap_or(if delta < 0 {
        NaiveDate::MIN
    } else {
        NaiveDate::MAX
    })
}

// First Friday on or after `date`, if the calendar has one
pub fn next_friday_on_or_after(date: NaiveDate) -> Option<NaiveDate> {
    let today = date.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    checked_add_days(date, (friday - today).rem_euclid(7))
}

// Upcoming Friday-to-Sunday windows, oldest first, starting with the first
// Friday on or after `reference_instant` (in UTC). Non-positive `n` yields
// an empty list.
pub fn next_n_weekends(n: i32, reference_instant: DateTime<Utc>) -> Vec<DateRange> {
    if n <= 0 {
        return Vec::new();
    }

    let first_friday = match next_friday_on_or_after(reference_instant.date_naive()) {
        Some(friday) => friday,
        None => return Vec::new(),
    };
    // Stops early once a whole Fri-Sun window no longer fits in the calendar
    (0..n as i64)
        .map_while(|i| {
            let friday = checked_add_days(first_friday, i.checked_mul(7)?)?;
            let sunday = checked_add_days(friday, 2)?;
            Some(DateRange {
                start: friday,
                end: sunday,
            })
        })
        .collect()
}
