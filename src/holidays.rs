// Holiday source: where public-holiday dates come from
// The classifier only ever sees a HolidaySet of plain dates.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TripError;

// Upper bound on holidays returned by a single upcoming() query
pub const DEFAULT_HOLIDAY_LIMIT: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

// Membership set of public-holiday dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidaySet {
    dates: HashSet<NaiveDate>,
}

impl HolidaySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_holidays(holidays: &[Holiday]) -> Self {
        holidays.iter().map(|h| h.date).collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn insert(&mut self, date: NaiveDate) -> bool {
        self.dates.insert(date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl FromIterator<NaiveDate> for HolidaySet {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self {
            dates: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
pub trait HolidaySource: Send + Sync {
    // Holidays on or after `from`, ascending by date, at most `limit` of them
    async fn upcoming(&self, from: NaiveDate, limit: usize) -> Result<Vec<Holiday>, TripError>;

    // Every holiday in `from..=to`, ascending; no count cap
    async fn between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>, TripError> {
        let mut holidays = self.upcoming(from, usize::MAX).await?;
        holidays.retain(|h| h.date <= to);
        Ok(holidays)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticHolidaySource {
    holidays: Vec<Holiday>,
}

impl StaticHolidaySource {
    pub fn new(mut holidays: Vec<Holiday>) -> Self {
        holidays.sort_by_key(|h| h.date);
        // Same date seeded twice keeps the last name, like an upsert
        let mut deduped: Vec<Holiday> = Vec::with_capacity(holidays.len());
        for holiday in holidays {
            match deduped.last_mut() {
                Some(last) if last.date == holiday.date => *last = holiday,
                _ => deduped.push(holiday),
            }
        }
        Self { holidays: deduped }
    }

    // Gazetted Singapore public holidays for 2025.
    pub fn singapore_2025() -> Self {
        const SEED: [(i32, u32, u32, &str); 10] = [
            (2025, 1, 1, "New Year's Day"),
            (2025, 1, 29, "Chinese New Year"),
            (2025, 1, 30, "Chinese New Year (Day 2)"),
            (2025, 4, 18, "Good Friday"),
            (2025, 5, 1, "Labour Day"),
            (2025, 5, 12, "Vesak Day (Observed)"),
            (2025, 6, 6, "Hari Raya Haji"),
            (2025, 8, 9, "National Day"),
            (2025, 10, 20, "Deepavali"),
            (2025, 12, 25, "Christmas Day"),
        ];

        Self::new(
            SEED.iter()
                .filter_map(|&(y, m, d, name)| {
                    NaiveDate::from_ymd_opt(y, m, d).map(|date| Holiday {
                        date,
                        name: name.to_string(),
                    })
                })
                .collect(),
        )
    }

    pub fn all(&self) -> &[Holiday] {
        &self.holidays
    }
}

#[async_trait]
impl HolidaySource for StaticHolidaySource {
    async fn upcoming(&self, from: NaiveDate, limit: usize) -> Result<Vec<Holiday>, TripError> {
        Ok(self
            .holidays
            .iter()
            .filter(|h| h.date >= from)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>, TripError> {
        Ok(self
            .holidays
            .iter()
            .skip_while(|h| h.date < from)
            .take_while(|h| h.date <= to)
            .cloned()
            .collect())
    }
}
