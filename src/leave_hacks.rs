// Leave-hack engine: classify weekends by how they sit next to public holidays
//
// Rules are tried in a fixed order and the first match wins. Zero-leave
// options come first, and among those a trailing Monday holiday is tried
// before a Friday holiday. Reordering RULES changes which rule claims a
// weekend that touches more than one holiday.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::{add_days, next_n_weekends, DateRange};
use crate::holidays::HolidaySet;

pub const DEFAULT_WINDOW_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaveHackReason {
    MonPH,
    FriPH,
    ThuPHPlusLeave,
    TuePHPlusLeave,
}

impl LeaveHackReason {
    pub fn label(&self) -> &'static str {
        match self {
            LeaveHackReason::MonPH => "Mon PH",
            LeaveHackReason::FriPH => "Fri PH",
            LeaveHackReason::ThuPHPlusLeave => "Thu PH +1 leave",
            LeaveHackReason::TuePHPlusLeave => "Tue PH +1 leave",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongWeekendCandidate {
    // The Fri-Sun anchor window
    pub window: DateRange,
    pub reason: LeaveHackReason,
    pub leave_days_needed: u32,
    // Actual start/end once the holiday (and any leave day) is added
    pub effective_range: DateRange,
}

struct AdjacencyRule {
    reason: LeaveHackReason,
    // Day that must be a holiday for the rule to fire
    probe: fn(&DateRange) -> chrono::NaiveDate,
    leave_days_needed: u32,
    extend: fn(&DateRange) -> DateRange,
}

const RULES: [AdjacencyRule; 4] = [
    AdjacencyRule {
        reason: LeaveHackReason::MonPH,
        probe: |w| add_days(w.end, 1),
        leave_days_needed: 0,
        extend: |w| w.extend_to(w.start, add_days(w.end, 1)),
    },
    AdjacencyRule {
        reason: LeaveHackReason::FriPH,
        probe: |w| w.start,
        leave_days_needed: 0,
        extend: |w| *w,
    },
    AdjacencyRule {
        reason: LeaveHackReason::ThuPHPlusLeave,
        probe: |w| add_days(w.start, -1),
        leave_days_needed: 1,
        extend: |w| w.extend_to(add_days(w.start, -1), w.end),
    },
    AdjacencyRule {
        reason: LeaveHackReason::TuePHPlusLeave,
        probe: |w| add_days(w.end, 2),
        leave_days_needed: 1,
        extend: |w| w.extend_to(w.start, add_days(w.end, 2)),
    },
];

// Classify one weekend window against the holiday set. `None` means no
// rule matched and the weekend is not a long weekend.
pub fn classify(window: &DateRange, holidays: &HolidaySet) -> Option<LongWeekendCandidate> {
    RULES
        .iter()
        .find(|rule| holidays.contains((rule.probe)(window)))
        .map(|rule| LongWeekendCandidate {
            window: *window,
            reason: rule.reason,
            leave_days_needed: rule.leave_days_needed,
            effective_range: (rule.extend)(window),
        })
}

// Long weekends among the next `window_count` weekends, chronological.
pub fn long_weekend_combos(
    reference_instant: DateTime<Utc>,
    holidays: &HolidaySet,
    window_count: usize,
) -> Vec<LongWeekendCandidate> {
    let count = i32::try_from(window_count).unwrap_or(i32::MAX);
    let combos: Vec<LongWeekendCandidate> = next_n_weekends(count, reference_instant)
        .iter()
        .filter_map(|window| classify(window, holidays))
        .collect();

    debug!(
        reference = %reference_instant,
        windows = window_count,
        found = combos.len(),
        "classified upcoming weekends"
    );
    combos
}

// True iff `range` is exactly the effective range of a long weekend found
// by scanning forward from `range.start`.
pub fn is_leave_hack(range: &DateRange, holidays: &HolidaySet) -> bool {
    let reference = range.start.and_time(chrono::NaiveTime::MIN).and_utc();
    long_weekend_combos(reference, holidays, DEFAULT_WINDOW_COUNT)
        .iter()
        .any(|candidate| candidate.effective_range == *range)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekendSuggestion {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    pub is_leave_hack: bool,
}

// One suggestion per upcoming weekend: the extended range when a rule
// matches, otherwise the plain Fri-Sun window.
pub fn weekend_suggestions(
    reference_instant: DateTime<Utc>,
    holidays: &HolidaySet,
    window_count: usize,
) -> Vec<WeekendSuggestion> {
    let count = i32::try_from(window_count).unwrap_or(i32::MAX);
    next_n_weekends(count, reference_instant)
        .iter()
        .map(|window| match classify(window, holidays) {
            Some(candidate) => WeekendSuggestion {
                start: candidate.effective_range.start,
                end: candidate.effective_range.end,
                is_leave_hack: true,
            },
            None => WeekendSuggestion {
                start: window.start,
                end: window.end,
                is_leave_hack: false,
            },
        })
        .collect()
}
