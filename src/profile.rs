use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Working-hours profile the planner schedules against.
///
/// Defines which weekdays carry capacity, the daily work window, and the
/// minimum gap ("breather") left between consecutively scheduled tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkProfile {
    pub working_days: HashSet<Weekday>,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub breather_minutes: i64,
}

impl Default for WorkProfile {
    fn default() -> Self {
        Self {
            working_days: HashSet::from([
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]),
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            breather_minutes: 0,
        }
    }
}

impl WorkProfile {
    pub fn set_working_days(&mut self, days: Vec<Weekday>) {
        self.working_days = days.into_iter().collect();
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday())
    }

    /// Minutes of capacity a full working day carries.
    pub fn daily_minutes(&self) -> i64 {
        (self.day_end - self.day_start).num_minutes()
    }

    /// The work window for a date, `None` on non-working days.
    pub fn work_window(&self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if !self.is_working_day(date) {
            return None;
        }
        Some((date.and_time(self.day_start), date.and_time(self.day_end)))
    }
}
