//! Working-day calendars
//!
//! A [`Calendar`] classifies every date as working or non-working and offers
//! date arithmetic in working-day units. A [`CalendarSet`] pairs the project
//! default calendar with per-resource-class variants (e.g. equipment that is
//! only available on weekdays while a crew works six days a week).
//!
//! Status precedence for a single date:
//! 1. An explicit [`CalendarException`] for the date
//! 2. A [`Holiday`] range containing the date (non-working)
//! 3. The weekly pattern (`working_days`)
//!
//! Calendars are plain values; once a scheduling run starts they are only
//! ever read, so a single instance may be shared across worker threads.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{CalendarId, ResourceId, ScheduleError};

/// Hours in a standard construction working day
pub const DEFAULT_HOURS_PER_DAY: u8 = 8;

/// Working-day definitions for one calendar variant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calendar {
    /// Unique identifier
    pub id: CalendarId,
    /// Human-readable name
    pub name: String,
    /// Working days of the week (0 = Sunday, 6 = Saturday)
    pub working_days: Vec<u8>,
    /// Non-working date ranges
    pub holidays: Vec<Holiday>,
    /// Single-date overrides (take precedence over holidays and the weekly pattern)
    pub exceptions: Vec<CalendarException>,
    /// Paid hours in one working day (used for cost estimation)
    pub hours_per_day: u8,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            id: "default".into(),
            name: "Standard".into(),
            working_days: vec![1, 2, 3, 4, 5], // Mon-Fri
            holidays: Vec::new(),
            exceptions: Vec::new(),
            hours_per_day: DEFAULT_HOURS_PER_DAY,
        }
    }
}

impl Calendar {
    /// Create a Monday-to-Friday calendar with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Replace the weekly working pattern (0 = Sunday, 6 = Saturday)
    pub fn with_working_days(mut self, days: &[u8]) -> Self {
        self.working_days = days.to_vec();
        self
    }

    /// Add a non-working date range (inclusive)
    pub fn with_holiday(mut self, name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        self.holidays.push(Holiday {
            name: name.into(),
            start,
            end,
        });
        self
    }

    /// Force a single date to be working or non-working
    pub fn with_exception(mut self, date: NaiveDate, working: bool) -> Self {
        self.exceptions.push(CalendarException { date, working });
        self
    }

    /// Set the paid hours per working day
    pub fn with_hours_per_day(mut self, hours: u8) -> Self {
        self.hours_per_day = hours;
        self
    }

    /// Check the calendar can ever produce a working day and that every
    /// date resolves to exactly one status.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidCalendar {
            calendar: self.id.clone(),
            reason,
        };

        if let Some(day) = self.working_days.iter().find(|d| **d > 6) {
            return Err(invalid(format!("weekday {} is out of range 0-6", day)));
        }
        if self.working_days.is_empty() {
            return Err(invalid("the working-day set is empty".into()));
        }
        if let Some(h) = self.holidays.iter().find(|h| h.end < h.start) {
            return Err(invalid(format!("holiday '{}' ends before it starts", h.name)));
        }

        let mut seen: HashMap<NaiveDate, bool> = HashMap::new();
        for exception in &self.exceptions {
            if let Some(previous) = seen.insert(exception.date, exception.working) {
                if previous != exception.working {
                    return Err(invalid(format!(
                        "conflicting exceptions for {}",
                        exception.date
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check if a date is a working day
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if let Some(exception) = self.exceptions.iter().find(|e| e.date == date) {
            return exception.working;
        }
        if self.holidays.iter().any(|h| h.contains(date)) {
            return false;
        }
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.working_days.contains(&weekday)
    }

    /// First working day on or after `date`
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        if self.working_days.is_empty() {
            return date;
        }
        let mut current = date;
        while !self.is_working_day(current) {
            current = match current.succ_opt() {
                Some(d) => d,
                None => return current,
            };
        }
        current
    }

    /// Move `n` working days away from `date`.
    ///
    /// Positive `n` steps forward, negative steps backward; `date` itself is
    /// never counted. Zero returns `date` unchanged.
    pub fn add_working_days(&self, date: NaiveDate, n: i64) -> NaiveDate {
        if n == 0 || self.working_days.is_empty() {
            return date;
        }

        let mut current = date;
        let mut remaining = n.abs();
        while remaining > 0 {
            let next = if n > 0 {
                current.succ_opt()
            } else {
                current.pred_opt()
            };
            current = match next {
                Some(d) => d,
                None => return current,
            };
            if self.is_working_day(current) {
                remaining -= 1;
            }
        }
        current
    }

    /// Move a fractional number of working days, rounding up to whole days
    pub fn add_fractional_working_days(&self, date: NaiveDate, days: f64) -> NaiveDate {
        self.add_working_days(date, days.ceil() as i64)
    }

    /// Number of working days in `[a, b)`; negative when `b` precedes `a`
    pub fn working_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        if b < a {
            return -self.working_days_between(b, a);
        }
        a.iter_days()
            .take_while(|d| *d < b)
            .filter(|d| self.is_working_day(*d))
            .count() as i64
    }
}

/// Holiday definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Holiday {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Calendar exception (override for a specific date)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarException {
    pub date: NaiveDate,
    pub working: bool,
}

// ============================================================================
// Calendar Set
// ============================================================================

/// The project default calendar plus per-resource-class overrides
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSet {
    /// Calendar used for task dates and any class without an override
    pub default: Calendar,
    /// Calendar variants keyed by resource class
    pub overrides: BTreeMap<ResourceId, Calendar>,
}

impl CalendarSet {
    /// Create a set with only a default calendar
    pub fn new(default: Calendar) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Register a calendar variant for a resource class
    pub fn with_override(mut self, resource_id: impl Into<String>, calendar: Calendar) -> Self {
        self.overrides.insert(resource_id.into(), calendar);
        self
    }

    /// Calendar governing a resource class (falls back to the default)
    pub fn for_resource(&self, resource_id: &str) -> &Calendar {
        self.overrides.get(resource_id).unwrap_or(&self.default)
    }

    /// Validate the default calendar and every override
    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.default.validate()?;
        for calendar in self.overrides.values() {
            calendar.validate()?;
        }
        Ok(())
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.default.is_working_day(date)
    }

    pub fn add_working_days(&self, date: NaiveDate, n: i64) -> NaiveDate {
        self.default.add_working_days(date, n)
    }

    pub fn working_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        self.default.working_days_between(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn calendar_working_day() {
        let cal = Calendar::default();

        // Monday
        assert!(cal.is_working_day(date(2025, 2, 3)));
        // Saturday
        assert!(!cal.is_working_day(date(2025, 2, 1)));
    }

    #[test]
    fn exception_overrides_holiday_and_weekend() {
        let cal = Calendar::default()
            .with_holiday("Site closure", date(2025, 3, 3), date(2025, 3, 7))
            .with_exception(date(2025, 3, 5), true)
            .with_exception(date(2025, 3, 8), true);

        assert!(!cal.is_working_day(date(2025, 3, 4)));
        assert!(cal.is_working_day(date(2025, 3, 5)));
        // Saturday made working
        assert!(cal.is_working_day(date(2025, 3, 8)));
    }

    #[test]
    fn add_working_days_skips_weekend() {
        let cal = Calendar::default();
        // Friday + 1 working day = Monday
        assert_eq!(cal.add_working_days(date(2025, 1, 10), 1), date(2025, 1, 13));
        // Monday - 1 working day = Friday
        assert_eq!(cal.add_working_days(date(2025, 1, 13), -1), date(2025, 1, 10));
        assert_eq!(cal.add_working_days(date(2025, 1, 13), 0), date(2025, 1, 13));
    }

    #[test]
    fn fractional_days_round_up() {
        let cal = Calendar::default();
        assert_eq!(
            cal.add_fractional_working_days(date(2025, 1, 6), 1.2),
            date(2025, 1, 8)
        );
    }

    #[test]
    fn working_days_between_is_half_open_and_signed() {
        let cal = Calendar::default();
        let monday = date(2025, 1, 6);
        let next_monday = date(2025, 1, 13);

        assert_eq!(cal.working_days_between(monday, next_monday), 5);
        assert_eq!(cal.working_days_between(next_monday, monday), -5);
        assert_eq!(cal.working_days_between(monday, monday), 0);
    }

    #[test]
    fn next_working_day_rolls_forward() {
        let cal = Calendar::default();
        assert_eq!(cal.next_working_day(date(2025, 1, 4)), date(2025, 1, 6));
        assert_eq!(cal.next_working_day(date(2025, 1, 6)), date(2025, 1, 6));
    }

    #[test]
    fn empty_working_set_is_invalid() {
        let cal = Calendar::new("never").with_working_days(&[]);
        assert!(matches!(
            cal.validate(),
            Err(ScheduleError::InvalidCalendar { calendar, .. }) if calendar == "never"
        ));
    }

    #[test]
    fn conflicting_exceptions_are_invalid() {
        let cal = Calendar::default()
            .with_exception(date(2025, 1, 6), true)
            .with_exception(date(2025, 1, 6), false);
        assert!(cal.validate().is_err());
    }

    #[test]
    fn out_of_range_weekday_is_invalid() {
        let cal = Calendar::default().with_working_days(&[1, 9]);
        assert!(cal.validate().is_err());
    }

    #[test]
    fn calendar_set_falls_back_to_default() {
        let set = CalendarSet::new(Calendar::default().with_working_days(&[1, 2, 3, 4, 5, 6]))
            .with_override("crane", Calendar::new("weekdays"));

        let saturday = date(2025, 1, 11);
        assert!(set.for_resource("mason").is_working_day(saturday));
        assert!(!set.for_resource("crane").is_working_day(saturday));
        assert!(set.validate().is_ok());
    }
}
