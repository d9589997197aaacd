use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::calendar::{CalendarUnit, CalendarUtils};
use crate::constrained::{self, ConstrainedSchedule};
use crate::context::ScheduleContext;
use crate::error::{Result, ScheduleError};
use crate::interval::ScheduleResult;
use crate::schedule::{fmt_refinement, Refineable, Schedule};

/// A day of the year as month and signed day of month.
///
/// Written `MM-DD`, or `MM-L` for the last day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    month: u32,
    day: i32,
}

impl MonthDay {
    pub const fn new(month: u32, day: i32) -> Self {
        Self { month, day }
    }

    /// The last day of `month`.
    pub const fn last_of(month: u32) -> Self {
        Self::new(month, -1)
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> i32 {
        self.day
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.day == -1 {
            write!(f, "{:02}-L", self.month)
        } else {
            write!(f, "{:02}-{:02}", self.month, self.day)
        }
    }
}

impl FromStr for MonthDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidSchedule(format!("invalid month-day: {s:?}"));
        let (month, day) = s.split_once('-').ok_or_else(invalid)?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        let day = if day.eq_ignore_ascii_case("l") {
            -1
        } else {
            day.parse::<i32>().map_err(|_| invalid())?
        };
        if !(1..=12).contains(&month) || day == 0 || !(-31..=31).contains(&day) {
            return Err(invalid());
        }
        Ok(Self::new(month, day))
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A range of days, every year. Both ends are inclusive.
#[derive(Debug)]
pub struct YearlySchedule {
    from: MonthDay,
    to: MonthDay,
    refinement: Option<Box<dyn Schedule>>,
}

impl YearlySchedule {
    /// The whole year.
    pub fn new() -> Self {
        Self::between(MonthDay::new(1, 1), MonthDay::last_of(12))
    }

    pub fn between(from: MonthDay, to: MonthDay) -> Self {
        Self {
            from,
            to,
            refinement: None,
        }
    }

    pub fn on(date: MonthDay) -> Self {
        Self::between(date, date)
    }

    pub fn in_month(month: u32) -> Self {
        Self::between_months(month, month)
    }

    /// From the 1st of `from` to the last day of `to`.
    pub fn between_months(from: u32, to: u32) -> Self {
        Self::between(MonthDay::new(from, 1), MonthDay::last_of(to))
    }
}

impl Default for YearlySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstrainedSchedule for YearlySchedule {
    fn from_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        CalendarUtils::of(reference).day_of_month_in_year(self.from.month, self.from.day)
    }

    fn to_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let last_day =
            CalendarUtils::of(reference).day_of_month_in_year(self.to.month, self.to.day)?;
        CalendarUtils::of(&last_day).end_of_day()
    }

    fn interval_between(&self) -> CalendarUnit {
        CalendarUnit::years(1)
    }
}

impl Schedule for YearlySchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        constrained::next_due(self, context)
    }
}

impl Refineable for YearlySchedule {
    fn refinement(&self) -> Option<&dyn Schedule> {
        self.refinement.as_deref()
    }

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>) {
        self.refinement = refinement;
    }
}

impl fmt::Display for YearlySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "yearly on {}", self.from)?;
        } else {
            write!(f, "yearly from {} to {}", self.from, self.to)?;
        }
        fmt_refinement(f, self.refinement.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn due(schedule: &YearlySchedule, at: DateTime<Utc>) -> ScheduleResult {
        schedule
            .next_due(&ScheduleContext::new(at))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn parses_month_days() {
        assert_eq!("02-29".parse::<MonthDay>().unwrap(), MonthDay::new(2, 29));
        assert_eq!("12-L".parse::<MonthDay>().unwrap(), MonthDay::last_of(12));
        assert_eq!("12--2".parse::<MonthDay>().unwrap(), MonthDay::new(12, -2));
        assert!("13-01".parse::<MonthDay>().is_err());
        assert!("01-00".parse::<MonthDay>().is_err());
        assert!("0101".parse::<MonthDay>().is_err());
        assert_eq!(MonthDay::last_of(2).to_string(), "02-L");
    }

    #[test]
    fn whole_year_by_default() {
        let due = due(&YearlySchedule::new(), utc(2024, 6, 12));
        assert_eq!(due.from(), utc(2024, 1, 1));
        assert_eq!(due.to(), utc(2025, 1, 1));
    }

    #[test]
    fn leap_day_in_a_common_year_rolls_into_march() {
        let due = due(&YearlySchedule::on(MonthDay::new(2, 29)), utc(2023, 3, 1));
        assert_eq!(due.from(), utc(2023, 3, 1));
        assert_eq!(due.to(), utc(2023, 3, 2));
    }

    #[test]
    fn last_day_of_february_follows_leap_years() {
        let due = due(&YearlySchedule::on(MonthDay::last_of(2)), utc(2023, 3, 1));
        assert_eq!(due.from(), utc(2024, 2, 29));
        assert_eq!(due.to(), utc(2024, 3, 1));
    }

    #[test]
    fn winter_wraps_over_new_year() {
        let schedule = YearlySchedule::between_months(12, 2);

        let january = due(&schedule, utc(2024, 1, 15));
        assert_eq!(january.from(), utc(2023, 12, 1));
        assert_eq!(january.to(), utc(2024, 3, 1));

        let june = due(&schedule, utc(2024, 6, 15));
        assert_eq!(june.from(), utc(2024, 12, 1));
        assert_eq!(june.to(), utc(2025, 3, 1));
    }

    #[test]
    fn display() {
        assert_eq!(
            YearlySchedule::in_month(7).to_string(),
            "yearly from 07-01 to 07-L"
        );
        assert_eq!(
            YearlySchedule::on(MonthDay::new(2, 29)).to_string(),
            "yearly on 02-29"
        );
    }
}
