use std::fmt;

use chrono::{DateTime, Weekday};
use chrono_tz::Tz;

use crate::calendar::{iso_day_of_week, CalendarUnit, CalendarUtils};
use crate::constrained::{self, ConstrainedSchedule};
use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::ScheduleResult;
use crate::schedule::{fmt_refinement, Refineable, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthlyBounds {
    /// Inclusive signed days of the month; negative counts from the end.
    Days { from: i32, to: i32 },
    /// Inclusive 7-day blocks: week 1 is days 1-7, week -1 the last 7 days.
    Weeks { from: i32, to: i32 },
    /// The `week`-th `day` of the month, `-1` for the last one.
    WeekdayInMonth { day: Weekday, week: i32 },
}

/// A part of every month.
#[derive(Debug)]
pub struct MonthlySchedule {
    bounds: MonthlyBounds,
    refinement: Option<Box<dyn Schedule>>,
}

impl MonthlySchedule {
    /// The whole month.
    pub fn new() -> Self {
        Self::between_days(1, -1)
    }

    pub fn between_days(from: i32, to: i32) -> Self {
        Self::with_bounds(MonthlyBounds::Days { from, to })
    }

    pub fn on_day(day: i32) -> Self {
        Self::between_days(day, day)
    }

    pub fn between_weeks(from: i32, to: i32) -> Self {
        Self::with_bounds(MonthlyBounds::Weeks { from, to })
    }

    pub fn on_week(week: i32) -> Self {
        Self::between_weeks(week, week)
    }

    /// The `week`-th `day` of every month, e.g. the second Tuesday.
    pub fn on_weekday(day: Weekday, week: i32) -> Self {
        Self::with_bounds(MonthlyBounds::WeekdayInMonth { day, week })
    }

    fn with_bounds(bounds: MonthlyBounds) -> Self {
        Self {
            bounds,
            refinement: None,
        }
    }
}

impl Default for MonthlySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstrainedSchedule for MonthlySchedule {
    fn from_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let utils = CalendarUtils::of(reference);
        match self.bounds {
            MonthlyBounds::Days { from, .. } => utils.day_of_month(from),
            MonthlyBounds::Weeks { from, .. } => utils.start_of_week_of_month(from),
            MonthlyBounds::WeekdayInMonth { day, week } => {
                utils.day_of_week_in_month(iso_day_of_week(day), week)
            }
        }
    }

    fn to_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let utils = CalendarUtils::of(reference);
        match self.bounds {
            MonthlyBounds::Days { to, .. } => {
                CalendarUtils::of(&utils.day_of_month(to)?).end_of_day()
            }
            MonthlyBounds::Weeks { to, .. } => {
                CalendarUnit::weeks(1).shift(&utils.start_of_week_of_month(to)?, 1)
            }
            MonthlyBounds::WeekdayInMonth { day, week } => {
                let start = utils.day_of_week_in_month(iso_day_of_week(day), week)?;
                CalendarUtils::of(&start).end_of_day()
            }
        }
    }

    fn interval_between(&self) -> CalendarUnit {
        CalendarUnit::months(1)
    }
}

impl Schedule for MonthlySchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        constrained::next_due(self, context)
    }
}

impl Refineable for MonthlySchedule {
    fn refinement(&self) -> Option<&dyn Schedule> {
        self.refinement.as_deref()
    }

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>) {
        self.refinement = refinement;
    }
}

impl fmt::Display for MonthlySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            MonthlyBounds::Days { from, to } if from == to => write!(f, "monthly on day {from}")?,
            MonthlyBounds::Days { from, to } => write!(f, "monthly from day {from} to {to}")?,
            MonthlyBounds::Weeks { from, to } if from == to => {
                write!(f, "monthly in week {from}")?
            }
            MonthlyBounds::Weeks { from, to } => write!(f, "monthly from week {from} to {to}")?,
            MonthlyBounds::WeekdayInMonth { day, week } => {
                write!(f, "monthly on {day} of week {week}")?
            }
        }
        fmt_refinement(f, self.refinement.as_deref())
    }
}
