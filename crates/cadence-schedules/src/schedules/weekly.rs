use std::fmt;

use chrono::{DateTime, Weekday};
use chrono_tz::Tz;

use crate::calendar::{iso_day_of_week, CalendarUnit, CalendarUtils};
use crate::constrained::{self, ConstrainedSchedule};
use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::ScheduleResult;
use crate::schedule::{fmt_refinement, Refineable, Schedule};

/// A run of weekdays, every week.
///
/// Both days are inclusive: `Fri..Mon` runs from Friday midnight to Tuesday
/// midnight.
#[derive(Debug)]
pub struct WeeklySchedule {
    from: Weekday,
    to: Weekday,
    refinement: Option<Box<dyn Schedule>>,
}

impl WeeklySchedule {
    /// Monday through Sunday.
    pub fn new() -> Self {
        Self::between(Weekday::Mon, Weekday::Sun)
    }

    pub fn between(from: Weekday, to: Weekday) -> Self {
        Self {
            from,
            to,
            refinement: None,
        }
    }

    pub fn on(day: Weekday) -> Self {
        Self::between(day, day)
    }
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstrainedSchedule for WeeklySchedule {
    fn from_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        CalendarUtils::of(reference).day_of_week(iso_day_of_week(self.from))
    }

    fn to_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let last_day = CalendarUtils::of(reference).day_of_week(iso_day_of_week(self.to))?;
        CalendarUtils::of(&last_day).end_of_day()
    }

    fn interval_between(&self) -> CalendarUnit {
        CalendarUnit::weeks(1)
    }
}

impl Schedule for WeeklySchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        constrained::next_due(self, context)
    }
}

impl Refineable for WeeklySchedule {
    fn refinement(&self) -> Option<&dyn Schedule> {
        self.refinement.as_deref()
    }

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>) {
        self.refinement = refinement;
    }
}

impl fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "weekly on {}", self.from)?;
        } else {
            write!(f, "weekly from {} to {}", self.from, self.to)?;
        }
        fmt_refinement(f, self.refinement.as_deref())
    }
}
