use std::fmt;

use chrono::{DateTime, Duration, NaiveTime};
use chrono_tz::Tz;

use super::TimeOfDay;
use crate::calendar::{CalendarUnit, CalendarUtils};
use crate::constrained::{self, ConstrainedSchedule};
use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::ScheduleResult;
use crate::schedule::{fmt_refinement, Refineable, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DailyBounds {
    /// `[from, to)` on the local clock; midnight as `to` means the end of the
    /// day, and `to <= from` wraps past midnight.
    Range { from: NaiveTime, to: NaiveTime },
    /// A single instant every day.
    At(NaiveTime),
}

/// A window of the day, every day.
#[derive(Debug)]
pub struct DailySchedule {
    bounds: DailyBounds,
    refinement: Option<Box<dyn Schedule>>,
}

impl DailySchedule {
    /// The whole day, midnight to midnight.
    pub fn new() -> Self {
        Self::between(NaiveTime::MIN, NaiveTime::MIN)
    }

    pub fn between(from: NaiveTime, to: NaiveTime) -> Self {
        Self {
            bounds: DailyBounds::Range { from, to },
            refinement: None,
        }
    }

    /// A point in time every day.
    pub fn at(at: NaiveTime) -> Self {
        Self {
            bounds: DailyBounds::At(at),
            refinement: None,
        }
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstrainedSchedule for DailySchedule {
    fn from_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let utils = CalendarUtils::of(reference);
        Ok(match self.bounds {
            DailyBounds::Range { from, .. } => utils.time_of_day(from),
            DailyBounds::At(at) => utils.time_of_day(at),
        })
    }

    fn to_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let utils = CalendarUtils::of(reference);
        match self.bounds {
            DailyBounds::Range { to, .. } if to == NaiveTime::MIN => utils.end_of_day(),
            DailyBounds::Range { to, .. } => Ok(utils.time_of_day(to)),
            DailyBounds::At(at) => Ok(utils.time_of_day(at) + Duration::milliseconds(1)),
        }
    }

    fn interval_between(&self) -> CalendarUnit {
        CalendarUnit::days(1)
    }
}

impl Schedule for DailySchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        constrained::next_due(self, context)
    }
}

impl Refineable for DailySchedule {
    fn refinement(&self) -> Option<&dyn Schedule> {
        self.refinement.as_deref()
    }

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>) {
        self.refinement = refinement;
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            DailyBounds::Range { from, to } if from == NaiveTime::MIN && to == NaiveTime::MIN => {
                write!(f, "daily")?
            }
            DailyBounds::Range { from, to } => {
                write!(f, "daily from {} to {}", TimeOfDay(from), TimeOfDay(to))?
            }
            DailyBounds::At(at) => write!(f, "daily at {}", TimeOfDay(at))?,
        }
        fmt_refinement(f, self.refinement.as_deref())
    }
}
