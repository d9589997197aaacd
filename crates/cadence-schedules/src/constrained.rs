//! The shared algorithm behind every calendar-bounded schedule.
//!
//! A constrained schedule describes one cycle with a `from` boundary, a `to`
//! boundary and the size of the cycle. When `from` is not before `to` the
//! cycle wraps (an overnight window, Friday to Monday, the 25th to the 5th).

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::calendar::CalendarUnit;
use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::{Interval, ScheduleResult};
use crate::schedule::{place_within, refine_forward, Placement, Refineable, Schedule};

pub trait ConstrainedSchedule: Schedule + Refineable {
    /// Start of the cycle boundary relative to `reference`.
    fn from_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>>;

    /// Exclusive end of the cycle boundary relative to `reference`.
    fn to_calendar(&self, reference: &DateTime<Tz>) -> Result<DateTime<Tz>>;

    /// Length of one cycle.
    fn interval_between(&self) -> CalendarUnit;

    /// Move a `from` boundary by whole cycles, then re-derive it.
    fn shift_from_calendar(&self, calendar: &DateTime<Tz>, intervals: i32) -> Result<DateTime<Tz>> {
        let shifted = self.interval_between().shift(calendar, intervals)?;
        self.from_calendar(&shifted)
    }

    /// Move a `to` boundary by whole cycles, then re-derive it from the
    /// instant just before, which still lies in the intended cycle.
    fn shift_to_calendar(&self, calendar: &DateTime<Tz>, intervals: i32) -> Result<DateTime<Tz>> {
        let shifted = self.interval_between().shift(calendar, intervals)? - Duration::milliseconds(1);
        self.to_calendar(&shifted)
    }

    /// The cycle containing the context's date, or the next one.
    fn next_interval(&self, context: &ScheduleContext) -> Result<Interval> {
        let now = context.local_date();
        let mut from = self.from_calendar(&now)?;
        let mut to = self.to_calendar(&now)?;

        if from >= to {
            if now < to {
                from = self.shift_from_calendar(&from, -1)?;
            } else {
                to = self.shift_to_calendar(&to, 1)?;
            }
        } else if now >= to {
            from = self.shift_from_calendar(&from, 1)?;
            to = self.shift_to_calendar(&to, 1)?;
        }

        Interval::try_new(from.with_timezone(&Utc), to.with_timezone(&Utc))
    }

    /// The cycle before the one [`next_interval`](Self::next_interval) returns.
    fn last_interval(&self, context: &ScheduleContext) -> Result<Interval> {
        let now = context.local_date();
        let mut from = self.from_calendar(&now)?;
        let mut to = self.to_calendar(&now)?;

        if from >= to {
            if now < to {
                from = self.shift_from_calendar(&from, -2)?;
                to = self.shift_to_calendar(&to, -1)?;
            } else {
                from = self.shift_from_calendar(&from, -1)?;
            }
        } else if now < to {
            from = self.shift_from_calendar(&from, -1)?;
            to = self.shift_to_calendar(&to, -1)?;
        }

        Interval::try_new(from.with_timezone(&Utc), to.with_timezone(&Utc))
    }
}

/// Evaluate a constrained schedule, applying its refinement if it has one.
///
/// A refinement may stretch a cycle past its nominal end (a night shift
/// refining a weekday), so when the next refined occurrence is still in the
/// future the previous cycle is refined too, and wins while it is open.
pub fn next_due<S>(schedule: &S, context: &ScheduleContext) -> Result<Option<ScheduleResult>>
where
    S: ConstrainedSchedule + ?Sized,
{
    evaluate(schedule, context).map_err(|e| e.in_schedule(&schedule))
}

fn evaluate<S>(schedule: &S, context: &ScheduleContext) -> Result<Option<ScheduleResult>>
where
    S: ConstrainedSchedule + ?Sized,
{
    let next = schedule.next_interval(context)?;
    let Some(child) = schedule.refinement() else {
        return Ok(Some(ScheduleResult::new(next)));
    };

    let now = context.date();
    let refined = refine_forward(&schedule, context, child, next, |moved| {
        schedule.next_interval(moved).map(Some)
    })?;

    if refined.as_ref().map_or(true, |r| r.from() > now) {
        let last = schedule.last_interval(context)?;
        if let Placement::Within(previous) = place_within(&schedule, &last, child, context)? {
            if now < previous.to() {
                return Ok(Some(previous));
            }
        }
    }

    Ok(refined)
}
