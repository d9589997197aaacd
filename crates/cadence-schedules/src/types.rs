//! Declarative schedule definitions, as found in configuration files and on
//! the command line.

use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{check_day_of_month, check_month, check_week_of_month};
use crate::error::{Result, ScheduleError};
use crate::list::ScheduleList;
use crate::schedule::{Refineable, Schedule};
use crate::schedules::{
    DailySchedule, DateSchedule, IntervalSchedule, MonthDay, MonthlySchedule, NowSchedule,
    WeeklySchedule, YearlySchedule,
};

/// A serialisable description of a schedule.
///
/// ```json
/// { "kind": "weekly", "from": "Mon", "to": "Fri",
///   "refinement": { "kind": "daily", "from": "09:00", "to": "17:00" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleDef {
    /// A time-of-day window (or instant) every day.
    Daily {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<NaiveTime>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<NaiveTime>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<NaiveTime>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refinement: Option<Box<ScheduleDef>>,
    },

    /// Inclusive weekdays every week.
    Weekly {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Weekday>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Weekday>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on: Option<Weekday>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refinement: Option<Box<ScheduleDef>>,
    },

    /// Signed days, week blocks, or the Nth weekday of every month.
    Monthly {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_day: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_day: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_day: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_week: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_week: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_week: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        day_of_week: Option<Weekday>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refinement: Option<Box<ScheduleDef>>,
    },

    /// Dates (`MM-DD`, `MM-L`) or whole months every year.
    Yearly {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_date: Option<MonthDay>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_date: Option<MonthDay>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_date: Option<MonthDay>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_month: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_month: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_month: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refinement: Option<Box<ScheduleDef>>,
    },

    /// Back-to-back slots of `every_secs` seconds.
    Interval { every_secs: u64 },

    /// One date or an inclusive range of dates, once.
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refinement: Option<Box<ScheduleDef>>,
    },

    /// Immediately, once.
    Now,

    /// Whenever any member is due.
    List { schedules: Vec<ScheduleDef> },
}

impl ScheduleDef {
    /// Validate the definition and build the schedule it describes.
    pub fn build(&self) -> Result<Box<dyn Schedule>> {
        match self {
            ScheduleDef::Daily {
                from,
                to,
                at,
                refinement,
            } => {
                let schedule = match at {
                    Some(_) if from.is_some() || to.is_some() => {
                        return Err(conflict("daily", "at", "from/to"))
                    }
                    Some(at) => DailySchedule::at(*at),
                    None => DailySchedule::between(
                        from.unwrap_or(NaiveTime::MIN),
                        to.unwrap_or(NaiveTime::MIN),
                    ),
                };
                refined(schedule, refinement)
            }

            ScheduleDef::Weekly {
                from,
                to,
                on,
                refinement,
            } => {
                let (from, to) = bounds("weekly", *from, *to, *on, (Weekday::Mon, Weekday::Sun))?;
                refined(WeeklySchedule::between(from, to), refinement)
            }

            ScheduleDef::Monthly {
                from_day,
                to_day,
                on_day,
                from_week,
                to_week,
                on_week,
                day_of_week,
                refinement,
            } => {
                let by_day = from_day.is_some() || to_day.is_some() || on_day.is_some();
                let by_week = from_week.is_some() || to_week.is_some() || on_week.is_some();

                let schedule = if let Some(day) = day_of_week {
                    if by_day || from_week.is_some() || to_week.is_some() {
                        return Err(conflict("monthly", "day_of_week", "day or week ranges"));
                    }
                    let week = on_week.ok_or_else(|| {
                        ScheduleError::InvalidSchedule(
                            "monthly: day_of_week requires on_week".to_string(),
                        )
                    })?;
                    check_week_of_month(week)?;
                    MonthlySchedule::on_weekday(*day, week)
                } else if by_week {
                    if by_day {
                        return Err(conflict("monthly", "days", "weeks"));
                    }
                    let (from, to) = bounds("monthly", *from_week, *to_week, *on_week, (1, -1))?;
                    check_week_of_month(from)?;
                    check_week_of_month(to)?;
                    MonthlySchedule::between_weeks(from, to)
                } else {
                    let (from, to) = bounds("monthly", *from_day, *to_day, *on_day, (1, -1))?;
                    check_day_of_month(from)?;
                    check_day_of_month(to)?;
                    MonthlySchedule::between_days(from, to)
                };
                refined(schedule, refinement)
            }

            ScheduleDef::Yearly {
                from_date,
                to_date,
                on_date,
                from_month,
                to_month,
                in_month,
                refinement,
            } => {
                let by_date = from_date.is_some() || to_date.is_some() || on_date.is_some();
                let by_month = from_month.is_some() || to_month.is_some() || in_month.is_some();

                let schedule = if by_month {
                    if by_date {
                        return Err(conflict("yearly", "dates", "months"));
                    }
                    let (from, to) = bounds("yearly", *from_month, *to_month, *in_month, (1, 12))?;
                    check_month(from)?;
                    check_month(to)?;
                    YearlySchedule::between_months(from, to)
                } else {
                    let (from, to) = bounds(
                        "yearly",
                        *from_date,
                        *to_date,
                        *on_date,
                        (MonthDay::new(1, 1), MonthDay::last_of(12)),
                    )?;
                    for date in [from, to] {
                        check_month(date.month())?;
                        check_day_of_month(date.day())?;
                    }
                    YearlySchedule::between(from, to)
                };
                refined(schedule, refinement)
            }

            ScheduleDef::Interval { every_secs } => {
                let secs = i64::try_from(*every_secs)
                    .ok()
                    .filter(|secs| *secs > 0)
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| {
                        ScheduleError::InvalidSchedule(format!(
                            "interval: every_secs must be positive, got {every_secs}"
                        ))
                    })?;
                Ok(Box::new(IntervalSchedule::new(secs)))
            }

            ScheduleDef::Date {
                on,
                from,
                to,
                refinement,
            } => {
                let schedule = match (on, from, to) {
                    (Some(on), None, None) => DateSchedule::on(*on),
                    (None, Some(from), Some(to)) if from <= to => DateSchedule::between(*from, *to),
                    (None, Some(from), Some(to)) => {
                        return Err(ScheduleError::InvalidSchedule(format!(
                            "date: {to} is before {from}"
                        )))
                    }
                    _ => {
                        return Err(ScheduleError::InvalidSchedule(
                            "date: expected either on, or both from and to".to_string(),
                        ))
                    }
                };
                refined(schedule, refinement)
            }

            ScheduleDef::Now => Ok(Box::new(NowSchedule)),

            ScheduleDef::List { schedules } => Ok(Box::new(
                schedules
                    .iter()
                    .map(ScheduleDef::build)
                    .collect::<Result<ScheduleList>>()?,
            )),
        }
    }
}

fn conflict(kind: &str, one: &str, other: &str) -> ScheduleError {
    ScheduleError::InvalidSchedule(format!("{kind}: {one} cannot be combined with {other}"))
}

/// Resolve an `on` value or a `from`/`to` pair, filling in defaults.
fn bounds<T: Copy>(
    kind: &str,
    from: Option<T>,
    to: Option<T>,
    on: Option<T>,
    default: (T, T),
) -> Result<(T, T)> {
    match on {
        Some(_) if from.is_some() || to.is_some() => Err(conflict(kind, "on", "from/to")),
        Some(on) => Ok((on, on)),
        None => Ok((from.unwrap_or(default.0), to.unwrap_or(default.1))),
    }
}

fn refined<S>(mut schedule: S, refinement: &Option<Box<ScheduleDef>>) -> Result<Box<dyn Schedule>>
where
    S: Schedule + Refineable + 'static,
{
    if let Some(def) = refinement {
        schedule.set_refinement(Some(def.build()?));
    }
    Ok(Box::new(schedule))
}
