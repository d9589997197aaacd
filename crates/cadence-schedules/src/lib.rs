//! `cadence-schedules`: calendar-aware schedule evaluation.
//!
//! # Overview
//!
//! A [`Schedule`] answers one question: given a [`ScheduleContext`] (a
//! reference instant and a time zone), which [`Interval`] is due now or next?
//! The answer is a [`ScheduleResult`] that also carries the instant from which
//! the following occurrence should be computed. Schedules are stateless and
//! never block; walking a sequence of occurrences is the caller's job (see
//! [`Occurrences`]).
//!
//! Calendar schedules can be *refined* by a child schedule that narrows each
//! of their intervals, e.g. weekdays refined by 09:00-17:00. Several schedules
//! combine into a union with [`ScheduleList`].
//!
//! # Schedule kinds
//!
//! | Kind       | Type                 | Cycle  |
//! |------------|----------------------|--------|
//! | `daily`    | [`DailySchedule`]    | day    |
//! | `weekly`   | [`WeeklySchedule`]   | week   |
//! | `monthly`  | [`MonthlySchedule`]  | month  |
//! | `yearly`   | [`YearlySchedule`]   | year   |
//! | `interval` | [`IntervalSchedule`] | fixed  |
//! | `date`     | [`DateSchedule`]     | once   |
//! | `now`      | [`NowSchedule`]      | once   |
//! | `list`     | [`ScheduleList`]     | union  |

pub mod calendar;
pub mod constrained;
pub mod context;
pub mod error;
pub mod interval;
pub mod list;
pub mod schedule;
pub mod schedules;
pub mod types;

pub use context::{parse_time_zone, ScheduleContext};
pub use error::{Result, ScheduleError};
pub use interval::{Interval, ScheduleResult, END_OF_TIME, START_OF_TIME};
pub use list::ScheduleList;
pub use schedule::{Occurrences, Refineable, Schedule};
pub use schedules::{
    DailySchedule, DateSchedule, IntervalSchedule, MonthDay, MonthlySchedule, NowSchedule,
    WeeklySchedule, YearlySchedule,
};
pub use types::ScheduleDef;
