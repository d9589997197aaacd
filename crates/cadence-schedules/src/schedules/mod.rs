//! Concrete schedules.
//!
//! | Schedule             | Due                                                |
//! |----------------------|----------------------------------------------------|
//! | [`DailySchedule`]    | a time-of-day window (or instant) every day         |
//! | [`WeeklySchedule`]   | a range of weekdays every week                      |
//! | [`MonthlySchedule`]  | days, week blocks or the Nth weekday of every month |
//! | [`YearlySchedule`]   | a date range or range of months every year          |
//! | [`IntervalSchedule`] | back-to-back slots of a fixed length                |
//! | [`DateSchedule`]     | one date or date range, once                        |
//! | [`NowSchedule`]      | immediately, once                                   |

mod daily;
mod date;
mod interval;
mod monthly;
mod now;
mod weekly;
mod yearly;

pub use daily::DailySchedule;
pub use date::DateSchedule;
pub use interval::IntervalSchedule;
pub use monthly::MonthlySchedule;
pub use now::NowSchedule;
pub use weekly::WeeklySchedule;
pub use yearly::{MonthDay, YearlySchedule};

use std::fmt;

use chrono::{NaiveTime, Timelike};

pub(crate) struct TimeOfDay(pub NaiveTime);

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.second() == 0 && self.0.nanosecond() == 0 {
            write!(f, "{}", self.0.format("%H:%M"))
        } else {
            write!(f, "{}", self.0.format("%H:%M:%S"))
        }
    }
}
