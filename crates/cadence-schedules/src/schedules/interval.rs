use std::fmt;

use chrono::Duration;

use crate::context::ScheduleContext;
use crate::error::{Result, ScheduleError};
use crate::interval::{Interval, ScheduleResult, END_OF_TIME};
use crate::schedule::Schedule;

/// Back-to-back slots of a fixed length.
///
/// As a refinement the slots are aligned to the start of the parent
/// interval; on its own the first slot starts at the context's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSchedule {
    every: Duration,
}

impl IntervalSchedule {
    pub fn new(every: Duration) -> Self {
        Self { every }
    }

    pub fn every(&self) -> Duration {
        self.every
    }
}

impl Schedule for IntervalSchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        let step = self.every.num_milliseconds();
        if step <= 0 {
            return Err(ScheduleError::InvalidSchedule(format!(
                "interval must be positive: {self}"
            )));
        }

        let now = context.date();
        let from = match context.parent_interval() {
            Some(parent) if now <= parent.from() => parent.from(),
            Some(parent) => {
                let elapsed = (now - parent.from()).num_milliseconds();
                parent.from() + Duration::milliseconds(elapsed - elapsed % step)
            }
            None => now,
        };
        let to = from.checked_add_signed(self.every).unwrap_or(END_OF_TIME);
        Ok(Some(ScheduleResult::new(Interval::new(from, to))))
    }
}

impl fmt::Display for IntervalSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {}", FormattedDuration(self.every))
    }
}

struct FormattedDuration(Duration);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.num_milliseconds();
        const UNITS: [(i64, &str); 4] = [
            (86_400_000, "d"),
            (3_600_000, "h"),
            (60_000, "m"),
            (1_000, "s"),
        ];
        for (size, suffix) in UNITS {
            if millis != 0 && millis % size == 0 {
                return write!(f, "{}{suffix}", millis / size);
            }
        }
        write!(f, "{millis}ms")
    }
}
