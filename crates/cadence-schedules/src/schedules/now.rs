use std::fmt;

use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::{Interval, ScheduleResult};
use crate::schedule::Schedule;

/// Due once, at the moment it is asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NowSchedule;

impl Schedule for NowSchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        Ok(Some(ScheduleResult::with_use_next(
            Interval::at(context.date()),
            None,
        )))
    }
}

impl fmt::Display for NowSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("now")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn point_at_now_with_nothing_after() {
        let now = Utc.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap();
        let due = NowSchedule
            .next_due(&ScheduleContext::new(now))
            .unwrap()
            .unwrap();
        assert_eq!(due.interval(), &Interval::at(now));
        assert_eq!(due.use_next(), None);
    }
}
