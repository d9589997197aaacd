use std::fmt;

use chrono::{Datelike, NaiveDate, Utc};

use crate::calendar::CalendarUtils;
use crate::context::ScheduleContext;
use crate::error::{Result, ScheduleError};
use crate::interval::{Interval, ScheduleResult};
use crate::schedule::{fmt_refinement, place_within, Placement, Refineable, Schedule};

/// One local date, or an inclusive range of dates, once.
#[derive(Debug)]
pub struct DateSchedule {
    from: NaiveDate,
    to: NaiveDate,
    refinement: Option<Box<dyn Schedule>>,
}

impl DateSchedule {
    pub fn on(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            refinement: None,
        }
    }

    fn interval(&self, context: &ScheduleContext) -> Result<Interval> {
        if self.to < self.from {
            return Err(ScheduleError::InvalidSchedule(format!(
                "{} is before {}",
                self.to, self.from
            )));
        }
        let after = self.to.succ_opt().ok_or(ScheduleError::OutOfRange {
            field: "date",
            value: i64::from(self.to.num_days_from_ce()),
        })?;
        let utils = CalendarUtils::new(context.date(), context.time_zone());
        Interval::try_new(
            utils.midnight(self.from).with_timezone(&Utc),
            utils.midnight(after).with_timezone(&Utc),
        )
    }

    fn evaluate(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        let interval = self.interval(context)?;
        let now = context.date();
        let Some(child) = self.refinement.as_deref() else {
            return Ok((now < interval.to()).then(|| ScheduleResult::new(interval)));
        };
        Ok(match place_within(self, &interval, child, context)? {
            Placement::Within(result) if now < result.to() => Some(result),
            _ => None,
        })
    }
}

impl Schedule for DateSchedule {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        self.evaluate(context).map_err(|e| e.in_schedule(self))
    }
}

impl Refineable for DateSchedule {
    fn refinement(&self) -> Option<&dyn Schedule> {
        self.refinement.as_deref()
    }

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>) {
        self.refinement = refinement;
    }
}

impl fmt::Display for DateSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "on {}", self.from)?;
        } else {
            write!(f, "from {} to {}", self.from, self.to)?;
        }
        fmt_refinement(f, self.refinement.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedules::DailySchedule;
    use chrono::{DateTime, NaiveTime, TimeZone};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn due_until_the_date_has_passed() {
        let schedule = DateSchedule::on(date(14));

        let before = schedule.next_due(&ScheduleContext::new(utc(12, 10))).unwrap().unwrap();
        assert_eq!(before.from(), utc(14, 0));
        assert_eq!(before.to(), utc(15, 0));

        let during = schedule.next_due(&ScheduleContext::new(utc(14, 10))).unwrap();
        assert_eq!(during, Some(before));

        assert_eq!(schedule.next_due(&ScheduleContext::new(utc(15, 0))).unwrap(), None);
    }

    #[test]
    fn range_is_inclusive() {
        let due = DateSchedule::between(date(10), date(12))
            .next_due(&ScheduleContext::new(utc(1, 0)))
            .unwrap()
            .unwrap();
        assert_eq!(due.from(), utc(10, 0));
        assert_eq!(due.to(), utc(13, 0));
    }

    #[test]
    fn refinement_walks_through_the_range() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let schedule =
            DateSchedule::between(date(10), date(11)).refined_by(DailySchedule::between(nine, ten));

        let first = schedule.next_due(&ScheduleContext::new(utc(1, 0))).unwrap().unwrap();
        assert_eq!(first.from(), utc(10, 9));

        let second = schedule
            .next_due(&ScheduleContext::new(first.use_next().unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(second.from(), utc(11, 9));

        let after = schedule.next_due(&ScheduleContext::new(second.use_next().unwrap()));
        assert_eq!(after.unwrap(), None);
    }

    #[test]
    fn reversed_range_is_an_error() {
        let err = DateSchedule::between(date(12), date(10))
            .next_due(&ScheduleContext::new(utc(1, 0)))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Evaluation { .. }));
    }
}
