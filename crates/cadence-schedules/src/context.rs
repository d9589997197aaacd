use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};
use crate::interval::{Interval, ScheduleResult};

/// Parse an IANA time zone name such as `"Europe/London"`.
pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimeZone(name.to_string()))
}

/// Everything a schedule needs to answer "when are you next due?".
///
/// Immutable: producing the context for a subsequent query is the caller's
/// job, usually via [`ScheduleContext::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleContext {
    date: DateTime<Utc>,
    time_zone: Tz,
    /// The enclosing schedule's interval when evaluated as a refinement.
    parent_interval: Option<Interval>,
}

impl ScheduleContext {
    /// A UTC context at `date`.
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            time_zone: Tz::UTC,
            parent_interval: None,
        }
    }

    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// The reference instant ("now").
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// The reference instant in the context's time zone.
    pub fn local_date(&self) -> DateTime<Tz> {
        self.date.with_timezone(&self.time_zone)
    }

    pub fn parent_interval(&self) -> Option<&Interval> {
        self.parent_interval.as_ref()
    }

    /// Same zone and parent, different reference instant.
    pub fn move_to(&self, date: DateTime<Utc>) -> Self {
        Self {
            date,
            time_zone: self.time_zone,
            parent_interval: self.parent_interval,
        }
    }

    /// Context for evaluating a refinement inside `parent`.
    pub fn spawn(&self, date: DateTime<Utc>, parent: Interval) -> Self {
        Self {
            date,
            time_zone: self.time_zone,
            parent_interval: Some(parent),
        }
    }

    /// The context that yields the occurrence following `result`, or `None`
    /// if the result carries no use-next marker.
    pub fn advance(&self, result: &ScheduleResult) -> Option<Self> {
        result.use_next().map(|next| self.move_to(next))
    }
}
