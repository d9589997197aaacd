use std::fmt;

use crate::context::ScheduleContext;
use crate::error::Result;
use crate::interval::ScheduleResult;
use crate::schedule::Schedule;

/// The union of several schedules: due whenever any member is.
///
/// Each query returns the member result that starts first; on a tie the
/// member added first wins.
#[derive(Debug, Default)]
pub struct ScheduleList {
    schedules: Vec<Box<dyn Schedule>>,
}

impl ScheduleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, schedule: impl Schedule + 'static) -> Self {
        self.schedules.push(Box::new(schedule));
        self
    }

    pub fn push(&mut self, schedule: Box<dyn Schedule>) {
        self.schedules.push(schedule);
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Schedule> {
        self.schedules.iter().map(|s| s.as_ref())
    }
}

impl FromIterator<Box<dyn Schedule>> for ScheduleList {
    fn from_iter<I: IntoIterator<Item = Box<dyn Schedule>>>(iter: I) -> Self {
        Self {
            schedules: iter.into_iter().collect(),
        }
    }
}

impl Schedule for ScheduleList {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        let mut earliest: Option<ScheduleResult> = None;
        for schedule in &self.schedules {
            let Some(candidate) = schedule.next_due(context)? else {
                continue;
            };
            let replaces = earliest
                .as_ref()
                .map_or(true, |best| candidate.interval().is_before(best.interval()));
            if replaces {
                earliest = Some(candidate);
            }
        }
        Ok(earliest)
    }
}

impl fmt::Display for ScheduleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any of [")?;
        for (i, schedule) in self.schedules.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{schedule}")?;
        }
        f.write_str("]")
    }
}
