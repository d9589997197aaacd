use std::fmt;
use std::iter::FusedIterator;

use chrono::{DateTime, Utc};

use crate::context::ScheduleContext;
use crate::error::{Result, ScheduleError};
use crate::interval::{one_millis_after, Interval, ScheduleResult};

/// Bound on the parent/child search so a refinement that can never fit
/// inside its parent fails instead of spinning.
const MAX_REFINEMENT_STEPS: usize = 1_000;

/// Something that can say when it is next due.
///
/// Implementations keep no state between calls; everything needed to resume
/// travels in the [`ScheduleContext`] and the returned [`ScheduleResult`].
pub trait Schedule: Send + Sync + fmt::Debug + fmt::Display {
    /// The interval that is due at, or next due after, the context's date.
    ///
    /// `Ok(None)` means there are no further occurrences.
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>>;
}

impl<S: Schedule + ?Sized> Schedule for Box<S> {
    fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
        (**self).next_due(context)
    }
}

/// A schedule whose intervals can be narrowed by a single child schedule.
pub trait Refineable {
    fn refinement(&self) -> Option<&dyn Schedule>;

    fn set_refinement(&mut self, refinement: Option<Box<dyn Schedule>>);

    fn refined_by(mut self, refinement: impl Schedule + 'static) -> Self
    where
        Self: Sized,
    {
        self.set_refinement(Some(Box::new(refinement)));
        self
    }
}

pub(crate) fn fmt_refinement(
    f: &mut fmt::Formatter<'_>,
    refinement: Option<&dyn Schedule>,
) -> fmt::Result {
    match refinement {
        Some(child) => write!(f, " refined by [{child}]"),
        None => Ok(()),
    }
}

/// Where a child schedule's occurrence falls relative to a parent interval.
#[derive(Debug)]
pub(crate) enum Placement {
    /// The child is due inside the parent; the result is already limited.
    Within(ScheduleResult),
    /// The child's next occurrence starts after the parent has ended.
    After(DateTime<Utc>),
    /// The child has no further occurrences.
    Exhausted,
}

/// Find the child's occurrence inside `parent`.
///
/// The child is queried at the context date, or at the parent's start when the
/// parent lies in the future, with `parent` attached to its context. Child
/// occurrences that started before the parent belong to an earlier parent
/// cycle and are stepped over.
pub(crate) fn place_within(
    owner: &dyn fmt::Display,
    parent: &Interval,
    child: &dyn Schedule,
    context: &ScheduleContext,
) -> Result<Placement> {
    let mut child_context = context.spawn(context.date().max(parent.from()), *parent);
    for _ in 0..MAX_REFINEMENT_STEPS {
        let Some(candidate) = child.next_due(&child_context)? else {
            return Ok(Placement::Exhausted);
        };
        if candidate.from() < parent.from() {
            match candidate.use_next() {
                Some(next) if next > child_context.date() => {
                    child_context = child_context.move_to(next);
                    continue;
                }
                _ => return Ok(Placement::Exhausted),
            }
        }
        return Ok(match parent.limit(candidate.interval()) {
            Some(limited) => {
                let use_next = candidate
                    .use_next()
                    .or_else(|| one_millis_after(parent.inclusive_end()));
                Placement::Within(ScheduleResult::with_use_next(limited, use_next))
            }
            None => Placement::After(candidate.from()),
        });
    }
    Err(ScheduleError::Unsatisfiable {
        schedule: owner.to_string(),
    })
}

/// Refine a sequence of parent intervals, starting at `first`, until the child
/// lands inside one of them.
///
/// `parent_at` yields the parent interval due at (or next due after) a
/// context's date.
pub(crate) fn refine_forward<F>(
    owner: &dyn fmt::Display,
    context: &ScheduleContext,
    child: &dyn Schedule,
    first: Interval,
    mut parent_at: F,
) -> Result<Option<ScheduleResult>>
where
    F: FnMut(&ScheduleContext) -> Result<Option<Interval>>,
{
    let mut parent = first;
    for _ in 0..MAX_REFINEMENT_STEPS {
        match place_within(owner, &parent, child, context)? {
            Placement::Within(result) => return Ok(Some(result)),
            Placement::Exhausted => return Ok(None),
            Placement::After(child_from) => {
                let Some(after_parent) = one_millis_after(parent.inclusive_end()) else {
                    return Ok(None);
                };
                match parent_at(&context.move_to(child_from.max(after_parent)))? {
                    Some(next) => parent = next,
                    None => return Ok(None),
                }
            }
        }
    }
    Err(ScheduleError::Unsatisfiable {
        schedule: owner.to_string(),
    })
}

/// Successive occurrences of a schedule, each query starting at the previous
/// result's use-next marker.
///
/// Ends at the first absence or error, or when a marker fails to move time
/// forward.
#[derive(Debug)]
pub struct Occurrences<'a> {
    schedule: &'a dyn Schedule,
    context: Option<ScheduleContext>,
}

impl<'a> Occurrences<'a> {
    pub fn new(schedule: &'a dyn Schedule, context: ScheduleContext) -> Self {
        Self {
            schedule,
            context: Some(context),
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Result<ScheduleResult>;

    fn next(&mut self) -> Option<Self::Item> {
        let context = self.context.take()?;
        match self.schedule.next_due(&context) {
            Ok(Some(result)) => {
                self.context = context
                    .advance(&result)
                    .filter(|next| next.date() > context.date());
                Some(Ok(result))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl FusedIterator for Occurrences<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Due every whole hour, for `hours` hours starting at `start`.
    #[derive(Debug)]
    struct Hourly {
        start: DateTime<Utc>,
        hours: i64,
    }

    impl fmt::Display for Hourly {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "hourly x{}", self.hours)
        }
    }

    impl Schedule for Hourly {
        fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
            let elapsed = (context.date() - self.start).num_hours().max(0);
            if elapsed >= self.hours {
                return Ok(None);
            }
            let from = self.start + Duration::hours(elapsed);
            Ok(Some(ScheduleResult::new(Interval::new(
                from,
                from + Duration::hours(1),
            ))))
        }
    }

    #[derive(Debug)]
    struct Stuck;

    impl fmt::Display for Stuck {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "stuck")
        }
    }

    impl Schedule for Stuck {
        fn next_due(&self, context: &ScheduleContext) -> Result<Option<ScheduleResult>> {
            let date = context.date();
            Ok(Some(ScheduleResult::with_use_next(Interval::at(date), Some(date))))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()
    }

    #[test]
    fn occurrences_follow_use_next_until_absent() {
        let schedule = Hourly {
            start: start(),
            hours: 3,
        };
        let froms: Vec<_> = Occurrences::new(&schedule, ScheduleContext::new(start()))
            .map(|r| r.unwrap().from())
            .collect();
        assert_eq!(
            froms,
            vec![start(), start() + Duration::hours(1), start() + Duration::hours(2)]
        );
    }

    #[test]
    fn occurrences_stop_when_use_next_does_not_advance() {
        let results: Vec<_> = Occurrences::new(&Stuck, ScheduleContext::new(start())).collect();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn boxed_schedules_delegate() {
        let boxed: Box<dyn Schedule> = Box::new(Hourly {
            start: start(),
            hours: 1,
        });
        let due = boxed.next_due(&ScheduleContext::new(start())).unwrap().unwrap();
        assert_eq!(due.from(), start());
        assert_eq!(boxed.to_string(), "hourly x1");
    }

    #[test]
    fn child_outside_every_parent_is_unsatisfiable() {
        let child = Hourly {
            start: start(),
            hours: 1_000_000,
        };
        // Parents are the first millisecond of each hour offset by 30 minutes,
        // so a whole-hour child never starts inside one.
        let half_past = |date: DateTime<Utc>| {
            let base = Utc
                .with_ymd_and_hms(2024, 6, 12, 9, 30, 0)
                .unwrap();
            let hours = (date - base).num_hours().max(0) + 1;
            Interval::at(base + Duration::hours(hours))
        };
        let context = ScheduleContext::new(start());
        let err = refine_forward(&"owner", &context, &child, half_past(start()), |c| {
            Ok(Some(half_past(c.date())))
        })
        .unwrap_err();
        assert_eq!(
            err,
            ScheduleError::Unsatisfiable {
                schedule: "owner".to_string()
            }
        );
    }
}
