use cadence_core::{CadenceConfig, TimerConfig};
use cadence_schedules::{Schedule, ScheduleContext, ScheduleResult, START_OF_TIME};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, TimerError},
    types::{Firing, JobSpec, JobState, JobStatus},
};

struct Job {
    state: JobState,
    schedule: Box<dyn Schedule>,
    time_zone: Tz,
    /// When this job was last polled, or registered live.
    last_poll: Option<DateTime<Utc>>,
}

impl Job {
    fn context(&self, at: DateTime<Utc>) -> ScheduleContext {
        ScheduleContext::new(at).with_time_zone(self.time_zone)
    }

    /// Re-evaluate the schedule from `at`, updating status and current interval.
    fn evaluate(&mut self, at: DateTime<Utc>) {
        match self.schedule.next_due(&self.context(at)) {
            Ok(Some(due)) => self.state.current = Some(due),
            Ok(None) => self.complete("no further occurrences"),
            Err(e) => {
                self.state.current = None;
                self.state.status = JobStatus::Failed;
                error!(job_id = %self.state.id, name = %self.state.name, "schedule evaluation failed: {e}");
            }
        }
    }

    fn complete(&mut self, reason: &str) {
        self.state.current = None;
        self.state.status = JobStatus::Completed;
        info!(job_id = %self.state.id, name = %self.state.name, reason, "job completed");
    }

    /// Latest end an interval can have and still count as missed at `now`:
    /// the previous poll, or `grace` before `now` if that is later.
    fn missed_cutoff(&self, now: DateTime<Utc>, grace: Duration) -> DateTime<Utc> {
        let slack = now.checked_sub_signed(grace).unwrap_or(START_OF_TIME);
        self.last_poll.map_or(slack, |last| last.max(slack))
    }

    fn is_missed(&self, due: &ScheduleResult, now: DateTime<Utc>, grace: Duration) -> bool {
        due.to() <= self.missed_cutoff(now, grace)
    }

    /// Fire the current interval if it has started. At most one firing per
    /// call, so a long backlog is caught up one interval per tick.
    ///
    /// An interval is missed once it ended before the previous poll or more
    /// than `grace` ago. A point interval that falls between two regular
    /// ticks is neither, so it still fires on time.
    fn poll(&mut self, now: DateTime<Utc>, skip_missed: bool, grace: Duration) -> Option<Firing> {
        if self.state.status != JobStatus::Pending {
            return None;
        }
        let cutoff = self.missed_cutoff(now, grace);
        self.last_poll = Some(now);
        let mut due = self.state.current?;
        if due.from() > now {
            return None;
        }

        if skip_missed && due.to() <= cutoff {
            self.state.missed_count += 1;
            warn!(job_id = %self.state.id, name = %self.state.name, interval = %due.interval(), "missed interval skipped");
            self.evaluate(now);
            due = match self.state.current {
                Some(next) if self.state.status == JobStatus::Pending && next.from() <= now => next,
                _ => return None,
            };
        }

        let late = due.to() <= cutoff;
        self.state.run_count += 1;
        self.state.last_fired = Some(now);
        info!(
            job_id = %self.state.id,
            name = %self.state.name,
            run = self.state.run_count,
            late,
            interval = %due.interval(),
            "job due"
        );
        self.advance(&due);

        Some(Firing {
            job_id: self.state.id,
            name: self.state.name.clone(),
            interval: due,
            fired_at: now,
            late,
        })
    }

    fn advance(&mut self, fired: &ScheduleResult) {
        if self
            .state
            .max_runs
            .is_some_and(|max| self.state.run_count >= max)
        {
            self.complete("max runs reached");
            return;
        }
        let Some(next) = fired.use_next() else {
            self.complete("no use-next marker");
            return;
        };
        self.evaluate(next);
        if self.state.current.as_ref() == Some(fired) {
            self.complete("schedule did not advance");
        }
    }
}

/// Drives a set of jobs against the clock.
pub struct Timer {
    config: TimerConfig,
    jobs: Vec<Job>,
    /// If set, every firing is also sent here.
    fired_tx: Option<mpsc::Sender<Firing>>,
}

impl Timer {
    /// Create an empty timer.
    ///
    /// Pass `Some(tx)` to receive a copy of every [`Firing`] via mpsc.
    /// The sender is non-blocking (`try_send`) so the tick loop is never stalled.
    pub fn new(config: TimerConfig, fired_tx: Option<mpsc::Sender<Firing>>) -> Self {
        Self {
            config,
            jobs: Vec::new(),
            fired_tx,
        }
    }

    /// Create a timer holding every enabled job of `config`, evaluated from `now`.
    pub fn from_config(
        config: &CadenceConfig,
        fired_tx: Option<mpsc::Sender<Firing>>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let default_zone = config.time_zone()?;
        let mut timer = Self::new(config.timer.clone(), fired_tx);
        for job in config.jobs.iter().filter(|job| job.enabled) {
            timer.add_job(JobSpec::from_config(job, default_zone)?, now)?;
        }
        Ok(timer)
    }

    /// Register a job, evaluating its first interval from `resume_from` or
    /// `now`. A schedule with no occurrences is registered as completed.
    pub fn add_job(&mut self, spec: JobSpec, now: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let start = spec.resume_from.unwrap_or(now);
        let context = ScheduleContext::new(start).with_time_zone(spec.time_zone);
        let current = spec.schedule.next_due(&context)?;

        let status = match (&current, spec.max_runs) {
            (_, Some(0)) | (None, _) => JobStatus::Completed,
            (Some(_), _) => JobStatus::Pending,
        };
        let state = JobState {
            id,
            name: spec.name,
            schedule: spec.schedule.to_string(),
            time_zone: spec.time_zone.name().to_string(),
            status,
            current: current.filter(|_| status == JobStatus::Pending),
            last_fired: None,
            run_count: 0,
            missed_count: 0,
            max_runs: spec.max_runs,
        };
        info!(job_id = %id, name = %state.name, schedule = %state.schedule, %status, "job added");

        self.jobs.push(Job {
            state,
            schedule: spec.schedule,
            time_zone: spec.time_zone,
            // a resumed job may owe intervals from before `now`
            last_poll: spec.resume_from.is_none().then_some(now),
        });
        Ok(id)
    }

    /// Remove a job by ID, returning its final state.
    pub fn remove_job(&mut self, id: Uuid) -> Result<JobState> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.state.id == id)
            .ok_or(TimerError::JobNotFound { id })?;
        let job = self.jobs.remove(index);
        info!(job_id = %id, name = %job.state.name, "job removed");
        Ok(job.state)
    }

    pub fn job(&self, id: Uuid) -> Result<&JobState> {
        self.jobs
            .iter()
            .map(|job| &job.state)
            .find(|state| state.id == id)
            .ok_or(TimerError::JobNotFound { id })
    }

    /// All jobs in registration order.
    pub fn jobs(&self) -> impl Iterator<Item = &JobState> {
        self.jobs.iter().map(|job| &job.state)
    }

    /// Fire every job whose current interval has started by `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Firing> {
        let skip_missed = self.config.skip_missed_runs;
        let grace = self.grace();
        let fired: Vec<Firing> = self
            .jobs
            .iter_mut()
            .filter_map(|job| job.poll(now, skip_missed, grace))
            .collect();

        // Forward to the consumer (non-blocking).
        if let Some(ref tx) = self.fired_tx {
            for firing in &fired {
                if tx.try_send(firing.clone()).is_err() {
                    warn!(job_id = %firing.job_id, "firing channel full or closed, firing dropped");
                }
            }
        }
        fired
    }

    /// Main event loop. Ticks every `tick_ms` until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.jobs.len(), tick_ms = self.config.tick_ms, "timer started");
        self.report_missed_on_startup(Utc::now());

        let period = std::time::Duration::from_millis(self.config.tick_ms.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("timer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Two tick periods, so one delayed tick does not turn a firing late.
    fn grace(&self) -> Duration {
        let period = i64::try_from(self.config.tick_ms.max(1)).unwrap_or(i64::MAX / 2);
        Duration::milliseconds(period.saturating_mul(2))
    }

    fn report_missed_on_startup(&self, now: DateTime<Utc>) {
        let grace = self.grace();
        let missed = self
            .jobs
            .iter()
            .filter(|job| job.state.status == JobStatus::Pending)
            .filter(|job| {
                job.state
                    .current
                    .is_some_and(|due| job.is_missed(&due, now, grace))
            })
            .count();
        if missed > 0 {
            if self.config.skip_missed_runs {
                warn!(count = missed, "jobs with missed intervals will be skipped");
            } else {
                warn!(count = missed, "jobs with missed intervals will fire late");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_schedules::{
        DailySchedule, DateSchedule, IntervalSchedule, NowSchedule, Refineable, ScheduleError,
        WeeklySchedule,
    };
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Weekday};
    use std::fmt;

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    fn office_hours() -> DailySchedule {
        DailySchedule::between(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
    }

    fn timer(skip_missed_runs: bool) -> Timer {
        Timer::new(
            TimerConfig {
                skip_missed_runs,
                ..TimerConfig::default()
            },
            None,
        )
    }

    #[test]
    fn fires_once_per_interval() {
        let mut timer = timer(false);
        let id = timer
            .add_job(JobSpec::new("office", office_hours()), utc(12, 8, 0))
            .unwrap();

        assert!(timer.tick(utc(12, 8, 30)).is_empty());

        let fired = timer.tick(utc(12, 9, 0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].job_id, id);
        assert_eq!(fired[0].interval.from(), utc(12, 9, 0));
        assert!(!fired[0].late);

        assert!(timer.tick(utc(12, 10, 0)).is_empty());
        assert_eq!(timer.job(id).unwrap().current.unwrap().from(), utc(13, 9, 0));
        assert_eq!(timer.tick(utc(13, 9, 0)).len(), 1);
        assert_eq!(timer.job(id).unwrap().run_count, 2);
    }

    #[test]
    fn in_progress_interval_fires_immediately() {
        let mut timer = timer(false);
        timer
            .add_job(JobSpec::new("office", office_hours()), utc(12, 12, 0))
            .unwrap();
        let fired = timer.tick(utc(12, 12, 0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].interval.from(), utc(12, 9, 0));
    }

    #[test]
    fn missed_intervals_fire_late_one_per_tick() {
        let mut timer = timer(false);
        let spec = JobSpec::new("office", office_hours()).resuming_from(utc(10, 0, 0));
        let id = timer.add_job(spec, utc(12, 18, 0)).unwrap();

        let now = utc(12, 18, 0);
        let froms: Vec<_> = (0..3)
            .flat_map(|_| timer.tick(now))
            .map(|firing| {
                assert!(firing.late);
                firing.interval.from()
            })
            .collect();
        assert_eq!(froms, vec![utc(10, 9, 0), utc(11, 9, 0), utc(12, 9, 0)]);
        assert!(timer.tick(now).is_empty());
        assert_eq!(timer.job(id).unwrap().missed_count, 0);
    }

    #[test]
    fn missed_intervals_are_skipped_when_configured() {
        let mut timer = timer(true);
        let spec = JobSpec::new("office", office_hours()).resuming_from(utc(10, 0, 0));
        let id = timer.add_job(spec, utc(12, 12, 0)).unwrap();

        let fired = timer.tick(utc(12, 12, 0));
        assert_eq!(fired.len(), 1);
        assert!(!fired[0].late);
        assert_eq!(fired[0].interval.from(), utc(12, 9, 0));
        assert_eq!(timer.job(id).unwrap().missed_count, 1);
    }

    #[test]
    fn point_intervals_between_ticks_fire_on_time() {
        let mut timer = timer(true);
        let at_ten = DailySchedule::at(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let id = timer.add_job(JobSpec::new("standup", at_ten), utc(12, 0, 0)).unwrap();

        // One tick per second, each landing 347ms past the second.
        let mut fired = Vec::new();
        let mut now = utc(12, 0, 0) + Duration::milliseconds(347);
        while now < utc(15, 0, 0) {
            fired.extend(timer.tick(now));
            now += Duration::seconds(1);
        }

        let froms: Vec<_> = fired.iter().map(|firing| firing.interval.from()).collect();
        assert_eq!(froms, vec![utc(12, 10, 0), utc(13, 10, 0), utc(14, 10, 0)]);
        assert!(fired.iter().all(|firing| !firing.late));
        let state = timer.job(id).unwrap();
        assert_eq!(state.missed_count, 0);
        assert_eq!(state.run_count, 3);
    }

    #[test]
    fn point_intervals_are_late_after_the_timer_stalls() {
        let mut timer = timer(false);
        let at_ten = DailySchedule::at(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        timer.add_job(JobSpec::new("standup", at_ten), utc(12, 0, 0)).unwrap();

        assert!(timer.tick(utc(12, 9, 59)).is_empty());
        assert!(!timer.tick(utc(12, 10, 0) + Duration::milliseconds(347))[0].late);
        assert!(timer.tick(utc(13, 9, 59)).is_empty());
        assert!(!timer.tick(utc(13, 10, 0) + Duration::milliseconds(500))[0].late);
        // The timer stalls through 10:00 on the 14th.
        assert!(timer.tick(utc(14, 11, 0))[0].late);
    }

    #[test]
    fn max_runs_completes_the_job() {
        let mut timer = timer(false);
        let spec = JobSpec::new("poll", IntervalSchedule::new(Duration::minutes(1))).with_max_runs(2);
        let id = timer.add_job(spec, utc(12, 10, 0)).unwrap();

        assert_eq!(timer.tick(utc(12, 10, 0)).len(), 1);
        assert_eq!(timer.tick(utc(12, 10, 1)).len(), 1);
        assert!(timer.tick(utc(12, 10, 2)).is_empty());

        let state = timer.job(id).unwrap();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.run_count, 2);
        assert!(state.current.is_none());
    }

    #[test]
    fn now_fires_once_then_completes() {
        let mut timer = timer(false);
        let id = timer.add_job(JobSpec::new("once", NowSchedule), utc(12, 10, 0)).unwrap();
        assert_eq!(timer.tick(utc(12, 10, 0)).len(), 1);
        assert_eq!(timer.job(id).unwrap().status, JobStatus::Completed);
        assert!(timer.tick(utc(12, 11, 0)).is_empty());
    }

    #[test]
    fn past_dates_are_registered_as_completed() {
        let mut timer = timer(false);
        let past = DateSchedule::on(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let id = timer.add_job(JobSpec::new("past", past), utc(12, 10, 0)).unwrap();
        assert_eq!(timer.job(id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn refined_schedules_carry_their_zone() {
        let mut timer = timer(false);
        let schedule = WeeklySchedule::on(Weekday::Wed).refined_by(office_hours());
        let spec = JobSpec::new("tokyo", schedule).with_time_zone(chrono_tz::Asia::Tokyo);
        let id = timer.add_job(spec, utc(11, 12, 0)).unwrap();

        let state = timer.job(id).unwrap();
        assert_eq!(state.time_zone, "Asia/Tokyo");
        // Wednesday 09:00 in Tokyo is Wednesday 00:00 UTC.
        assert_eq!(state.current.unwrap().from(), utc(12, 0, 0));
    }

    #[derive(Debug)]
    struct BreaksAfter(DateTime<Utc>);

    impl fmt::Display for BreaksAfter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "breaks after {}", self.0)
        }
    }

    impl Schedule for BreaksAfter {
        fn next_due(
            &self,
            context: &ScheduleContext,
        ) -> cadence_schedules::Result<Option<ScheduleResult>> {
            if context.date() > self.0 {
                return Err(ScheduleError::InvalidSchedule("broken".into()));
            }
            IntervalSchedule::new(Duration::hours(1)).next_due(context)
        }
    }

    #[test]
    fn evaluation_errors_fail_the_job() {
        let mut timer = timer(false);
        let id = timer
            .add_job(JobSpec::new("fragile", BreaksAfter(utc(12, 10, 0))), utc(12, 10, 0))
            .unwrap();
        assert_eq!(timer.tick(utc(12, 10, 0)).len(), 1);
        assert_eq!(timer.job(id).unwrap().status, JobStatus::Failed);
        assert!(timer.tick(utc(12, 12, 0)).is_empty());
    }

    #[test]
    fn first_evaluation_errors_are_returned() {
        let mut timer = timer(false);
        let err = timer
            .add_job(JobSpec::new("fragile", BreaksAfter(utc(1, 0, 0))), utc(12, 10, 0))
            .unwrap_err();
        assert!(matches!(err, TimerError::Schedule(_)));
        assert_eq!(timer.jobs().count(), 0);
    }

    #[test]
    fn firings_are_sent_to_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = Timer::new(TimerConfig::default(), Some(tx));
        timer.add_job(JobSpec::new("once", NowSchedule), utc(12, 10, 0)).unwrap();
        timer.tick(utc(12, 10, 0));
        let firing = rx.try_recv().unwrap();
        assert_eq!(firing.name, "once");
    }

    #[test]
    fn remove_unknown_job() {
        let mut timer = timer(false);
        let id = Uuid::new_v4();
        assert!(matches!(
            timer.remove_job(id),
            Err(TimerError::JobNotFound { id: missing }) if missing == id
        ));
    }

    #[test]
    fn from_config_skips_disabled_jobs() {
        let config = CadenceConfig::from_toml_str(
            r#"
[[jobs]]
name = "on"
schedule = { kind = "now" }

[[jobs]]
name = "off"
enabled = false
schedule = { kind = "now" }
"#,
        )
        .unwrap();
        let timer = Timer::from_config(&config, None, utc(12, 10, 0)).unwrap();
        let names: Vec<_> = timer.jobs().map(|state| state.name.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }
}
