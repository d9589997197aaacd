use std::fmt;

use cadence_core::JobConfig;
use cadence_schedules::{Schedule, ScheduleResult};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to register a job with a [`Timer`](crate::Timer).
#[derive(Debug)]
pub struct JobSpec {
    pub name: String,
    pub schedule: Box<dyn Schedule>,
    pub time_zone: Tz,
    /// The job completes after this many firings.
    pub max_runs: Option<u32>,
    /// Evaluate the first occurrence from here instead of from "now".
    pub resume_from: Option<DateTime<Utc>>,
}

impl JobSpec {
    /// A UTC job with no run limit.
    pub fn new(name: impl Into<String>, schedule: impl Schedule + 'static) -> Self {
        Self {
            name: name.into(),
            schedule: Box::new(schedule),
            time_zone: Tz::UTC,
            max_runs: None,
            resume_from: None,
        }
    }

    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn resuming_from(mut self, at: DateTime<Utc>) -> Self {
        self.resume_from = Some(at);
        self
    }

    /// Build the schedule a configured job describes.
    pub fn from_config(job: &JobConfig, default_zone: Tz) -> cadence_core::Result<Self> {
        Ok(Self {
            name: job.name.clone(),
            schedule: job.schedule.build()?,
            time_zone: job.time_zone(default_zone)?,
            max_runs: job.max_runs,
            resume_from: job.resume_from,
        })
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its current interval to start.
    Pending,
    /// No further occurrences, or `max_runs` reached.
    Completed,
    /// The schedule returned an error.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Bookkeeping for one registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub id: Uuid,
    pub name: String,
    /// Display form of the schedule.
    pub schedule: String,
    pub time_zone: String,
    pub status: JobStatus,
    /// The interval the job is waiting on (or is inside of).
    pub current: Option<ScheduleResult>,
    pub last_fired: Option<DateTime<Utc>>,
    pub run_count: u32,
    /// Intervals dropped because they ended before the timer saw them.
    pub missed_count: u32,
    pub max_runs: Option<u32>,
}

/// A job's interval became due.
#[derive(Debug, Clone, Serialize)]
pub struct Firing {
    pub job_id: Uuid,
    pub name: String,
    pub interval: ScheduleResult,
    pub fired_at: DateTime<Utc>,
    /// The interval had already ended when it fired (catch-up).
    pub late: bool,
}
