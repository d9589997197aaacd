//! `cadence-timer`: drives schedules against the wall clock.
//!
//! # Overview
//!
//! A [`Timer`] holds named jobs, each a schedule plus the zone it is
//! evaluated in. Every tick it checks which jobs have a due interval, emits a
//! [`Firing`] for each, and advances the job to its use-next marker. Firings
//! are returned from [`Timer::tick`] and, when a channel is attached, sent
//! with `try_send` so the loop never blocks on a slow consumer.
//!
//! # Job lifecycle
//!
//! | Status      | Meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | `pending`   | Has a current interval and waits for it to start          |
//! | `completed` | No further occurrences, or `max_runs` reached             |
//! | `failed`    | The schedule raised an error while being re-evaluated     |

pub mod error;
pub mod timer;
pub mod types;

pub use error::{Result, TimerError};
pub use timer::Timer;
pub use types::{Firing, JobSpec, JobState, JobStatus};
