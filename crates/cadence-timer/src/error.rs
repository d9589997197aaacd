use cadence_core::CadenceError;
use cadence_schedules::ScheduleError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Core(#[from] CadenceError),

    #[error("Job not found: {id}")]
    JobNotFound { id: Uuid },
}

pub type Result<T> = std::result::Result<T, TimerError>;
