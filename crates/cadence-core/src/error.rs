use cadence_schedules::ScheduleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceError {
    /// Short error code for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
            CadenceError::Schedule(_) => "SCHEDULE_ERROR",
            CadenceError::JobNotFound { .. } => "JOB_NOT_FOUND",
            CadenceError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
