use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while building or evaluating a schedule.
///
/// "No further occurrence" is never an error: schedules report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// An interval whose end precedes its start.
    #[error("Invalid interval: {to} is before {from}")]
    InvalidInterval {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// The provided schedule definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A calendar designator outside the range its field allows.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    /// A calendar computation failed while evaluating `schedule`.
    #[error("Failed to evaluate [{schedule}]: {source}")]
    Evaluation {
        schedule: String,
        #[source]
        source: Box<ScheduleError>,
    },

    /// The refinement never lands inside its parent schedule.
    #[error("Refinement can never be satisfied: [{schedule}]")]
    Unsatisfiable { schedule: String },

    /// The name is not a known IANA time zone.
    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),
}

impl ScheduleError {
    /// Attach the display form of the schedule being evaluated.
    ///
    /// Errors that already name a schedule are passed through so the innermost
    /// (most specific) schedule is the one reported.
    pub fn in_schedule(self, schedule: &dyn std::fmt::Display) -> Self {
        match self {
            ScheduleError::Evaluation { .. } | ScheduleError::Unsatisfiable { .. } => self,
            other => ScheduleError::Evaluation {
                schedule: schedule.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
