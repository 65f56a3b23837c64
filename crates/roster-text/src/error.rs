//! Error types for text conversion

use chrono::NaiveDateTime;
use roster_model::ValidationError;

/// Date/time text could not be turned into an instant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// Neither the numeric nor the month-name form matched
    #[error("unparsable date/time: '{date}' '{time}'")]
    Unparsable { date: String, time: String },

    /// Wall-clock time skipped by a DST transition
    #[error("local time {0} does not exist in the configured zone")]
    NonexistentLocalTime(NaiveDateTime),
}

impl From<ScheduleError> for ValidationError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Unparsable { date, time } => ValidationError::UnparsableSchedule { date, time },
            ScheduleError::NonexistentLocalTime(naive) => ValidationError::UnparsableSchedule {
                date: naive.date().to_string(),
                time: naive.time().to_string(),
            },
        }
    }
}

/// Snapshot text could not be turned into a panel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    /// Nothing to parse
    #[error("snapshot text is empty")]
    EmptySnapshot,

    /// The `**Co:**` title line is missing
    #[error("snapshot has no title marker")]
    MissingTitle,
}
