use chrono::NaiveDate;
use thiserror::Error;

use crate::task::ClockTime;

/// Rejections raised at the task creation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task text cannot be empty")]
    EmptyText,

    #[error("end time {end} must be later than start time {start}")]
    InvalidTimeRange { start: ClockTime, end: ClockTime },

    #[error("invalid clock time: {0} (expected HH:mm)")]
    InvalidClockTime(String),

    #[error("invalid date: {0} (expected yyyy-MM-dd)")]
    InvalidDate(String),

    #[error("unknown importance level: {0}")]
    UnknownImportance(String),

    #[error("task {id} not found on {date}")]
    TaskNotFound { id: u64, date: NaiveDate },
}
