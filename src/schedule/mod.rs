//! Recurring captures through cron

pub mod cron;
pub mod store;

pub use cron::{cron_expression, RecordType, ScheduleEntry, ScheduleRequest};
pub use store::{CronTable, FileCrontab, ScheduleStore, UserCrontab};

use thiserror::Error;

/// Errors from schedule management
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid schedule: {0}")]
    InvalidRequest(String),

    #[error("Schedule already exists: {0}")]
    Duplicate(String),

    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Crontab error: {0}")]
    Crontab(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
