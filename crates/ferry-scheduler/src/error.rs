use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task's cron string could not be parsed.
    #[error("Invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// A run ended in a task-level failure. Only ever logged.
    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
