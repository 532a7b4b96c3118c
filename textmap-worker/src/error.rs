//! Task execution error taxonomy
//!
//! Three outcomes matter to the worker loop: the task finished, the task is
//! waiting on something external (retry with delay), or the task failed.
//! `NotReady` is expected control flow and is never logged as an error.

use thiserror::Error;

/// Result of one task execution attempt
pub type TaskResult = std::result::Result<TaskOutcome, TaskError>;

/// Successful execution outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Task finished; the worker submits the chained next task
    Done,
    /// Task finished but the chain must not advance (cooperative stop)
    Halted,
}

/// Why a task execution attempt did not complete
#[derive(Error, Debug)]
pub enum TaskError {
    /// External dependency not satisfied yet; the worker resubmits the same
    /// task with the configured fixed delay
    #[error("external dependency not completed")]
    NotReady,

    /// Task parameters failed validation against the declared schema;
    /// fails fast, never retried
    #[error("invalid task parameters: {0}")]
    InvalidParameters(String),

    /// Deterministic failure: re-executing the same task against the same
    /// state cannot succeed, so the retry budget is skipped and the message
    /// is dead-lettered on the first attempt
    #[error(transparent)]
    Unrecoverable(anyhow::Error),

    /// Any other execution failure; subject to the bounded retry policy
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl From<textmap_common::Error> for TaskError {
    fn from(err: textmap_common::Error) -> Self {
        match err {
            textmap_common::Error::InvalidParameters(msg) => TaskError::InvalidParameters(msg),
            // Too few texts stays too few texts no matter how often the
            // task re-runs
            err @ textmap_common::Error::InsufficientData { .. } => {
                TaskError::Unrecoverable(err.into())
            }
            other => TaskError::Fatal(other.into()),
        }
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(err: sqlx::Error) -> Self {
        TaskError::Fatal(err.into())
    }
}
