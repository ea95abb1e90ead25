//! Task queue errors.

use thiserror::Error;

/// Errors raised by the task queue.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Failed to load or write the queue file.
    #[error("Task queue persistence error: {0}")]
    Persist(String),

    /// Failed to encode or decode queued tasks.
    #[error("Task serialization error: {0}")]
    Serialization(String),

    /// No queued task has the given id.
    #[error("Unknown task id {0}")]
    UnknownTask(u64),
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::Serialization(e.to_string())
    }
}
