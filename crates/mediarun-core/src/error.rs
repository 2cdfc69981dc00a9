//! Core domain errors.

use thiserror::Error;

/// Core domain errors for mediarun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task record was submitted with no log content.
    #[error("Log is empty")]
    EmptyLog,
}
