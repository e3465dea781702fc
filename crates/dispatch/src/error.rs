use thiserror::Error;

use crate::slot::WorkerId;

/// Errors that abort a dispatch run, either before any task is submitted
/// (configuration) or during the initialization phase.
///
/// Per-item failures never surface here — they are routed to the
/// [`ErrorSink`](crate::ErrorSink) and the run continues.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("worker {worker} failed to initialize: {source}")]
    Init { worker: WorkerId, source: TaskError },

    #[error("error log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure raised by a single task.
///
/// Carries the failure as text only: outcomes cross the worker boundary the
/// same way they would cross a process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure text as reported by the worker.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
