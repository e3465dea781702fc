//! Per-item failure capture.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::TaskError;

/// One recorded failure. Appended, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Original sequence position of the failed item.
    pub position: usize,
    /// Failure text as reported by the worker.
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Captures per-item failures without affecting control flow.
///
/// Every failure is logged through `tracing`; if a persistence path is
/// configured, one line of the form `Error in worker: <message>` is appended
/// per failure. Appends happen only on the dispatcher's control task, so the
/// file needs no cross-task synchronization. Nothing here ever propagates —
/// a failed append is itself only logged.
pub struct ErrorSink {
    records: Vec<ErrorRecord>,
    log: Option<File>,
}

impl ErrorSink {
    /// Sink that records failures in memory only.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            log: None,
        }
    }

    /// Sink that additionally appends one line per failure to `path`.
    ///
    /// The file is created if missing and opened in append mode, so shards
    /// of the same run may share a path across invocations.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            records: Vec::new(),
            log: Some(log),
        })
    }

    /// Record one failure.
    pub fn record(&mut self, position: usize, failure: &TaskError) {
        error!(position, error = %failure, "Error in worker");
        if let Some(log) = &mut self.log {
            if let Err(e) = writeln!(log, "Error in worker: {failure}") {
                warn!(error = %e, "failed to append to error log");
            }
        }
        self.records.push(ErrorRecord {
            position,
            message: failure.message().to_string(),
            at: Utc::now(),
        });
    }

    /// All failures recorded so far, in completion order.
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::new()
    }
}
