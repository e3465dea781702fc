//! Progress reporting seam.
//!
//! The dispatcher notifies the reporter once per completed data item;
//! rendering stays outside the crate.

use tracing::info;

/// Collaborator notified once per completed data item, success or failure.
pub trait ProgressReporter: Send {
    /// Called once before any data task is submitted, with the expected item
    /// count when one is known.
    fn begin(&mut self, total: Option<usize>) {
        let _ = total;
    }

    /// Called exactly once per completed data item.
    fn tick(&mut self);

    /// Called once after the in-flight set drains.
    fn finish(&mut self) {}
}

/// Reports progress through `tracing`, every `every` completions and at the
/// end of the run. This is the default reporter.
pub struct LogProgress {
    every: usize,
    done: usize,
    total: Option<usize>,
}

impl LogProgress {
    /// Log a line every `every` completions (clamped to at least 1).
    pub fn every(every: usize) -> Self {
        Self {
            every: every.max(1),
            done: 0,
            total: None,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::every(100)
    }
}

impl ProgressReporter for LogProgress {
    fn begin(&mut self, total: Option<usize>) {
        self.total = total;
        match total {
            Some(total) => info!(total, "Processing data"),
            None => info!("Processing data"),
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        if self.done % self.every == 0 {
            match self.total {
                Some(total) => info!(done = self.done, total, "progress"),
                None => info!(done = self.done, "progress"),
            }
        }
    }

    fn finish(&mut self) {
        info!(done = self.done, "processing complete");
    }
}

/// Reporter that ignores every notification.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn tick(&mut self) {}
}
