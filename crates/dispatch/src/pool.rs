//! Worker pool seam and the default in-process pool.
//!
//! The dispatcher's only view of a pool is "submit a task, get a handle that
//! resolves to a result or failure". [`TaskPool`] is the batteries-included
//! implementation; anything that can honor the [`WorkerPool`] contract
//! (including a pool of real processes) can be swapped in.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TaskError;

/// A unit of work shipped to a pool worker.
///
/// Tasks must be self-contained: no shared mutable state is assumed, so the
/// same closure shape would survive a move to a process-backed pool.
pub type TaskFn = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// Completion side of a [`TaskHandle`], held by the pool.
///
/// Dropping it without calling [`complete`](Self::complete) resolves the
/// handle to a lost-worker failure.
pub struct TaskCompletion {
    tx: oneshot::Sender<Result<(), TaskError>>,
}

impl TaskCompletion {
    /// Deliver the task outcome. Ignores a dispatcher that went away.
    pub fn complete(self, outcome: Result<(), TaskError>) {
        let _ = self.tx.send(outcome);
    }
}

/// Resolves to the outcome of one submitted task. Never hangs: a worker that
/// disappears resolves the handle to a [`TaskError`].
pub struct TaskHandle {
    rx: oneshot::Receiver<Result<(), TaskError>>,
}

impl TaskHandle {
    /// Handle/completion pair for pool implementations.
    pub fn channel() -> (Self, TaskCompletion) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, TaskCompletion { tx })
    }

    /// Wait for the task to resolve.
    pub async fn wait(self) -> Result<(), TaskError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::new("worker dropped before reporting a result")),
        }
    }
}

/// A fixed-size pool of workers, each executing at most one task at a time.
pub trait WorkerPool {
    /// Hand `task` to the pool. Must not block the dispatcher's control
    /// task; backpressure is the dispatcher's job, not the pool's.
    fn submit(&mut self, task: TaskFn) -> TaskHandle;
}

type Job = (TaskFn, TaskCompletion);

/// Fixed-size in-process pool executing tasks on tokio's blocking thread
/// pool.
///
/// Workers pull from a shared queue, so a submitted task goes to whichever
/// worker frees up first; logical worker identities live entirely in the
/// dispatcher. Panics inside a task are captured and reported as task
/// failures.
pub struct TaskPool {
    tx: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn `num_workers` pool workers (at least one). Must be called from
    /// within a tokio runtime.
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        // Queue capacity == pool size: a dispatcher that honors the
        // in-flight bound can never fill it.
        let (tx, rx) = mpsc::channel(num_workers);
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..num_workers)
            .map(|n| {
                let rx = Arc::clone(&rx);
                tokio::spawn(worker_loop(n, rx))
            })
            .collect();
        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Close the queue and wait for every worker to drain and exit.
    ///
    /// Dropping the pool instead also closes the queue but does not wait.
    pub async fn shutdown(mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(n: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    debug!(worker = n, "pool worker started");
    loop {
        // The queue lock is held only while waiting for a job, never while
        // executing one.
        let job = rx.lock().await.recv().await;
        let Some((task, completion)) = job else { break };
        let outcome = match tokio::task::spawn_blocking(task).await {
            Ok(outcome) => outcome,
            Err(e) => Err(TaskError::new(format!("task panicked: {e}"))),
        };
        completion.complete(outcome);
    }
    debug!(worker = n, "pool worker stopped");
}

impl WorkerPool for TaskPool {
    fn submit(&mut self, task: TaskFn) -> TaskHandle {
        let (handle, completion) = TaskHandle::channel();
        match &self.tx {
            Some(tx) => {
                // The completion travels with the rejected job, so a full or
                // closed queue resolves the handle instead of hanging it.
                if tx.try_send((task, completion)).is_err() {
                    warn!("task rejected: pool queue full or shut down");
                }
            }
            None => warn!("task rejected: pool is shut down"),
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn executes_submitted_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = TaskPool::new(2);

        let handles: Vec<TaskHandle> = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .collect();
        for handle in handles {
            handle.wait().await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn task_failure_is_reported_not_swallowed() {
        let mut pool = TaskPool::new(1);
        let handle = pool.submit(Box::new(|| Err(TaskError::new("boom"))));
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.message(), "boom");
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_task_resolves_to_an_error() {
        let mut pool = TaskPool::new(1);
        let handle = pool.submit(Box::new(|| panic!("kaputt")));
        let err = handle.wait().await.unwrap_err();
        assert!(err.message().contains("panicked"), "got: {err}");

        // The worker survives the panic and keeps serving tasks.
        let handle = pool.submit(Box::new(|| Ok(())));
        assert!(handle.wait().await.is_ok());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn dropped_completion_resolves_the_handle() {
        let (handle, completion) = TaskHandle::channel();
        drop(completion);
        assert!(handle.wait().await.is_err());
    }
}
