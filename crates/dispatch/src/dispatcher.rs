//! The dispatch control loop.
//!
//! A single cooperative task drives the whole run: it fills the in-flight
//! set, suspends until the next completion, records the outcome, resubmits,
//! and repeats until the source is exhausted and the in-flight set is empty.
//! Backpressure is structural — there are never more than `num_workers`
//! outstanding tasks, and a replacement is only submitted once a slot frees.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, TaskError};
use crate::pool::WorkerPool;
use crate::progress::{LogProgress, ProgressReporter};
use crate::shard::{ShardSpec, ShardedSource};
use crate::sink::ErrorSink;
use crate::slot::{Assignment, WorkerId, WorkerSlot};
use crate::source::{WorkItem, WorkSource};

type ProcessFn<T> = Arc<dyn Fn(WorkerSlot, T) -> Result<(), TaskError> + Send + Sync>;
type InitFn = Arc<dyn Fn(WorkerId) -> Result<(), TaskError> + Send + Sync>;

// ── Builder ─────────────────────────────────────────────────────────

/// Fluent builder for [`Dispatcher`].
pub struct DispatcherBuilder<T> {
    config: DispatchConfig,
    process: Option<ProcessFn<T>>,
    init: Option<InitFn>,
    sink: Option<ErrorSink>,
    progress: Option<Box<dyn ProgressReporter>>,
}

impl<T: Send + 'static> DispatcherBuilder<T> {
    /// Set the per-item processing function, executed on a pool worker.
    ///
    /// The slot identifies the logical worker the task is routed through;
    /// successful results are discarded.
    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(WorkerSlot, T) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.process = Some(Arc::new(f));
        self
    }

    /// Set the one-shot per-slot initialization function.
    ///
    /// Its presence selects the ephemeral-init assignment variant: one init
    /// task per identity `0..num_workers-1` runs to completion before any
    /// data task, and an init failure aborts the run.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(WorkerId) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
        self
    }

    /// Supply an [`ErrorSink`] instead of having `build` derive one from the
    /// config's `error_path`.
    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the default [`LogProgress`] reporter.
    pub fn progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Some(Box::new(reporter));
        self
    }

    /// Validate the configuration and assemble the dispatcher.
    ///
    /// Fails fast — before any task submission — on a zero-sized pool, a
    /// malformed shard spec, a missing process function, or an unopenable
    /// error-log path.
    pub fn build(self) -> Result<Dispatcher<T>, DispatchError> {
        let shard = self.config.validate()?;
        let process = self
            .process
            .ok_or_else(|| DispatchError::Config("a process function is required".into()))?;
        let sink = match (self.sink, &self.config.error_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => ErrorSink::with_path(path)?,
            (None, None) => ErrorSink::new(),
        };
        Ok(Dispatcher {
            config: self.config,
            shard,
            process,
            init: self.init,
            sink,
            progress: self
                .progress
                .unwrap_or_else(|| Box::new(LogProgress::default())),
        })
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Drives every item of a work source to completion over a fixed-size
/// worker pool, keeping at most `num_workers` tasks in flight.
///
/// Exactly one task is created per yielded item; data-task failures are
/// isolated into the [`ErrorSink`] while the run continues.
pub struct Dispatcher<T> {
    config: DispatchConfig,
    shard: Option<ShardSpec>,
    process: ProcessFn<T>,
    init: Option<InitFn>,
    sink: ErrorSink,
    progress: Box<dyn ProgressReporter>,
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("shard", &self.shard)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for one in-flight data task.
struct DataTask {
    slot: WorkerSlot,
    position: usize,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn builder(config: DispatchConfig) -> DispatcherBuilder<T> {
        DispatcherBuilder {
            config,
            process: None,
            init: None,
            sink: None,
            progress: None,
        }
    }

    /// Failures recorded during the most recent run.
    pub fn sink(&self) -> &ErrorSink {
        &self.sink
    }

    /// Drive `source` to exhaustion over `pool`, returning only once every
    /// submitted task has resolved.
    ///
    /// Per-item failures do not fail the run; an initialization failure
    /// aborts it immediately without draining outstanding tasks. A
    /// configured `split` restricts the run to that shard of the source.
    pub async fn run<S, P>(&mut self, source: S, pool: &mut P) -> Result<(), DispatchError>
    where
        S: WorkSource<Item = T>,
        P: WorkerPool,
    {
        match self.shard {
            Some(spec) => self.run_inner(ShardedSource::new(source, spec), pool).await,
            None => self.run_inner(source, pool).await,
        }
    }

    async fn run_inner<S, P>(&mut self, mut source: S, pool: &mut P) -> Result<(), DispatchError>
    where
        S: WorkSource<Item = T>,
        P: WorkerPool,
    {
        let run_id = Uuid::new_v4();
        let num_workers = self.config.num_workers;
        info!(%run_id, num_workers, shard = ?self.shard, "dispatch started");

        if let Some(init) = self.init.clone() {
            self.initialize_workers(&init, pool, run_id).await?;
        }

        let total = self.progress_total(&source);
        self.progress.begin(total);

        let mut assignment = if self.init.is_some() {
            Assignment::round_robin(num_workers)
        } else {
            Assignment::sticky(num_workers)
        };

        let mut in_flight = FuturesUnordered::new();
        let mut completed: usize = 0;

        // Fill the in-flight set up to the pool size.
        while in_flight.len() < num_workers {
            match source.next_item() {
                Some(item) => {
                    let slot = assignment.first_fill();
                    in_flight.push(submit_data(pool, &self.process, slot, item));
                }
                None => break,
            }
        }

        // Drain completions, resubmitting one item per freed slot until the
        // source is exhausted.
        while let Some((task, outcome)) = in_flight.next().await {
            completed += 1;
            self.progress.tick();
            match outcome {
                Ok(()) => {
                    debug!(%run_id, position = task.position, worker = %task.slot, "item processed")
                }
                Err(failure) => self.sink.record(task.position, &failure),
            }
            if let Some(item) = source.next_item() {
                let slot = assignment.reassign(task.slot);
                in_flight.push(submit_data(pool, &self.process, slot, item));
            }
        }

        self.progress.finish();
        info!(%run_id, completed, failed = self.sink.len(), "dispatch complete");
        Ok(())
    }

    /// Run the one-shot initialization task class to completion.
    ///
    /// Identities `0..num_workers-1`, one task each, all resolved before any
    /// data task is submitted. The first failure aborts the run without
    /// draining the remaining handles.
    async fn initialize_workers<P: WorkerPool>(
        &self,
        init: &InitFn,
        pool: &mut P,
        run_id: Uuid,
    ) -> Result<(), DispatchError> {
        let mut pending = FuturesUnordered::new();
        for raw in 0..self.config.num_workers {
            let worker = WorkerId::new(raw as u32);
            let f = Arc::clone(init);
            let handle = pool.submit(Box::new(move || f(worker)));
            pending.push(async move { (worker, handle.wait().await) });
        }
        while let Some((worker, outcome)) = pending.next().await {
            outcome.map_err(|source| DispatchError::Init { worker, source })?;
            debug!(%run_id, worker = %worker, "worker initialized");
        }
        Ok(())
    }

    /// Expected data-task count for the progress reporter, if known.
    ///
    /// An explicit `data_count` (adjusted to the configured shard) wins over
    /// the source's own hint.
    fn progress_total<S: WorkSource>(&self, source: &S) -> Option<usize> {
        match (self.config.data_count, self.shard) {
            (Some(n), Some(spec)) => Some(spec.expected_len(n)),
            (Some(n), None) => Some(n),
            (None, _) => source.remaining_hint(),
        }
    }
}

/// Submit one data task and pair its handle with its bookkeeping.
fn submit_data<T, P>(
    pool: &mut P,
    process: &ProcessFn<T>,
    slot: WorkerSlot,
    item: WorkItem<T>,
) -> impl Future<Output = (DataTask, Result<(), TaskError>)>
where
    T: Send + 'static,
    P: WorkerPool,
{
    let position = item.position;
    let payload = item.payload;
    let f = Arc::clone(process);
    let handle = pool.submit(Box::new(move || f(slot, payload)));
    async move { (DataTask { slot, position }, handle.wait().await) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{TaskFn, TaskHandle};
    use crate::source::IterSource;
    use std::sync::Mutex;

    /// Pool that runs every task inline on the control thread, resolving the
    /// handle before `submit` returns. Keeps loop tests deterministic.
    struct InlinePool;

    impl WorkerPool for InlinePool {
        fn submit(&mut self, task: TaskFn) -> TaskHandle {
            let (handle, completion) = TaskHandle::channel();
            completion.complete(task());
            handle
        }
    }

    #[derive(Debug, PartialEq)]
    enum Event {
        Init(u32),
        Data(usize),
    }

    #[tokio::test]
    async fn build_requires_a_process_fn() {
        let err = Dispatcher::<usize>::builder(DispatchConfig::new(2))
            .build()
            .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[tokio::test]
    async fn build_rejects_bad_split_before_any_submission() {
        let err = Dispatcher::<usize>::builder(DispatchConfig::new(2).with_split("5/2"))
            .process(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[tokio::test]
    async fn sticky_ids_stay_within_the_pool() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut dispatcher = Dispatcher::builder(DispatchConfig::new(2))
            .process(move |slot, item: usize| {
                sink.lock().unwrap().push((slot.id.get(), item));
                Ok(())
            })
            .build()
            .unwrap();

        dispatcher
            .run(IterSource::from_vec((0..6).collect()), &mut InlinePool)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        let mut ids: Vec<u32> = seen.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn init_tasks_resolve_before_any_data_task() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let init_events = Arc::clone(&events);
        let data_events = Arc::clone(&events);
        let mut dispatcher = Dispatcher::builder(DispatchConfig::new(3))
            .init(move |worker| {
                init_events.lock().unwrap().push(Event::Init(worker.get()));
                Ok(())
            })
            .process(move |_, item: usize| {
                data_events.lock().unwrap().push(Event::Data(item));
                Ok(())
            })
            .build()
            .unwrap();

        dispatcher
            .run(IterSource::from_vec((0..5).collect()), &mut InlinePool)
            .await
            .unwrap();

        let events = events.lock().unwrap();
        let mut init_ids: Vec<u32> = events
            .iter()
            .take(3)
            .map(|e| match e {
                Event::Init(id) => *id,
                Event::Data(_) => panic!("data task ran before initialization finished"),
            })
            .collect();
        init_ids.sort_unstable();
        assert_eq!(init_ids, vec![0, 1, 2]);
        assert_eq!(events.len(), 8);
    }

    #[tokio::test]
    async fn init_failure_aborts_without_data_tasks() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&processed);
        let mut dispatcher = Dispatcher::builder(DispatchConfig::new(2))
            .init(|worker| {
                if worker.get() == 1 {
                    Err(TaskError::new("no device"))
                } else {
                    Ok(())
                }
            })
            .process(move |_, item: usize| {
                sink.lock().unwrap().push(item);
                Ok(())
            })
            .build()
            .unwrap();

        let err = dispatcher
            .run(IterSource::from_vec((0..4).collect()), &mut InlinePool)
            .await
            .unwrap_err();

        match err {
            DispatchError::Init { worker, source } => {
                assert_eq!(worker.get(), 1);
                assert_eq!(source.message(), "no device");
            }
            other => panic!("expected Init error, got {other}"),
        }
        assert!(processed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded_and_the_run_continues() {
        let mut dispatcher = Dispatcher::builder(DispatchConfig::new(2))
            .process(|_, item: usize| {
                if item == 3 {
                    Err(TaskError::new("Dummy error for testing"))
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap();

        dispatcher
            .run(IterSource::from_vec((0..5).collect()), &mut InlinePool)
            .await
            .unwrap();

        let records = dispatcher.sink().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].position, 3);
        assert_eq!(records[0].message, "Dummy error for testing");
    }

    #[tokio::test]
    async fn split_restricts_the_run_to_one_shard() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&processed);
        let mut dispatcher = Dispatcher::builder(
            DispatchConfig::new(2).with_split("2/2").with_data_count(10),
        )
        .process(move |_, item: usize| {
            sink.lock().unwrap().push(item);
            Ok(())
        })
        .build()
        .unwrap();

        dispatcher
            .run(IterSource::from_vec((0..10).collect()), &mut InlinePool)
            .await
            .unwrap();

        let mut processed = processed.lock().unwrap().clone();
        processed.sort_unstable();
        assert_eq!(processed, vec![1, 3, 5, 7, 9]);
    }
}
