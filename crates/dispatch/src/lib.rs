pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod progress;
pub mod shard;
pub mod sink;
pub mod slot;
pub mod source;

pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, TaskError};
pub use pool::{TaskCompletion, TaskFn, TaskHandle, TaskPool, WorkerPool};
pub use progress::{LogProgress, ProgressReporter, SilentProgress};
pub use shard::{ShardSpec, ShardedSource};
pub use sink::{ErrorRecord, ErrorSink};
pub use slot::{WorkerId, WorkerSlot};
pub use source::{IterSource, WorkItem, WorkSource};
