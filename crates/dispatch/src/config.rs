//! Dispatch run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::shard::ShardSpec;

/// Configuration for one dispatch run.
///
/// Validated fail-fast when the dispatcher is built — a malformed shard spec
/// or zero-sized pool is rejected before any task is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Size of the worker pool. Must be greater than zero.
    pub num_workers: usize,

    /// Known item total, used for progress totals only (counted before
    /// sharding; the dispatcher adjusts it to the configured shard).
    #[serde(default)]
    pub data_count: Option<usize>,

    /// File that receives one appended line per failed item.
    #[serde(default)]
    pub error_path: Option<PathBuf>,

    /// Shard spec `"idx/total"` (1-based) restricting the run to one
    /// partition of the input.
    #[serde(default)]
    pub split: Option<String>,
}

impl DispatchConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            data_count: None,
            error_path: None,
            split: None,
        }
    }

    pub fn with_data_count(mut self, count: usize) -> Self {
        self.data_count = Some(count);
        self
    }

    pub fn with_error_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    /// Validate the config and resolve the shard spec.
    pub(crate) fn validate(&self) -> Result<Option<ShardSpec>, DispatchError> {
        if self.num_workers == 0 {
            return Err(DispatchError::Config(
                "num_workers must be greater than zero".into(),
            ));
        }
        self.split.as_deref().map(str::parse).transpose()
    }
}
