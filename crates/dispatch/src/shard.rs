//! Deterministic position-modulo sharding of a work source.

use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;
use crate::source::{WorkItem, WorkSource};

/// One shard of a fixed partitioning, parsed from an external `"idx/total"`
/// spec (1-based index) and stored 0-based.
///
/// Shard `k` of `total` owns every position `p` with `p % total == k - 1`,
/// so shard sizes differ by at most one and the remainder lands on the
/// lowest-numbered shards. Concatenating shards `1..=total` over the same
/// ordering reconstructs the original sequence exactly once per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    index: usize,
    total: usize,
}

impl ShardSpec {
    /// Build from the external 1-based index; `index` must lie in
    /// `[1, total]`.
    pub fn new(index: usize, total: usize) -> Result<Self, DispatchError> {
        if total == 0 {
            return Err(DispatchError::Config(
                "shard total must be greater than zero".into(),
            ));
        }
        if index == 0 || index > total {
            return Err(DispatchError::Config(format!(
                "shard index {index} out of range 1..={total}"
            )));
        }
        Ok(Self {
            index: index - 1,
            total,
        })
    }

    /// 0-based shard index.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn contains(&self, position: usize) -> bool {
        position % self.total == self.index
    }

    /// Number of items this shard receives out of `n` total.
    pub fn expected_len(&self, n: usize) -> usize {
        n / self.total + usize::from(self.index < n % self.total)
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

impl FromStr for ShardSpec {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, total) = s.split_once('/').ok_or_else(|| {
            DispatchError::Config(format!("invalid shard spec '{s}', expected 'idx/total'"))
        })?;
        let index = index.trim().parse::<usize>().map_err(|e| {
            DispatchError::Config(format!("invalid shard index in '{s}': {e}"))
        })?;
        let total = total.trim().parse::<usize>().map_err(|e| {
            DispatchError::Config(format!("invalid shard total in '{s}': {e}"))
        })?;
        Self::new(index, total)
    }
}

/// Restricts a source to the positions owned by one shard.
///
/// Positions of yielded items are the inner source's original positions.
pub struct ShardedSource<S> {
    inner: S,
    spec: ShardSpec,
}

impl<S: WorkSource> ShardedSource<S> {
    pub fn new(inner: S, spec: ShardSpec) -> Self {
        Self { inner, spec }
    }
}

impl<S: WorkSource> WorkSource for ShardedSource<S> {
    type Item = S::Item;

    fn next_item(&mut self) -> Option<WorkItem<S::Item>> {
        loop {
            let item = self.inner.next_item()?;
            if self.spec.contains(item.position) {
                return Some(item);
            }
        }
    }

    /// Exact before the first pull; afterwards an estimate, since skipped
    /// positions are no longer visible.
    fn remaining_hint(&self) -> Option<usize> {
        self.inner
            .remaining_hint()
            .map(|n| self.spec.expected_len(n))
    }
}
