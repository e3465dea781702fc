//! Work item sources.

/// One unit of work: an opaque payload tagged with its original position in
/// the input sequence.
///
/// The position drives sharding and failure context, never result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    pub position: usize,
    pub payload: T,
}

/// A pull-based sequence of work items.
///
/// Sources may be lazy (unknown length) or materialized. `remaining_hint`
/// feeds the progress total when the length is known and has no effect on
/// dispatch itself.
pub trait WorkSource {
    type Item;

    /// Pull the next item, or `None` once the source is exhausted.
    fn next_item(&mut self) -> Option<WorkItem<Self::Item>>;

    /// Items left to yield, if known.
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// Adapts any iterator into a [`WorkSource`], assigning positions in yield
/// order. Iterators with an exact size report a remaining hint.
pub struct IterSource<I> {
    iter: I,
    position: usize,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter, position: 0 }
    }
}

impl<T> IterSource<std::vec::IntoIter<T>> {
    /// Materialized source over a vector; the length is known upfront.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::new(items.into_iter())
    }
}

impl<I: Iterator> WorkSource for IterSource<I> {
    type Item = I::Item;

    fn next_item(&mut self) -> Option<WorkItem<I::Item>> {
        let payload = self.iter.next()?;
        let position = self.position;
        self.position += 1;
        Some(WorkItem { position, payload })
    }

    fn remaining_hint(&self) -> Option<usize> {
        match self.iter.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(lower),
            _ => None,
        }
    }
}
