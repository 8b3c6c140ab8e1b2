pub mod merge;
pub mod reconcile;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::key::{DecoratedKey, Token};
use crate::types::{DeletionTime, Row};

pub use merge::MergeIterator;

/// Lazy sequence of clustering rows backing a partition.
pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// One partition: its key, partition-level deletion, static row, and a lazy
/// sequence of clustering rows in clustering order.
///
/// The rows are decoded as the partition is iterated; dropping a partition
/// part-way through costs nothing further.
pub struct Partition {
    key: DecoratedKey,
    deletion: DeletionTime,
    static_row: Option<Row>,
    rows: RowIter,
}

impl Partition {
    pub fn new(
        key: DecoratedKey,
        deletion: DeletionTime,
        static_row: Option<Row>,
        rows: RowIter,
    ) -> Self {
        Partition {
            key,
            deletion,
            static_row,
            rows,
        }
    }

    pub fn decorated_key(&self) -> &DecoratedKey {
        &self.key
    }

    /// The encoded partition key.
    pub fn key(&self) -> &[u8] {
        &self.key.key
    }

    pub fn token(&self) -> Token {
        self.key.token
    }

    pub fn deletion(&self) -> DeletionTime {
        self.deletion
    }

    pub fn static_row(&self) -> Option<&Row> {
        self.static_row.as_ref()
    }

    pub fn into_parts(self) -> (DecoratedKey, DeletionTime, Option<Row>, RowIter) {
        (self.key, self.deletion, self.static_row, self.rows)
    }
}

impl Iterator for Partition {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("key", &self.key)
            .field("deletion", &self.deletion)
            .field("static_row", &self.static_row)
            .finish_non_exhaustive()
    }
}

/// A source of partitions in ascending `DecoratedKey` order.
///
/// Single-file scanners and merge iterators both implement this, so merges
/// compose: a merge can take other merges as inputs.
pub trait PartitionIterator: Iterator<Item = Result<Partition>> + Send {
    /// Release the underlying resources. Idempotent; iteration afterwards
    /// yields nothing.
    fn close(&mut self);
}

impl<I: PartitionIterator + ?Sized> PartitionIterator for Box<I> {
    fn close(&mut self) {
        (**self).close();
    }
}

/// Failure flag shared between an iterator and the row sequences it hands
/// out, so an error deep inside a partition also ends the outer iteration.
#[derive(Clone, Default, Debug)]
pub(crate) struct Poison(Arc<AtomicBool>);

impl Poison {
    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Wraps a row sequence so the first error it yields poisons the owner.
pub(crate) struct PoisonOnError {
    inner: RowIter,
    poison: Poison,
    done: bool,
}

impl PoisonOnError {
    pub(crate) fn wrap(inner: RowIter, poison: Poison) -> RowIter {
        Box::new(PoisonOnError {
            inner,
            poison,
            done: false,
        })
    }
}

impl Iterator for PoisonOnError {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Err(e)) => {
                self.done = true;
                self.poison.set();
                Some(Err(e))
            }
            None => {
                self.done = true;
                None
            }
            item => item,
        }
    }
}
