use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iterator::reconcile::merge_rows;
use crate::iterator::{Partition, PartitionIterator, Poison, PoisonOnError, RowIter};
use crate::key::DecoratedKey;
use crate::observability::{log_debug, log_trace, log_warn};
use crate::schema::Schema;
use crate::types::{DeletionTime, Row};

/// Lookahead partition of one source, ordered for a min-heap.
#[derive(PartialEq, Eq)]
struct HeapEntry {
    key: DecoratedKey,
    source: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges several partition sources over the same table into one sorted,
/// deduplicated partition sequence.
///
/// - A partition held by one source is passed through unchanged.
/// - A partition held by several sources is merged: the partition deletion
///   is the newest one, rows are merged lazily by clustering order, and each
///   cell is resolved by last-write-wins (see [`reconcile`](super::reconcile)).
/// - Data shadowed by a deletion is dropped; the deletions themselves are
///   kept, so the output can be merged again with older data.
///
/// The first error from any source, at partition or row level, is yielded
/// once; after that the iterator is exhausted.
pub struct MergeIterator {
    sources: Vec<Box<dyn PartitionIterator>>,
    heads: Vec<Option<Partition>>,
    heap: BinaryHeap<HeapEntry>,
    /// Sources whose lookahead was consumed by the last yielded partition.
    refill: Vec<usize>,
    schema: Arc<Schema>,
    now: i32,
    poison: Poison,
    primed: bool,
    finished: bool,
    closed: bool,
}

impl MergeIterator {
    /// `now` is the current time in seconds, used to decide which expiring
    /// cells have become tombstones.
    pub fn new(sources: Vec<Box<dyn PartitionIterator>>, schema: Arc<Schema>, now: i32) -> Self {
        log_debug!(
            component = "merge",
            event = "merge_started",
            sources = sources.len(),
            now,
        );
        let heads = sources.iter().map(|_| None).collect();
        MergeIterator {
            sources,
            heads,
            heap: BinaryHeap::new(),
            refill: Vec::new(),
            schema,
            now,
            poison: Poison::default(),
            primed: false,
            finished: false,
            closed: false,
        }
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        match self.sources[source].next() {
            Some(Ok(partition)) => {
                self.heap.push(HeapEntry {
                    key: partition.decorated_key().clone(),
                    source,
                });
                self.heads[source] = Some(partition);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    fn next_partition(&mut self) -> Result<Option<Partition>> {
        if !self.primed {
            self.primed = true;
            self.refill = (0..self.sources.len()).collect();
        }
        for source in std::mem::take(&mut self.refill) {
            self.advance(source)?;
        }

        let Some(first) = self.heap.pop() else {
            return Ok(None);
        };
        let mut holders = vec![first.source];
        while self.heap.peek().is_some_and(|e| e.key == first.key) {
            if let Some(entry) = self.heap.pop() {
                holders.push(entry.source);
            }
        }
        holders.sort_unstable();

        let mut partitions: Vec<Partition> = holders
            .iter()
            .filter_map(|&source| self.heads[source].take())
            .collect();
        self.refill = holders;

        if partitions.len() == 1 {
            if let Some(partition) = partitions.pop() {
                let (key, deletion, static_row, rows) = partition.into_parts();
                let rows = PoisonOnError::wrap(rows, self.poison.clone());
                return Ok(Some(Partition::new(key, deletion, static_row, rows)));
            }
        }

        log_trace!(
            component = "merge",
            event = "merge_overlapping_partition",
            token = first.key.token.0,
            sources = partitions.len(),
        );

        let deletion = partitions
            .iter()
            .fold(DeletionTime::LIVE, |acc, p| acc.max(p.deletion()));
        let mut statics = Vec::new();
        let mut inputs = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let (_, _, static_row, rows) = partition.into_parts();
            statics.extend(static_row);
            inputs.push(rows);
        }
        let static_row = merge_rows(statics, deletion, self.now);
        let rows = MergedRows::new(inputs, Arc::clone(&self.schema), deletion, self.now);
        let rows = PoisonOnError::wrap(Box::new(rows), self.poison.clone());
        Ok(Some(Partition::new(first.key, deletion, static_row, rows)))
    }

    fn fail(&mut self, error: Error) -> Option<Result<Partition>> {
        log_warn!(component = "merge", event = "merge_error", error = %error);
        self.finished = true;
        self.poison.set();
        Some(Err(error))
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Partition>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.closed {
            return None;
        }
        if self.poison.is_set() {
            // A row-level error was already handed out by a partition.
            self.finished = true;
            return None;
        }
        match self.next_partition() {
            Ok(Some(partition)) => Some(Ok(partition)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => self.fail(e),
        }
    }
}

impl PartitionIterator for MergeIterator {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for source in &mut self.sources {
            source.close();
        }
        self.heads.clear();
        self.heap.clear();
        self.refill.clear();
    }
}

impl Drop for MergeIterator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lazy merge of the row sequences of one partition held by several sources.
struct MergedRows {
    inputs: Vec<RowIter>,
    heads: Vec<Option<Row>>,
    exhausted: Vec<bool>,
    schema: Arc<Schema>,
    deletion: DeletionTime,
    now: i32,
}

impl MergedRows {
    fn new(inputs: Vec<RowIter>, schema: Arc<Schema>, deletion: DeletionTime, now: i32) -> Self {
        let n = inputs.len();
        MergedRows {
            inputs,
            heads: (0..n).map(|_| None).collect(),
            exhausted: vec![false; n],
            schema,
            deletion,
            now,
        }
    }

    fn fill(&mut self) -> Result<()> {
        for i in 0..self.inputs.len() {
            if self.heads[i].is_some() || self.exhausted[i] {
                continue;
            }
            match self.inputs[i].next() {
                Some(Ok(row)) => self.heads[i] = Some(row),
                Some(Err(e)) => return Err(e),
                None => self.exhausted[i] = true,
            }
        }
        Ok(())
    }

    fn smallest_key(&self) -> Option<Vec<u8>> {
        let mut smallest: Option<&[u8]> = None;
        for row in self.heads.iter().flatten() {
            let key = row.clustering_key().unwrap_or_default();
            if smallest.is_none_or(|s| self.schema.compare_clustering(key, s) == Ordering::Less) {
                smallest = Some(key);
            }
        }
        smallest.map(<[u8]>::to_vec)
    }
}

impl Iterator for MergedRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(e) = self.fill() {
                return Some(Err(e));
            }
            let key = self.smallest_key()?;
            let schema = &self.schema;
            let versions: Vec<Row> = self
                .heads
                .iter_mut()
                .filter(|head| {
                    matches!(head, Some(row) if schema
                        .compare_clustering(row.clustering_key().unwrap_or_default(), &key)
                        == Ordering::Equal)
                })
                .filter_map(Option::take)
                .collect();
            if let Some(row) = merge_rows(versions, self.deletion, self.now) {
                return Some(Ok(row));
            }
        }
    }
}
