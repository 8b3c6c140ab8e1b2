//! # SSTable reader
//!
//! Reads immutable, sorted, columnar table files without the database that
//! wrote them, and merges several of them into one time-consistent view.
//!
//! ## Layers
//! Reading is three nested lazy sequences, each pulled on demand:
//! partitions from a file ([`SSTable::scan`]), rows from a partition
//! ([`Partition`]), cells inside a row. A [`MergeIterator`] combines the
//! partition sequences of several files, resolving duplicates by
//! last-write-wins, and a [`Materializer`] turns the result into live rows
//! with decoded values.
//!
//! ```text
//! DataSource ─▶ SSTable::scan(range) ─┐
//! DataSource ─▶ SSTable::scan(range) ─┼─▶ MergeIterator ─▶ Materializer ─▶ rows
//! DataSource ─▶ SSTable::scan(range) ─┘
//! ```
//!
//! Data blocks are decompressed and checksummed one at a time as a scan
//! reaches them, so memory use is bounded by the block size regardless of
//! file or partition size.

pub mod bloom;
pub mod error;
pub mod iterator;
pub mod key;
pub mod materialize;
mod observability;
pub mod option;
pub mod schema;
pub mod sstable;
pub mod types;

pub use error::{Error, Result};
pub use iterator::{MergeIterator, Partition, PartitionIterator};
pub use key::{DecoratedKey, KeyCodec, Token, TokenRange};
pub use materialize::{
    MaterializedCell, MaterializedPartition, MaterializedRow, Materializer, count_rows,
};
pub use option::{ReadOptions, WriteOptions};
pub use schema::{ClusteringOrder, ColumnDef, ColumnRole, ColumnType, Schema, SchemaBuilder, Value};
pub use sstable::{
    Compression, DataSource, FORMAT_VERSION, SSTable, SSTableBuilder, SSTableScanner, Stats,
};
pub use types::{Cell, CellPayload, DeletionTime, Expiration, LivenessInfo, Row, RowKind};
