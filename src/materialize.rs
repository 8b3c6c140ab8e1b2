//! Turns stored rows into what a query would see: live, non-expired cells
//! with decoded values.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iterator::{Partition, RowIter};
use crate::key::Token;
use crate::schema::{ColumnRole, Schema, Value};
use crate::types::{DeletionTime, Expiration, Row, RowKind};

/// A live cell with its value decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedCell {
    pub column: String,
    pub timestamp: i64,
    pub expiration: Option<Expiration>,
    /// Serialized value as stored.
    pub raw: Vec<u8>,
    pub value: Value,
}

/// A resolved row. Static rows have no clustering values.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow {
    pub clustering: Vec<Value>,
    /// Sorted by column name.
    pub cells: Vec<MaterializedCell>,
}

impl MaterializedRow {
    pub fn cell(&self, column: &str) -> Option<&MaterializedCell> {
        self.cells.iter().find(|c| c.column == column)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.cell(column).map(|c| &c.value)
    }
}

/// A partition with its key decoded and its rows resolved lazily.
pub struct MaterializedPartition {
    key: Vec<Value>,
    token: Token,
    static_row: Option<MaterializedRow>,
    rows: MaterializedRows,
}

impl MaterializedPartition {
    /// Decoded partition-key values, in declaration order.
    pub fn partition_key(&self) -> &[Value] {
        &self.key
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn static_row(&self) -> Option<&MaterializedRow> {
        self.static_row.as_ref()
    }
}

impl Iterator for MaterializedPartition {
    type Item = Result<MaterializedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

/// Resolves rows against a point in time.
///
/// Tombstones, expired cells (expiration time `<= now`) and anything
/// shadowed by the partition or row deletion are dropped. A clustering row is
/// kept if its primary-key liveness is live or it has a live cell; a static
/// row only if it has a live cell.
#[derive(Clone)]
pub struct Materializer {
    schema: Arc<Schema>,
    now: i32,
}

impl Materializer {
    pub fn new(schema: Arc<Schema>, now: i32) -> Self {
        Materializer { schema, now }
    }

    pub fn materialize(&self, partition: Partition) -> Result<MaterializedPartition> {
        let (key, deletion, static_row, rows) = partition.into_parts();
        let values = self.schema.decode_partition_key(&key.key)?;
        let static_row = match static_row {
            Some(row) => self.materialize_row(row, deletion)?,
            None => None,
        };
        Ok(MaterializedPartition {
            key: values,
            token: key.token,
            static_row,
            rows: MaterializedRows {
                inner: rows,
                materializer: self.clone(),
                deletion,
                done: false,
            },
        })
    }

    /// Resolve one row under `partition_deletion`; `None` if nothing in it is
    /// live.
    pub fn materialize_row(
        &self,
        row: Row,
        partition_deletion: DeletionTime,
    ) -> Result<Option<MaterializedRow>> {
        let (clustering, role) = match &row.kind {
            RowKind::Static => (Vec::new(), ColumnRole::Static),
            RowKind::Clustering(key) => (self.schema.decode_clustering(key)?, ColumnRole::Regular),
        };
        let deletion = row.deletion.max(partition_deletion);

        let mut cells = Vec::with_capacity(row.cells.len());
        for cell in row.cells {
            let Some(def) = self.schema.column(&cell.column) else {
                return Err(Error::SchemaMismatch(format!("unknown column {}", cell.column)));
            };
            if def.role != role {
                return Err(Error::SchemaMismatch(format!(
                    "column {} is {:?}, found in a {:?} row",
                    cell.column, def.role, role
                )));
            }
            if deletion.deletes(cell.timestamp) || !cell.is_live(self.now) {
                continue;
            }
            let expiration = cell.expiration();
            let raw = cell.value().map(<[u8]>::to_vec).unwrap_or_default();
            let value = def.column_type.decode(&raw).map_err(|e| {
                Error::SchemaMismatch(format!(
                    "column {} does not hold a {}: {e}",
                    cell.column, def.column_type
                ))
            })?;
            cells.push(MaterializedCell {
                column: cell.column,
                timestamp: cell.timestamp,
                expiration,
                raw,
                value,
            });
        }

        let primary_key_live = role == ColumnRole::Regular
            && row
                .liveness
                .is_some_and(|l| l.is_live(self.now) && !deletion.deletes(l.timestamp));
        if cells.is_empty() && !primary_key_live {
            return Ok(None);
        }
        Ok(Some(MaterializedRow { clustering, cells }))
    }
}

struct MaterializedRows {
    inner: RowIter,
    materializer: Materializer,
    deletion: DeletionTime,
    done: bool,
}

impl Iterator for MaterializedRows {
    type Item = Result<MaterializedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let row = match self.inner.next()? {
                Ok(row) => row,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match self.materializer.materialize_row(row, self.deletion) {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Number of live clustering rows across a partition stream.
pub fn count_rows<I>(partitions: I, materializer: &Materializer) -> Result<u64>
where
    I: IntoIterator<Item = Result<Partition>>,
{
    let mut count = 0;
    for partition in partitions {
        for row in materializer.materialize(partition?)? {
            row?;
            count += 1;
        }
    }
    Ok(count)
}
