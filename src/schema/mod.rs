//! Table metadata: key columns, static and regular columns.

pub mod column;

use std::cmp::Ordering;
use std::collections::HashMap;

pub use column::{ColumnType, Value};

use crate::error::{Error, Result};
use crate::key::KeyCodec;

/// Where a column lives in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

/// Declared sort direction of a clustering column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringOrder {
    #[default]
    Asc,
    Desc,
}

/// One column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub role: ColumnRole,
    /// Only meaningful for clustering columns.
    pub order: ClusteringOrder,
}

/// Immutable description of one table.
///
/// Built once per table and shared by reference (`Arc<Schema>`) with every
/// scanner, merge iterator and materializer opened against it.
#[derive(Debug, Clone)]
pub struct Schema {
    keyspace: String,
    table: String,
    partition_key: Vec<ColumnDef>,
    clustering: Vec<ColumnDef>,
    columns: HashMap<String, ColumnDef>,
}

impl Schema {
    pub fn builder(keyspace: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key: Vec::new(),
            clustering: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Partition-key columns in declaration order.
    pub fn partition_key_columns(&self) -> &[ColumnDef] {
        &self.partition_key
    }

    /// Clustering columns in declaration order.
    pub fn clustering_columns(&self) -> &[ColumnDef] {
        &self.clustering
    }

    /// Look up any column (key, static or regular) by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    pub fn has_static_columns(&self) -> bool {
        self.columns.values().any(|c| c.role == ColumnRole::Static)
    }

    /// Static and regular columns, sorted by name.
    pub fn value_columns(&self) -> Vec<&ColumnDef> {
        let mut cols: Vec<_> = self
            .columns
            .values()
            .filter(|c| matches!(c.role, ColumnRole::Static | ColumnRole::Regular))
            .collect();
        cols.sort_by(|a, b| a.name.cmp(&b.name));
        cols
    }

    /// Compare two encoded clustering keys by the declared column comparators.
    ///
    /// Keys that cannot be split into components compare as raw bytes, which
    /// keeps the ordering total; decoding reports the malformation separately.
    pub fn compare_clustering(&self, a: &[u8], b: &[u8]) -> Ordering {
        let n = self.clustering.len();
        let (Ok(left), Ok(right)) = (KeyCodec::split(a, n), KeyCodec::split(b, n)) else {
            return a.cmp(b);
        };
        for ((col, l), r) in self.clustering.iter().zip(left).zip(right) {
            let ord = col.column_type.compare(l, r);
            let ord = match col.order {
                ClusteringOrder::Asc => ord,
                ClusteringOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Encode partition-key values into the stored key form.
    pub fn encode_partition_key(&self, values: &[Value]) -> Result<Vec<u8>> {
        KeyCodec::encode(values, &self.partition_key)
    }

    /// Encode clustering values into the stored key form.
    pub fn encode_clustering(&self, values: &[Value]) -> Result<Vec<u8>> {
        KeyCodec::encode(values, &self.clustering)
    }

    pub fn decode_partition_key(&self, key: &[u8]) -> Result<Vec<Value>> {
        KeyCodec::decode(key, &self.partition_key)
    }

    pub fn decode_clustering(&self, key: &[u8]) -> Result<Vec<Value>> {
        KeyCodec::decode(key, &self.clustering)
    }
}

/// Accumulates column definitions and validates them into a `Schema`.
pub struct SchemaBuilder {
    keyspace: String,
    table: String,
    partition_key: Vec<ColumnDef>,
    clustering: Vec<ColumnDef>,
    columns: Vec<ColumnDef>,
}

impl SchemaBuilder {
    pub fn partition_key(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.partition_key.push(ColumnDef {
            name: name.into(),
            column_type,
            role: ColumnRole::PartitionKey,
            order: ClusteringOrder::Asc,
        });
        self
    }

    pub fn clustering(self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.clustering_with_order(name, column_type, ClusteringOrder::Asc)
    }

    pub fn clustering_with_order(
        mut self,
        name: impl Into<String>,
        column_type: ColumnType,
        order: ClusteringOrder,
    ) -> Self {
        self.clustering.push(ColumnDef {
            name: name.into(),
            column_type,
            role: ColumnRole::Clustering,
            order,
        });
        self
    }

    pub fn static_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
            role: ColumnRole::Static,
            order: ClusteringOrder::Asc,
        });
        self
    }

    pub fn regular_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
            role: ColumnRole::Regular,
            order: ClusteringOrder::Asc,
        });
        self
    }

    pub fn build(self) -> Result<Schema> {
        if self.partition_key.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "table {}.{} needs at least one partition key column",
                self.keyspace, self.table
            )));
        }
        if self.clustering.is_empty() && self.columns.iter().any(|c| c.role == ColumnRole::Static)
        {
            return Err(Error::InvalidArgument(
                "static columns require at least one clustering column".into(),
            ));
        }

        let mut columns = HashMap::new();
        let all = self
            .partition_key
            .iter()
            .chain(&self.clustering)
            .chain(&self.columns);
        for col in all {
            if columns.insert(col.name.clone(), col.clone()).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate column {}",
                    col.name
                )));
            }
        }

        Ok(Schema {
            keyspace: self.keyspace,
            table: self.table,
            partition_key: self.partition_key,
            clustering: self.clustering,
            columns,
        })
    }
}
