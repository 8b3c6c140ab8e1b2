// Shared fixtures for the integration tests.
//
// The two "bills" tables mirror the layouts the reader was first exercised
// against: one with a single partition-key column, one with a composite
// partition key and two clustering columns.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sstable_reader::{
    Cell, ColumnType, DecoratedKey, DeletionTime, MaterializedRow, Materializer, Partition, Row,
    SSTable, SSTableBuilder, Schema, Value, WriteOptions,
};

/// Wall-clock seconds used as `now` unless a test needs expiry.
pub const NOW: i32 = 1_700_000_000;

pub fn int(v: i32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// CREATE TABLE bills (user text, balance int static, expense_id int,
/// amount int, name text, PRIMARY KEY (user, expense_id))
pub fn bills_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("test", "bills")
            .partition_key("user", ColumnType::Text)
            .clustering("expense_id", ColumnType::Int)
            .static_column("balance", ColumnType::Int)
            .regular_column("amount", ColumnType::Int)
            .regular_column("name", ColumnType::Text)
            .build()
            .unwrap(),
    )
}

/// CREATE TABLE compressed_bills (user text, email text, account_id text
/// static, balance int static, expense_id int, item_id int, amount int,
/// name text, PRIMARY KEY ((user, email), expense_id, item_id))
pub fn compressed_bills_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("test", "compressed_bills")
            .partition_key("user", ColumnType::Text)
            .partition_key("email", ColumnType::Text)
            .clustering("expense_id", ColumnType::Int)
            .clustering("item_id", ColumnType::Int)
            .static_column("account_id", ColumnType::Text)
            .static_column("balance", ColumnType::Int)
            .regular_column("amount", ColumnType::Int)
            .regular_column("name", ColumnType::Text)
            .build()
            .unwrap(),
    )
}

/// One partition to be written.
#[derive(Clone)]
pub struct PartitionSpec {
    pub key: Vec<u8>,
    pub deletion: DeletionTime,
    pub static_row: Option<Row>,
    pub rows: Vec<Row>,
}

impl PartitionSpec {
    pub fn new(key: Vec<u8>) -> Self {
        PartitionSpec {
            key,
            deletion: DeletionTime::LIVE,
            static_row: None,
            rows: Vec::new(),
        }
    }

    pub fn deleted_at(mut self, timestamp: i64) -> Self {
        self.deletion = DeletionTime::new(timestamp, NOW - 10);
        self
    }

    pub fn with_static(mut self, row: Row) -> Self {
        self.static_row = Some(row);
        self
    }

    pub fn with_row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }
}

/// Serialize partitions (any order) into an in-memory file.
pub fn write_table(
    schema: &Arc<Schema>,
    options: WriteOptions,
    partitions: &[PartitionSpec],
) -> Vec<u8> {
    let mut sorted = partitions.to_vec();
    sorted.sort_by_key(|p| DecoratedKey::new(p.key.clone()));
    let mut builder = SSTableBuilder::new(Vec::<u8>::new(), schema.clone(), options).unwrap();
    for p in &sorted {
        builder
            .add_partition(&p.key, p.deletion, p.static_row.as_ref(), &p.rows)
            .unwrap();
    }
    builder.finish().unwrap().0
}

/// Same as `write_table`, onto disk.
pub fn write_table_file(
    dir: &Path,
    name: &str,
    schema: &Arc<Schema>,
    options: WriteOptions,
    partitions: &[PartitionSpec],
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, write_table(schema, options, partitions)).unwrap();
    path
}

pub fn open(schema: &Arc<Schema>, bytes: Vec<u8>) -> SSTable {
    SSTable::open(bytes, schema.clone()).unwrap()
}

/// Small blocks so fixtures span several of them.
pub fn small_blocks() -> WriteOptions {
    WriteOptions::default().block_length(64)
}

pub fn bills_key(schema: &Schema, user: &str) -> Vec<u8> {
    schema.encode_partition_key(&[Value::from(user)]).unwrap()
}

pub fn bill_row(schema: &Schema, expense_id: i32, amount: i32, name: &str, ts: i64) -> Row {
    Row::clustering(schema.encode_clustering(&[Value::Int(expense_id)]).unwrap())
        .with_liveness(ts)
        .with_cell(Cell::live("amount", ts, int(amount)))
        .with_cell(Cell::live("name", ts, name.as_bytes().to_vec()))
}

pub fn balance(amount: i32, ts: i64) -> Row {
    Row::static_row().with_cell(Cell::live("balance", ts, int(amount)))
}

/// Two users with two expenses each: 4 clustering rows.
pub fn bills_partitions(schema: &Schema) -> Vec<PartitionSpec> {
    vec![
        PartitionSpec::new(bills_key(schema, "alice"))
            .with_static(balance(100, 10))
            .with_row(bill_row(schema, 1, 20, "lunch", 10))
            .with_row(bill_row(schema, 2, 35, "books", 11)),
        PartitionSpec::new(bills_key(schema, "bob"))
            .with_static(balance(50, 10))
            .with_row(bill_row(schema, 1, 12, "coffee", 12))
            .with_row(bill_row(schema, 7, 80, "rent", 13)),
    ]
}

/// Eight (user, email) partitions with two (expense_id, item_id) rows each.
pub fn compressed_bills_partitions(schema: &Schema) -> Vec<PartitionSpec> {
    (0..8)
        .map(|i| {
            let user = format!("user{i}");
            let email = format!("user{i}@example.com");
            let key = schema
                .encode_partition_key(&[Value::from(user.as_str()), Value::from(email)])
                .unwrap();
            let statics = Row::static_row()
                .with_cell(Cell::live("account_id", 5, format!("acct-{i}").into_bytes()))
                .with_cell(Cell::live("balance", 5, int(1_000 + i)));
            let row = |expense_id: i32, item_id: i32| {
                let ck = schema
                    .encode_clustering(&[Value::Int(expense_id), Value::Int(item_id)])
                    .unwrap();
                Row::clustering(ck)
                    .with_liveness(5)
                    .with_cell(Cell::live("amount", 5, int(i * 10 + item_id)))
                    .with_cell(Cell::live("name", 5, format!("item-{item_id}").into_bytes()))
            };
            PartitionSpec::new(key)
                .with_static(statics)
                .with_row(row(1, 1))
                .with_row(row(1, 2))
        })
        .collect()
}

/// Materialize a partition stream into (partition key, row) pairs.
pub fn materialized_rows<I>(partitions: I, materializer: &Materializer) -> Vec<(Vec<Value>, MaterializedRow)>
where
    I: IntoIterator<Item = sstable_reader::Result<Partition>>,
{
    let mut out = Vec::new();
    for partition in partitions {
        let partition = materializer.materialize(partition.unwrap()).unwrap();
        let key = partition.partition_key().to_vec();
        for row in partition {
            out.push((key.clone(), row.unwrap()));
        }
    }
    out
}

pub fn decorated_keys<I>(partitions: I) -> Vec<DecoratedKey>
where
    I: IntoIterator<Item = sstable_reader::Result<Partition>>,
{
    partitions
        .into_iter()
        .map(|p| p.unwrap().decorated_key().clone())
        .collect()
}
