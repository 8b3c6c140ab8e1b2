// Merge iterator tests
// Combining several files: union, last-write-wins, deletions, composition.

mod common;

use std::sync::Arc;

use common::*;
use sstable_reader::sstable::format::Footer;
use sstable_reader::{
    Cell, Compression, DeletionTime, Error, Materializer, MergeIterator, PartitionIterator, Row,
    SSTable, Schema, TokenRange, Value, WriteOptions,
};

fn merge(tables: &[&SSTable], schema: &Arc<Schema>) -> MergeIterator {
    merge_range(tables, schema, TokenRange::FULL)
}

fn merge_range(tables: &[&SSTable], schema: &Arc<Schema>, range: TokenRange) -> MergeIterator {
    let sources: Vec<Box<dyn PartitionIterator>> = tables
        .iter()
        .map(|t| Box::new(t.scan(range)) as Box<dyn PartitionIterator>)
        .collect();
    MergeIterator::new(sources, schema.clone(), NOW)
}

fn table(schema: &Arc<Schema>, partitions: &[PartitionSpec]) -> SSTable {
    open(schema, write_table(schema, small_blocks(), partitions))
}

// =============================================================================
// Test 1: Disjoint files → union in key order
// =============================================================================
#[test]
fn disjoint_files_union() {
    init_tracing();
    let schema = bills_schema();
    let all = bills_partitions(&schema);
    let alice = table(&schema, &all[..1]);
    let bob = table(&schema, &all[1..]);
    let both = table(&schema, &all);

    let merged = decorated_keys(merge(&[&bob, &alice], &schema));
    assert_eq!(merged, decorated_keys(both.scan_all()));

    let materializer = Materializer::new(schema.clone(), NOW);
    let rows = materialized_rows(merge(&[&alice, &bob], &schema), &materializer);
    assert_eq!(rows, materialized_rows(both.scan_all(), &materializer));
    assert_eq!(rows.len(), 4);
}

// =============================================================================
// Test 2: Same cell in two files → newest timestamp wins, in either order
// =============================================================================
#[test]
fn last_write_wins_regardless_of_order() {
    let schema = bills_schema();
    let key = bills_key(&schema, "alice");
    let old = table(
        &schema,
        &[PartitionSpec::new(key.clone())
            .with_static(balance(100, 10))
            .with_row(bill_row(&schema, 1, 20, "lunch", 10))],
    );
    let newer_amount = Row::clustering(schema.encode_clustering(&[Value::Int(1)]).unwrap())
        .with_cell(Cell::live("amount", 20, int(99)));
    let new = table(
        &schema,
        &[PartitionSpec::new(key)
            .with_static(balance(70, 30))
            .with_row(newer_amount)],
    );

    let materializer = Materializer::new(schema.clone(), NOW);
    for order in [[&old, &new], [&new, &old]] {
        let rows = materialized_rows(merge(&order, &schema), &materializer);
        assert_eq!(rows.len(), 1);
        let (_, row) = &rows[0];
        assert_eq!(row.value("amount"), Some(&Value::Int(99)));
        assert_eq!(row.cell("amount").unwrap().timestamp, 20);
        // Untouched column survives from the older file.
        assert_eq!(row.value("name"), Some(&Value::Text("lunch".into())));

        let partition = merge(&order, &schema).next().unwrap().unwrap();
        let statics = materializer
            .materialize(partition)
            .unwrap()
            .static_row()
            .cloned()
            .unwrap();
        assert_eq!(statics.value("balance"), Some(&Value::Int(70)));
    }
}

// =============================================================================
// Test 3: Tombstone vs live value at the same timestamp → tombstone wins
// =============================================================================
#[test]
fn tombstone_wins_timestamp_tie() {
    let schema = bills_schema();
    let key = bills_key(&schema, "alice");
    let ck = schema.encode_clustering(&[Value::Int(1)]).unwrap();
    let live = table(
        &schema,
        &[PartitionSpec::new(key.clone()).with_row(bill_row(&schema, 1, 20, "lunch", 10))],
    );
    let deleted = table(
        &schema,
        &[PartitionSpec::new(key).with_row(
            Row::clustering(ck).with_cell(Cell::tombstone("amount", 10, NOW - 5)),
        )],
    );

    let materializer = Materializer::new(schema.clone(), NOW);
    for order in [[&live, &deleted], [&deleted, &live]] {
        let mut partition = merge(&order, &schema).next().unwrap().unwrap();
        let row = partition.next().unwrap().unwrap();
        assert!(row.cell("amount").unwrap().is_tombstone());

        let rows = materialized_rows(merge(&order, &schema), &materializer);
        let (_, row) = &rows[0];
        assert!(row.value("amount").is_none());
        assert_eq!(row.value("name"), Some(&Value::Text("lunch".into())));
    }
}

// =============================================================================
// Test 4: Partition tombstone in one file hides older rows in another
// =============================================================================
#[test]
fn partition_tombstone_shadows_older_data() {
    let schema = bills_schema();
    let key = bills_key(&schema, "alice");
    let data = table(
        &schema,
        &[PartitionSpec::new(key.clone())
            .with_static(balance(100, 10))
            .with_row(bill_row(&schema, 1, 20, "lunch", 10))
            .with_row(bill_row(&schema, 2, 35, "books", 11))
            .with_row(bill_row(&schema, 3, 50, "train", 20))],
    );
    let tombstone = table(&schema, &[PartitionSpec::new(key).deleted_at(15)]);

    for order in [[&data, &tombstone], [&tombstone, &data]] {
        let partition = merge(&order, &schema).next().unwrap().unwrap();
        assert_eq!(partition.deletion().marked_for_delete_at, 15);
        assert!(partition.static_row().is_none());
        let rows: Vec<Row> = partition.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].clustering_key(),
            Some(schema.encode_clustering(&[Value::Int(3)]).unwrap().as_slice())
        );
    }
}

// =============================================================================
// Test 5: Row deletion vs row liveness
// =============================================================================
#[test]
fn row_deletion_removes_row() {
    let schema = bills_schema();
    let key = bills_key(&schema, "bob");
    let ck = schema.encode_clustering(&[Value::Int(1)]).unwrap();
    let data = table(
        &schema,
        &[PartitionSpec::new(key.clone())
            .with_row(bill_row(&schema, 1, 12, "coffee", 12))
            .with_row(bill_row(&schema, 2, 5, "tea", 12))],
    );
    let deletion = table(
        &schema,
        &[PartitionSpec::new(key)
            .with_row(Row::clustering(ck).with_deletion(DeletionTime::new(12, NOW - 1)))],
    );

    let materializer = Materializer::new(schema.clone(), NOW);
    let rows = materialized_rows(merge(&[&data, &deletion], &schema), &materializer);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.clustering, vec![Value::Int(2)]);
}

// =============================================================================
// Test 6: Merging merges equals one flat merge
// =============================================================================
#[test]
fn merge_of_merges_equals_flat_merge() {
    let schema = bills_schema();
    let alice = bills_key(&schema, "alice");
    let bob = bills_key(&schema, "bob");
    let a = table(
        &schema,
        &[PartitionSpec::new(alice.clone())
            .with_row(bill_row(&schema, 1, 20, "lunch", 10))
            .with_row(bill_row(&schema, 2, 35, "books", 11))],
    );
    let b = table(
        &schema,
        &[
            PartitionSpec::new(alice.clone()).with_row(bill_row(&schema, 1, 25, "dinner", 40)),
            PartitionSpec::new(bob.clone()).with_row(bill_row(&schema, 4, 9, "snack", 5)),
        ],
    );
    let c = table(
        &schema,
        &[
            PartitionSpec::new(alice).deleted_at(30),
            PartitionSpec::new(bob).with_row(bill_row(&schema, 4, 10, "snack", 6)),
        ],
    );

    let materializer = Materializer::new(schema.clone(), NOW);
    let flat = materialized_rows(merge(&[&a, &b, &c], &schema), &materializer);

    let inner: Box<dyn PartitionIterator> = Box::new(merge(&[&a, &b], &schema));
    let nested = MergeIterator::new(vec![inner, Box::new(c.scan_all())], schema.clone(), NOW);
    assert_eq!(materialized_rows(nested, &materializer), flat);

    let inner: Box<dyn PartitionIterator> = Box::new(merge(&[&b, &c], &schema));
    let nested = MergeIterator::new(vec![Box::new(a.scan_all()), inner], schema.clone(), NOW);
    assert_eq!(materialized_rows(nested, &materializer), flat);

    // alice: only the write after the deletion; bob: newest snack.
    assert_eq!(flat.len(), 2);
    assert!(flat.iter().any(|(_, r)| r.value("amount") == Some(&Value::Int(25))));
    assert!(flat.iter().any(|(_, r)| r.value("amount") == Some(&Value::Int(10))));
}

// =============================================================================
// Test 7: Merges over split ranges in parallel concatenate to the full merge
// =============================================================================
#[test]
fn parallel_split_ranges() {
    let schema = compressed_bills_schema();
    let partitions = compressed_bills_partitions(&schema);
    let (even, odd): (Vec<_>, Vec<_>) = partitions
        .iter()
        .cloned()
        .enumerate()
        .partition(|(i, _)| i % 2 == 0);
    let even: Vec<_> = even.into_iter().map(|(_, p)| p).collect();
    let odd: Vec<_> = odd.into_iter().map(|(_, p)| p).collect();
    let a = table(&schema, &even);
    let b = table(&schema, &odd);
    let c = table(&schema, &partitions);

    let materializer = Materializer::new(schema.clone(), NOW);
    let full = materialized_rows(merge(&[&a, &b, &c], &schema), &materializer);
    assert_eq!(full.len(), 16);

    let ranges = TokenRange::FULL.split(4);
    let pieces: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = ranges
            .iter()
            .map(|range| {
                let (a, b, c, schema, materializer) = (&a, &b, &c, &schema, &materializer);
                s.spawn(move || {
                    materialized_rows(merge_range(&[a, b, c], schema, *range), materializer)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let concatenated: Vec<_> = pieces.into_iter().flatten().collect();
    assert_eq!(concatenated, full);
}

// =============================================================================
// Test 8: A failing source → error once, then exhausted
// =============================================================================
#[test]
fn error_is_yielded_once() {
    let schema = bills_schema();
    let good = table(&schema, &bills_partitions(&schema));

    let options = WriteOptions::default().compression(Compression::None);
    let mut bytes = write_table(&schema, options, &bills_partitions(&schema));
    let footer = Footer::decode(&bytes[bytes.len() - Footer::SIZE..]).unwrap();
    bytes[footer.block_table_offset as usize - 1] ^= 0xFF;
    let bad = open(&schema, bytes);

    let mut merged = merge(&[&good, &bad], &schema);
    let mut errors = 0;
    for item in merged.by_ref() {
        match item {
            Ok(partition) => {
                for row in partition {
                    if row.is_err() {
                        errors += 1;
                    }
                }
            }
            Err(e) => {
                assert!(matches!(e, Error::CorruptBlock { .. }));
                errors += 1;
            }
        }
    }
    assert_eq!(errors, 1);
    assert!(merged.next().is_none());
    merged.close();
    merged.close();
    assert!(merged.next().is_none());
}

// =============================================================================
// Test 9: Expired cells become tombstones during the merge
// =============================================================================
#[test]
fn expired_cell_becomes_tombstone() {
    let schema = bills_schema();
    let key = bills_key(&schema, "alice");
    let ck = schema.encode_clustering(&[Value::Int(1)]).unwrap();
    let expiring = table(
        &schema,
        &[PartitionSpec::new(key.clone()).with_row(
            Row::clustering(ck.clone())
                .with_cell(Cell::expiring("amount", 50, int(1), 100, NOW - 1)),
        )],
    );
    let older = table(
        &schema,
        &[PartitionSpec::new(key).with_row(
            Row::clustering(ck).with_cell(Cell::live("amount", 40, int(2))),
        )],
    );

    let mut partition = merge(&[&expiring, &older], &schema).next().unwrap().unwrap();
    let row = partition.next().unwrap().unwrap();
    let cell = row.cell("amount").unwrap();
    assert!(cell.is_tombstone());
    assert_eq!(cell.timestamp, 50);

    let materializer = Materializer::new(schema.clone(), NOW);
    assert!(materialized_rows(merge(&[&older, &expiring], &schema), &materializer).is_empty());
}
