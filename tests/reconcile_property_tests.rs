// Reconciliation properties
// Last-write-wins must not depend on merge order or grouping.

use proptest::prelude::*;
use sstable_reader::iterator::reconcile::{merge_rows, reconcile};
use sstable_reader::{Cell, DeletionTime, Row};

const NOW: i32 = 1_000;

/// Cells for one column with deliberately colliding timestamps and values.
fn cell_strategy(column: &'static str) -> impl Strategy<Value = Cell> {
    let value = proptest::collection::vec(0u8..3, 0..3);
    prop_oneof![
        (0i64..4, value.clone()).prop_map(move |(ts, v)| Cell::live(column, ts, v)),
        (0i64..4, value, 1i32..4, 995i32..1_005)
            .prop_map(move |(ts, v, ttl, exp)| Cell::expiring(column, ts, v, ttl, exp)),
        (0i64..4, 990i32..1_000).prop_map(move |(ts, ldt)| Cell::tombstone(column, ts, ldt)),
    ]
}

fn row_strategy() -> impl Strategy<Value = Row> {
    (
        proptest::option::of(0i64..4),
        proptest::option::of(0i64..4),
        proptest::option::of(cell_strategy("a")),
        proptest::option::of(cell_strategy("b")),
    )
        .prop_map(|(liveness, deletion, a, b)| {
            let mut row = Row::clustering(vec![0, 0, 0, 1]);
            if let Some(ts) = liveness {
                row = row.with_liveness(ts);
            }
            if let Some(ts) = deletion {
                row = row.with_deletion(DeletionTime::new(ts, 990));
            }
            for cell in a.into_iter().chain(b) {
                row = row.with_cell(cell);
            }
            row
        })
}

fn partition_deletion() -> impl Strategy<Value = DeletionTime> {
    prop_oneof![
        Just(DeletionTime::LIVE),
        (0i64..4).prop_map(|ts| DeletionTime::new(ts, 990)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// reconcile(a, b) == reconcile(b, a)
    #[test]
    fn prop_reconcile_is_commutative(a in cell_strategy("v"), b in cell_strategy("v")) {
        prop_assert_eq!(reconcile(a.clone(), b.clone()), reconcile(b, a));
    }

    /// reconcile(reconcile(a, b), c) == reconcile(a, reconcile(b, c))
    #[test]
    fn prop_reconcile_is_associative(
        a in cell_strategy("v"),
        b in cell_strategy("v"),
        c in cell_strategy("v"),
    ) {
        let left = reconcile(reconcile(a.clone(), b.clone()), c.clone());
        let right = reconcile(a, reconcile(b, c));
        prop_assert_eq!(left, right);
    }

    /// Merging row versions gives the same row whatever order they arrive in.
    #[test]
    fn prop_merge_rows_is_order_independent(
        a in row_strategy(),
        b in row_strategy(),
        c in row_strategy(),
        deletion in partition_deletion(),
    ) {
        let forward = merge_rows(vec![a.clone(), b.clone(), c.clone()], deletion, NOW);
        let backward = merge_rows(vec![c.clone(), b.clone(), a.clone()], deletion, NOW);
        let rotated = merge_rows(vec![b.clone(), c.clone(), a.clone()], deletion, NOW);
        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &rotated);

        // Grouping: merge two first, then the third.
        let nested = merge_rows(vec![a, b], deletion, NOW)
            .into_iter()
            .chain(Some(c))
            .collect();
        prop_assert_eq!(merge_rows(nested, deletion, NOW), forward);
    }
}
