//! Last-write-wins resolution between versions of the same cell or row.
//!
//! Cell versions are ranked by a total order and the greatest wins:
//!
//! 1. write timestamp;
//! 2. a tombstone beats a live value;
//! 3. value bytes, compared unsigned;
//! 4. local deletion or expiration time (non-expiring values rank as `i32::MAX`);
//! 5. an expiring value beats a non-expiring one, then the larger ttl.
//!
//! Because the winner is a maximum under a total order, reconciliation is
//! commutative and associative: the order files are merged in, and how they
//! are grouped, cannot change the outcome.

use std::cmp::Ordering;

use crate::types::{Cell, CellPayload, DeletionTime, LivenessInfo, Row};

fn cell_rank(cell: &Cell) -> (i64, bool, &[u8], i32, bool, i32) {
    match &cell.payload {
        CellPayload::Live(value) => (cell.timestamp, false, value, i32::MAX, false, 0),
        CellPayload::Expiring { value, expiration } => (
            cell.timestamp,
            false,
            value,
            expiration.local_expiration_time,
            true,
            expiration.ttl,
        ),
        CellPayload::Tombstone {
            local_deletion_time,
        } => (cell.timestamp, true, &[], *local_deletion_time, false, 0),
    }
}

/// Order two versions of a cell; `Greater` means `a` wins.
pub fn compare_cells(a: &Cell, b: &Cell) -> Ordering {
    cell_rank(a).cmp(&cell_rank(b))
}

/// Pick the winning version of a cell.
pub fn reconcile(a: Cell, b: Cell) -> Cell {
    if compare_cells(&b, &a) == Ordering::Greater { b } else { a }
}

/// An expiring cell past its expiration time turns into a tombstone dated
/// from when it was written. Other cells are returned unchanged.
pub fn expire(cell: Cell, now: i32) -> Cell {
    match cell.payload {
        CellPayload::Expiring { expiration, .. } if expiration.is_expired(now) => Cell {
            payload: CellPayload::Tombstone {
                local_deletion_time: expiration
                    .local_expiration_time
                    .saturating_sub(expiration.ttl),
            },
            ..cell
        },
        _ => cell,
    }
}

fn liveness_rank(info: &LivenessInfo) -> (i64, i32, i32) {
    match info.expiration {
        Some(e) => (info.timestamp, e.local_expiration_time, e.ttl),
        None => (info.timestamp, i32::MAX, 0),
    }
}

fn newer_liveness(a: Option<LivenessInfo>, b: Option<LivenessInfo>) -> Option<LivenessInfo> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if liveness_rank(&b) > liveness_rank(&a) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

/// Merge two versions of the same row (same kind, same clustering key).
pub fn merge_two(a: Row, b: Row) -> Row {
    let liveness = newer_liveness(a.liveness, b.liveness);
    let deletion = a.deletion.max(b.deletion);

    let mut cells = Vec::with_capacity(a.cells.len().max(b.cells.len()));
    let mut left = a.cells.into_iter().peekable();
    let mut right = b.cells.into_iter().peekable();
    loop {
        let next = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => match l.column.cmp(&r.column) {
                Ordering::Less => left.next(),
                Ordering::Greater => right.next(),
                Ordering::Equal => match (left.next(), right.next()) {
                    (Some(l), Some(r)) => Some(reconcile(l, r)),
                    (l, r) => l.or(r),
                },
            },
            (Some(_), None) => left.next(),
            (None, Some(_)) => right.next(),
            (None, None) => None,
        };
        match next {
            Some(cell) => cells.push(cell),
            None => break,
        }
    }

    Row {
        kind: a.kind,
        liveness,
        deletion,
        cells,
    }
}

/// Drop everything in `row` shadowed by its own deletion or by the
/// partition deletion. Tombstones that still matter are kept.
///
/// Returns `None` if nothing is left.
pub fn purge(mut row: Row, partition_deletion: DeletionTime) -> Option<Row> {
    if !row.deletion.supersedes(&partition_deletion) {
        row.deletion = DeletionTime::LIVE;
    }
    let effective = row.deletion.max(partition_deletion);

    if row.liveness.is_some_and(|l| effective.deletes(l.timestamp)) {
        row.liveness = None;
    }
    row.cells.retain(|c| !effective.deletes(c.timestamp));

    if row.is_empty() { None } else { Some(row) }
}

/// Merge every version of one row and purge the result.
///
/// Expired cells are converted to tombstones before reconciling, so the
/// outcome does not depend on which versions were merged earlier.
pub fn merge_rows(rows: Vec<Row>, partition_deletion: DeletionTime, now: i32) -> Option<Row> {
    let merged = rows
        .into_iter()
        .map(|mut row| {
            row.cells = row.cells.into_iter().map(|c| expire(c, now)).collect();
            row
        })
        .reduce(merge_two)?;
    purge(merged, partition_deletion)
}
