//! Unfiltered row data as stored in a file: cells, rows, deletion markers.
//!
//! Timestamps are write timestamps in microseconds. Local deletion and
//! expiration times are wall-clock seconds, the unit `now` is given in.

/// A deletion marker for a partition or a row.
///
/// Deletes everything written at or before `marked_for_delete_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeletionTime {
    pub marked_for_delete_at: i64,
    pub local_deletion_time: i32,
}

impl DeletionTime {
    /// "Not deleted".
    pub const LIVE: DeletionTime = DeletionTime {
        marked_for_delete_at: i64::MIN,
        local_deletion_time: i32::MAX,
    };

    pub fn new(marked_for_delete_at: i64, local_deletion_time: i32) -> Self {
        DeletionTime {
            marked_for_delete_at,
            local_deletion_time,
        }
    }

    pub fn is_live(&self) -> bool {
        *self == Self::LIVE
    }

    /// Whether data written at `timestamp` is shadowed by this deletion.
    pub fn deletes(&self, timestamp: i64) -> bool {
        !self.is_live() && timestamp <= self.marked_for_delete_at
    }

    /// The more recent of two deletions.
    pub fn supersedes(&self, other: &DeletionTime) -> bool {
        (self.marked_for_delete_at, self.local_deletion_time)
            > (other.marked_for_delete_at, other.local_deletion_time)
    }

    pub fn max(self, other: DeletionTime) -> DeletionTime {
        if other.supersedes(&self) { other } else { self }
    }
}

impl Default for DeletionTime {
    fn default() -> Self {
        DeletionTime::LIVE
    }
}

/// Time-to-live attached to a cell or to a row's primary key liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expiration {
    pub ttl: i32,
    pub local_expiration_time: i32,
}

impl Expiration {
    pub fn is_expired(&self, now: i32) -> bool {
        self.local_expiration_time <= now
    }
}

/// Primary-key liveness: proof that the row was inserted, independent of
/// its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LivenessInfo {
    pub timestamp: i64,
    pub expiration: Option<Expiration>,
}

impl LivenessInfo {
    pub fn is_live(&self, now: i32) -> bool {
        !self.expiration.is_some_and(|e| e.is_expired(now))
    }
}

/// What a cell holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellPayload {
    Live(Vec<u8>),
    Expiring { value: Vec<u8>, expiration: Expiration },
    Tombstone { local_deletion_time: i32 },
}

/// One column's value in one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    pub column: String,
    pub timestamp: i64,
    pub payload: CellPayload,
}

impl Cell {
    pub fn live(column: impl Into<String>, timestamp: i64, value: impl Into<Vec<u8>>) -> Self {
        Cell {
            column: column.into(),
            timestamp,
            payload: CellPayload::Live(value.into()),
        }
    }

    pub fn expiring(
        column: impl Into<String>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
        ttl: i32,
        local_expiration_time: i32,
    ) -> Self {
        Cell {
            column: column.into(),
            timestamp,
            payload: CellPayload::Expiring {
                value: value.into(),
                expiration: Expiration {
                    ttl,
                    local_expiration_time,
                },
            },
        }
    }

    pub fn tombstone(column: impl Into<String>, timestamp: i64, local_deletion_time: i32) -> Self {
        Cell {
            column: column.into(),
            timestamp,
            payload: CellPayload::Tombstone {
                local_deletion_time,
            },
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.payload, CellPayload::Tombstone { .. })
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.payload {
            CellPayload::Live(v) | CellPayload::Expiring { value: v, .. } => Some(v),
            CellPayload::Tombstone { .. } => None,
        }
    }

    pub fn expiration(&self) -> Option<Expiration> {
        match self.payload {
            CellPayload::Expiring { expiration, .. } => Some(expiration),
            _ => None,
        }
    }

    /// Holds a value that has not expired at `now`.
    pub fn is_live(&self, now: i32) -> bool {
        match &self.payload {
            CellPayload::Live(_) => true,
            CellPayload::Expiring { expiration, .. } => !expiration.is_expired(now),
            CellPayload::Tombstone { .. } => false,
        }
    }
}

/// Static row or a clustering row identified by its encoded clustering key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKind {
    Static,
    Clustering(Vec<u8>),
}

/// A row as stored: may carry deleted or expired data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub kind: RowKind,
    pub liveness: Option<LivenessInfo>,
    pub deletion: DeletionTime,
    /// Unique per column, sorted by column name.
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn clustering(key: Vec<u8>) -> Self {
        Row {
            kind: RowKind::Clustering(key),
            liveness: None,
            deletion: DeletionTime::LIVE,
            cells: Vec::new(),
        }
    }

    pub fn static_row() -> Self {
        Row {
            kind: RowKind::Static,
            liveness: None,
            deletion: DeletionTime::LIVE,
            cells: Vec::new(),
        }
    }

    pub fn with_liveness(mut self, timestamp: i64) -> Self {
        self.liveness = Some(LivenessInfo {
            timestamp,
            expiration: None,
        });
        self
    }

    pub fn with_deletion(mut self, deletion: DeletionTime) -> Self {
        self.deletion = deletion;
        self
    }

    /// Add a cell, keeping cells sorted by column name.
    pub fn with_cell(mut self, cell: Cell) -> Self {
        let pos = self
            .cells
            .binary_search_by(|c| c.column.as_str().cmp(&cell.column))
            .unwrap_or_else(|p| p);
        self.cells.insert(pos, cell);
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == RowKind::Static
    }

    pub fn clustering_key(&self) -> Option<&[u8]> {
        match &self.kind {
            RowKind::Clustering(key) => Some(key),
            RowKind::Static => None,
        }
    }

    /// Nothing at all: no liveness, no deletion, no cells.
    pub fn is_empty(&self) -> bool {
        self.liveness.is_none() && self.deletion.is_live() && self.cells.is_empty()
    }

    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells
            .binary_search_by(|c| c.column.as_str().cmp(column))
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Largest timestamp of anything in the row.
    pub fn max_timestamp(&self) -> Option<i64> {
        let cells = self.cells.iter().map(|c| c.timestamp);
        let liveness = self.liveness.map(|l| l.timestamp);
        let deletion = (!self.deletion.is_live()).then_some(self.deletion.marked_for_delete_at);
        cells.chain(liveness).chain(deletion).max()
    }
}
