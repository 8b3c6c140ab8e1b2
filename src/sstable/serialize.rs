//! Partition and row encoding inside the uncompressed data stream.
//!
//! ```text
//! partition := key_len(2B) key deletion(8B+4B) body_len(8B) body
//! body      := [static row] clustering row* END(1B)
//! row       := flags(1B) row_len(4B) row_bytes
//! row_bytes := [clustering_len(2B) clustering]      unless static
//!              [timestamp(8B) [ttl(4B) expires(4B)]] if HAS_LIVENESS
//!              [deleted_at(8B) local_time(4B)]      if HAS_DELETION
//!              cell_count(2B) cell*
//! cell      := name_len(2B) name flags(1B) timestamp(8B)
//!              ttl(4B) expires(4B) value    if EXPIRING
//!              local_deletion_time(4B)      if DELETED
//!              value                        otherwise
//! value     := len(4B) bytes
//! ```
//!
//! The partition body length lets a reader jump over a partition without
//! decoding its rows, and the row length does the same for a single row.

use crate::error::{Error, Result};
use crate::key::DecoratedKey;
use crate::sstable::block::BlockReader;
use crate::sstable::format::{ByteReader, Context};
use crate::types::{Cell, CellPayload, DeletionTime, Expiration, LivenessInfo, Row, RowKind};

const END_OF_PARTITION: u8 = 0x01;
const HAS_LIVENESS: u8 = 0x04;
const HAS_TTL: u8 = 0x08;
const HAS_DELETION: u8 = 0x10;
const IS_STATIC: u8 = 0x80;
const ROW_FLAGS: u8 = HAS_LIVENESS | HAS_TTL | HAS_DELETION | IS_STATIC;

const CELL_DELETED: u8 = 0x01;
const CELL_EXPIRING: u8 = 0x02;

/// Decoded partition framing.
#[derive(Debug, Clone)]
pub struct PartitionHeader {
    pub key: DecoratedKey,
    pub deletion: DeletionTime,
    /// Position of the first row (or the end marker).
    pub body_start: u64,
    /// Position just past the end marker; the next partition starts here.
    pub body_end: u64,
}

fn len_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::InvalidArgument(format!("{what} is {len} bytes, limit is {}", u16::MAX))
    })
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::InvalidArgument(format!("{what} is {len} bytes, limit is {}", u32::MAX))
    })
}

pub fn write_partition_header(
    out: &mut Vec<u8>,
    key: &[u8],
    deletion: DeletionTime,
    body_len: u64,
) -> Result<()> {
    out.extend_from_slice(&len_u16(key.len(), "partition key")?.to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&deletion.marked_for_delete_at.to_be_bytes());
    out.extend_from_slice(&deletion.local_deletion_time.to_be_bytes());
    out.extend_from_slice(&body_len.to_be_bytes());
    Ok(())
}

pub fn write_end_of_partition(out: &mut Vec<u8>) {
    out.push(END_OF_PARTITION);
}

pub fn write_row(out: &mut Vec<u8>, row: &Row) -> Result<()> {
    let mut flags = 0u8;
    let mut body = Vec::new();

    match &row.kind {
        RowKind::Static => flags |= IS_STATIC,
        RowKind::Clustering(key) => {
            body.extend_from_slice(&len_u16(key.len(), "clustering key")?.to_be_bytes());
            body.extend_from_slice(key);
        }
    }

    if let Some(liveness) = &row.liveness {
        flags |= HAS_LIVENESS;
        body.extend_from_slice(&liveness.timestamp.to_be_bytes());
        if let Some(expiration) = &liveness.expiration {
            flags |= HAS_TTL;
            body.extend_from_slice(&expiration.ttl.to_be_bytes());
            body.extend_from_slice(&expiration.local_expiration_time.to_be_bytes());
        }
    }

    if !row.deletion.is_live() {
        flags |= HAS_DELETION;
        body.extend_from_slice(&row.deletion.marked_for_delete_at.to_be_bytes());
        body.extend_from_slice(&row.deletion.local_deletion_time.to_be_bytes());
    }

    body.extend_from_slice(&len_u16(row.cells.len(), "cell count")?.to_be_bytes());
    for cell in &row.cells {
        write_cell(&mut body, cell)?;
    }

    out.push(flags);
    out.extend_from_slice(&len_u32(body.len(), "row")?.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

fn write_cell(out: &mut Vec<u8>, cell: &Cell) -> Result<()> {
    out.extend_from_slice(&len_u16(cell.column.len(), "column name")?.to_be_bytes());
    out.extend_from_slice(cell.column.as_bytes());
    let write_value = |out: &mut Vec<u8>, value: &[u8]| -> Result<()> {
        out.extend_from_slice(&len_u32(value.len(), "cell value")?.to_be_bytes());
        out.extend_from_slice(value);
        Ok(())
    };
    match &cell.payload {
        CellPayload::Live(value) => {
            out.push(0);
            out.extend_from_slice(&cell.timestamp.to_be_bytes());
            write_value(out, value)?;
        }
        CellPayload::Expiring { value, expiration } => {
            out.push(CELL_EXPIRING);
            out.extend_from_slice(&cell.timestamp.to_be_bytes());
            out.extend_from_slice(&expiration.ttl.to_be_bytes());
            out.extend_from_slice(&expiration.local_expiration_time.to_be_bytes());
            write_value(out, value)?;
        }
        CellPayload::Tombstone {
            local_deletion_time,
        } => {
            out.push(CELL_DELETED);
            out.extend_from_slice(&cell.timestamp.to_be_bytes());
            out.extend_from_slice(&local_deletion_time.to_be_bytes());
        }
    }
    Ok(())
}

pub fn read_partition_header(reader: &mut BlockReader) -> Result<PartitionHeader> {
    let block = reader.current_block();
    let key_len = reader.read_u16()? as usize;
    let key = reader.read_vec(key_len)?;
    let deletion = DeletionTime::new(reader.read_i64()?, reader.read_i32()?);
    let body_len = reader.read_u64()?;
    let body_start = reader.position();
    let body_end = body_start
        .checked_add(body_len)
        .filter(|end| *end <= reader.data_length())
        .ok_or_else(|| {
            Error::corrupt_block(block, format!("partition body of {body_len} bytes overruns data"))
        })?;

    Ok(PartitionHeader {
        key: DecoratedKey::new(key),
        deletion,
        body_start,
        body_end,
    })
}

/// Read the next row of a partition, or `None` at the end marker.
///
/// `end` is the partition's body end; a row may not run past it.
pub fn read_unfiltered(reader: &mut BlockReader, end: u64) -> Result<Option<Row>> {
    let block = reader.current_block();
    let flags = reader.read_u8()?;
    if flags == END_OF_PARTITION {
        return Ok(None);
    }
    if flags & !ROW_FLAGS != 0 {
        return Err(Error::corrupt_block(block, format!("invalid row flags {flags:#04x}")));
    }
    let row_len = reader.read_u32()?;
    if reader.position() + u64::from(row_len) > end {
        return Err(Error::corrupt_block(
            block,
            format!("row of {row_len} bytes overruns its partition"),
        ));
    }
    let bytes = reader.read_vec(row_len as usize)?;
    decode_row(flags, &bytes, Context::Block(block)).map(Some)
}

fn decode_row(flags: u8, bytes: &[u8], context: Context) -> Result<Row> {
    let mut r = ByteReader::new(bytes, context);

    let kind = if flags & IS_STATIC != 0 {
        RowKind::Static
    } else {
        let len = r.u16("clustering length")? as usize;
        RowKind::Clustering(r.bytes(len, "clustering key")?.to_vec())
    };

    let liveness = if flags & HAS_LIVENESS != 0 {
        let timestamp = r.i64("liveness timestamp")?;
        let expiration = if flags & HAS_TTL != 0 {
            Some(Expiration {
                ttl: r.i32("liveness ttl")?,
                local_expiration_time: r.i32("liveness expiration")?,
            })
        } else {
            None
        };
        Some(LivenessInfo {
            timestamp,
            expiration,
        })
    } else {
        None
    };

    let deletion = if flags & HAS_DELETION != 0 {
        DeletionTime::new(r.i64("row deletion")?, r.i32("row deletion time")?)
    } else {
        DeletionTime::LIVE
    };

    let count = r.u16("cell count")? as usize;
    let mut cells: Vec<Cell> = Vec::with_capacity(count);
    for _ in 0..count {
        let cell = decode_cell(&mut r)?;
        if let Some(prev) = cells.last() {
            if prev.column >= cell.column {
                return Err(r.fail(format!(
                    "cells out of order: {} then {}",
                    prev.column, cell.column
                )));
            }
        }
        cells.push(cell);
    }
    if !r.is_empty() {
        return Err(r.fail(format!("{} trailing bytes after row", r.remaining())));
    }

    Ok(Row {
        kind,
        liveness,
        deletion,
        cells,
    })
}

fn decode_cell(r: &mut ByteReader<'_>) -> Result<Cell> {
    let name_len = r.u16("column name length")? as usize;
    let column = String::from_utf8(r.bytes(name_len, "column name")?.to_vec())
        .map_err(|_| r.fail("column name is not UTF-8"))?;
    let flags = r.u8("cell flags")?;
    let timestamp = r.i64("cell timestamp")?;

    let value = |r: &mut ByteReader<'_>| -> Result<Vec<u8>> {
        let len = r.u32("value length")? as usize;
        Ok(r.bytes(len, "cell value")?.to_vec())
    };

    let payload = match flags {
        0 => CellPayload::Live(value(r)?),
        CELL_EXPIRING => {
            let expiration = Expiration {
                ttl: r.i32("cell ttl")?,
                local_expiration_time: r.i32("cell expiration")?,
            };
            CellPayload::Expiring {
                value: value(r)?,
                expiration,
            }
        }
        CELL_DELETED => CellPayload::Tombstone {
            local_deletion_time: r.i32("cell deletion time")?,
        },
        other => return Err(r.fail(format!("invalid cell flags {other:#04x}"))),
    };

    Ok(Cell {
        column,
        timestamp,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_roundtrip_through_bytes() {
        let row = Row::clustering(vec![0, 0, 0, 1])
            .with_liveness(10)
            .with_deletion(DeletionTime::new(5, 100))
            .with_cell(Cell::live("amount", 10, vec![0, 0, 0, 7]))
            .with_cell(Cell::tombstone("name", 11, 200))
            .with_cell(Cell::expiring("note", 12, b"x".to_vec(), 60, 1_060));

        let mut out = Vec::new();
        write_row(&mut out, &row).unwrap();
        let flags = out[0];
        let len = u32::from_be_bytes([out[1], out[2], out[3], out[4]]) as usize;
        assert_eq!(len, out.len() - 5);
        let decoded = decode_row(flags, &out[5..], Context::Block(0)).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn static_row_has_no_clustering() {
        let row = Row::static_row().with_cell(Cell::live("balance", 1, vec![0, 0, 0, 9]));
        let mut out = Vec::new();
        write_row(&mut out, &row).unwrap();
        assert_eq!(out[0] & IS_STATIC, IS_STATIC);
        let decoded = decode_row(out[0], &out[5..], Context::Block(0)).unwrap();
        assert!(decoded.is_static());
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut out = Vec::new();
        write_row(&mut out, &Row::clustering(vec![1]).with_liveness(1)).unwrap();
        let mut body = out[5..].to_vec();
        body.push(0xAA);
        let err = decode_row(out[0], &body, Context::Block(3)).unwrap_err();
        assert!(matches!(err, Error::CorruptBlock { block: 3, .. }));
    }
}
