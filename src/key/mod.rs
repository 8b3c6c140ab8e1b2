//! Composite key encoding.
//!
//! A single-column key is the column value's serialized bytes. A key over
//! several columns packs each component as:
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────┐
//! │ length (2B)  │ component bytes │ EOC (1B) │  × number of columns
//! └──────────────┴─────────────────┴──────────┘
//! ```
//!
//! Length is big-endian. The end-of-component byte is `0x00` when more
//! components follow and `0x01` on the last one.

pub mod token;

use crate::error::{Error, Result};
use crate::schema::{ColumnDef, Value};

pub use token::{DecoratedKey, Token, TokenRange};

/// End-of-component marker between components.
pub const EOC_MORE: u8 = 0x00;
/// End-of-component marker after the final component.
pub const EOC_END: u8 = 0x01;

/// Stateless encoder/decoder for partition and clustering keys.
pub struct KeyCodec;

impl KeyCodec {
    /// Encode `values` as a key over `columns` (same length, same order).
    pub fn encode(values: &[Value], columns: &[ColumnDef]) -> Result<Vec<u8>> {
        if values.len() != columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} key components, got {}",
                columns.len(),
                values.len()
            )));
        }

        match columns {
            [] => Ok(Vec::new()),
            [col] => col.column_type.encode(&values[0]),
            _ => {
                let mut buf = Vec::new();
                let last = columns.len() - 1;
                for (i, (col, value)) in columns.iter().zip(values).enumerate() {
                    let bytes = col.column_type.encode(value)?;
                    let len = u16::try_from(bytes.len()).map_err(|_| {
                        Error::InvalidArgument(format!(
                            "key component {} is {} bytes, limit is {}",
                            col.name,
                            bytes.len(),
                            u16::MAX
                        ))
                    })?;
                    buf.extend_from_slice(&len.to_be_bytes());
                    buf.extend_from_slice(&bytes);
                    buf.push(if i == last { EOC_END } else { EOC_MORE });
                }
                Ok(buf)
            }
        }
    }

    /// Decode a key over `columns` back into typed values.
    pub fn decode(key: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>> {
        let parts = Self::split(key, columns.len())?;
        columns
            .iter()
            .zip(parts)
            .map(|(col, bytes)| {
                col.column_type.decode(bytes).map_err(|e| match e {
                    Error::MalformedKey(reason) => {
                        Error::MalformedKey(format!("column {}: {reason}", col.name))
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Split a key into its `n` component byte slices without decoding them.
    pub fn split(key: &[u8], n: usize) -> Result<Vec<&[u8]>> {
        match n {
            0 if key.is_empty() => Ok(Vec::new()),
            0 => Err(Error::SchemaMismatch(format!(
                "expected an empty key, got {} bytes",
                key.len()
            ))),
            1 => Ok(vec![key]),
            _ => {
                let parts = Self::split_composite(key)?;
                if parts.len() != n {
                    return Err(Error::SchemaMismatch(format!(
                        "expected {n} key components, found {}",
                        parts.len()
                    )));
                }
                Ok(parts)
            }
        }
    }

    fn split_composite(key: &[u8]) -> Result<Vec<&[u8]>> {
        let mut parts = Vec::new();
        let mut rest = key;
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(Error::MalformedKey(format!(
                    "truncated component header at byte {}",
                    key.len() - rest.len()
                )));
            }
            let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            // length + payload + EOC
            if rest.len() < 2 + len + 1 {
                return Err(Error::MalformedKey(format!(
                    "component of {len} bytes overruns key of {} bytes",
                    key.len()
                )));
            }
            parts.push(&rest[2..2 + len]);
            let eoc = rest[2 + len];
            rest = &rest[2 + len + 1..];
            // Writers that never set the end marker leave 0x00 on the final
            // component too, so only interior markers are checked.
            if !rest.is_empty() && eoc != EOC_MORE {
                return Err(Error::MalformedKey(format!(
                    "unexpected end-of-component byte {eoc:#04x} before final component"
                )));
            }
        }
        Ok(parts)
    }
}
