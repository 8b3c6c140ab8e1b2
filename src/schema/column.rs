use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Scalar column types understood by the reader.
///
/// Serialized forms follow the native protocol: big-endian two's complement
/// for integers, IEEE-754 for floats, UTF-8 for text, raw bytes for blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Ascii,
    Text,
    Blob,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    /// Milliseconds since the epoch.
    Timestamp,
    Uuid,
}

impl ColumnType {
    /// Byte width of a serialized value, or `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Boolean | ColumnType::TinyInt => Some(1),
            ColumnType::SmallInt => Some(2),
            ColumnType::Int | ColumnType::Float => Some(4),
            ColumnType::BigInt | ColumnType::Double | ColumnType::Timestamp => Some(8),
            ColumnType::Uuid => Some(16),
            ColumnType::Ascii | ColumnType::Text | ColumnType::Blob => None,
        }
    }

    /// Serialize a value of this type.
    pub fn encode(self, value: &Value) -> Result<Vec<u8>> {
        let bytes = match (self, value) {
            (ColumnType::Ascii, Value::Ascii(s)) => {
                if !s.is_ascii() {
                    return Err(Error::SchemaMismatch(format!(
                        "non-ASCII text {s:?} for ascii column"
                    )));
                }
                s.as_bytes().to_vec()
            }
            (ColumnType::Text, Value::Text(s)) => s.as_bytes().to_vec(),
            (ColumnType::Blob, Value::Blob(b)) => b.clone(),
            (ColumnType::Boolean, Value::Boolean(b)) => vec![u8::from(*b)],
            (ColumnType::TinyInt, Value::TinyInt(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::SmallInt, Value::SmallInt(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::Int, Value::Int(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::BigInt, Value::BigInt(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::Float, Value::Float(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::Double, Value::Double(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::Timestamp, Value::Timestamp(v)) => v.to_be_bytes().to_vec(),
            (ColumnType::Uuid, Value::Uuid(v)) => v.to_vec(),
            (ty, value) => {
                return Err(Error::SchemaMismatch(format!(
                    "value {value:?} does not match column type {ty}"
                )));
            }
        };
        Ok(bytes)
    }

    /// Deserialize bytes of this type.
    ///
    /// Fails with `MalformedKey` when a fixed-width type gets the wrong number
    /// of bytes or text is not valid for the type.
    pub fn decode(self, bytes: &[u8]) -> Result<Value> {
        if let Some(width) = self.fixed_width() {
            if bytes.len() != width {
                return Err(Error::MalformedKey(format!(
                    "{self} expects {width} bytes, got {}",
                    bytes.len()
                )));
            }
        }
        let value = match self {
            ColumnType::Ascii => {
                if !bytes.is_ascii() {
                    return Err(Error::MalformedKey("non-ASCII bytes in ascii value".into()));
                }
                Value::Ascii(utf8(bytes)?)
            }
            ColumnType::Text => Value::Text(utf8(bytes)?),
            ColumnType::Blob => Value::Blob(bytes.to_vec()),
            ColumnType::Boolean => Value::Boolean(bytes[0] != 0),
            ColumnType::TinyInt => Value::TinyInt(i8::from_be_bytes(fixed(bytes))),
            ColumnType::SmallInt => Value::SmallInt(i16::from_be_bytes(fixed(bytes))),
            ColumnType::Int => Value::Int(i32::from_be_bytes(fixed(bytes))),
            ColumnType::BigInt => Value::BigInt(i64::from_be_bytes(fixed(bytes))),
            ColumnType::Float => Value::Float(f32::from_be_bytes(fixed(bytes))),
            ColumnType::Double => Value::Double(f64::from_be_bytes(fixed(bytes))),
            ColumnType::Timestamp => Value::Timestamp(i64::from_be_bytes(fixed(bytes))),
            ColumnType::Uuid => Value::Uuid(fixed(bytes)),
        };
        Ok(value)
    }

    /// Compare two serialized values of this type.
    ///
    /// Integers compare signed, floats by `total_cmp`, everything else as
    /// unsigned bytes. Values of the wrong width fall back to byte order so a
    /// comparator never panics on bad input.
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        if let Some(width) = self.fixed_width() {
            if a.len() != width || b.len() != width {
                return a.cmp(b);
            }
        }
        match self {
            ColumnType::TinyInt => i8::from_be_bytes(fixed(a)).cmp(&i8::from_be_bytes(fixed(b))),
            ColumnType::SmallInt => {
                i16::from_be_bytes(fixed(a)).cmp(&i16::from_be_bytes(fixed(b)))
            }
            ColumnType::Int => i32::from_be_bytes(fixed(a)).cmp(&i32::from_be_bytes(fixed(b))),
            ColumnType::BigInt | ColumnType::Timestamp => {
                i64::from_be_bytes(fixed(a)).cmp(&i64::from_be_bytes(fixed(b)))
            }
            ColumnType::Float => {
                f32::from_be_bytes(fixed(a)).total_cmp(&f32::from_be_bytes(fixed(b)))
            }
            ColumnType::Double => {
                f64::from_be_bytes(fixed(a)).total_cmp(&f64::from_be_bytes(fixed(b)))
            }
            ColumnType::Boolean => (a[0] != 0).cmp(&(b[0] != 0)),
            ColumnType::Ascii | ColumnType::Text | ColumnType::Blob | ColumnType::Uuid => {
                a.cmp(b)
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Ascii => "ascii",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
            ColumnType::Boolean => "boolean",
            ColumnType::TinyInt => "tinyint",
            ColumnType::SmallInt => "smallint",
            ColumnType::Int => "int",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A decoded, typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Ascii(String),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ascii(s) | Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Boolean(v) => write!(f, "{v}"),
            Value::TinyInt(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Uuid(v) => {
                for (i, byte) in v.iter().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::MalformedKey(format!("invalid UTF-8: {e}")))
}

// Callers check the width first.
fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
