//! File-level structures: header, footer, partition index entries, statistics.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Header: magic, version, compression  │  12 bytes
//! ├──────────────────────────────────────┤
//! │ Data blocks (compressed + CRC32)     │
//! ├──────────────────────────────────────┤
//! │ Block table (one offset per block)   │ ┐
//! │ Partition index (optional)           │ │ metadata region,
//! │ Bloom filter (optional)              │ │ covered by meta CRC
//! │ Statistics                           │ ┘
//! ├──────────────────────────────────────┤
//! │ Footer                               │  FOOTER_SIZE bytes
//! └──────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use crate::error::{Error, Result};

/// Magic number at both ends of the file ("SSTableR").
pub const SSTABLE_MAGIC: u64 = 0x5353_5461_626C_6552;

/// Newest on-disk format version this reader understands.
pub const FORMAT_VERSION: u16 = 1;

/// Block compression algorithm, recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Snappy,
}

impl Compression {
    pub fn id(self) -> u16 {
        match self {
            Compression::None => 0,
            Compression::Snappy => 1,
        }
    }

    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Snappy),
            _ => Err(Error::CorruptFile(format!("unknown compression id {id}"))),
        }
    }
}

/// Where a decode failure is reported: the file as a whole, or one block.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Context {
    File,
    Block(u64),
}

impl Context {
    pub(crate) fn fail(self, reason: impl Into<String>) -> Error {
        match self {
            Context::File => Error::CorruptFile(reason.into()),
            Context::Block(block) => Error::corrupt_block(block, reason),
        }
    }
}

/// Bounds-checked big-endian decoding over a byte slice.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: Context,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], context: Context) -> Self {
        ByteReader {
            data,
            pos: 0,
            context,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.context.fail(format!(
                "truncated {what}: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn i32(&mut self, what: &str) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn i64(&mut self, what: &str) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) -> Error {
        self.context.fail(reason)
    }
}

/// Fixed-size file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub compression: Compression,
}

impl Header {
    pub const SIZE: usize = 8 + 2 + 2;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&SSTABLE_MAGIC.to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.compression.id().to_be_bytes());
        buf
    }

    /// Decode and validate the header.
    ///
    /// A version newer than `FORMAT_VERSION` fails with `UnsupportedVersion`
    /// before anything else in the file is looked at.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data, Context::File);
        let magic = r.u64("header magic")?;
        if magic != SSTABLE_MAGIC {
            return Err(Error::CorruptFile(format!(
                "bad header magic: expected {SSTABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }
        let version = check_version(r.u16("header version")?)?;
        let compression = Compression::from_id(r.u16("compression id")?)?;
        Ok(Header {
            version,
            compression,
        })
    }
}

fn check_version(version: u16) -> Result<u16> {
    if version > FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    if version == 0 {
        return Err(Error::CorruptFile("format version 0 is invalid".into()));
    }
    Ok(version)
}

/// The footer sits at the end of the file and locates every metadata
/// component.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Block table offset (8B)              │
/// │ Block count (8B)                     │
/// │ Block length, uncompressed (4B)      │
/// │ Data length, uncompressed (8B)       │
/// │ Index offset (8B) / size (8B)        │
/// │ Bloom offset (8B) / size (8B)        │
/// │ Stats offset (8B) / size (8B)        │
/// │ Metadata CRC32 (4B)                  │
/// │ Version (2B)                         │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
///
/// A component of size 0 is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub block_table_offset: u64,
    pub block_count: u64,
    pub block_length: u32,
    pub data_length: u64,
    pub index_offset: u64,
    pub index_size: u64,
    pub bloom_offset: u64,
    pub bloom_size: u64,
    pub stats_offset: u64,
    pub stats_size: u64,
    pub meta_crc: u32,
    pub version: u16,
}

impl Footer {
    pub const SIZE: usize = 8 + 8 + 4 + 8 + 8 * 6 + 4 + 2 + 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.block_table_offset.to_be_bytes());
        buf.extend_from_slice(&self.block_count.to_be_bytes());
        buf.extend_from_slice(&self.block_length.to_be_bytes());
        buf.extend_from_slice(&self.data_length.to_be_bytes());
        buf.extend_from_slice(&self.index_offset.to_be_bytes());
        buf.extend_from_slice(&self.index_size.to_be_bytes());
        buf.extend_from_slice(&self.bloom_offset.to_be_bytes());
        buf.extend_from_slice(&self.bloom_size.to_be_bytes());
        buf.extend_from_slice(&self.stats_offset.to_be_bytes());
        buf.extend_from_slice(&self.stats_size.to_be_bytes());
        buf.extend_from_slice(&self.meta_crc.to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&SSTABLE_MAGIC.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::CorruptFile("footer too short".into()));
        }
        let mut r = ByteReader::new(data, Context::File);
        let footer = Footer {
            block_table_offset: r.u64("block table offset")?,
            block_count: r.u64("block count")?,
            block_length: r.u32("block length")?,
            data_length: r.u64("data length")?,
            index_offset: r.u64("index offset")?,
            index_size: r.u64("index size")?,
            bloom_offset: r.u64("bloom offset")?,
            bloom_size: r.u64("bloom size")?,
            stats_offset: r.u64("stats offset")?,
            stats_size: r.u64("stats size")?,
            meta_crc: r.u32("metadata crc")?,
            version: r.u16("footer version")?,
        };
        let magic = r.u64("footer magic")?;
        if magic != SSTABLE_MAGIC {
            return Err(Error::CorruptFile(format!(
                "bad footer magic: expected {SSTABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }
        check_version(footer.version)?;
        Ok(footer)
    }
}

/// An entry in the partition index: where a partition starts in the
/// uncompressed data stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub token: i64,
    pub key: Vec<u8>,
    pub position: u64,
}

impl IndexEntry {
    /// Format: [token(8B)][key_len(2B)][key][position(8B)]
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.token.to_be_bytes());
        buf.extend_from_slice(&(self.key.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.position.to_be_bytes());
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let token = r.i64("index token")?;
        let key_len = r.u16("index key length")? as usize;
        let key = r.bytes(key_len, "index key")?.to_vec();
        let position = r.u64("index position")?;
        Ok(IndexEntry {
            token,
            key,
            position,
        })
    }

    /// Decode a whole index component.
    pub fn decode_all(data: &[u8]) -> Result<Vec<IndexEntry>> {
        let mut r = ByteReader::new(data, Context::File);
        let mut entries = Vec::new();
        while !r.is_empty() {
            entries.push(Self::decode(&mut r)?);
        }
        Ok(entries)
    }
}

/// Summary statistics of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub partition_count: u64,
    /// Clustering rows, static rows excluded.
    pub row_count: u64,
    pub min_token: i64,
    pub max_token: i64,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
}

impl Stats {
    pub const SIZE: usize = 8 * 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.partition_count.to_be_bytes());
        buf.extend_from_slice(&self.row_count.to_be_bytes());
        buf.extend_from_slice(&self.min_token.to_be_bytes());
        buf.extend_from_slice(&self.max_token.to_be_bytes());
        buf.extend_from_slice(&self.min_timestamp.to_be_bytes());
        buf.extend_from_slice(&self.max_timestamp.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data, Context::File);
        Ok(Stats {
            partition_count: r.u64("partition count")?,
            row_count: r.u64("row count")?,
            min_token: r.i64("min token")?,
            max_token: r.i64("max token")?,
            min_timestamp: r.i64("min timestamp")?,
            max_timestamp: r.i64("max timestamp")?,
        })
    }
}
