use std::sync::Arc;

use crate::error::{Error, Result};
use crate::observability::log_warn;
use crate::sstable::format::Compression;
use crate::sstable::source::DataSource;

/// Everything needed to locate and decode data blocks.
#[derive(Debug)]
pub struct BlockTable {
    /// File offset of each block.
    pub offsets: Vec<u64>,
    /// File offset where the data region ends.
    pub data_end: u64,
    /// Uncompressed length of every block but the last.
    pub block_length: u32,
    /// Total uncompressed bytes.
    pub data_length: u64,
    pub compression: Compression,
    pub verify_checksums: bool,
}

impl BlockTable {
    pub fn block_of(&self, position: u64) -> u64 {
        position / u64::from(self.block_length)
    }

    fn expected_len(&self, index: u64) -> u64 {
        let start = index * u64::from(self.block_length);
        u64::from(self.block_length).min(self.data_length.saturating_sub(start))
    }
}

/// A forward cursor over the uncompressed data stream.
///
/// Blocks are fetched, verified and decompressed one at a time when the
/// cursor first touches them; only the current block is kept. Clones share
/// the source and the already-decoded block but move independently.
#[derive(Clone)]
pub struct BlockReader {
    source: Arc<dyn DataSource>,
    table: Arc<BlockTable>,
    position: u64,
    current: Option<(u64, Arc<[u8]>)>,
}

impl BlockReader {
    pub fn new(source: Arc<dyn DataSource>, table: Arc<BlockTable>) -> Self {
        BlockReader {
            source,
            table,
            position: 0,
            current: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position;
    }

    /// Index of the block the cursor is in.
    pub fn current_block(&self) -> u64 {
        self.table.block_of(self.position)
    }

    pub fn data_length(&self) -> u64 {
        self.table.data_length
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let block_length = u64::from(self.table.block_length);
        let mut filled = 0;
        while filled < buf.len() {
            if self.position >= self.table.data_length {
                return Err(Error::corrupt_block(
                    self.current_block(),
                    format!("read past end of data at position {}", self.position),
                ));
            }
            let index = self.current_block();
            let block = self.block(index)?;
            let offset = (self.position - index * block_length) as usize;
            let n = (<[u8]>::len(&block) - offset).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&block[offset..offset + n]);
            filled += n;
            self.position += n as u64;
        }
        Ok(())
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    fn block(&mut self, index: u64) -> Result<Arc<[u8]>> {
        if let Some((cached, data)) = &self.current {
            if *cached == index {
                return Ok(Arc::clone(data));
            }
        }
        let data = self.load(index)?;
        self.current = Some((index, Arc::clone(&data)));
        Ok(data)
    }

    fn load(&self, index: u64) -> Result<Arc<[u8]>> {
        let table = &self.table;
        let slot = usize::try_from(index)
            .ok()
            .filter(|i| *i < table.offsets.len())
            .ok_or_else(|| Error::corrupt_block(index, "block index out of range"))?;

        let start = table.offsets[slot];
        let end = table.offsets.get(slot + 1).copied().unwrap_or(table.data_end);
        if end < start + 4 {
            return Err(Error::corrupt_block(index, "block shorter than its checksum"));
        }

        let mut stored = vec![0u8; (end - start) as usize];
        self.source.read_exact_at(&mut stored, start)?;
        let (payload, crc_bytes) = stored.split_at(stored.len() - 4);

        if table.verify_checksums {
            let mut crc = [0u8; 4];
            crc.copy_from_slice(crc_bytes);
            let expected = u32::from_be_bytes(crc);
            let actual = crc32fast::hash(payload);
            if expected != actual {
                log_warn!(
                    component = "sstable",
                    event = "block_checksum_mismatch",
                    block = index,
                    expected,
                    actual,
                );
                return Err(Error::corrupt_block(
                    index,
                    format!("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}"),
                ));
            }
        }

        let data = match table.compression {
            Compression::None => payload.to_vec(),
            Compression::Snappy => snap::raw::Decoder::new()
                .decompress_vec(payload)
                .map_err(|e| Error::corrupt_block(index, format!("decompression failed: {e}")))?,
        };

        let expected_len = table.expected_len(index);
        if data.len() as u64 != expected_len {
            return Err(Error::corrupt_block(
                index,
                format!("decoded {} bytes, expected {expected_len}", data.len()),
            ));
        }
        Ok(Arc::from(data))
    }
}
