use std::io::{self, Write};

use crate::error::Result;
use crate::sstable::format::Compression;

/// Cuts the logical (uncompressed) data stream into fixed-length blocks and
/// writes each one compressed and checksummed.
///
/// On-disk layout of a block:
/// ```text
/// ┌──────────────────────────────┬────────────┐
/// │ payload (compressed or raw)  │ CRC32 (4B) │
/// └──────────────────────────────┴────────────┘
/// ```
///
/// Every block holds exactly `block_length` uncompressed bytes except the
/// last. The reader finds block `i` through the block table (one file offset
/// per block) and its payload ends where the next block starts.
pub struct BlockBuilder<W: Write> {
    writer: W,
    compression: Compression,
    block_length: usize,
    buffer: Vec<u8>,
    offsets: Vec<u64>,
    file_offset: u64,
    data_length: u64,
}

/// What `BlockBuilder::finish` hands back.
pub struct BlockOutput<W> {
    pub writer: W,
    /// File offset of every block, in order.
    pub offsets: Vec<u64>,
    /// Total uncompressed bytes written.
    pub data_length: u64,
    /// File offset just past the last block.
    pub end_offset: u64,
}

impl<W: Write> BlockBuilder<W> {
    /// `start_offset` is where the first block lands in the file.
    pub fn new(writer: W, start_offset: u64, block_length: usize, compression: Compression) -> Self {
        BlockBuilder {
            writer,
            compression,
            block_length,
            buffer: Vec::with_capacity(block_length),
            offsets: Vec::new(),
            file_offset: start_offset,
            data_length: 0,
        }
    }

    /// Append bytes to the logical stream, flushing full blocks.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let room = self.block_length - self.buffer.len();
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            data = &data[n..];
            self.data_length += n as u64;
            if self.buffer.len() == self.block_length {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Current position in the uncompressed stream.
    pub fn position(&self) -> u64 {
        self.data_length
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let payload = match self.compression {
            Compression::None => std::mem::take(&mut self.buffer),
            Compression::Snappy => {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(&self.buffer)
                    .map_err(io::Error::other)?;
                self.buffer.clear();
                compressed
            }
        };
        let crc = crc32fast::hash(&payload);

        self.writer.write_all(&payload)?;
        self.writer.write_all(&crc.to_be_bytes())?;

        self.offsets.push(self.file_offset);
        self.file_offset += payload.len() as u64 + 4;
        Ok(())
    }

    /// Flush the trailing partial block.
    pub fn finish(mut self) -> Result<BlockOutput<W>> {
        self.flush_block()?;
        Ok(BlockOutput {
            writer: self.writer,
            offsets: self.offsets,
            data_length: self.data_length,
            end_offset: self.file_offset,
        })
    }
}
