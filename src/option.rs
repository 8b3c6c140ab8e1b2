use crate::error::{Error, Result};
use crate::sstable::format::{Compression, FORMAT_VERSION};

/// Smallest and largest accepted block length.
pub const MIN_BLOCK_LENGTH: u32 = 16;
pub const MAX_BLOCK_LENGTH: u32 = 16 * 1024 * 1024;

/// Options applied when opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub(crate) verify_checksums: bool,
    pub(crate) use_index: bool,
    pub(crate) use_bloom_filter: bool,
    pub(crate) use_statistics: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            verify_checksums: true,
            use_index: true,
            use_bloom_filter: true,
            use_statistics: false,
        }
    }
}

impl ReadOptions {
    /// Check each data block's CRC32 before decompressing it.
    pub fn verify_checksums(self, verify_checksums: bool) -> Self {
        ReadOptions {
            verify_checksums,
            ..self
        }
    }

    /// Seek through the partition index when the file has one. Without it
    /// every scan and lookup reads the data region from the start.
    pub fn use_index(self, use_index: bool) -> Self {
        ReadOptions { use_index, ..self }
    }

    pub fn use_bloom_filter(self, use_bloom_filter: bool) -> Self {
        ReadOptions {
            use_bloom_filter,
            ..self
        }
    }

    /// Skip the data region when the file's recorded token bounds do not
    /// intersect the scanned range. Off by default: statistics that are stale
    /// would hide partitions, and the index already bounds indexed scans.
    pub fn use_statistics(self, use_statistics: bool) -> Self {
        ReadOptions {
            use_statistics,
            ..self
        }
    }
}

/// Options for [`SSTableBuilder`](crate::sstable::SSTableBuilder).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    pub(crate) block_length: u32,
    pub(crate) compression: Compression,
    pub(crate) write_index: bool,
    pub(crate) write_bloom_filter: bool,
    pub(crate) write_statistics: bool,
    pub(crate) bloom_fp_rate: f64,
    pub(crate) format_version: u16,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            block_length: 64 * 1024,
            compression: Compression::Snappy,
            write_index: true,
            write_bloom_filter: true,
            write_statistics: true,
            bloom_fp_rate: 0.01,
            format_version: FORMAT_VERSION,
        }
    }
}

impl WriteOptions {
    /// Uncompressed length of each data block. Must be a power of two
    /// between 16 B and 16 MiB.
    pub fn block_length(self, block_length: u32) -> Self {
        WriteOptions {
            block_length,
            ..self
        }
    }

    pub fn compression(self, compression: Compression) -> Self {
        WriteOptions {
            compression,
            ..self
        }
    }

    pub fn write_index(self, write_index: bool) -> Self {
        WriteOptions {
            write_index,
            ..self
        }
    }

    pub fn write_bloom_filter(self, write_bloom_filter: bool) -> Self {
        WriteOptions {
            write_bloom_filter,
            ..self
        }
    }

    pub fn write_statistics(self, write_statistics: bool) -> Self {
        WriteOptions {
            write_statistics,
            ..self
        }
    }

    pub fn bloom_fp_rate(self, bloom_fp_rate: f64) -> Self {
        WriteOptions {
            bloom_fp_rate,
            ..self
        }
    }

    /// Version stamped into the header and footer. Only useful for testing
    /// how readers treat other versions.
    pub fn format_version(self, format_version: u16) -> Self {
        WriteOptions {
            format_version,
            ..self
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_block_length(self.block_length)?;
        if !(self.bloom_fp_rate > 0.0 && self.bloom_fp_rate < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "bloom filter false positive rate {} is outside (0, 1)",
                self.bloom_fp_rate
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_block_length(block_length: u32) -> Result<()> {
    if !block_length.is_power_of_two()
        || !(MIN_BLOCK_LENGTH..=MAX_BLOCK_LENGTH).contains(&block_length)
    {
        return Err(Error::InvalidArgument(format!(
            "block length {block_length} must be a power of two in \
             [{MIN_BLOCK_LENGTH}, {MAX_BLOCK_LENGTH}]"
        )));
    }
    Ok(())
}
