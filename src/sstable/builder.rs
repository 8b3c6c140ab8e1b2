use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::bloom::BloomFilterBuilder;
use crate::error::{Error, Result};
use crate::key::DecoratedKey;
use crate::observability::log_debug;
use crate::option::WriteOptions;
use crate::schema::Schema;
use crate::sstable::block::{BlockBuilder, BlockOutput};
use crate::sstable::format::{Footer, Header, IndexEntry, Stats};
use crate::sstable::serialize::{write_end_of_partition, write_partition_header, write_row};
use crate::types::{DeletionTime, Row};

/// Writes a file in the format [`SSTable`](crate::sstable::SSTable) reads.
///
/// This is not a flush or compaction path: it stores exactly what it is
/// given, tombstones and shadowed data included, and never merges.
///
/// Build process:
/// 1. `new` writes the header.
/// 2. `add_partition` is called once per partition, in ascending
///    `DecoratedKey` order; partitions are serialized into the block stream.
/// 3. `finish` flushes the last block and writes the metadata region (block
///    table, index, bloom filter, statistics) followed by the footer.
pub struct SSTableBuilder<W: Write> {
    blocks: BlockBuilder<W>,
    schema: Arc<Schema>,
    options: WriteOptions,
    index: Vec<IndexEntry>,
    bloom: Option<BloomFilterBuilder>,
    last_key: Option<DecoratedKey>,
    stats: Stats,
}

impl SSTableBuilder<BufWriter<File>> {
    /// Create (or truncate) a file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        options: WriteOptions,
    ) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), schema, options)
    }
}

impl<W: Write> SSTableBuilder<W> {
    pub fn new(mut sink: W, schema: Arc<Schema>, options: WriteOptions) -> Result<Self> {
        options.validate()?;
        let header = Header {
            version: options.format_version,
            compression: options.compression,
        };
        sink.write_all(&header.encode())?;

        Ok(SSTableBuilder {
            blocks: BlockBuilder::new(
                sink,
                Header::SIZE as u64,
                options.block_length as usize,
                options.compression,
            ),
            schema,
            options,
            index: Vec::new(),
            bloom: options
                .write_bloom_filter
                .then(|| BloomFilterBuilder::new(options.bloom_fp_rate)),
            last_key: None,
            stats: Stats {
                min_token: i64::MAX,
                max_token: i64::MIN,
                min_timestamp: i64::MAX,
                max_timestamp: i64::MIN,
                ..Stats::default()
            },
        })
    }

    /// Append one partition.
    ///
    /// `key` is the encoded partition key. Partitions must arrive in strictly
    /// ascending `DecoratedKey` order and `rows` in strictly ascending
    /// clustering order; anything else is `InvalidArgument`.
    pub fn add_partition(
        &mut self,
        key: &[u8],
        deletion: DeletionTime,
        static_row: Option<&Row>,
        rows: &[Row],
    ) -> Result<()> {
        self.schema.decode_partition_key(key)?;
        let decorated = DecoratedKey::new(key.to_vec());
        if let Some(last) = &self.last_key {
            if decorated <= *last {
                return Err(Error::InvalidArgument(format!(
                    "partition with token {} added out of order",
                    decorated.token
                )));
            }
        }
        self.check_rows(static_row, rows)?;

        let mut body = Vec::new();
        if let Some(row) = static_row {
            write_row(&mut body, row)?;
        }
        for row in rows {
            write_row(&mut body, row)?;
        }
        write_end_of_partition(&mut body);

        let mut header = Vec::new();
        write_partition_header(&mut header, key, deletion, body.len() as u64)?;

        if self.options.write_index {
            self.index.push(IndexEntry {
                token: decorated.token.0,
                key: key.to_vec(),
                position: self.blocks.position(),
            });
        }
        if let Some(bloom) = &mut self.bloom {
            bloom.add_key(key);
        }
        self.blocks.write(&header)?;
        self.blocks.write(&body)?;

        let timestamps = static_row
            .into_iter()
            .chain(rows)
            .flat_map(|row| row.cells.iter().map(|c| c.timestamp).chain(row_markers(row)))
            .chain((!deletion.is_live()).then_some(deletion.marked_for_delete_at));
        let stats = &mut self.stats;
        for ts in timestamps {
            stats.min_timestamp = stats.min_timestamp.min(ts);
            stats.max_timestamp = stats.max_timestamp.max(ts);
        }
        stats.partition_count += 1;
        stats.row_count += rows.len() as u64;
        stats.min_token = stats.min_token.min(decorated.token.0);
        stats.max_token = stats.max_token.max(decorated.token.0);

        self.last_key = Some(decorated);
        Ok(())
    }

    fn check_rows(&self, static_row: Option<&Row>, rows: &[Row]) -> Result<()> {
        if static_row.is_some_and(|row| !row.is_static()) {
            return Err(Error::InvalidArgument("static row slot holds a clustering row".into()));
        }
        let mut previous: Option<&[u8]> = None;
        for row in rows {
            let Some(key) = row.clustering_key() else {
                return Err(Error::InvalidArgument("static row among clustering rows".into()));
            };
            if previous.is_some_and(|p| self.schema.compare_clustering(p, key) != Ordering::Less) {
                return Err(Error::InvalidArgument("clustering rows out of order".into()));
            }
            previous = Some(key);
        }
        for row in static_row.into_iter().chain(rows) {
            if row.cells.windows(2).any(|w| w[0].column >= w[1].column) {
                return Err(Error::InvalidArgument(
                    "cells must be unique and sorted by column name".into(),
                ));
            }
        }
        Ok(())
    }

    /// Write the metadata region and footer, and hand back the sink.
    pub fn finish(self) -> Result<(W, Stats)> {
        let BlockOutput {
            mut writer,
            offsets,
            data_length,
            end_offset,
        } = self.blocks.finish()?;

        let mut stats = self.stats;
        if stats.partition_count == 0 {
            stats = Stats::default();
        }

        let block_table_offset = end_offset;
        let mut meta = Vec::new();
        for offset in &offsets {
            meta.extend_from_slice(&offset.to_be_bytes());
        }

        let index_offset = block_table_offset + meta.len() as u64;
        for entry in &self.index {
            entry.encode(&mut meta);
        }
        let index_size = block_table_offset + meta.len() as u64 - index_offset;

        let bloom_offset = block_table_offset + meta.len() as u64;
        if let Some(bloom) = self.bloom {
            meta.extend_from_slice(&bloom.build().serialize());
        }
        let bloom_size = block_table_offset + meta.len() as u64 - bloom_offset;

        let stats_offset = block_table_offset + meta.len() as u64;
        if self.options.write_statistics {
            meta.extend_from_slice(&stats.encode());
        }
        let stats_size = block_table_offset + meta.len() as u64 - stats_offset;

        let footer = Footer {
            block_table_offset,
            block_count: offsets.len() as u64,
            block_length: self.options.block_length,
            data_length,
            index_offset: if index_size > 0 { index_offset } else { 0 },
            index_size,
            bloom_offset: if bloom_size > 0 { bloom_offset } else { 0 },
            bloom_size,
            stats_offset: if stats_size > 0 { stats_offset } else { 0 },
            stats_size,
            meta_crc: crc32fast::hash(&meta),
            version: self.options.format_version,
        };
        writer.write_all(&meta)?;
        writer.write_all(&footer.encode())?;
        writer.flush()?;

        log_debug!(
            component = "builder",
            event = "builder_finished",
            partitions = stats.partition_count,
            rows = stats.row_count,
            blocks = offsets.len(),
            data_length,
        );
        Ok((writer, stats))
    }
}

/// Liveness and deletion timestamps of a row.
fn row_markers(row: &Row) -> impl Iterator<Item = i64> {
    let liveness = row.liveness.map(|l| l.timestamp);
    let deletion = (!row.deletion.is_live()).then_some(row.deletion.marked_for_delete_at);
    liveness.into_iter().chain(deletion)
}
