use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::iterator::{Partition, PartitionIterator, Poison, PoisonOnError};
use crate::key::{DecoratedKey, Token, TokenRange};
use crate::observability::log_debug;
use crate::option::{ReadOptions, check_block_length};
use crate::schema::{Schema, Value};
use crate::sstable::block::{BlockReader, BlockTable};
use crate::sstable::format::{Compression, Footer, Header, IndexEntry, Stats};
use crate::sstable::serialize::{read_partition_header, read_unfiltered};
use crate::sstable::source::DataSource;
use crate::types::Row;

/// An opened, validated SSTable.
///
/// Opening reads the header, the footer and the metadata region (block
/// table, partition index, bloom filter, statistics). Data blocks are only
/// read when a scan reaches them.
///
/// Index, bloom filter and statistics are optional. Without them every scan
/// and lookup falls back to reading the data region linearly.
///
/// The file stays open while the `SSTable` or anything derived from it (a
/// scanner, a partition, a row sequence) is alive.
pub struct SSTable {
    source: Arc<dyn DataSource>,
    schema: Arc<Schema>,
    options: ReadOptions,
    table: Arc<BlockTable>,
    version: u16,
    /// Sorted by (token, key).
    index: Option<Vec<IndexEntry>>,
    bloom: Option<BloomFilter>,
    stats: Option<Stats>,
}

impl SSTable {
    pub fn open<S: DataSource + 'static>(source: S, schema: Arc<Schema>) -> Result<Self> {
        Self::open_with(source, schema, ReadOptions::default())
    }

    pub fn open_with<S: DataSource + 'static>(
        source: S,
        schema: Arc<Schema>,
        options: ReadOptions,
    ) -> Result<Self> {
        Self::open_shared(Arc::new(source), schema, options)
    }

    /// Open a local file.
    pub fn path_open(path: impl AsRef<Path>, schema: Arc<Schema>) -> Result<Self> {
        Self::open(File::open(path)?, schema)
    }

    /// Open a source that is already shared elsewhere.
    ///
    /// Validation order:
    /// 1. size, then header magic and version (a newer version fails here,
    ///    before anything else is read);
    /// 2. footer magic and version, which must agree with the header;
    /// 3. metadata region bounds and CRC;
    /// 4. block table, index, bloom filter and statistics.
    pub fn open_shared(
        source: Arc<dyn DataSource>,
        schema: Arc<Schema>,
        options: ReadOptions,
    ) -> Result<Self> {
        let file_size = source.len()?;
        let minimum = (Header::SIZE + Footer::SIZE) as u64;
        if file_size < minimum {
            return Err(Error::CorruptFile(format!(
                "file is {file_size} bytes, smaller than header and footer ({minimum})"
            )));
        }

        let mut buf = [0u8; Header::SIZE];
        source.read_exact_at(&mut buf, 0)?;
        let header = Header::decode(&buf)?;

        let footer_start = file_size - Footer::SIZE as u64;
        let mut buf = [0u8; Footer::SIZE];
        source.read_exact_at(&mut buf, footer_start)?;
        let footer = Footer::decode(&buf)?;
        if footer.version != header.version {
            return Err(Error::CorruptFile(format!(
                "header version {} disagrees with footer version {}",
                header.version, footer.version
            )));
        }

        let meta_start = footer.block_table_offset;
        if meta_start < Header::SIZE as u64 || meta_start > footer_start {
            return Err(Error::CorruptFile(format!(
                "block table offset {meta_start} is outside the file"
            )));
        }
        let mut meta = vec![0u8; (footer_start - meta_start) as usize];
        source.read_exact_at(&mut meta, meta_start)?;
        let crc = crc32fast::hash(&meta);
        if crc != footer.meta_crc {
            return Err(Error::CorruptFile(format!(
                "metadata checksum mismatch: stored {:#010x}, computed {crc:#010x}",
                footer.meta_crc
            )));
        }

        let table = decode_block_table(&footer, &meta, header.compression, &options)?;
        let data_length = table.data_length;

        let index = component(&meta, meta_start, footer.index_offset, footer.index_size, "index")?
            .map(IndexEntry::decode_all)
            .transpose()?;
        if let Some(entries) = &index {
            check_index(entries, data_length)?;
        }

        let bloom = component(&meta, meta_start, footer.bloom_offset, footer.bloom_size, "bloom")?
            .map(BloomFilter::deserialize)
            .transpose()?;

        let stats = component(&meta, meta_start, footer.stats_offset, footer.stats_size, "stats")?
            .map(|bytes| {
                if bytes.len() != Stats::SIZE {
                    return Err(Error::CorruptFile(format!(
                        "statistics must be {} bytes, footer says {}",
                        Stats::SIZE,
                        footer.stats_size
                    )));
                }
                Stats::decode(bytes)
            })
            .transpose()?;

        log_debug!(
            component = "sstable",
            event = "sstable_opened",
            version = header.version,
            compression = ?header.compression,
            blocks = table.offsets.len(),
            partitions = stats.map(|s| s.partition_count),
            has_index = index.is_some(),
            has_bloom_filter = bloom.is_some(),
            has_statistics = stats.is_some(),
        );

        Ok(SSTable {
            source,
            schema,
            options,
            table: Arc::new(table),
            version: header.version,
            index,
            bloom,
            stats,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn compression(&self) -> Compression {
        self.table.compression
    }

    pub fn block_count(&self) -> usize {
        self.table.offsets.len()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    /// Statistics recorded by the writer, if the file carries them.
    pub fn stats(&self) -> Option<&Stats> {
        self.stats.as_ref()
    }

    /// Whether `range` can hold any partition of this file. Recorded token
    /// bounds are only trusted when `use_statistics` is set.
    fn covers(&self, range: &TokenRange) -> bool {
        if range.is_empty() {
            return false;
        }
        match &self.stats {
            Some(stats) if self.options.use_statistics => {
                stats.partition_count > 0
                    && range.intersects(Token(stats.min_token), Token(stats.max_token))
            }
            _ => true,
        }
    }

    /// Partitions whose token lies in `range`, in ascending key order.
    pub fn scan(&self, range: TokenRange) -> SSTableScanner {
        let data_length = self.table.data_length;
        let covered = self.covers(&range);
        let start = match &self.index {
            Some(index) if covered && self.options.use_index => {
                let i = index.partition_point(|e| e.token < range.min.0);
                index.get(i).map_or(data_length, |e| e.position)
            }
            _ => 0,
        };

        log_debug!(
            component = "scanner",
            event = "scan_started",
            min = range.min.0,
            max = range.max.0,
            start,
            skipped = !covered,
        );

        let mut reader = BlockReader::new(Arc::clone(&self.source), Arc::clone(&self.table));
        reader.seek(start);
        SSTableScanner {
            reader: covered.then_some(reader),
            schema: Arc::clone(&self.schema),
            range,
            last_key: None,
            poison: Poison::default(),
            done: !covered,
        }
    }

    /// Every partition in the file.
    pub fn scan_all(&self) -> SSTableScanner {
        self.scan(TokenRange::FULL)
    }

    /// Look up one partition by its partition-key values.
    pub fn get(&self, key_values: &[Value]) -> Result<Option<Partition>> {
        let key = self.schema.encode_partition_key(key_values)?;
        self.get_key(&key)
    }

    /// Look up one partition by its encoded partition key.
    ///
    /// Consults the bloom filter, then binary-searches the index. Without an
    /// index the data region is scanned from the start.
    pub fn get_key(&self, key: &[u8]) -> Result<Option<Partition>> {
        let target = DecoratedKey::new(key.to_vec());
        if self.options.use_bloom_filter {
            if let Some(bloom) = &self.bloom {
                if !bloom.may_contain(key) {
                    return Ok(None);
                }
            }
        }

        let range = TokenRange {
            min: target.token,
            max: target.token,
        };
        let mut scanner = self.scan(range);
        if let (Some(index), true) = (&self.index, self.options.use_index) {
            let found = index.binary_search_by(|e| {
                (e.token, e.key.as_slice()).cmp(&(target.token.0, key))
            });
            match (found, scanner.reader.as_mut()) {
                (Ok(i), Some(reader)) => reader.seek(index[i].position),
                _ => return Ok(None),
            }
        }

        for partition in scanner {
            let partition = partition?;
            match partition.decorated_key().cmp(&target) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(partition)),
                Ordering::Greater => break,
            }
        }
        Ok(None)
    }
}

fn decode_block_table(
    footer: &Footer,
    meta: &[u8],
    compression: Compression,
    options: &ReadOptions,
) -> Result<BlockTable> {
    check_block_length(footer.block_length)
        .map_err(|_| Error::CorruptFile(format!("invalid block length {}", footer.block_length)))?;
    let expected = footer.data_length.div_ceil(u64::from(footer.block_length));
    if footer.block_count != expected {
        return Err(Error::CorruptFile(format!(
            "{} blocks recorded for {} bytes of data, expected {expected}",
            footer.block_count, footer.data_length
        )));
    }
    let table_size = footer
        .block_count
        .checked_mul(8)
        .filter(|size| *size <= meta.len() as u64)
        .ok_or_else(|| Error::CorruptFile("block table overruns the metadata region".into()))?;

    let offsets: Vec<u64> = meta[..table_size as usize]
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    let in_data = |o: u64| (Header::SIZE as u64..footer.block_table_offset).contains(&o);
    if offsets.first().is_some_and(|o| *o != Header::SIZE as u64)
        || offsets.windows(2).any(|w| w[0] >= w[1])
        || !offsets.iter().copied().all(in_data)
    {
        return Err(Error::CorruptFile(
            "block offsets are not ascending within the data region".into(),
        ));
    }

    Ok(BlockTable {
        offsets,
        data_end: footer.block_table_offset,
        block_length: footer.block_length,
        data_length: footer.data_length,
        compression,
        verify_checksums: options.verify_checksums,
    })
}

/// Slice of the metadata region holding one component, `None` if absent.
fn component<'a>(
    meta: &'a [u8],
    meta_start: u64,
    offset: u64,
    size: u64,
    what: &str,
) -> Result<Option<&'a [u8]>> {
    if size == 0 {
        return Ok(None);
    }
    let start = offset.checked_sub(meta_start);
    let end = start.and_then(|s| s.checked_add(size));
    match (start, end) {
        (Some(start), Some(end)) if end <= meta.len() as u64 => {
            Ok(Some(&meta[start as usize..end as usize]))
        }
        _ => Err(Error::CorruptFile(format!(
            "{what} component at {offset}+{size} is outside the metadata region"
        ))),
    }
}

fn check_index(entries: &[IndexEntry], data_length: u64) -> Result<()> {
    let sorted = entries.windows(2).all(|w| {
        (w[0].token, &w[0].key) < (w[1].token, &w[1].key) && w[0].position < w[1].position
    });
    if !sorted {
        return Err(Error::CorruptFile("partition index is not sorted".into()));
    }
    if entries.iter().any(|e| e.position >= data_length) {
        return Err(Error::CorruptFile("partition index points past the data".into()));
    }
    Ok(())
}

/// Forward-only scan over the partitions of one file within a token range.
///
/// Each yielded partition reads its rows through its own cursor, so the
/// scanner can move on (or the partition be dropped half-read) without either
/// affecting the other. Partitions the caller does not finish are skipped by
/// their stored length.
///
/// After the first error, from the scanner itself or from the rows of a
/// partition it yielded, the scanner is exhausted.
///
/// The scanner holds a shared handle to the table's source. `close` (or
/// dropping the scanner) releases that handle; the file itself stays open
/// until the `SSTable` and every other scanner and partition are gone.
pub struct SSTableScanner {
    reader: Option<BlockReader>,
    schema: Arc<Schema>,
    range: TokenRange,
    last_key: Option<DecoratedKey>,
    poison: Poison,
    done: bool,
}

impl SSTableScanner {
    fn next_partition(&mut self) -> Result<Option<Partition>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        loop {
            if reader.position() >= reader.data_length() {
                return Ok(None);
            }
            let block = reader.current_block();
            let header = read_partition_header(reader)?;
            if self.last_key.as_ref().is_some_and(|prev| header.key <= *prev) {
                return Err(Error::corrupt_block(block, "partitions out of order"));
            }
            self.last_key = Some(header.key.clone());
            reader.seek(header.body_end);

            let token = header.key.token;
            if token > self.range.max {
                return Ok(None);
            }
            if !self.range.contains(token) {
                continue;
            }
            self.schema.decode_partition_key(&header.key.key)?;

            let mut cursor = reader.clone();
            cursor.seek(header.body_start);
            let mut rows = RowReader {
                reader: cursor,
                end: header.body_end,
                schema: Arc::clone(&self.schema),
                pending: None,
                previous: None,
                done: false,
            };
            let static_row = rows.read_static()?;
            let rows = PoisonOnError::wrap(Box::new(rows), self.poison.clone());
            return Ok(Some(Partition::new(header.key, header.deletion, static_row, rows)));
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.reader = None;
    }
}

impl Iterator for SSTableScanner {
    type Item = Result<Partition>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.poison.is_set() {
            self.finish();
            return None;
        }
        match self.next_partition() {
            Ok(Some(partition)) => Some(Ok(partition)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.poison.set();
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl PartitionIterator for SSTableScanner {
    fn close(&mut self) {
        self.finish();
    }
}

/// Decodes the rows of one partition on demand.
struct RowReader {
    reader: BlockReader,
    /// Just past the partition's end marker.
    end: u64,
    schema: Arc<Schema>,
    /// First clustering row, read while looking for a static row.
    pending: Option<Row>,
    previous: Option<Vec<u8>>,
    done: bool,
}

impl RowReader {
    fn read_static(&mut self) -> Result<Option<Row>> {
        match read_unfiltered(&mut self.reader, self.end)? {
            Some(row) if row.is_static() => Ok(Some(row)),
            Some(row) => {
                self.pending = Some(row);
                Ok(None)
            }
            None => {
                self.done = true;
                self.check_end()?;
                Ok(None)
            }
        }
    }

    fn check_end(&self) -> Result<()> {
        if self.reader.position() != self.end {
            return Err(Error::corrupt_block(
                self.reader.current_block(),
                "end of partition does not match its recorded length",
            ));
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = match self.pending.take() {
            Some(row) => row,
            None => match read_unfiltered(&mut self.reader, self.end)? {
                Some(row) => row,
                None => {
                    self.check_end()?;
                    return Ok(None);
                }
            },
        };
        let block = self.reader.current_block();
        let Some(key) = row.clustering_key() else {
            return Err(Error::corrupt_block(block, "static row after clustering rows"));
        };
        if let Some(previous) = &self.previous {
            if self.schema.compare_clustering(previous, key) != Ordering::Less {
                return Err(Error::corrupt_block(block, "clustering rows out of order"));
            }
        }
        self.previous = Some(key.to_vec());
        Ok(Some(row))
    }
}

impl Iterator for RowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
