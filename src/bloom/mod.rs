pub mod builder;

pub use builder::BloomFilterBuilder;

use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};
use crate::sstable::format::{ByteReader, Context};

/// Upper bound on hash functions accepted from a file.
const MAX_HASHES: u32 = 64;

/// Partition-key filter stored in a file's metadata region.
///
/// A miss means the partition is definitely not in the file, so a point
/// lookup can return without touching the index or any data block. A hit may
/// be a false positive.
///
/// Sizing, for a target false positive rate `p`:
///   bits_per_key = -1.44 * log2(p)
///   num_hashes   = bits_per_key * ln(2)
///
/// The `k` probe positions come from one xxh3-128 hash split into two 64-bit
/// halves: `h_i = h1 + i * h2 (mod m)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    num_bits: u32,
}

impl BloomFilter {
    /// A filter sized for `expected_items` keys at `false_positive_rate`.
    ///
    /// # Panics
    /// Panics if the rate is not in (0, 1).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "FPR must be in (0, 1)"
        );
        let expected_items = expected_items.max(1);
        let bits_per_key = -1.44 * false_positive_rate.log2();
        let num_bits = ((expected_items as f64) * bits_per_key).ceil() as u32;
        let num_bits = num_bits.max(64);
        let num_hashes = ((bits_per_key * 2.0f64.ln()).ceil() as u32).clamp(1, MAX_HASHES);

        Self {
            bits: vec![0u64; num_bits.div_ceil(64) as usize],
            num_hashes,
            num_bits,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_key(key);
        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    /// `false` means definitely absent.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_key(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            (self.bits[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
        })
    }

    /// Format: [num_hashes(4B)][num_bits(4B)][words(8B each)]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bits.len() * 8);
        buf.extend_from_slice(&self.num_hashes.to_be_bytes());
        buf.extend_from_slice(&self.num_bits.to_be_bytes());
        for word in &self.bits {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data, Context::File);
        let num_hashes = r.u32("bloom hash count")?;
        let num_bits = r.u32("bloom bit count")?;
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(Error::CorruptFile(format!(
                "bloom filter has {num_hashes} hash functions"
            )));
        }
        if num_bits == 0 {
            return Err(Error::CorruptFile("bloom filter has no bits".into()));
        }
        let words = num_bits.div_ceil(64) as usize;
        if r.remaining() != words * 8 {
            return Err(Error::CorruptFile(format!(
                "bloom filter of {num_bits} bits needs {} bytes, found {}",
                words * 8,
                r.remaining()
            )));
        }
        let mut bits = Vec::with_capacity(words);
        for _ in 0..words {
            bits.push(r.u64("bloom word")?);
        }
        Ok(Self {
            bits,
            num_hashes,
            num_bits,
        })
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    fn hash_key(key: &[u8]) -> (u64, u64) {
        let hash = xxh3_128(key);
        (hash as u64, (hash >> 64) as u64)
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u32 {
        (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % u64::from(self.num_bits)) as u32
    }
}
