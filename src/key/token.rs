//! Partition tokens and the order partitions are stored in.

use std::fmt;

/// Position of a partition on the ring: the Murmur3 hash of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub i64);

impl Token {
    pub const MIN: Token = Token(i64::MIN);
    pub const MAX: Token = Token(i64::MAX);

    /// Token of an encoded partition key.
    ///
    /// First half of MurmurHash3 x64_128 with seed 0, computed the way the
    /// Murmur3 partitioner does it (tail bytes are sign-extended). `i64::MIN`
    /// is reserved as the ring minimum and maps to `i64::MAX`.
    pub fn of(key: &[u8]) -> Token {
        let (h1, _) = murmur3_x64_128(key, 0);
        let token = h1 as i64;
        if token == i64::MIN {
            Token(i64::MAX)
        } else {
            Token(token)
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition key together with its token.
///
/// Ordering is (token, key bytes unsigned), which is the order partitions are
/// written in and the order every scanner and merge yields them in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    pub token: Token,
    pub key: Vec<u8>,
}

impl DecoratedKey {
    pub fn new(key: Vec<u8>) -> Self {
        DecoratedKey {
            token: Token::of(&key),
            key,
        }
    }
}

/// Inclusive token range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    pub min: Token,
    pub max: Token,
}

/// Most sub-ranges [`TokenRange::split`] will produce.
pub const MAX_SPLITS: usize = 1 << 16;

impl TokenRange {
    /// Every token; scanning with this range reads the whole file.
    pub const FULL: TokenRange = TokenRange {
        min: Token::MIN,
        max: Token::MAX,
    };

    pub fn new(min: i64, max: i64) -> Self {
        TokenRange {
            min: Token(min),
            max: Token(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, token: Token) -> bool {
        self.min <= token && token <= self.max
    }

    /// Whether any token in `[lo, hi]` falls in this range.
    pub fn intersects(&self, lo: Token, hi: Token) -> bool {
        !self.is_empty() && lo <= self.max && self.min <= hi
    }

    /// Cut the range into at most `n` disjoint, contiguous sub-ranges, and
    /// never more than [`MAX_SPLITS`].
    ///
    /// Running one merge per sub-range and concatenating the results in order
    /// gives the same output as one merge over the whole range.
    pub fn split(&self, n: usize) -> Vec<TokenRange> {
        if self.is_empty() {
            return Vec::new();
        }
        let lo = self.min.0 as i128;
        let hi = self.max.0 as i128;
        let width = hi - lo + 1;
        let parts = (n.clamp(1, MAX_SPLITS) as i128).min(width);
        let step = width / parts;
        let extra = width % parts;

        let mut ranges = Vec::with_capacity(parts as usize);
        let mut start = lo;
        for i in 0..parts {
            let len = step + i128::from(i < extra);
            let end = start + len - 1;
            ranges.push(TokenRange {
                min: Token(start as i64),
                max: Token(end as i64),
            });
            start = end + 1;
        }
        ranges
    }
}

impl Default for TokenRange {
    fn default() -> Self {
        TokenRange::FULL
    }
}

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

fn fmix(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

// Tail bytes are widened as signed bytes, matching the partitioner that
// produced the tokens in existing files.
fn signed(byte: u8) -> u64 {
    byte as i8 as i64 as u64
}

pub(crate) fn murmur3_x64_128(key: &[u8], seed: u64) -> (u64, u64) {
    let nblocks = key.len() / 16;
    let mut h1 = seed;
    let mut h2 = seed;

    for i in 0..nblocks {
        let block = &key[i * 16..i * 16 + 16];
        let mut k1 = read_u64_le(&block[..8]);
        let mut k2 = read_u64_le(&block[8..]);

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = &key[nblocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;

    for i in (8..tail.len()).rev() {
        k2 ^= signed(tail[i]) << ((i - 8) * 8);
    }
    if tail.len() > 8 {
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }

    for i in (0..tail.len().min(8)).rev() {
        k1 ^= signed(tail[i]) << (i * 8);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= key.len() as u64;
    h2 ^= key.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix(h1);
    h2 = fmix(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}
