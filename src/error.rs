use std::io;

use thiserror::Error;

/// Unified error type for the reader.
///
/// Every failure is surfaced as one of these values at the point iteration
/// reaches it. Nothing is retried: the files are immutable, so decoding the
/// same bytes again cannot produce a different outcome.
#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be read (missing, unreachable, truncated read).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The on-disk format version is newer than this reader understands.
    #[error("unsupported format version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },
    /// File-level structure is invalid (bad magic, bad metadata checksum, ...).
    #[error("corrupt file: {0}")]
    CorruptFile(String),
    /// A single data block failed its checksum or could not be decoded.
    #[error("corrupt block {block}: {reason}")]
    CorruptBlock { block: u64, reason: String },
    /// Key bytes do not decode under the column types.
    #[error("malformed key: {0}")]
    MalformedKey(String),
    /// The file's contents disagree with the schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// The caller passed something unusable (bad options, unsorted input).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn corrupt_block(block: u64, reason: impl Into<String>) -> Self {
        Error::CorruptBlock {
            block,
            reason: reason.into(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
