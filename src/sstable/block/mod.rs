//! Fixed-length, independently compressed and checksummed data blocks.

pub mod builder;
pub mod reader;

pub use builder::{BlockBuilder, BlockOutput};
pub use reader::{BlockReader, BlockTable};
