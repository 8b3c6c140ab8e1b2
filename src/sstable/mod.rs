//! The on-disk table format: reading it, and writing fixtures in it.

pub mod block;
pub mod builder;
pub mod format;
pub mod reader;
pub mod serialize;
pub mod source;

pub use builder::SSTableBuilder;
pub use format::{Compression, FORMAT_VERSION, Stats};
pub use reader::{SSTable, SSTableScanner};
pub use source::DataSource;
