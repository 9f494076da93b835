//! Range readers.
//!
//! Everything the decoder reads goes through [`RangeReader`]: directory
//! parsing, strile table paging and strile payloads.

mod file_reader;
mod memory_reader;
mod range_reader;

pub use file_reader::FileRangeReader;
pub use memory_reader::MemoryRangeReader;
pub use range_reader::RangeReader;

pub(crate) use range_reader::check_range;
