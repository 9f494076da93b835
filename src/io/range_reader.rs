use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Positional reads over a file-like resource.
///
/// Reads carry no cursor state. Once parallel decoding is enabled the same
/// reader is hit concurrently at unrelated offsets.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Name of the resource in log lines; the path for local files.
    fn identifier(&self) -> &str;
}

/// Validate `len` bytes at `offset` against a resource of `size` bytes and
/// return the exclusive end offset.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<u64, IoError> {
    offset
        .checked_add(len as u64)
        .filter(|&end| end <= size)
        .ok_or(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        })
}
