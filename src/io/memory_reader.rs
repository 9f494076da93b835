use async_trait::async_trait;
use bytes::Bytes;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// A [`RangeReader`] over bytes already held in memory.
///
/// Slicing a [`Bytes`] is reference counted, so reads never copy.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    /// Create a reader over `data`.
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let end = check_range(offset, len, self.data.len() as u64)?;
        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_within_bounds() {
        let reader = MemoryRangeReader::new(vec![1u8, 2, 3, 4, 5], "mem://test");
        let bytes = reader.read_exact_at(1, 3).await.unwrap();
        assert_eq!(&bytes[..], &[2, 3, 4]);
        assert_eq!(reader.size(), 5);
        assert_eq!(reader.identifier(), "mem://test");
    }

    #[tokio::test]
    async fn test_read_out_of_bounds() {
        let reader = MemoryRangeReader::new(vec![0u8; 4], "mem://test");
        let result = reader.read_exact_at(2, 3).await;
        assert!(matches!(
            result,
            Err(IoError::RangeOutOfBounds {
                offset: 2,
                requested: 3,
                size: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_read_offset_overflow() {
        let reader = MemoryRangeReader::new(vec![0u8; 4], "mem://test");
        assert!(reader.read_exact_at(u64::MAX, 2).await.is_err());
    }
}
