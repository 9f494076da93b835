//! Strile offset cache.
//!
//! Answers "where is strip/tile N and how long is it" for one directory.
//! Small tables are read once up front. Large tables (pyramidal images can
//! carry millions of tiles) are paged: fixed-size windows of both arrays are
//! fetched on first use and kept in a small LRU.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::DecodeError;
use crate::format::tiff::{IfdEntry, TiffHeader, ValueReader};
use crate::io::RangeReader;

/// Tables with more entries than this are paged rather than loaded eagerly.
pub const DEFAULT_LAZY_THRESHOLD: u64 = 4096;

/// Number of entries fetched per lazy window.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Windows kept in memory by a lazy cache.
const WINDOW_CAPACITY: usize = 16;

/// Location of one compressed strile in the file.
///
/// A zero length marks a strile that was never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrileRegion {
    pub offset: u64,
    pub length: u64,
}

impl StrileRegion {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

// =============================================================================
// StrileCache
// =============================================================================

/// Offset/byte-count lookup for every strile of a directory.
pub struct StrileCache {
    len: usize,
    backend: Backend,
}

enum Backend {
    Eager {
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
    },
    Lazy(LazyTables),
}

struct LazyTables {
    reader: Arc<dyn RangeReader>,
    header: TiffHeader,
    offsets: IfdEntry,
    byte_counts: IfdEntry,
    batch_size: usize,
    windows: Mutex<LruCache<usize, Arc<Window>>>,
}

struct Window {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl StrileCache {
    /// Build the cache for a pair of offsets/byte-counts entries.
    ///
    /// Tables larger than `lazy_threshold` entries are paged in windows of
    /// `batch_size`; anything else is read immediately.
    ///
    /// # Errors
    /// - `StrileCountMismatch` if the two tables differ in length
    /// - `Tiff` if an eager table cannot be read
    pub async fn open(
        reader: Arc<dyn RangeReader>,
        header: &TiffHeader,
        offsets: &IfdEntry,
        byte_counts: &IfdEntry,
        lazy_threshold: u64,
        batch_size: usize,
    ) -> Result<Self, DecodeError> {
        if offsets.count != byte_counts.count {
            return Err(DecodeError::StrileCountMismatch {
                offsets: offsets.count as usize,
                byte_counts: byte_counts.count as usize,
            });
        }
        let len = usize::try_from(offsets.count).map_err(|_| {
            DecodeError::InvalidGeometry(format!("{} striles exceed address space", offsets.count))
        })?;

        let fully_inline = offsets.is_inline && byte_counts.is_inline;
        if offsets.count <= lazy_threshold || fully_inline {
            let values = ValueReader::new(reader.as_ref(), header);
            let offsets = values.read_u64_array(offsets).await?;
            let byte_counts = values.read_u64_array(byte_counts).await?;
            return Self::from_values(offsets, byte_counts);
        }

        trace!(
            file = reader.identifier(),
            striles = len,
            batch_size,
            "Paging strile tables lazily"
        );

        let capacity = NonZeroUsize::new(WINDOW_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            len,
            backend: Backend::Lazy(LazyTables {
                reader,
                header: *header,
                offsets: offsets.clone(),
                byte_counts: byte_counts.clone(),
                batch_size: batch_size.max(1),
                windows: Mutex::new(LruCache::new(capacity)),
            }),
        })
    }

    /// Build an eager cache from already decoded tables.
    pub fn from_values(offsets: Vec<u64>, byte_counts: Vec<u64>) -> Result<Self, DecodeError> {
        if offsets.len() != byte_counts.len() {
            return Err(DecodeError::StrileCountMismatch {
                offsets: offsets.len(),
                byte_counts: byte_counts.len(),
            });
        }
        Ok(Self {
            len: offsets.len(),
            backend: Backend::Eager {
                offsets,
                byte_counts,
            },
        })
    }

    /// Number of striles in the tables.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.backend, Backend::Lazy(_))
    }

    /// Look up strile `index`.
    ///
    /// # Errors
    /// - `MissingStrile` if `index` is outside the tables
    /// - `Tiff` if a lazy window cannot be read
    pub async fn get(&self, index: usize) -> Result<StrileRegion, DecodeError> {
        if index >= self.len {
            return Err(DecodeError::MissingStrile {
                index,
                count: self.len,
            });
        }

        match &self.backend {
            Backend::Eager {
                offsets,
                byte_counts,
            } => Ok(StrileRegion::new(offsets[index], byte_counts[index])),
            Backend::Lazy(tables) => {
                let window_index = index / tables.batch_size;
                let window = tables.window(window_index, self.len).await?;
                let at = index - window_index * tables.batch_size;
                Ok(StrileRegion::new(window.offsets[at], window.byte_counts[at]))
            }
        }
    }
}

impl LazyTables {
    async fn window(&self, window_index: usize, len: usize) -> Result<Arc<Window>, DecodeError> {
        {
            let mut windows = self.windows.lock().await;
            if let Some(window) = windows.get(&window_index) {
                return Ok(Arc::clone(window));
            }
        }

        // Lock released while fetching; a concurrent miss may fetch the same
        // window twice, which is harmless.
        let start = window_index * self.batch_size;
        let count = self.batch_size.min(len - start);
        let values = ValueReader::new(self.reader.as_ref(), &self.header);
        let offsets = values.read_u64_window(&self.offsets, start, count).await?;
        let byte_counts = values
            .read_u64_window(&self.byte_counts, start, count)
            .await?;
        trace!(window = window_index, start, count, "Loaded strile window");

        let window = Arc::new(Window {
            offsets,
            byte_counts,
        });
        self.windows
            .lock()
            .await
            .put(window_index, Arc::clone(&window));
        Ok(window)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tiff::{ByteOrder, FieldType};
    use crate::io::MemoryRangeReader;

    fn header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    fn long_entry(tag_id: u16, count: u64, offset: u32) -> IfdEntry {
        IfdEntry {
            tag_id,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count,
            value_offset_bytes: offset.to_le_bytes().to_vec(),
            is_inline: count == 1,
        }
    }

    /// File holding `n` offsets at 0 and `n` byte counts right after.
    fn tables(n: u32) -> (Arc<dyn RangeReader>, IfdEntry, IfdEntry) {
        let mut data = Vec::new();
        for i in 0..n {
            data.extend_from_slice(&(1000 + i * 10).to_le_bytes());
        }
        for i in 0..n {
            // Every seventh strile is empty
            let len = if i % 7 == 3 { 0 } else { i + 1 };
            data.extend_from_slice(&len.to_le_bytes());
        }
        let reader: Arc<dyn RangeReader> = Arc::new(MemoryRangeReader::new(data, "mem://tables"));
        (
            reader,
            long_entry(324, n as u64, 0),
            long_entry(325, n as u64, n * 4),
        )
    }

    #[tokio::test]
    async fn test_eager_and_lazy_agree() {
        let (reader, offsets, counts) = tables(50);
        let eager = StrileCache::open(reader.clone(), &header(), &offsets, &counts, u64::MAX, 8)
            .await
            .unwrap();
        let lazy = StrileCache::open(reader, &header(), &offsets, &counts, 0, 8)
            .await
            .unwrap();
        assert!(!eager.is_lazy());
        assert!(lazy.is_lazy());
        assert_eq!(eager.len(), 50);
        assert_eq!(lazy.len(), 50);

        // Any order, repeated lookups
        for index in (0..50).rev().chain(0..50).chain([17, 17, 3]) {
            assert_eq!(
                eager.get(index).await.unwrap(),
                lazy.get(index).await.unwrap(),
                "index {}",
                index
            );
        }
        assert_eq!(lazy.get(3).await.unwrap(), StrileRegion::new(1030, 0));
        assert!(lazy.get(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_is_malformed() {
        let (reader, offsets, _) = tables(10);
        let counts = long_entry(325, 9, 40);
        let result = StrileCache::open(reader, &header(), &offsets, &counts, 0, 4).await;
        assert!(matches!(
            result,
            Err(DecodeError::StrileCountMismatch {
                offsets: 10,
                byte_counts: 9
            })
        ));
    }

    #[tokio::test]
    async fn test_index_out_of_range() {
        let cache = StrileCache::from_values(vec![8], vec![4]).unwrap();
        let err = cache.get(1).await.unwrap_err();
        assert!(matches!(err, DecodeError::MissingStrile { index: 1, count: 1 }));
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_single_inline_entry_is_eager() {
        let (reader, _, _) = tables(1);
        let offsets = long_entry(273, 1, 500);
        let counts = long_entry(279, 1, 64);
        let cache = StrileCache::open(reader, &header(), &offsets, &counts, 0, 4)
            .await
            .unwrap();
        assert!(!cache.is_lazy());
        assert_eq!(cache.get(0).await.unwrap(), StrileRegion::new(500, 64));
    }
}
