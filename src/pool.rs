//! Byte buffer pool for decompressed striles.
//!
//! Decoding a large image touches thousands of striles of the same size.
//! The pool keeps released buffers in power-of-two size classes so that the
//! next strile of the same shape reuses the allocation instead of asking the
//! allocator again.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of buffers retained per size class.
pub const DEFAULT_BUFFERS_PER_CLASS: usize = 8;

/// Smallest size class (bytes).
const MIN_CLASS: usize = 4096;

/// Source of zeroed byte buffers.
///
/// Cloning is cheap and clones share the same buckets.
#[derive(Clone)]
pub struct MemoryPool {
    shared: Option<Arc<PoolShared>>,
}

struct PoolShared {
    max_per_class: usize,
    buckets: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl MemoryPool {
    /// Pool retaining up to `max_per_class` buffers in every size class.
    pub fn pooled(max_per_class: usize) -> Self {
        Self {
            shared: Some(Arc::new(PoolShared {
                max_per_class,
                buckets: Mutex::new(HashMap::new()),
            })),
        }
    }

    /// Pool that allocates fresh buffers and drops them on release.
    pub fn unpooled() -> Self {
        Self { shared: None }
    }

    pub fn is_pooled(&self) -> bool {
        self.shared.is_some()
    }

    /// Rent a zeroed buffer of exactly `len` bytes.
    pub fn rent(&self, len: usize) -> PooledBuffer {
        let Some(shared) = &self.shared else {
            return PooledBuffer {
                data: vec![0; len],
                pool: None,
            };
        };

        let class = size_class(len);
        let reused = shared
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&class)
            .and_then(Vec::pop);

        let mut data = reused.unwrap_or_else(|| Vec::with_capacity(class));
        data.clear();
        data.resize(len, 0);
        PooledBuffer {
            data,
            pool: Some(Arc::clone(shared)),
        }
    }

    /// Number of idle buffers currently retained.
    pub fn idle_buffers(&self) -> usize {
        match &self.shared {
            Some(shared) => shared
                .buckets
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .map(Vec::len)
                .sum(),
            None => 0,
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::pooled(DEFAULT_BUFFERS_PER_CLASS)
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("pooled", &self.is_pooled())
            .field("idle_buffers", &self.idle_buffers())
            .finish()
    }
}

fn size_class(len: usize) -> usize {
    len.max(MIN_CLASS).next_power_of_two()
}

impl PoolShared {
    fn give_back(&self, mut data: Vec<u8>) {
        let class = data.capacity();
        // Buffers that grew past their class are not reusable as that class
        if !class.is_power_of_two() || class < MIN_CLASS {
            return;
        }
        data.clear();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(class).or_default();
        if bucket.len() < self.max_per_class {
            bucket.push(data);
        }
    }
}

// =============================================================================
// PooledBuffer
// =============================================================================

/// A rented buffer. Returned to its pool when dropped.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<Arc<PoolShared>>,
}

impl PooledBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_is_zeroed_and_sized() {
        let pool = MemoryPool::default();
        let buf = pool.rent(100);
        assert_eq!(buf.len(), 100);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_buffer_returns_on_drop() {
        let pool = MemoryPool::pooled(2);
        {
            let mut buf = pool.rent(5000);
            buf[0] = 0xAB;
        }
        assert_eq!(pool.idle_buffers(), 1);

        // Reused buffer is zeroed again
        let buf = pool.rent(6000);
        assert_eq!(pool.idle_buffers(), 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_class_capacity_is_bounded() {
        let pool = MemoryPool::pooled(1);
        let a = pool.rent(10);
        let b = pool.rent(10);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_buffers(), 1);
    }

    #[test]
    fn test_unpooled_retains_nothing() {
        let pool = MemoryPool::unpooled();
        drop(pool.rent(10));
        assert_eq!(pool.idle_buffers(), 0);
        assert!(!pool.is_pooled());
    }

    #[test]
    fn test_size_class() {
        assert_eq!(size_class(1), MIN_CLASS);
        assert_eq!(size_class(MIN_CLASS + 1), MIN_CLASS * 2);
        assert_eq!(size_class(65536), 65536);
    }
}
