//! Strile decompressors.
//!
//! A [`Decompressor`] turns the compressed bytes of one strile plane into
//! raw scanlines. [`DecompressorRegistry`] maps Compression tag values to
//! implementations; callers can register their own or override defaults.
//!
//! | Code        | Scheme           | Implementation            |
//! |-------------|------------------|---------------------------|
//! | 1           | None             | [`Uncompressed`]          |
//! | 5           | LZW              | [`Lzw`] (weezl)           |
//! | 7           | JPEG             | [`Jpeg`] (image)          |
//! | 8, 32946    | Deflate          | [`Deflate`] (flate2)      |
//! | 32773       | PackBits         | [`PackBits`]              |

mod deflate;
mod jpeg;
mod lzw;
mod packbits;
mod uncompressed;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::format::tiff::{ByteOrder, Compression};

pub use deflate::Deflate;
pub use jpeg::Jpeg;
pub use lzw::Lzw;
pub use packbits::PackBits;
pub use uncompressed::Uncompressed;

/// Everything a decompressor may need to know about the strile plane it
/// is decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecompressionContext<'a> {
    /// Raw Compression tag value
    pub compression: u16,
    /// Raw PhotometricInterpretation tag value
    pub photometric: u16,
    /// Strile width in pixels
    pub width: u32,
    /// Strile height in rows
    pub height: u32,
    pub bits_per_sample: u16,
    /// Samples stored in this plane
    pub samples_per_pixel: u16,
    pub jpeg_tables: Option<&'a [u8]>,
    pub byte_order: ByteOrder,
}

/// Decompression capability for one compression scheme.
pub trait Decompressor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `input` into `output`, returning the number of bytes written.
    ///
    /// Writing fewer bytes than `output.len()` is not an error here; the
    /// caller decides whether the scanline layout was satisfied.
    fn decompress(
        &self,
        ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError>;

    /// Whether several striles may be decoded through this instance at once.
    fn is_parallel_safe(&self) -> bool {
        true
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Compression code → decompressor map.
#[derive(Clone)]
pub struct DecompressorRegistry {
    decompressors: HashMap<u16, Arc<dyn Decompressor>>,
}

impl DecompressorRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            decompressors: HashMap::new(),
        }
    }

    /// A registry with every built-in decompressor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Compression::None.as_u16(), Arc::new(Uncompressed));
        registry.register(Compression::Lzw.as_u16(), Arc::new(Lzw));
        registry.register(Compression::Jpeg.as_u16(), Arc::new(Jpeg));
        registry.register(Compression::Deflate.as_u16(), Arc::new(Deflate));
        registry.register(Compression::AdobeDeflate.as_u16(), Arc::new(Deflate));
        registry.register(Compression::PackBits.as_u16(), Arc::new(PackBits));
        registry
    }

    /// Register (or replace) the decompressor for `code`.
    pub fn register(&mut self, code: u16, decompressor: Arc<dyn Decompressor>) {
        self.decompressors.insert(code, decompressor);
    }

    /// Look up the decompressor for `code`.
    ///
    /// # Errors
    /// - `UnsupportedCompression` if nothing is registered for the code
    pub fn get(&self, code: u16) -> Result<Arc<dyn Decompressor>, DecodeError> {
        self.decompressors
            .get(&code)
            .cloned()
            .ok_or_else(|| DecodeError::UnsupportedCompression(Compression::describe(code)))
    }

    pub fn contains(&self, code: u16) -> bool {
        self.decompressors.contains_key(&code)
    }
}

impl Default for DecompressorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.decompressors.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("DecompressorRegistry")
            .field("codes", &codes)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
