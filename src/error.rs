use thiserror::Error;

/// I/O errors that can occur when reading file content
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system or the underlying store
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::Io(err.to_string()),
        }
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The IFD chain loops back on itself
    #[error("IFD chain revisits offset {0}")]
    IfdCycle(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while decoding pixel data through the pipeline.
///
/// Variants fall into three classes, see [`DecodeError::is_malformed`],
/// [`DecodeError::is_unsupported`] and [`DecodeError::is_cancelled`].
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// I/O error while reading strile data
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Directory or tag value error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    // -------------------------------------------------------------------------
    // Malformed data
    // -------------------------------------------------------------------------
    /// Offsets and byte counts tables disagree on the number of striles
    #[error("Strile table mismatch: {offsets} offsets but {byte_counts} byte counts")]
    StrileCountMismatch { offsets: usize, byte_counts: usize },

    /// The strile tables do not cover a required index
    #[error("Strile {index} is missing, table only holds {count} entries")]
    MissingStrile { index: usize, count: usize },

    /// Fewer bytes were read than the strile region declares
    #[error("Truncated region at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedRegion {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Decompressor produced fewer bytes than the scanline layout requires
    #[error("Decompressed size mismatch: expected {expected} bytes, got {actual}")]
    DecompressedSizeMismatch { expected: usize, actual: usize },

    /// Tile dimensions are not multiples of 16
    #[error("Invalid tile size {width}x{height}: dimensions must be multiples of 16")]
    InvalidTileSize { width: u32, height: u32 },

    /// Image geometry is inconsistent (zero sized, overflowing, ...)
    #[error("Invalid image geometry: {0}")]
    InvalidGeometry(String),

    /// The compressed stream could not be decoded
    #[error("{compression} decompression failed: {message}")]
    Decompression {
        compression: &'static str,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Unsupported features
    // -------------------------------------------------------------------------
    /// Predictor other than none or horizontal differencing
    #[error("Unsupported predictor: {0}")]
    UnsupportedPredictor(u16),

    /// No decompressor is registered for this compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Photometric/sample layout combination absent from the dispatch table
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The destination pixel type differs from the decoded one and
    /// conversion is disabled
    #[error("Unsupported pixel conversion from {from} to {to}")]
    UnsupportedConversion {
        from: &'static str,
        to: &'static str,
    },

    // -------------------------------------------------------------------------
    // Control flow
    // -------------------------------------------------------------------------
    /// The decode was cancelled through its cancellation token
    #[error("Decode cancelled")]
    Cancelled,

    /// A dispatched unit stopped without reporting a result
    #[error("Decode unit aborted before completion")]
    Aborted,
}

impl DecodeError {
    /// Whether the error reports corrupt or inconsistent file data.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DecodeError::Tiff(_)
                | DecodeError::StrileCountMismatch { .. }
                | DecodeError::MissingStrile { .. }
                | DecodeError::TruncatedRegion { .. }
                | DecodeError::DecompressedSizeMismatch { .. }
                | DecodeError::InvalidTileSize { .. }
                | DecodeError::InvalidGeometry(_)
                | DecodeError::Decompression { .. }
        )
    }

    /// Whether the error reports a feature this decoder does not handle.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            DecodeError::UnsupportedPredictor(_)
                | DecodeError::UnsupportedCompression(_)
                | DecodeError::UnsupportedFormat(_)
                | DecodeError::UnsupportedConversion { .. }
        )
    }

    /// Whether the decode stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeError::Cancelled)
    }
}
