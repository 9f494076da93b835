//! # tiff-pipeline
//!
//! A streaming TIFF and BigTIFF decoder built as a middleware pipeline.
//!
//! Strile data is fetched through positional range reads, so decoding a
//! window of a multi-gigabyte image touches only the strips or tiles it
//! intersects. Decoding can fan out across striles with bounded
//! parallelism.
//!
//! ## Architecture
//!
//! - [`io`] - Range readers over files and memory
//! - [`mod@format`] - TIFF header, IFD and typed directory parsing
//! - [`strile`] - Eager or lazily paged strile offset tables
//! - [`compression`] - Decompressors keyed by Compression tag value
//! - [`pipeline`] - The middleware chain and the decode context
//! - [`middleware`] - The pipeline stages
//! - [`pixel`] - Pixel types and destination buffers
//! - [`decoder`] - Builds the pipeline for one directory
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiff_pipeline::{
//!     read_directories, CancellationToken, DecoderOptions, FileRangeReader, ImageBuffer,
//!     ImageDecoder, Point, RangeReader, Rgba64, Size,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader: Arc<dyn RangeReader> = Arc::new(FileRangeReader::open("slide.tif").await?);
//!     let directories = read_directories(reader.as_ref()).await?;
//!     let decoder = ImageDecoder::new(&directories[0], reader, DecoderOptions::default()).await?;
//!
//!     let buffer = Arc::new(ImageBuffer::<Rgba64>::new(256, 256));
//!     decoder
//!         .decode::<Rgba64>(
//!             Point::new(1024, 1024),
//!             Size::new(256, 256),
//!             Point::new(0, 0),
//!             buffer.clone(),
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod geometry;
pub mod io;
pub mod middleware;
pub mod pipeline;
pub mod pixel;
pub mod pool;
pub mod strile;

// Re-export commonly used types
pub use compression::{DecompressionContext, Decompressor, DecompressorRegistry};
pub use config::{Cli, Command, DecodeConfig, InfoConfig};
pub use decoder::{DecoderOptions, ImageDecoder};
pub use error::{DecodeError, IoError, TiffError};
pub use format::tiff::{
    read_directories, read_header, read_ifd, ByteOrder, Compression, DirectorySummary, FieldType,
    Ifd, IfdEntry, ImageDirectory, Photometric, StrileLayout, TiffHeader, TiffTag, ValueReader,
    BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use format::{detect_tiff, is_tiff_header};
pub use geometry::{Orientation, Point, Rect, Size};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use pipeline::{CancellationToken, DecodeContext, Middleware, Next, Pipeline};
pub use pixel::{
    Cmyk32, Cmyk64, Gray16, Gray8, ImageBuffer, Pixel, PixelBufferReader, PixelBufferWriter,
    PixelConversion, Rgb24, Rgb48, Rgba32, Rgba64,
};
pub use pool::{MemoryPool, PooledBuffer};
pub use strile::{StrileCache, StrileRegion};
