//! Pixel types and destination buffers.
//!
//! # Components
//!
//! - [`Pixel`]: the pixel formats stages produce, all convertible through [`Rgba64`]
//! - [`PixelBufferWriter`] / [`PixelBufferReader`]: 2-D windows over pixel storage
//! - [`CroppedWriter`], [`OrientedWriter`]: windows wrapping other windows
//! - [`PixelWriter`]: the handle stages write through, leasing [`RowSpan`]s and [`ColumnSpan`]s
//! - [`ErasedSink`]: a caller destination with its pixel type erased

mod buffer;
mod convert;
mod orient;
mod types;

pub use buffer::{
    ColumnSpan, CroppedReader, CroppedWriter, ImageBuffer, PixelBufferReader, PixelBufferWriter,
    PixelWriter, RowSpan,
};
pub use convert::{resolve_sink, ErasedSink, PixelConversion, TypedSink};
pub use orient::OrientedWriter;
pub use types::{Cmyk32, Cmyk64, Gray16, Gray8, Pixel, Rgb24, Rgb48, Rgba32, Rgba64};
