//! TIFF structure parsing.
//!
//! This module handles parsing of TIFF and BigTIFF files into the typed
//! directories the decoder factory consumes.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Describes one image: dimensions, sample
//!   layout, compression and where its strips or tiles live in the file.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod directory;
mod parser;
mod tags;
mod values;

pub use directory::{
    read_directories, read_header, read_ifd, DirectorySummary, ImageDirectory, StrileLayout,
};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{
    Compression, ExtraSample, FieldType, Photometric, PlanarConfiguration, TiffTag,
    FILL_ORDER_LSB_FIRST, PREDICTOR_HORIZONTAL, PREDICTOR_NONE, SAMPLE_FORMAT_UINT,
};
pub use values::ValueReader;
