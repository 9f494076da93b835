//! File format parsing.
//!
//! - [`tiff`] reads headers, IFDs and typed image directories
//! - [`detect`] is the magic-number check
//! - [`jpeg`] merges shared JPEG tables into abbreviated strile streams

pub mod detect;
pub mod jpeg;
pub mod tiff;

pub use detect::{detect_tiff, is_tiff_header};
pub use jpeg::{is_abbreviated_stream, merge_jpeg_tables, prepare_strile_jpeg};
