//! Magic-number detection.
//!
//! A file is accepted as TIFF when its first bytes carry a valid byte order
//! mark followed by version 42 (classic) or 43 (BigTIFF). No deeper sniffing
//! is attempted.

use crate::error::TiffError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, TIFF_HEADER_SIZE};

/// Check if bytes start with a TIFF or BigTIFF header.
///
/// Recognizes `II*\0`, `MM\0*`, `II+\0` and `MM\0+`.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    ByteOrder::from_mark(bytes)
        .map(|order| order.read_u16(&bytes[2..]))
        .is_some_and(|version| version == 42 || version == 43)
}

/// Read the first bytes of a resource and check the magic number.
///
/// Returns `Ok(false)` for files that are too small or carry another magic.
pub async fn detect_tiff<R: RangeReader + ?Sized>(reader: &R) -> Result<bool, TiffError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Ok(false);
    }
    let bytes = reader.read_exact_at(0, TIFF_HEADER_SIZE).await?;
    Ok(is_tiff_header(&bytes))
}

// =============================================================================
// Tests
// =============================================================================
