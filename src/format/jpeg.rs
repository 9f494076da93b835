//! JPEG stream handling for JPEG-compressed striles.
//!
//! TIFF writers usually store the quantization (DQT) and Huffman (DHT)
//! tables once in the `JPEGTables` tag and leave them out of every strip or
//! tile. Such an abbreviated strile is not decodable on its own: the tables
//! have to be spliced in front of its scan data first.
//!
//! # Merging Process
//!
//! 1. JPEGTables starts with SOI (FFD8) and ends with EOI (FFD9)
//! 2. Strile data also starts with SOI and ends with EOI
//! 3. To merge: strip EOI from tables, strip SOI from strile, concatenate
//!
//! Result: SOI + tables_content + strile_content + EOI

use std::borrow::Cow;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// JPEG Stream Analysis
// =============================================================================

/// Check if a JPEG stream reaches its first scan without defining any
/// quantization or Huffman table.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the marker segment (marker + 2-byte length + payload)
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Merge JPEGTables with abbreviated strile data.
///
/// Empty tables return the strile unchanged; an empty strile yields an
/// empty result.
pub fn merge_jpeg_tables(tables: &[u8], strile: &[u8]) -> Vec<u8> {
    if tables.is_empty() {
        return strile.to_vec();
    }
    if strile.is_empty() {
        return Vec::new();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let strile_start = if strile.starts_with(&SOI) { 2 } else { 0 };

    let mut result = Vec::with_capacity(tables_end + strile.len() - strile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&strile[strile_start..]);
    result
}

/// Produce a decodable stream for one strile.
///
/// Tables are merged in only when they exist and the strile is abbreviated.
pub fn prepare_strile_jpeg<'a>(tables: Option<&[u8]>, strile: &'a [u8]) -> Cow<'a, [u8]> {
    match tables {
        Some(tables) if is_abbreviated_stream(strile) => {
            Cow::Owned(merge_jpeg_tables(tables, strile))
        }
        _ => Cow::Borrowed(strile),
    }
}

// =============================================================================
// Tests
// =============================================================================
