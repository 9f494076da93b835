//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays).
//!
//! # Windowed reads
//!
//! Strile offset and byte count tables can hold millions of entries for very
//! large tiled images. [`ValueReader::read_u64_window`] fetches a contiguous
//! slice of such an array without materializing the rest, which is what the
//! lazy strile cache pages through.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// Combines a [`RangeReader`] with the file header so values are decoded in
/// the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read a single unsigned value (Byte, Short, Long or Long8).
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }

        if entry.count != 1 {
            return Err(invalid(entry, format!("expected count 1, got {}", entry.count)));
        }

        let values = self.read_u64_array(entry).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| invalid(entry, "empty value".to_string()))
    }

    /// Read a single value that must fit in 32 bits.
    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        let value = self.read_u64(entry).await?;
        u32::try_from(value).map_err(|_| invalid(entry, format!("{} exceeds 32 bits", value)))
    }

    /// Read an array of unsigned values, widening each to u64.
    ///
    /// The whole array is fetched in a single range request.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        self.read_u64_window(entry, 0, entry.count as usize).await
    }

    /// Read `count` values of an unsigned array starting at element `start`.
    ///
    /// Only the bytes of the requested window are fetched.
    ///
    /// # Errors
    /// - `InvalidTagValue` if the window exceeds the entry's count or the
    ///   field type is not an unsigned integer type
    pub async fn read_u64_window(
        &self,
        entry: &IfdEntry,
        start: usize,
        count: usize,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if !is_unsigned(field_type) {
            return Err(invalid(
                entry,
                format!("expected an unsigned integer array, got {:?}", field_type),
            ));
        }
        if start as u64 + count as u64 > entry.count {
            return Err(invalid(
                entry,
                format!(
                    "window {}..{} exceeds {} values",
                    start,
                    start + count,
                    entry.count
                ),
            ));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let elem = field_type.size_in_bytes();
        let bytes = if entry.is_inline {
            Bytes::copy_from_slice(&entry.value_offset_bytes[start * elem..(start + count) * elem])
        } else {
            let offset = entry.value_offset(self.header.byte_order) + (start * elem) as u64;
            self.reader.read_exact_at(offset, count * elem).await?
        };

        Ok(parse_u64_array(
            &bytes,
            count,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Read an array of 16-bit values (Byte or Short).
    pub async fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        let values = self.read_u64_array(entry).await?;
        values
            .into_iter()
            .map(|v| u16::try_from(v).map_err(|_| invalid(entry, format!("{} exceeds 16 bits", v))))
            .collect()
    }

    /// Read an array of Rational values as floating point.
    ///
    /// A zero denominator yields 0.0.
    pub async fn read_rational_array(&self, entry: &IfdEntry) -> Result<Vec<f64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if field_type != FieldType::Rational {
            return Err(invalid(
                entry,
                format!("expected Rational, got {:?}", field_type),
            ));
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        Ok(bytes
            .chunks_exact(8)
            .map(|pair| {
                let num = byte_order.read_u32(&pair[0..4]);
                let den = byte_order.read_u32(&pair[4..8]);
                if den == 0 {
                    0.0
                } else {
                    num as f64 / den as f64
                }
            })
            .collect())
    }
}

fn is_unsigned(field_type: FieldType) -> bool {
    matches!(
        field_type,
        FieldType::Byte | FieldType::Short | FieldType::Long | FieldType::Long8
    )
}

fn invalid(entry: &IfdEntry, message: String) -> TiffError {
    TiffError::InvalidTagValue {
        tag: super::tags::TiffTag::from_u16(entry.tag_id)
            .map(|t| t.name())
            .unwrap_or("unknown"),
        message,
    }
}

/// Widen raw unsigned values to u64.
///
/// Stops early if `bytes` holds fewer than `count` values. Non integer field
/// types yield an empty vector.
fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let elem = field_type.size_in_bytes();
    let read: fn(ByteOrder, &[u8]) -> u64 = match field_type {
        FieldType::Byte => |_, b| b[0] as u64,
        FieldType::Short => |o, b| o.read_u16(b) as u64,
        FieldType::Long => |o, b| o.read_u32(b) as u64,
        FieldType::Long8 => |o, b| o.read_u64(b),
        _ => return Vec::new(),
    };

    bytes
        .chunks_exact(elem)
        .take(count)
        .map(|chunk| read(byte_order, chunk))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
