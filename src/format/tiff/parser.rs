//! TIFF header and raw IFD parsing.
//!
//! ```text
//! Classic (8 bytes):  II|MM  42  offset:u32
//! BigTIFF (16 bytes): II|MM  43  8:u16  0:u16  offset:u64
//! ```
//!
//! An IFD is an entry count (u16 or u64), the entries (12 or 20 bytes each)
//! and the offset of the next IFD (u32 or u64). Typed interpretation of the
//! entries lives in [`super::directory`].

use std::collections::HashMap;

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II")
    LittleEndian,
    /// Big-endian ("MM")
    BigEndian,
}

/// Copy the first `N` bytes of `bytes`. Panics if fewer are available.
#[inline]
fn prefix<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl ByteOrder {
    /// Decode the two-byte order mark that opens every TIFF file.
    pub fn from_mark(mark: &[u8]) -> Option<Self> {
        match mark.get(..2)? {
            b"II" => Some(ByteOrder::LittleEndian),
            b"MM" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    /// Read a u16 from the start of `bytes`.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(prefix(bytes)),
            ByteOrder::BigEndian => u16::from_be_bytes(prefix(bytes)),
        }
    }

    /// Read a u32 from the start of `bytes`.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(prefix(bytes)),
            ByteOrder::BigEndian => u32::from_be_bytes(prefix(bytes)),
        }
    }

    /// Read a u64 from the start of `bytes`.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(prefix(bytes)),
            ByteOrder::BigEndian => u64::from_be_bytes(prefix(bytes)),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets and counts)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header from the first 8 (classic) or 16 (BigTIFF) bytes.
    ///
    /// # Errors
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if version is not 42 or 43
    /// - `InvalidBigTiffOffsetSize` if BigTIFF offset size is not 8
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = ByteOrder::from_mark(bytes)
            .ok_or_else(|| TiffError::InvalidMagic(u16::from_le_bytes([bytes[0], bytes[1]])))?;

        let is_bigtiff = match byte_order.read_u16(&bytes[2..]) {
            VERSION_TIFF => false,
            VERSION_BIGTIFF => true,
            other => return Err(TiffError::InvalidVersion(other)),
        };

        let header = if is_bigtiff {
            if bytes.len() < BIGTIFF_HEADER_SIZE {
                return Err(TiffError::FileTooSmall {
                    required: BIGTIFF_HEADER_SIZE as u64,
                    actual: bytes.len() as u64,
                });
            }
            let offset_size = byte_order.read_u16(&bytes[4..]);
            if offset_size != 8 {
                return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
            }
            // Bytes 6-7 are reserved and not checked
            TiffHeader {
                byte_order,
                is_bigtiff,
                first_ifd_offset: byte_order.read_u64(&bytes[8..]),
            }
        } else {
            TiffHeader {
                byte_order,
                is_bigtiff,
                first_ifd_offset: byte_order.read_u32(&bytes[4..]) as u64,
            }
        };

        if header.first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(header.first_ifd_offset));
        }
        Ok(header)
    }

    /// Width of offsets, of the next-IFD link and of the entry value field.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the entry count field at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of one IFD entry: tag, type, count and value field.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        4 + 2 * self.value_offset_size()
    }

    /// Size of the next IFD offset field at the end of an IFD.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        self.value_offset_size()
    }

    /// Read an offset-width value (u32 or u64) from the start of `bytes`.
    #[inline]
    pub fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }

    /// Read the IFD entry count (u16 or u64) from the start of `bytes`.
    #[inline]
    pub fn read_entry_count(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u16(bytes) as u64
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One raw IFD entry.
///
/// The value field is kept as raw bytes: whether it holds the value itself
/// or a file offset depends on the field type and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag id
    pub tag_id: u16,

    /// Decoded field type, `None` when the type is unknown
    pub field_type: Option<FieldType>,

    /// Raw field type as stored
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw value/offset bytes (4 or 8 bytes)
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value is stored inline in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total size of the value in bytes, or `None` for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Interpret the value field as a file offset.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// The single inline unsigned value of this entry.
    ///
    /// `None` unless the entry is inline, holds exactly one value and is of
    /// an unsigned integer type.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        let raw = &self.value_offset_bytes;
        match self.field_type? {
            FieldType::Byte => Some(raw[0] as u64),
            FieldType::Short => Some(byte_order.read_u16(raw) as u64),
            FieldType::Long => Some(byte_order.read_u32(raw) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(raw)),
            _ => None,
        }
    }

    /// Like [`inline_u64`](Self::inline_u64), limited to 32-bit types.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        match self.field_type? {
            FieldType::Long8 => None,
            _ => self.inline_u64(byte_order).map(|v| v as u32),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory: its entries plus the link to the next IFD.
#[derive(Debug, Clone)]
pub struct Ifd {
    /// Entries in file order
    pub entries: Vec<IfdEntry>,

    /// Index into `entries` by tag id
    pub entries_by_tag: HashMap<u16, usize>,

    /// Offset of the next IFD, 0 if this is the last one
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Number of bytes an IFD with `entry_count` entries occupies.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Parse an IFD from bytes starting at the entry count field.
    ///
    /// # Errors
    /// - `FileTooSmall` if `bytes` is shorter than the declared entry count needs
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }
        let entry_count = header.read_entry_count(bytes);
        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let table_end = required - header.ifd_next_offset_size();
        let entries: Vec<IfdEntry> = bytes[count_size..table_end]
            .chunks_exact(header.ifd_entry_size())
            .map(|raw| parse_entry(raw, header))
            .collect();

        let mut entries_by_tag = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            // First occurrence wins on duplicate tags
            entries_by_tag.entry(entry.tag_id).or_insert(index);
        }

        Ok(Ifd {
            entries,
            entries_by_tag,
            next_ifd_offset: header.read_offset(&bytes[table_end..]),
        })
    }

    /// Look up an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry(tag.as_u16())
    }

    /// Look up an entry by raw tag id.
    pub fn get_entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries_by_tag
            .get(&tag_id)
            .and_then(|&idx| self.entries.get(idx))
    }

    /// Whether the directory describes a tiled image.
    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }
}

fn parse_entry(raw: &[u8], header: &TiffHeader) -> IfdEntry {
    let byte_order = header.byte_order;
    let field_type_raw = byte_order.read_u16(&raw[2..]);
    let field_type = FieldType::from_u16(field_type_raw);
    let value_size = header.value_offset_size();
    let count = header.read_offset(&raw[4..]);

    IfdEntry {
        tag_id: byte_order.read_u16(raw),
        field_type,
        field_type_raw,
        count,
        value_offset_bytes: raw[4 + value_size..].to_vec(),
        is_inline: field_type.is_some_and(|ft| ft.fits_inline(count, header.is_bigtiff)),
    }
}

// =============================================================================
// Tests
// =============================================================================
