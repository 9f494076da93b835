//! Layout of decompressed strile buffers and sample access.
//!
//! A decompressed unit is one contiguous buffer holding every plane, each
//! plane in its own slot of [`SampleLayout::plane_bytes`]. Rows are padded
//! to whole bytes. Chroma-subsampled data is stored compactly at the start
//! of its slot and expanded in place by the subsampling stage, so the slots
//! are always sized for the expanded layout.

use crate::format::tiff::ByteOrder;
use crate::geometry::Size;

/// Bit layout of a decompressed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    pub bits: u16,
    pub samples: u16,
    pub planar: bool,
    /// Chroma subsampling factors, `(1, 1)` when samples are not subsampled
    pub subsampling: (u16, u16),
}

impl SampleLayout {
    pub fn planes(&self) -> usize {
        if self.planar {
            self.samples as usize
        } else {
            1
        }
    }

    /// Samples per pixel within one plane.
    pub fn samples_in_plane(&self) -> usize {
        if self.planar {
            1
        } else {
            self.samples as usize
        }
    }

    pub fn is_subsampled(&self) -> bool {
        self.subsampling != (1, 1)
    }

    /// Bytes of one sample, for byte-aligned depths.
    pub fn sample_bytes(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Bytes per expanded row of one plane.
    pub fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.samples_in_plane() * self.bits as usize).div_ceil(8)
    }

    /// Bytes of one expanded plane slot.
    pub fn plane_bytes(&self, size: Size) -> usize {
        self.row_bytes(size.width) * size.height as usize
    }

    /// Bytes of the whole unit buffer.
    ///
    /// Tiny chunky subsampled units can store more bytes than they expand
    /// to (a 1x1 pixel image still carries a full block).
    pub fn buffer_bytes(&self, size: Size) -> usize {
        let expanded = self.plane_bytes(size) * self.planes();
        if self.is_subsampled() && !self.planar {
            expanded.max(self.stored_plane_bytes(0, size))
        } else {
            expanded
        }
    }

    /// Size of the chroma planes of a subsampled unit.
    pub fn chroma_size(&self, size: Size) -> Size {
        let (h, v) = self.subsampling;
        Size::new(size.width.div_ceil(h as u32), size.height.div_ceil(v as u32))
    }

    /// Pixel dimensions the decompressor sees for `plane`.
    pub fn stored_plane_size(&self, plane: usize, size: Size) -> Size {
        if self.planar && self.is_subsampled() && plane > 0 {
            self.chroma_size(size)
        } else {
            size
        }
    }

    /// Bytes the decompressor must produce for `plane`.
    pub fn stored_plane_bytes(&self, plane: usize, size: Size) -> usize {
        if !self.is_subsampled() {
            return self.plane_bytes(size);
        }
        let (h, v) = self.subsampling;
        let chroma = self.chroma_size(size);
        let blocks = chroma.width as usize * chroma.height as usize;
        if self.planar {
            if plane == 0 {
                size.width as usize * size.height as usize * self.sample_bytes()
            } else {
                blocks * self.sample_bytes()
            }
        } else {
            blocks * (h as usize * v as usize + 2) * self.sample_bytes()
        }
    }
}

// =============================================================================
// Bit access
// =============================================================================

/// Read `bits` (1..=32) starting at `bit_offset`, most significant bit first.
pub fn read_bits(data: &[u8], bit_offset: usize, bits: u16) -> u32 {
    let mut value: u64 = 0;
    let first = bit_offset / 8;
    let last = (bit_offset + bits as usize - 1) / 8;
    for i in first..=last {
        value = (value << 8) | data.get(i).copied().unwrap_or(0) as u64;
    }
    let trailing = (last + 1) * 8 - (bit_offset + bits as usize);
    ((value >> trailing) & mask(bits)) as u32
}

/// Write the low `bits` of `value` at `bit_offset`, most significant bit first.
pub fn write_bits(data: &mut [u8], bit_offset: usize, bits: u16, value: u32) {
    for b in 0..bits as usize {
        let bit = (value >> (bits as usize - 1 - b)) & 1;
        let pos = bit_offset + b;
        let Some(byte) = data.get_mut(pos / 8) else {
            return;
        };
        let shift = 7 - (pos % 8);
        *byte = (*byte & !(1 << shift)) | ((bit as u8) << shift);
    }
}

fn mask(bits: u16) -> u64 {
    (1u64 << bits) - 1
}

/// Largest value representable in `bits`.
pub fn max_value(bits: u16) -> u32 {
    mask(bits) as u32
}

// =============================================================================
// SampleView
// =============================================================================

/// Read-only access to the samples of a decompressed unit.
pub struct SampleView<'a> {
    data: &'a [u8],
    layout: SampleLayout,
    size: Size,
    byte_order: ByteOrder,
}

impl<'a> SampleView<'a> {
    pub fn new(data: &'a [u8], layout: SampleLayout, size: Size, byte_order: ByteOrder) -> Self {
        Self {
            data,
            layout,
            size,
            byte_order,
        }
    }

    /// Sample `sample` of pixel `(x, y)`. Out-of-range reads yield 0.
    pub fn get(&self, x: u32, y: u32, sample: usize) -> u32 {
        let (plane, index) = if self.layout.planar {
            (sample, x as usize)
        } else {
            (0, x as usize * self.layout.samples as usize + sample)
        };
        let base = plane * self.layout.plane_bytes(self.size)
            + y as usize * self.layout.row_bytes(self.size.width);
        let bits = self.layout.bits;

        match bits {
            8 => self.data.get(base + index).copied().unwrap_or(0) as u32,
            16 => {
                let at = base + index * 2;
                match self.data.get(at..at + 2) {
                    Some(b) => self.byte_order.read_u16(b) as u32,
                    None => 0,
                }
            }
            32 => {
                let at = base + index * 4;
                match self.data.get(at..at + 4) {
                    Some(b) => self.byte_order.read_u32(b),
                    None => 0,
                }
            }
            _ => match self.data.get(base..) {
                Some(row) => read_bits(row, index * bits as usize, bits),
                None => 0,
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
