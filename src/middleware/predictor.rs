//! Horizontal differencing reversal (Predictor 2).

use async_trait::async_trait;

use crate::error::DecodeError;
use crate::format::tiff::ByteOrder;
use crate::pipeline::{DecodeContext, Middleware, Next};

use super::samples::{read_bits, write_bits, SampleLayout};

/// Undoes horizontal differencing on every row of every plane.
///
/// Each channel is accumulated against the same channel of the previous
/// pixel, with wrapping arithmetic at the sample width.
pub struct PredictorReversal {
    layout: SampleLayout,
}

impl PredictorReversal {
    pub fn new(layout: SampleLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Middleware for PredictorReversal {
    fn name(&self) -> &'static str {
        "PredictorReversal"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        let size = ctx.source_image_size;
        let byte_order = ctx.byte_order();
        if let Some(buffer) = ctx.uncompressed.as_deref_mut() {
            let row_bytes = self.layout.row_bytes(size.width);
            let channels = self.layout.samples_in_plane();
            let values = size.width as usize * channels;
            if row_bytes > 0 {
                for row in buffer.chunks_exact_mut(row_bytes) {
                    undo_horizontal(row, values, channels, self.layout.bits, byte_order);
                }
            }
        }
        next.run(ctx).await
    }
}

/// Reverse differencing over the first `values` samples of `row`.
pub fn undo_horizontal(row: &mut [u8], values: usize, channels: usize, bits: u16, byte_order: ByteOrder) {
    match bits {
        8 => {
            for i in channels..values.min(row.len()) {
                row[i] = row[i].wrapping_add(row[i - channels]);
            }
        }
        16 => {
            for i in channels..values.min(row.len() / 2) {
                let prev = byte_order.read_u16(&row[(i - channels) * 2..]);
                let cur = byte_order.read_u16(&row[i * 2..]);
                write_u16(&mut row[i * 2..i * 2 + 2], cur.wrapping_add(prev), byte_order);
            }
        }
        32 => {
            for i in channels..values.min(row.len() / 4) {
                let prev = byte_order.read_u32(&row[(i - channels) * 4..]);
                let cur = byte_order.read_u32(&row[i * 4..]);
                write_u32(&mut row[i * 4..i * 4 + 4], cur.wrapping_add(prev), byte_order);
            }
        }
        _ => {
            let width = bits as usize;
            let mask = super::samples::max_value(bits);
            let values = values.min(row.len() * 8 / width);
            for i in channels..values {
                let prev = read_bits(row, (i - channels) * width, bits);
                let cur = read_bits(row, i * width, bits);
                write_bits(row, i * width, bits, cur.wrapping_add(prev) & mask);
            }
        }
    }
}

fn write_u16(out: &mut [u8], value: u16, byte_order: ByteOrder) {
    let bytes = match byte_order {
        ByteOrder::LittleEndian => value.to_le_bytes(),
        ByteOrder::BigEndian => value.to_be_bytes(),
    };
    out.copy_from_slice(&bytes);
}

fn write_u32(out: &mut [u8], value: u32, byte_order: ByteOrder) {
    let bytes = match byte_order {
        ByteOrder::LittleEndian => value.to_le_bytes(),
        ByteOrder::BigEndian => value.to_be_bytes(),
    };
    out.copy_from_slice(&bytes);
}

// =============================================================================
// Tests
// =============================================================================
