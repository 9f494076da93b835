//! YCbCr chroma subsampling reversal.
//!
//! Chunky data arrives as blocks of `h * v` luma samples followed by one Cb
//! and one Cr sample, blocks in raster order. Planar data arrives as a full
//! resolution Y plane and reduced Cb/Cr planes. Both are expanded to one
//! (Y, Cb, Cr) triple per pixel in the buffer slots sized by
//! [`SampleLayout`].

use async_trait::async_trait;

use crate::error::DecodeError;
use crate::geometry::Size;
use crate::pipeline::{DecodeContext, Middleware, Next};
use crate::pool::MemoryPool;

use super::samples::SampleLayout;

pub struct SubsamplingReversal {
    layout: SampleLayout,
}

impl SubsamplingReversal {
    /// # Errors
    /// - `UnsupportedFormat` for factors outside {1, 2, 4}, depths other
    ///   than 8 or 16, or a sample count other than 3
    pub fn new(layout: SampleLayout) -> Result<Self, DecodeError> {
        let (h, v) = layout.subsampling;
        let valid = |f: u16| matches!(f, 1 | 2 | 4);
        if !valid(h) || !valid(v) {
            return Err(DecodeError::UnsupportedFormat(format!(
                "YCbCr subsampling {}x{}",
                h, v
            )));
        }
        if !matches!(layout.bits, 8 | 16) || layout.samples != 3 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "subsampled YCbCr with {} samples of {} bits",
                layout.samples, layout.bits
            )));
        }
        Ok(Self { layout })
    }
}

#[async_trait]
impl Middleware for SubsamplingReversal {
    fn name(&self) -> &'static str {
        "SubsamplingReversal"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        let size = ctx.source_image_size;
        let pool = ctx.memory_pool().clone();
        if let Some(buffer) = ctx.uncompressed.as_deref_mut() {
            if self.layout.planar {
                expand_planar(buffer, self.layout, size);
            } else {
                expand_chunky(buffer, self.layout, size, &pool);
            }
        }
        next.run(ctx).await
    }
}

/// Expand chunky blocks. Runs in place, last block first, when no block's
/// output can reach input that has not been read yet; otherwise expands
/// from a pooled copy of the stored data.
pub fn expand_chunky(buffer: &mut [u8], layout: SampleLayout, size: Size, pool: &MemoryPool) {
    let (h, v) = (layout.subsampling.0 as usize, layout.subsampling.1 as usize);
    let bs = layout.sample_bytes();
    let block_bytes = (h * v + 2) * bs;
    let blocks = layout.chroma_size(size);
    let (across, down) = (blocks.width as usize, blocks.height as usize);
    let stored = across * down * block_bytes;
    let pixel_bytes = 3 * bs;
    let width = size.width as usize;

    let first_output = |k: usize| ((k / across) * v * width + (k % across) * h) * pixel_bytes;
    let in_place = (0..across * down).all(|k| first_output(k) >= k * block_bytes);

    let mut block = vec![0u8; block_bytes];
    if in_place {
        for k in (0..across * down).rev() {
            block.copy_from_slice(&buffer[k * block_bytes..(k + 1) * block_bytes]);
            write_block(buffer, &block, k, layout, size);
        }
    } else {
        let mut copy = pool.rent(stored);
        copy.copy_from_slice(&buffer[..stored]);
        for k in 0..across * down {
            block.copy_from_slice(&copy[k * block_bytes..(k + 1) * block_bytes]);
            write_block(buffer, &block, k, layout, size);
        }
    }
}

fn write_block(buffer: &mut [u8], block: &[u8], k: usize, layout: SampleLayout, size: Size) {
    let (h, v) = (layout.subsampling.0 as usize, layout.subsampling.1 as usize);
    let bs = layout.sample_bytes();
    let across = layout.chroma_size(size).width as usize;
    let (bx, by) = (k % across, k / across);
    let (width, height) = (size.width as usize, size.height as usize);
    let cb = &block[h * v * bs..(h * v + 1) * bs];
    let cr = &block[(h * v + 1) * bs..(h * v + 2) * bs];

    for j in 0..v {
        let y = by * v + j;
        if y >= height {
            break;
        }
        for i in 0..h {
            let x = bx * h + i;
            if x >= width {
                break;
            }
            let at = (y * width + x) * 3 * bs;
            let luma = (j * h + i) * bs;
            buffer[at..at + bs].copy_from_slice(&block[luma..luma + bs]);
            buffer[at + bs..at + 2 * bs].copy_from_slice(cb);
            buffer[at + 2 * bs..at + 3 * bs].copy_from_slice(cr);
        }
    }
}

/// Expand the Cb and Cr planes to full resolution inside their slots.
///
/// Pixel `i` reads reduced sample `j <= i`, so walking backwards never
/// overwrites a sample that is still needed.
pub fn expand_planar(buffer: &mut [u8], layout: SampleLayout, size: Size) {
    let (h, v) = (layout.subsampling.0 as usize, layout.subsampling.1 as usize);
    let bs = layout.sample_bytes();
    let slot = layout.plane_bytes(size);
    let chroma_width = layout.chroma_size(size).width as usize;
    let (width, height) = (size.width as usize, size.height as usize);

    for plane in 1..3 {
        let data = &mut buffer[plane * slot..(plane + 1) * slot];
        for i in (0..width * height).rev() {
            let (x, y) = (i % width, i / width);
            let j = (y / v) * chroma_width + x / h;
            data.copy_within(j * bs..(j + 1) * bs, i * bs);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(h: u16, v: u16, bits: u16, planar: bool) -> SampleLayout {
        SampleLayout {
            bits,
            samples: 3,
            planar,
            subsampling: (h, v),
        }
    }

    /// Full resolution test image: luma and chroma vary per pixel.
    fn sample(x: usize, y: usize, channel: usize) -> u16 {
        (x * 7 + y * 13 + channel * 50) as u16 % 256
    }

    fn write_sample(out: &mut [u8], at: usize, value: u16, bs: usize) {
        if bs == 1 {
            out[at] = value as u8;
        } else {
            out[at..at + 2].copy_from_slice(&(value * 257).to_le_bytes());
        }
    }

    fn read_sample(data: &[u8], at: usize, bs: usize) -> u16 {
        if bs == 1 {
            data[at] as u16
        } else {
            u16::from_le_bytes([data[at], data[at + 1]]) / 257
        }
    }

    /// Chroma of one block: the average of the covered pixels.
    fn block_chroma(bx: usize, by: usize, h: usize, v: usize, size: Size, channel: usize) -> u16 {
        let mut sum = 0u32;
        let mut n = 0u32;
        for y in by * v..((by + 1) * v).min(size.height as usize) {
            for x in bx * h..((bx + 1) * h).min(size.width as usize) {
                sum += sample(x, y, channel) as u32;
                n += 1;
            }
        }
        (sum / n) as u16
    }

    /// Subsample the test image into the stored layout.
    fn encode(layout: SampleLayout, size: Size) -> Vec<u8> {
        let (h, v) = (layout.subsampling.0 as usize, layout.subsampling.1 as usize);
        let bs = layout.sample_bytes();
        let chroma = layout.chroma_size(size);
        let (across, down) = (chroma.width as usize, chroma.height as usize);
        let (w, ht) = (size.width as usize, size.height as usize);
        let mut out = vec![0u8; layout.buffer_bytes(size)];

        if layout.planar {
            let slot = layout.plane_bytes(size);
            for y in 0..ht {
                for x in 0..w {
                    write_sample(&mut out, (y * w + x) * bs, sample(x, y, 0), bs);
                }
            }
            for by in 0..down {
                for bx in 0..across {
                    let j = by * across + bx;
                    write_sample(&mut out, slot + j * bs, block_chroma(bx, by, h, v, size, 1), bs);
                    write_sample(&mut out, 2 * slot + j * bs, block_chroma(bx, by, h, v, size, 2), bs);
                }
            }
        } else {
            let mut at = 0;
            for by in 0..down {
                for bx in 0..across {
                    for j in 0..v {
                        for i in 0..h {
                            // Padding pixels replicate the edge
                            let x = (bx * h + i).min(w - 1);
                            let y = (by * v + j).min(ht - 1);
                            write_sample(&mut out, at, sample(x, y, 0), bs);
                            at += bs;
                        }
                    }
                    write_sample(&mut out, at, block_chroma(bx, by, h, v, size, 1), bs);
                    write_sample(&mut out, at + bs, block_chroma(bx, by, h, v, size, 2), bs);
                    at += 2 * bs;
                }
            }
        }
        out
    }

    fn check(layout: SampleLayout, size: Size) {
        let (h, v) = (layout.subsampling.0 as usize, layout.subsampling.1 as usize);
        let bs = layout.sample_bytes();
        let mut buffer = encode(layout, size);
        if layout.planar {
            expand_planar(&mut buffer, layout, size);
        } else {
            expand_chunky(&mut buffer, layout, size, &MemoryPool::default());
        }

        let slot = layout.plane_bytes(size);
        let w = size.width as usize;
        for y in 0..size.height as usize {
            for x in 0..w {
                let i = y * w + x;
                let get = |channel: usize| {
                    if layout.planar {
                        read_sample(&buffer, channel * slot + i * bs, bs)
                    } else {
                        read_sample(&buffer, (i * 3 + channel) * bs, bs)
                    }
                };
                let what = format!("{:?} at ({}, {})", layout, x, y);
                assert_eq!(get(0), sample(x, y, 0), "luma {}", what);
                assert_eq!(get(1), block_chroma(x / h, y / v, h, v, size, 1), "cb {}", what);
                assert_eq!(get(2), block_chroma(x / h, y / v, h, v, size, 2), "cr {}", what);
            }
        }
    }

    #[test]
    fn test_all_factors_chunky_and_planar() {
        for h in [1u16, 2, 4] {
            for v in [1u16, 2, 4] {
                for bits in [8u16, 16] {
                    for planar in [false, true] {
                        check(layout(h, v, bits, planar), Size::new(9, 7));
                        check(layout(h, v, bits, planar), Size::new(8, 8));
                    }
                }
            }
        }
    }

    #[test]
    fn test_rejects_invalid_factors() {
        assert!(SubsamplingReversal::new(layout(3, 1, 8, false)).is_err());
        assert!(SubsamplingReversal::new(layout(2, 2, 4, false)).is_err());
        assert!(SubsamplingReversal::new(layout(2, 2, 8, false)).is_ok());
    }
}
