//! Reading and decompressing one unit.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::compression::{DecompressionContext, Decompressor};
use crate::error::{DecodeError, IoError};
use crate::pipeline::{DecodeContext, Middleware, Next};
use crate::pixel::Rgba64;

use super::samples::SampleLayout;

/// Reads the compressed regions of the current unit and decompresses every
/// plane into one pooled buffer.
///
/// A unit whose region has zero length was never written; its window is
/// painted [`Rgba64::TRANSPARENT_WHITE`] without touching the file and the
/// rest of the pipeline is skipped.
pub struct DecompressionMiddleware {
    decompressor: Arc<dyn Decompressor>,
    compression: u16,
    photometric: u16,
    layout: SampleLayout,
    jpeg_tables: Option<Bytes>,
}

impl DecompressionMiddleware {
    pub fn new(
        decompressor: Arc<dyn Decompressor>,
        compression: u16,
        photometric: u16,
        layout: SampleLayout,
        jpeg_tables: Option<Bytes>,
    ) -> Self {
        Self {
            decompressor,
            compression,
            photometric,
            layout,
            jpeg_tables,
        }
    }

    fn fill_empty(ctx: &DecodeContext) -> Result<(), DecodeError> {
        let mut writer = ctx.writer::<Rgba64>()?;
        let width = ctx.read_size.width as usize;
        for y in 0..ctx.read_size.height {
            let mut row = writer.row_span(0, y, width);
            row.fill(Rgba64::TRANSPARENT_WHITE);
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for DecompressionMiddleware {
    fn name(&self) -> &'static str {
        "Decompression"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        if ctx.regions.len() != self.layout.planes() {
            return Err(DecodeError::InvalidGeometry(format!(
                "unit has {} regions for {} planes",
                ctx.regions.len(),
                self.layout.planes()
            )));
        }
        if ctx.regions.iter().any(|r| r.is_empty()) {
            trace!(x = ctx.read_offset.x, y = ctx.read_offset.y, "Filling empty strile");
            return Self::fill_empty(ctx);
        }

        let size = ctx.source_image_size;
        let slot = self.layout.plane_bytes(size);
        let mut buffer = ctx.memory_pool().rent(self.layout.buffer_bytes(size));

        for (plane, region) in ctx.regions.iter().enumerate() {
            let length = usize::try_from(region.length).map_err(|_| {
                DecodeError::InvalidGeometry(format!("strile of {} bytes", region.length))
            })?;
            let compressed = ctx
                .reader()
                .read_exact_at(region.offset, length)
                .await
                .map_err(|e| match e {
                    IoError::RangeOutOfBounds { size, .. } => DecodeError::TruncatedRegion {
                        offset: region.offset,
                        expected: region.length,
                        actual: size.saturating_sub(region.offset),
                    },
                    other => DecodeError::Io(other),
                })?;
            if compressed.len() < length {
                return Err(DecodeError::TruncatedRegion {
                    offset: region.offset,
                    expected: region.length,
                    actual: compressed.len() as u64,
                });
            }

            let dims = self.layout.stored_plane_size(plane, size);
            let expected = self.layout.stored_plane_bytes(plane, size);
            let decompression = DecompressionContext {
                compression: self.compression,
                photometric: self.photometric,
                width: dims.width,
                height: dims.height,
                bits_per_sample: self.layout.bits,
                samples_per_pixel: self.layout.samples_in_plane() as u16,
                jpeg_tables: self.jpeg_tables.as_deref(),
                byte_order: ctx.byte_order(),
            };

            let start = plane * slot;
            let output = &mut buffer[start..start + expected];
            let written = self
                .decompressor
                .decompress(&decompression, &compressed, output)?;
            if written < expected {
                return Err(DecodeError::DecompressedSizeMismatch {
                    expected,
                    actual: written,
                });
            }
        }

        ctx.uncompressed = Some(buffer);
        let result = next.run(ctx).await;
        ctx.uncompressed = None;
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
