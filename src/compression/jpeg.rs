use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::error::DecodeError;
use crate::format::prepare_strile_jpeg;

use super::{DecompressionContext, Decompressor};

/// Compression 7: JPEG striles, with `JPEGTables` merged in when the strile
/// stream is abbreviated.
///
/// The codec performs its own colour conversion, so three-sample output is
/// interleaved RGB and single-sample output is luma.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jpeg;

impl Decompressor for Jpeg {
    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn decompress(
        &self,
        ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let stream = prepare_strile_jpeg(ctx.jpeg_tables, input);
        let reader = ImageReader::with_format(Cursor::new(stream.as_ref()), ImageFormat::Jpeg);
        let img = reader.decode().map_err(|e| DecodeError::Decompression {
            compression: "JPEG",
            message: e.to_string(),
        })?;

        let pixels = match ctx.samples_per_pixel {
            1 => img.to_luma8().into_raw(),
            3 => img.to_rgb8().into_raw(),
            n => {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "JPEG with {} samples per pixel",
                    n
                )))
            }
        };

        // Striles at the image edge may decode larger than the scanline
        // layout; copy row by row so widths line up.
        let samples = ctx.samples_per_pixel as usize;
        let src_stride = img.width() as usize * samples;
        let dst_stride = ctx.width as usize * samples;
        let stride = src_stride.min(dst_stride);
        let rows = (img.height() as usize).min(ctx.height as usize);

        let mut written = 0;
        for row in 0..rows {
            let dst = row * dst_stride;
            if dst + stride > output.len() {
                break;
            }
            let src = row * src_stride;
            output[dst..dst + stride].copy_from_slice(&pixels[src..src + stride]);
            written = dst + stride;
        }
        Ok(written)
    }
}
