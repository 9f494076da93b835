use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::DecodeError;

use super::{DecompressionContext, Decompressor};

/// Compression 8 and 32946: zlib-wrapped Deflate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deflate;

impl Decompressor for Deflate {
    fn name(&self) -> &'static str {
        "Deflate"
    }

    fn decompress(
        &self,
        _ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let mut decoder = ZlibDecoder::new(input);
        let mut written = 0;
        while written < output.len() {
            let n = decoder
                .read(&mut output[written..])
                .map_err(|e| DecodeError::Decompression {
                    compression: "Deflate",
                    message: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            written += n;
        }
        Ok(written)
    }
}
