use crate::error::DecodeError;

use super::{DecompressionContext, Decompressor};

/// Compression 1: bytes are stored as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncompressed;

impl Decompressor for Uncompressed {
    fn name(&self) -> &'static str {
        "None"
    }

    fn decompress(
        &self,
        _ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(n)
    }
}
