use crate::error::DecodeError;

use super::{DecompressionContext, Decompressor};

/// Compression 32773: Macintosh PackBits run-length encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackBits;

impl Decompressor for PackBits {
    fn name(&self) -> &'static str {
        "PackBits"
    }

    fn decompress(
        &self,
        _ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let mut src = 0;
        let mut dst = 0;

        while src < input.len() && dst < output.len() {
            let header = input[src] as i8;
            src += 1;

            match header {
                // No-op
                -128 => {}
                0..=127 => {
                    let literal = header as usize + 1;
                    if src + literal > input.len() {
                        return Err(truncated(literal, input.len() - src));
                    }
                    let n = literal.min(output.len() - dst);
                    output[dst..dst + n].copy_from_slice(&input[src..src + n]);
                    src += literal;
                    dst += n;
                }
                _ => {
                    let Some(&value) = input.get(src) else {
                        return Err(truncated(1, 0));
                    };
                    src += 1;
                    let run = (1 - header as isize) as usize;
                    let n = run.min(output.len() - dst);
                    output[dst..dst + n].fill(value);
                    dst += n;
                }
            }
        }

        Ok(dst)
    }
}

fn truncated(needed: usize, available: usize) -> DecodeError {
    DecodeError::Decompression {
        compression: "PackBits",
        message: format!("literal run needs {} bytes, {} left", needed, available),
    }
}
