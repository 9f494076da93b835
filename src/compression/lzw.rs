use weezl::decode::Decoder;
use weezl::{BitOrder, LzwStatus};

use crate::error::DecodeError;

use super::{DecompressionContext, Decompressor};

/// Compression 5: TIFF flavoured LZW (MSB first, early code size switch).
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzw;

impl Decompressor for Lzw {
    fn name(&self) -> &'static str {
        "LZW"
    }

    fn decompress(
        &self,
        _ctx: &DecompressionContext<'_>,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, DecodeError> {
        let mut decoder = Decoder::with_tiff_size_switch(BitOrder::Msb, 8);
        let (mut read, mut written) = (0, 0);

        // weezl yields after partial progress, so drive it until the stream
        // ends or the output is full
        while written < output.len() {
            let result = decoder.decode_bytes(&input[read..], &mut output[written..]);
            read += result.consumed_in;
            written += result.consumed_out;
            match result.status {
                Ok(LzwStatus::Ok) if result.consumed_in + result.consumed_out > 0 => {}
                Ok(_) => break,
                Err(e) => {
                    return Err(DecodeError::Decompression {
                        compression: "LZW",
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::tests::gray_context;

    fn compress(data: &[u8]) -> Vec<u8> {
        weezl::encode::Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(data)
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7 * 31) as u8).collect();
        let mut out = vec![0u8; data.len()];
        let n = Lzw
            .decompress(&gray_context(64, 64), &compress(&data), &mut out)
            .unwrap();
        assert_eq!(n, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_output_smaller_than_stream() {
        let data = vec![5u8; 100];
        let mut out = vec![0u8; 40];
        let n = Lzw
            .decompress(&gray_context(40, 1), &compress(&data), &mut out)
            .unwrap();
        assert_eq!(n, 40);
        assert!(out.iter().all(|&b| b == 5));
    }

    #[test]
    fn test_small_strile_fully_written() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut out = vec![0u8; 256];
        let n = Lzw
            .decompress(&gray_context(16, 16), &compress(&data), &mut out)
            .unwrap();
        assert_eq!(n, 256);
        assert_eq!(out, data);
    }

    #[test]
    fn test_truncated_stream_reports_short_output() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 13 % 251) as u8).collect();
        let stream = compress(&data);
        let mut out = vec![0u8; data.len()];
        let n = Lzw
            .decompress(&gray_context(64, 64), &stream[..stream.len() / 2], &mut out)
            .unwrap();
        assert!(n < data.len());
        assert_eq!(out[..n], data[..n]);
    }
}
