//! FillOrder 2 support.

use async_trait::async_trait;

use crate::error::DecodeError;
use crate::pipeline::{DecodeContext, Middleware, Next};

/// Reverses the bit order of every byte of the decompressed unit, turning
/// least-significant-bit-first data into the MSB-first order the sample
/// readers expect.
pub struct FillOrderReversal;

#[async_trait]
impl Middleware for FillOrderReversal {
    fn name(&self) -> &'static str {
        "FillOrderReversal"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        if let Some(buffer) = ctx.uncompressed.as_deref_mut() {
            for byte in buffer.iter_mut() {
                *byte = byte.reverse_bits();
            }
        }
        next.run(ctx).await
    }
}
