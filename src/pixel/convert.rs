//! Type-erased destinations and pixel format conversion.
//!
//! The caller picks the destination pixel type; each photometric stage
//! produces its own. When they match the stage writes straight through,
//! otherwise pixels travel through [`Rgba64`].

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::DecodeError;

use super::buffer::PixelBufferWriter;
use super::types::{Pixel, Rgba64};

/// What to do when a stage's pixel type differs from the destination's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PixelConversion {
    /// Convert through the canonical RGBA-64 representation.
    #[default]
    Canonical,
    /// Refuse with `UnsupportedConversion`.
    Strict,
}

// =============================================================================
// Erased sink
// =============================================================================

/// A caller-supplied writer with its pixel type erased.
pub trait ErasedSink: Send + Sync {
    fn pixel_name(&self) -> &'static str;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn Any;

    /// The sink viewed as an RGBA-64 writer.
    fn canonical(&self) -> Arc<dyn PixelBufferWriter<Rgba64>>;
}

/// [`ErasedSink`] over a writer of a known pixel type.
pub struct TypedSink<Q: Pixel> {
    writer: Arc<dyn PixelBufferWriter<Q>>,
}

impl<Q: Pixel> TypedSink<Q> {
    pub fn new(writer: Arc<dyn PixelBufferWriter<Q>>) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> Arc<dyn PixelBufferWriter<Q>> {
        Arc::clone(&self.writer)
    }
}

impl<Q: Pixel> ErasedSink for TypedSink<Q> {
    fn pixel_name(&self) -> &'static str {
        Q::NAME
    }

    fn width(&self) -> u32 {
        self.writer.width()
    }

    fn height(&self) -> u32 {
        self.writer.height()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn canonical(&self) -> Arc<dyn PixelBufferWriter<Rgba64>> {
        if let Some(direct) = (&self.writer as &dyn Any).downcast_ref::<Arc<dyn PixelBufferWriter<Rgba64>>>() {
            return Arc::clone(direct);
        }
        Arc::new(FromCanonical {
            inner: Arc::clone(&self.writer),
        })
    }
}

/// Resolve an erased sink into a writer of `P`.
pub fn resolve_sink<P: Pixel>(
    sink: &dyn ErasedSink,
    policy: PixelConversion,
) -> Result<Arc<dyn PixelBufferWriter<P>>, DecodeError> {
    if let Some(typed) = sink.as_any().downcast_ref::<TypedSink<P>>() {
        return Ok(typed.writer());
    }
    match policy {
        PixelConversion::Strict => Err(DecodeError::UnsupportedConversion {
            from: P::NAME,
            to: sink.pixel_name(),
        }),
        PixelConversion::Canonical => Ok(Arc::new(ToCanonical::<P> {
            inner: sink.canonical(),
            _pixel: PhantomData,
        })),
    }
}

// =============================================================================
// Conversion writers
// =============================================================================

/// Accepts `P`, writes RGBA-64.
struct ToCanonical<P: Pixel> {
    inner: Arc<dyn PixelBufferWriter<Rgba64>>,
    _pixel: PhantomData<fn(P)>,
}

impl<P: Pixel> PixelBufferWriter<P> for ToCanonical<P> {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn write_row(&self, x: u32, y: u32, pixels: &[P]) {
        let converted: Vec<Rgba64> = pixels.iter().map(|p| p.to_rgba64()).collect();
        self.inner.write_row(x, y, &converted);
    }

    fn write_column(&self, x: u32, y: u32, pixels: &[P]) {
        let converted: Vec<Rgba64> = pixels.iter().map(|p| p.to_rgba64()).collect();
        self.inner.write_column(x, y, &converted);
    }
}

/// Accepts RGBA-64, writes `Q`.
struct FromCanonical<Q: Pixel> {
    inner: Arc<dyn PixelBufferWriter<Q>>,
}

impl<Q: Pixel> PixelBufferWriter<Rgba64> for FromCanonical<Q> {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn write_row(&self, x: u32, y: u32, pixels: &[Rgba64]) {
        let converted: Vec<Q> = pixels.iter().map(|&p| Q::from_rgba64(p)).collect();
        self.inner.write_row(x, y, &converted);
    }

    fn write_column(&self, x: u32, y: u32, pixels: &[Rgba64]) {
        let converted: Vec<Q> = pixels.iter().map(|&p| Q::from_rgba64(p)).collect();
        self.inner.write_column(x, y, &converted);
    }
}

// =============================================================================
// Tests
// =============================================================================
