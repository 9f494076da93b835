//! The unit of work flowing through the pipeline.

use std::sync::Arc;

use crate::error::DecodeError;
use crate::format::tiff::ByteOrder;
use crate::geometry::{Orientation, Point, Size};
use crate::io::RangeReader;
use crate::middleware::parallel::ParallelDecodingState;
use crate::pixel::{
    resolve_sink, CroppedWriter, ErasedSink, OrientedWriter, Pixel, PixelBufferWriter,
    PixelConversion, PixelWriter,
};
use crate::pool::{MemoryPool, PooledBuffer};
use crate::strile::StrileRegion;

use super::cancel::CancellationToken;

/// Settings shared by every context of one decode call.
pub struct DecodeParameters {
    pub byte_order: ByteOrder,
    pub reader: Arc<dyn RangeReader>,
    pub memory_pool: MemoryPool,
    pub pixel_conversion: PixelConversion,
}

/// Coordination services attached by the parallel blocker.
#[derive(Clone, Default)]
pub struct ParallelExtension {
    pub state: Option<Arc<ParallelDecodingState>>,

    /// Serializes stages that cannot run concurrently
    pub exclusive: Option<Arc<tokio::sync::Mutex<()>>>,
}

// =============================================================================
// Destination
// =============================================================================

/// Where decoded pixels go, as a tree of window wrappers around the
/// caller's sink.
pub enum Destination {
    Sink(Arc<dyn ErasedSink>),
    Cropped {
        inner: Arc<Destination>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Oriented {
        inner: Arc<Destination>,
        orientation: Orientation,
        /// Stored-space size of the window
        width: u32,
        height: u32,
    },
}

impl Destination {
    pub fn cropped(inner: Arc<Destination>, origin: Point, size: Size) -> Arc<Destination> {
        Arc::new(Destination::Cropped {
            inner,
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        })
    }

    pub fn oriented(inner: Arc<Destination>, orientation: Orientation, stored: Size) -> Arc<Destination> {
        Arc::new(Destination::Oriented {
            inner,
            orientation,
            width: stored.width,
            height: stored.height,
        })
    }

    /// Build the writer chain for pixel type `P`.
    pub fn resolve<P: Pixel>(
        &self,
        policy: PixelConversion,
    ) -> Result<Arc<dyn PixelBufferWriter<P>>, DecodeError> {
        Ok(match self {
            Destination::Sink(sink) => resolve_sink::<P>(sink.as_ref(), policy)?,
            Destination::Cropped {
                inner,
                x,
                y,
                width,
                height,
            } => Arc::new(CroppedWriter::new(
                inner.resolve::<P>(policy)?,
                *x,
                *y,
                *width,
                *height,
            )),
            Destination::Oriented {
                inner,
                orientation,
                width,
                height,
            } => Arc::new(OrientedWriter::new(
                inner.resolve::<P>(policy)?,
                *orientation,
                *width,
                *height,
            )),
        })
    }
}

// =============================================================================
// DecodeContext
// =============================================================================

/// State of the unit currently being decoded.
///
/// Geometry is expressed relative to the current unit: `source_image_size`
/// is the size of the image (or strile) being read, `read_offset` and
/// `read_size` the window within it, and `destination` is positioned so
/// that pixel `(0, 0)` of the window lands where it belongs.
pub struct DecodeContext {
    pub params: Arc<DecodeParameters>,
    pub cancellation: CancellationToken,
    pub parallel: ParallelExtension,

    /// Compressed regions of the current unit, one per plane
    pub regions: Vec<StrileRegion>,

    /// Decompressed bytes of the current unit
    pub uncompressed: Option<PooledBuffer>,

    pub source_image_size: Size,
    pub read_offset: Point,
    pub read_size: Size,
    pub destination: Arc<Destination>,
}

impl DecodeContext {
    pub fn new(
        params: Arc<DecodeParameters>,
        cancellation: CancellationToken,
        source_image_size: Size,
        read_offset: Point,
        read_size: Size,
        destination: Arc<Destination>,
    ) -> Self {
        Self {
            params,
            cancellation,
            parallel: ParallelExtension::default(),
            regions: Vec::new(),
            uncompressed: None,
            source_image_size,
            read_offset,
            read_size,
            destination,
        }
    }

    /// Derive a context sharing this one's operation state.
    ///
    /// The decompressed buffer is not carried over.
    pub fn fork(&self) -> DecodeContext {
        DecodeContext {
            params: Arc::clone(&self.params),
            cancellation: self.cancellation.clone(),
            parallel: self.parallel.clone(),
            regions: self.regions.clone(),
            uncompressed: None,
            source_image_size: self.source_image_size,
            read_offset: self.read_offset,
            read_size: self.read_size,
            destination: Arc::clone(&self.destination),
        }
    }

    pub fn reader(&self) -> &dyn RangeReader {
        self.params.reader.as_ref()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.params.byte_order
    }

    pub fn memory_pool(&self) -> &MemoryPool {
        &self.params.memory_pool
    }

    /// Writer for the current destination, positioned at the read window.
    pub fn writer<P: Pixel>(&self) -> Result<PixelWriter<P>, DecodeError> {
        let resolved = self.destination.resolve::<P>(self.params.pixel_conversion)?;
        Ok(PixelWriter::new(resolved))
    }
}

// =============================================================================
// Tests
// =============================================================================
