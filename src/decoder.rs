//! Decoder factory.
//!
//! [`ImageDecoder::new`] inspects one [`ImageDirectory`] and assembles the
//! pipeline that decodes it. Everything that can be rejected is rejected
//! here, so a built decoder only fails on malformed data, I/O or
//! cancellation.

use std::sync::Arc;

use tracing::debug;

use crate::compression::DecompressorRegistry;
use crate::error::DecodeError;
use crate::format::tiff::{
    Compression, ImageDirectory, Photometric, StrileLayout, FILL_ORDER_LSB_FIRST,
    PREDICTOR_HORIZONTAL, PREDICTOR_NONE,
};
use crate::geometry::{Orientation, Point, Size};
use crate::io::RangeReader;
use crate::middleware::{
    select_interpretation, DecompressionMiddleware, ExclusiveAccess, FillOrderReversal,
    OrientationMapper, ParallelBlocker, ParallelDispatcher, PhotometricInterpreter,
    PredictorReversal, SampleLayout, StripEnumerator, SubsamplingReversal, TileEnumerator,
};
use crate::pipeline::{
    CancellationToken, DecodeContext, DecodeParameters, Destination, Middleware, Pipeline,
};
use crate::pixel::{ErasedSink, Pixel, PixelBufferWriter, PixelConversion, TypedSink};
use crate::pool::MemoryPool;
use crate::strile::{StrileCache, DEFAULT_BATCH_SIZE, DEFAULT_LAZY_THRESHOLD};

// =============================================================================
// Options
// =============================================================================

/// Settings for building an [`ImageDecoder`].
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Decode in stored order, ignoring the Orientation tag
    pub ignore_orientation: bool,

    pub memory_pool: MemoryPool,

    /// What to do when the destination pixel type differs from the decoded one
    pub pixel_conversion: PixelConversion,

    /// Maximum striles decoded concurrently; 0 decodes sequentially
    pub max_degree_of_parallelism: usize,

    /// Strile tables above this many entries are paged lazily
    pub lazy_strile_threshold: u64,

    /// Entries per lazily paged strile window
    pub strile_batch_size: usize,

    pub decompressors: Arc<DecompressorRegistry>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            ignore_orientation: false,
            memory_pool: MemoryPool::default(),
            pixel_conversion: PixelConversion::Canonical,
            max_degree_of_parallelism: 0,
            lazy_strile_threshold: DEFAULT_LAZY_THRESHOLD,
            strile_batch_size: DEFAULT_BATCH_SIZE,
            decompressors: Arc::new(DecompressorRegistry::with_defaults()),
        }
    }
}

// =============================================================================
// ImageDecoder
// =============================================================================

/// A built pipeline for one image directory.
///
/// Decoders are immutable and may serve any number of concurrent
/// [`decode`](Self::decode) calls.
pub struct ImageDecoder {
    pipeline: Pipeline,
    params: Arc<DecodeParameters>,
    stored: Size,
    orientation: Orientation,
    pixel_name: &'static str,
}

impl ImageDecoder {
    /// Build the decoder for `dir`, reading strile data through `reader`.
    ///
    /// # Errors
    /// - `UnsupportedCompression`, `UnsupportedPredictor` or
    ///   `UnsupportedFormat` for layouts the pipeline cannot decode
    /// - `InvalidGeometry`, `InvalidTileSize`, `StrileCountMismatch` or
    ///   `MissingStrile` for inconsistent directories
    /// - `Tiff` / `Io` if eager strile tables cannot be read
    pub async fn new(
        dir: &ImageDirectory,
        reader: Arc<dyn RangeReader>,
        options: DecoderOptions,
    ) -> Result<Self, DecodeError> {
        let stored = Size::new(dir.width, dir.height);
        if stored.is_empty() {
            return Err(DecodeError::InvalidGeometry(format!(
                "image is {}x{}",
                dir.width, dir.height
            )));
        }
        if dir.samples_per_pixel == 0 {
            return Err(DecodeError::InvalidGeometry("zero samples per pixel".to_string()));
        }
        let bits = dir.bits();
        if !(1..=32).contains(&bits) {
            return Err(DecodeError::UnsupportedFormat(format!("{} bits per sample", bits)));
        }

        let interpretation = select_interpretation(dir)?;
        let pixel_name = interpretation.pixel_name();
        let decompressor = options.decompressors.get(dir.compression)?;

        let jpeg = dir.compression == Compression::Jpeg.as_u16();
        if jpeg && bits != 8 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "JPEG with {} bits per sample",
                bits
            )));
        }

        let subsampled = dir.photometric_kind() == Some(Photometric::YCbCr)
            && !jpeg
            && dir.ycbcr_subsampling != (1, 1);
        let layout = SampleLayout {
            bits,
            samples: dir.samples_per_pixel,
            planar: dir.is_planar(),
            subsampling: if subsampled { dir.ycbcr_subsampling } else { (1, 1) },
        };

        let predictor = match dir.predictor {
            PREDICTOR_NONE => false,
            PREDICTOR_HORIZONTAL => true,
            other => return Err(DecodeError::UnsupportedPredictor(other)),
        };
        if predictor && subsampled {
            return Err(DecodeError::UnsupportedFormat(
                "horizontal predictor on subsampled YCbCr".to_string(),
            ));
        }

        let striles = Arc::new(
            StrileCache::open(
                Arc::clone(&reader),
                &dir.header,
                &dir.strile_offsets,
                &dir.strile_byte_counts,
                options.lazy_strile_threshold,
                options.strile_batch_size,
            )
            .await?,
        );

        let orientation = if options.ignore_orientation {
            Orientation::TopLeft
        } else {
            Orientation::from_tag(dir.orientation)
        };
        let parallel = options.max_degree_of_parallelism > 0;

        let mut stages: Vec<Arc<dyn Middleware>> = Vec::new();
        if parallel {
            stages.push(Arc::new(ParallelBlocker::new(options.max_degree_of_parallelism)));
        }
        if !orientation.is_identity() {
            stages.push(Arc::new(OrientationMapper::new(orientation, stored)));
        }
        match dir.layout {
            StrileLayout::Strips { rows_per_strip } => stages.push(Arc::new(StripEnumerator::new(
                stored,
                rows_per_strip,
                layout.planes(),
                striles,
            )?)),
            StrileLayout::Tiles {
                tile_width,
                tile_height,
            } => stages.push(Arc::new(TileEnumerator::new(
                stored,
                tile_width,
                tile_height,
                layout.planes(),
                striles,
            )?)),
        }
        if parallel {
            stages.push(Arc::new(ParallelDispatcher));
            if !decompressor.is_parallel_safe() {
                stages.push(Arc::new(ExclusiveAccess));
            }
        }
        stages.push(Arc::new(DecompressionMiddleware::new(
            decompressor,
            dir.compression,
            dir.photometric,
            layout,
            dir.jpeg_tables.clone(),
        )));
        if dir.fill_order == FILL_ORDER_LSB_FIRST
            && bits < 8
            && dir.compression == Compression::None.as_u16()
        {
            stages.push(Arc::new(FillOrderReversal));
        }
        if subsampled {
            stages.push(Arc::new(SubsamplingReversal::new(layout)?));
        }
        if predictor {
            stages.push(Arc::new(PredictorReversal::new(layout)));
        }
        stages.push(Arc::new(PhotometricInterpreter::new(interpretation, layout)));

        let pipeline = Pipeline::build(stages);
        debug!(
            file = reader.identifier(),
            width = dir.width,
            height = dir.height,
            compression = %Compression::describe(dir.compression),
            pixel = pixel_name,
            stages = ?pipeline.stages(),
            "Built decoder"
        );

        Ok(Self {
            pipeline,
            params: Arc::new(DecodeParameters {
                byte_order: dir.header.byte_order,
                reader,
                memory_pool: options.memory_pool,
                pixel_conversion: options.pixel_conversion,
            }),
            stored,
            orientation,
            pixel_name,
        })
    }

    /// Displayed width, after orientation.
    pub fn width(&self) -> u32 {
        self.size().width
    }

    /// Displayed height, after orientation.
    pub fn height(&self) -> u32 {
        self.size().height
    }

    pub fn size(&self) -> Size {
        self.orientation.oriented_size(self.stored)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Name of the pixel type the photometric stage produces.
    pub fn pixel_name(&self) -> &'static str {
        self.pixel_name
    }

    /// Stage names in pipeline order.
    pub fn stages(&self) -> &[&'static str] {
        self.pipeline.stages()
    }

    /// Decode the displayed window at `source_offset` of `read_size` into
    /// `writer`, placing its top-left pixel at `destination_offset`.
    ///
    /// Parts of the window outside the image are left untouched, as are
    /// parts falling outside the writer.
    ///
    /// # Errors
    /// - `Cancelled` once `cancellation` fires
    /// - `UnsupportedConversion` if `P` differs from the decoded pixel type
    ///   under [`PixelConversion::Strict`]
    /// - malformed-data and I/O errors raised while decoding striles
    pub async fn decode<P: Pixel>(
        &self,
        source_offset: Point,
        read_size: Size,
        destination_offset: Point,
        writer: Arc<dyn PixelBufferWriter<P>>,
        cancellation: &CancellationToken,
    ) -> Result<(), DecodeError> {
        let sink: Arc<dyn ErasedSink> = Arc::new(TypedSink::new(writer));
        let destination = Destination::cropped(
            Arc::new(Destination::Sink(sink)),
            destination_offset,
            read_size,
        );
        let mut ctx = DecodeContext::new(
            Arc::clone(&self.params),
            cancellation.clone(),
            self.size(),
            source_offset,
            read_size,
            destination,
        );

        debug!(
            file = self.params.reader.identifier(),
            x = source_offset.x,
            y = source_offset.y,
            width = read_size.width,
            height = read_size.height,
            pixel = P::NAME,
            "Decode started"
        );
        let result = self.pipeline.invoke(&mut ctx).await;
        match &result {
            Ok(()) => debug!(file = self.params.reader.identifier(), "Decode finished"),
            Err(e) => debug!(file = self.params.reader.identifier(), error = %e, "Decode failed"),
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
