//! Typed image directories.
//!
//! [`ImageDirectory`] is the view of one IFD the decoder factory consumes:
//! every tag that influences pipeline construction, read and validated once.
//! Strile offset/byte count tables are deliberately kept as raw
//! [`IfdEntry`] values so the strile cache can decide whether to load them
//! eagerly or page through them.

use std::collections::HashSet;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::{Compression, Photometric, TiffTag, PREDICTOR_NONE, SAMPLE_FORMAT_UINT};
use super::values::ValueReader;

// =============================================================================
// Strile layout
// =============================================================================

/// How the image data of a directory is cut into striles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StrileLayout {
    /// Full-width strips of `rows_per_strip` rows.
    ///
    /// A value of 0 or one larger than the image height means a single
    /// strip spanning the whole image.
    Strips { rows_per_strip: u32 },

    /// Rectangular tiles.
    Tiles { tile_width: u32, tile_height: u32 },
}

// =============================================================================
// ImageDirectory
// =============================================================================

/// Decoding-relevant contents of one IFD.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    /// Header of the file the directory belongs to
    pub header: TiffHeader,

    /// File offset of the IFD
    pub ifd_offset: u64,

    pub width: u32,
    pub height: u32,

    /// One entry per sample (a single value is repeated for all samples)
    pub bits_per_sample: Vec<u16>,
    pub samples_per_pixel: u16,

    /// Raw Compression tag value
    pub compression: u16,

    /// Raw PhotometricInterpretation tag value
    pub photometric: u16,

    /// 1 = chunky, 2 = planar
    pub planar_configuration: u16,

    pub predictor: u16,
    pub fill_order: u16,

    /// EXIF-style orientation, 1..=8
    pub orientation: u16,

    pub layout: StrileLayout,

    /// StripOffsets or TileOffsets entry
    pub strile_offsets: IfdEntry,

    /// StripByteCounts or TileByteCounts entry
    pub strile_byte_counts: IfdEntry,

    pub extra_samples: Vec<u16>,
    pub sample_format: Vec<u16>,

    /// 3 * 2^bits values: all reds, then greens, then blues
    pub color_map: Option<Vec<u16>>,

    /// Horizontal and vertical chroma subsampling factors
    pub ycbcr_subsampling: (u16, u16),
    pub ycbcr_coefficients: Option<[f64; 3]>,
    pub reference_black_white: Option<[f64; 6]>,
    pub jpeg_tables: Option<Bytes>,
}

impl ImageDirectory {
    /// Read the typed directory from a parsed IFD.
    ///
    /// # Errors
    /// - `MissingTag` if dimensions or strile tables are absent
    /// - `InvalidTagValue` if a tag has an unusable type or count
    pub async fn read<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
        ifd_offset: u64,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let scalar = |tag: TiffTag| ifd.get_entry_by_tag(tag);
        async fn opt_u32<R: RangeReader + ?Sized>(
            values: &ValueReader<'_, R>,
            entry: Option<&IfdEntry>,
        ) -> Result<Option<u32>, TiffError> {
            match entry {
                Some(e) => values.read_u32(e).await.map(Some),
                None => Ok(None),
            }
        }

        let width = opt_u32(&values, scalar(TiffTag::ImageWidth))
            .await?
            .ok_or(TiffError::MissingTag("ImageWidth"))?;
        let height = opt_u32(&values, scalar(TiffTag::ImageLength))
            .await?
            .ok_or(TiffError::MissingTag("ImageLength"))?;

        let samples_per_pixel = opt_u32(&values, scalar(TiffTag::SamplesPerPixel))
            .await?
            .unwrap_or(1) as u16;
        if samples_per_pixel == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "SamplesPerPixel",
                message: "must be at least 1".to_string(),
            });
        }

        let bits_per_sample = match scalar(TiffTag::BitsPerSample) {
            Some(e) => expand_per_sample(values.read_u16_array(e).await?, samples_per_pixel),
            None => vec![1; samples_per_pixel as usize],
        };
        let sample_format = match scalar(TiffTag::SampleFormat) {
            Some(e) => expand_per_sample(values.read_u16_array(e).await?, samples_per_pixel),
            None => vec![SAMPLE_FORMAT_UINT; samples_per_pixel as usize],
        };

        let compression = opt_u32(&values, scalar(TiffTag::Compression))
            .await?
            .unwrap_or(Compression::None.as_u16() as u32) as u16;

        // Missing photometric is tolerated, inferred from the sample count
        let photometric = match opt_u32(&values, scalar(TiffTag::PhotometricInterpretation)).await? {
            Some(v) => v as u16,
            None if samples_per_pixel >= 3 => 2,
            None => 1,
        };

        let planar_configuration = opt_u32(&values, scalar(TiffTag::PlanarConfiguration))
            .await?
            .unwrap_or(1) as u16;
        let predictor = opt_u32(&values, scalar(TiffTag::Predictor))
            .await?
            .unwrap_or(PREDICTOR_NONE as u32) as u16;
        let fill_order = opt_u32(&values, scalar(TiffTag::FillOrder))
            .await?
            .unwrap_or(1) as u16;
        let orientation = match opt_u32(&values, scalar(TiffTag::Orientation)).await? {
            Some(v @ 1..=8) => v as u16,
            _ => 1,
        };

        let (layout, offsets_tag, counts_tag) = if ifd.is_tiled() {
            let tile_width = opt_u32(&values, scalar(TiffTag::TileWidth))
                .await?
                .ok_or(TiffError::MissingTag("TileWidth"))?;
            let tile_height = opt_u32(&values, scalar(TiffTag::TileLength))
                .await?
                .ok_or(TiffError::MissingTag("TileLength"))?;
            (
                StrileLayout::Tiles {
                    tile_width,
                    tile_height,
                },
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else {
            let rows_per_strip = opt_u32(&values, scalar(TiffTag::RowsPerStrip))
                .await?
                .unwrap_or(0);
            (
                StrileLayout::Strips { rows_per_strip },
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            )
        };

        let strile_offsets = scalar(offsets_tag)
            .cloned()
            .ok_or(TiffError::MissingTag(offsets_tag.name()))?;
        let strile_byte_counts = scalar(counts_tag)
            .cloned()
            .ok_or(TiffError::MissingTag(counts_tag.name()))?;

        let extra_samples = match scalar(TiffTag::ExtraSamples) {
            Some(e) => values.read_u16_array(e).await?,
            None => Vec::new(),
        };
        let color_map = match scalar(TiffTag::ColorMap) {
            Some(e) => Some(values.read_u16_array(e).await?),
            None => None,
        };

        let ycbcr_subsampling = match scalar(TiffTag::YCbCrSubSampling) {
            Some(e) => {
                let v = values.read_u16_array(e).await?;
                if v.len() != 2 {
                    return Err(TiffError::InvalidTagValue {
                        tag: "YCbCrSubSampling",
                        message: format!("expected 2 values, got {}", v.len()),
                    });
                }
                (v[0], v[1])
            }
            None => (2, 2),
        };
        let ycbcr_coefficients = match scalar(TiffTag::YCbCrCoefficients) {
            Some(e) => {
                let v = values.read_rational_array(e).await?;
                fixed_array::<3>(&v, "YCbCrCoefficients")?
            }
            None => None,
        };
        let reference_black_white = match scalar(TiffTag::ReferenceBlackWhite) {
            Some(e) => {
                let v = values.read_rational_array(e).await?;
                fixed_array::<6>(&v, "ReferenceBlackWhite")?
            }
            None => None,
        };
        let jpeg_tables = match scalar(TiffTag::JpegTables) {
            Some(e) => Some(values.read_bytes(e).await?),
            None => None,
        };

        Ok(ImageDirectory {
            header: *header,
            ifd_offset,
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            compression,
            photometric,
            planar_configuration,
            predictor,
            fill_order,
            orientation,
            layout,
            strile_offsets,
            strile_byte_counts,
            extra_samples,
            sample_format,
            color_map,
            ycbcr_subsampling,
            ycbcr_coefficients,
            reference_black_white,
            jpeg_tables,
        })
    }

    /// Bits of the first sample; the pipeline requires all samples to match.
    pub fn bits(&self) -> u16 {
        self.bits_per_sample.first().copied().unwrap_or(1)
    }

    /// Whether every sample has the same bit depth.
    pub fn has_uniform_bits(&self) -> bool {
        self.bits_per_sample.windows(2).all(|w| w[0] == w[1])
    }

    /// Whether every sample is an unsigned integer.
    pub fn is_unsigned_integer(&self) -> bool {
        self.sample_format.iter().all(|&f| f == SAMPLE_FORMAT_UINT)
    }

    /// Whether samples are stored in separate planes.
    pub fn is_planar(&self) -> bool {
        self.planar_configuration == 2 && self.samples_per_pixel > 1
    }

    pub fn photometric_kind(&self) -> Option<Photometric> {
        Photometric::from_u16(self.photometric)
    }

    /// A serializable overview of the directory.
    pub fn summary(&self, index: usize) -> DirectorySummary {
        DirectorySummary {
            index,
            ifd_offset: self.ifd_offset,
            width: self.width,
            height: self.height,
            samples_per_pixel: self.samples_per_pixel,
            bits_per_sample: self.bits_per_sample.clone(),
            compression: Compression::describe(self.compression),
            photometric: self
                .photometric_kind()
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| format!("unknown ({})", self.photometric)),
            planar: self.is_planar(),
            predictor: self.predictor,
            orientation: self.orientation,
            layout: self.layout,
            strile_count: self.strile_offsets.count,
        }
    }
}

/// Printable description of an [`ImageDirectory`].
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySummary {
    pub index: usize,
    pub ifd_offset: u64,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    pub bits_per_sample: Vec<u16>,
    pub compression: String,
    pub photometric: String,
    pub planar: bool,
    pub predictor: u16,
    pub orientation: u16,
    pub layout: StrileLayout,
    pub strile_count: u64,
}

fn expand_per_sample(values: Vec<u16>, samples: u16) -> Vec<u16> {
    match values.as_slice() {
        [single] => vec![*single; samples as usize],
        _ => values,
    }
}

fn fixed_array<const N: usize>(
    values: &[f64],
    tag: &'static str,
) -> Result<Option<[f64; N]>, TiffError> {
    let array: [f64; N] = values
        .try_into()
        .map_err(|_| TiffError::InvalidTagValue {
            tag,
            message: format!("expected {} values, got {}", N, values.len()),
        })?;
    Ok(Some(array))
}

// =============================================================================
// File level reading
// =============================================================================

/// Read and parse the file header.
pub async fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<TiffHeader, TiffError> {
    let size = reader.size();
    if size < TIFF_HEADER_SIZE as u64 {
        return Err(TiffError::FileTooSmall {
            required: TIFF_HEADER_SIZE as u64,
            actual: size,
        });
    }
    let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
    let bytes = reader.read_exact_at(0, len).await?;
    TiffHeader::parse(&bytes, size)
}

/// Read the raw IFD located at `offset`.
pub async fn read_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    offset: u64,
) -> Result<Ifd, TiffError> {
    let count_size = header.ifd_count_size();
    if offset.saturating_add(count_size as u64) > reader.size() {
        return Err(TiffError::InvalidIfdOffset(offset));
    }
    let count_bytes = reader.read_exact_at(offset, count_size).await?;
    let entry_count = header.read_entry_count(&count_bytes);

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
    Ifd::parse(&ifd_bytes, header)
}

/// Walk the IFD chain and read every image directory in the file.
///
/// # Errors
/// - Header errors from [`TiffHeader::parse`]
/// - `IfdCycle` if the chain links back to a visited IFD
pub async fn read_directories<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<Vec<ImageDirectory>, TiffError> {
    let header = read_header(reader).await?;
    let mut directories = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 {
        if !visited.insert(offset) {
            return Err(TiffError::IfdCycle(offset));
        }
        let ifd = read_ifd(reader, &header, offset).await?;
        let directory = ImageDirectory::read(reader, &header, &ifd, offset).await?;
        debug!(
            file = reader.identifier(),
            index = directories.len(),
            width = directory.width,
            height = directory.height,
            compression = directory.compression,
            "Read image directory"
        );
        directories.push(directory);
        offset = ifd.next_ifd_offset;
    }

    Ok(directories)
}

// =============================================================================
// Tests
// =============================================================================
