//! Test utilities for integration tests.
//!
//! This module provides a request-tracking range reader and a builder for
//! small synthetic TIFF and BigTIFF files.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tiff_pipeline::error::IoError;
use tiff_pipeline::io::RangeReader;
use tiff_pipeline::{read_directories, DecoderOptions, ImageDecoder};

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A range reader over memory that records every read request.
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn get_requests(&self) -> Vec<(u64, usize)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.requests.lock().unwrap().clear();
    }
}

impl Clone for TrackingMockReader {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            identifier: self.identifier.clone(),
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
        }
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((offset, len));

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Synthetic TIFF Builder
// =============================================================================

pub const SHORT: u16 = 3;
pub const LONG: u16 = 4;
pub const LONG8: u16 = 16;

/// Strip or tile layout of a synthetic image.
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    Strips { rows_per_strip: u32 },
    Tiles { width: u32, height: u32 },
}

/// Tags of a synthetic single-image file.
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    pub width: u32,
    pub height: u32,
    pub samples: u16,
    pub bits: u16,
    pub photometric: u16,
    pub compression: u16,
    pub planar: bool,
    pub predictor: u16,
    pub orientation: u16,
    pub layout: Layout,
    /// Additional (tag, type, values) entries
    pub extra: Vec<(u16, u16, Vec<u64>)>,
}

impl SyntheticImage {
    pub fn gray8(width: u32, height: u32, layout: Layout) -> Self {
        Self {
            width,
            height,
            samples: 1,
            bits: 8,
            photometric: 1,
            compression: 1,
            planar: false,
            predictor: 1,
            orientation: 1,
            layout,
            extra: Vec::new(),
        }
    }

    pub fn rgb8(width: u32, height: u32, layout: Layout) -> Self {
        Self {
            samples: 3,
            photometric: 2,
            ..Self::gray8(width, height, layout)
        }
    }

    /// Units across and down.
    pub fn grid(&self) -> (u32, u32) {
        match self.layout {
            Layout::Strips { rows_per_strip } => (1, self.height.div_ceil(rows_per_strip)),
            Layout::Tiles { width, height } => {
                (self.width.div_ceil(width), self.height.div_ceil(height))
            }
        }
    }

    /// Pixel size of the units in `row` as stored (tiles are padded).
    pub fn unit_size(&self, row: u32) -> (u32, u32) {
        match self.layout {
            Layout::Strips { rows_per_strip } => {
                let start = row * rows_per_strip;
                (self.width, rows_per_strip.min(self.height - start))
            }
            Layout::Tiles { width, height } => (width, height),
        }
    }

    /// Origin of unit `(col, row)` in the image.
    pub fn unit_origin(&self, col: u32, row: u32) -> (u32, u32) {
        match self.layout {
            Layout::Strips { rows_per_strip } => (0, row * rows_per_strip),
            Layout::Tiles { width, height } => (col * width, row * height),
        }
    }
}

/// Byte order and variant of a synthetic file.
#[derive(Debug, Clone, Copy)]
pub struct FileFormat {
    pub little_endian: bool,
    pub bigtiff: bool,
}

impl Default for FileFormat {
    fn default() -> Self {
        Self {
            little_endian: true,
            bigtiff: false,
        }
    }
}

struct Writer {
    data: Vec<u8>,
    little: bool,
}

fn encode_uint(value: u64, size: usize, little: bool) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    if little {
        bytes[..size].to_vec()
    } else {
        bytes[..size].iter().rev().copied().collect()
    }
}

impl Writer {
    fn uint(&mut self, value: u64, size: usize) {
        let bytes = encode_uint(value, size, self.little);
        self.data.extend_from_slice(&bytes);
    }

    fn align(&mut self) {
        if self.data.len() % 2 == 1 {
            self.data.push(0);
        }
    }

    fn patch(&mut self, at: usize, value: u64, size: usize) {
        let bytes = encode_uint(value, size, self.little);
        self.data[at..at + size].copy_from_slice(&bytes);
    }
}

fn type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 7 => 1,
        3 => 2,
        4 => 4,
        _ => 8,
    }
}

/// Build a single-image file holding `striles` (already compressed, in
/// plane-major raster order).
pub fn build_tiff(image: &SyntheticImage, striles: &[Vec<u8>], format: FileFormat) -> Vec<u8> {
    let mut w = Writer {
        data: Vec::new(),
        little: format.little_endian,
    };
    w.data.extend_from_slice(if format.little_endian { b"II" } else { b"MM" });
    if format.bigtiff {
        w.uint(43, 2);
        w.uint(8, 2);
        w.uint(0, 2);
        w.uint(0, 8);
    } else {
        w.uint(42, 2);
        w.uint(0, 4);
    }

    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for s in striles {
        offsets.push(w.data.len() as u64);
        counts.push(s.len() as u64);
        w.data.extend_from_slice(s);
    }

    let table_type = if format.bigtiff { LONG8 } else { LONG };
    let mut entries: Vec<(u16, u16, Vec<u64>)> = vec![
        (256, LONG, vec![image.width as u64]),
        (257, LONG, vec![image.height as u64]),
        (258, SHORT, vec![image.bits as u64; image.samples as usize]),
        (259, SHORT, vec![image.compression as u64]),
        (262, SHORT, vec![image.photometric as u64]),
        (277, SHORT, vec![image.samples as u64]),
        (284, SHORT, vec![if image.planar { 2 } else { 1 }]),
    ];
    if image.orientation != 1 {
        entries.push((274, SHORT, vec![image.orientation as u64]));
    }
    if image.predictor != 1 {
        entries.push((317, SHORT, vec![image.predictor as u64]));
    }
    match image.layout {
        Layout::Strips { rows_per_strip } => {
            entries.push((273, table_type, offsets));
            entries.push((278, LONG, vec![rows_per_strip as u64]));
            entries.push((279, table_type, counts));
        }
        Layout::Tiles { width, height } => {
            entries.push((322, LONG, vec![width as u64]));
            entries.push((323, LONG, vec![height as u64]));
            entries.push((324, table_type, offsets));
            entries.push((325, table_type, counts));
        }
    }
    entries.extend(image.extra.iter().cloned());
    entries.sort_by_key(|e| e.0);

    let inline = if format.bigtiff { 8 } else { 4 };
    let mut fields = Vec::with_capacity(entries.len());
    for (_, field_type, values) in &entries {
        let size = type_size(*field_type);
        let mut encoded: Vec<u8> = values
            .iter()
            .flat_map(|v| encode_uint(*v, size, format.little_endian))
            .collect();
        if encoded.len() <= inline {
            encoded.resize(inline, 0);
            fields.push(encoded);
        } else {
            w.align();
            let at = w.data.len() as u64;
            w.data.extend_from_slice(&encoded);
            fields.push(encode_uint(at, inline, format.little_endian));
        }
    }

    w.align();
    let ifd_offset = w.data.len() as u64;
    let count_size = if format.bigtiff { 8 } else { 2 };
    w.uint(entries.len() as u64, count_size);
    for ((tag, field_type, values), field) in entries.iter().zip(&fields) {
        w.uint(*tag as u64, 2);
        w.uint(*field_type as u64, 2);
        w.uint(values.len() as u64, if format.bigtiff { 8 } else { 4 });
        w.data.extend_from_slice(field);
    }
    w.uint(0, inline);

    if format.bigtiff {
        w.patch(8, ifd_offset, 8);
    } else {
        w.patch(4, ifd_offset, 4);
    }
    w.data
}

// =============================================================================
// Strile payloads
// =============================================================================

/// Raw, byte-aligned pixels of every unit, plane-major, computed from
/// `sample(x, y, s)`. Tiles are padded with zeros.
pub fn raw_striles(
    image: &SyntheticImage,
    format: FileFormat,
    sample: impl Fn(u32, u32, usize) -> u16,
) -> Vec<Vec<u8>> {
    let (across, down) = image.grid();
    let bytes = (image.bits as usize).div_ceil(8);
    let planes = if image.planar { image.samples as usize } else { 1 };
    let per_pixel = if image.planar { 1 } else { image.samples as usize };

    let mut out = Vec::new();
    for plane in 0..planes {
        for row in 0..down {
            for col in 0..across {
                let (uw, uh) = image.unit_size(row);
                let (ox, oy) = image.unit_origin(col, row);
                let mut unit = Vec::new();
                for y in 0..uh {
                    for x in 0..uw {
                        for s in 0..per_pixel {
                            let (ix, iy) = (ox + x, oy + y);
                            let value = if ix < image.width && iy < image.height {
                                sample(ix, iy, plane + s)
                            } else {
                                0
                            };
                            push_sample(&mut unit, value, bytes, format.little_endian);
                        }
                    }
                }
                out.push(unit);
            }
        }
    }
    out
}

fn push_sample(out: &mut Vec<u8>, value: u16, bytes: usize, little: bool) {
    match (bytes, little) {
        (1, _) => out.push(value as u8),
        (_, true) => out.extend_from_slice(&value.to_le_bytes()),
        (_, false) => out.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Apply 8-bit horizontal differencing to every row of a chunky unit.
pub fn difference_rows(unit: &mut [u8], row_bytes: usize, channels: usize) {
    for row in unit.chunks_exact_mut(row_bytes) {
        for i in (channels..row.len()).rev() {
            row[i] = row[i].wrapping_sub(row[i - channels]);
        }
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn lzw(data: &[u8]) -> Vec<u8> {
    weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
        .encode(data)
        .unwrap()
}

/// PackBits with literal runs only.
pub fn packbits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(128) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out
}

// =============================================================================
// Decoder helpers
// =============================================================================

/// Build a decoder for the first directory of `file`.
pub async fn open_decoder(
    file: Vec<u8>,
    options: DecoderOptions,
) -> (ImageDecoder, TrackingMockReader) {
    let reader = TrackingMockReader::new(file, "mem://test.tif");
    let directories = read_directories(&reader).await.unwrap();
    let decoder = ImageDecoder::new(&directories[0], Arc::new(reader.clone()), options)
        .await
        .unwrap();
    reader.reset_tracking();
    (decoder, reader)
}
