//! Pixel buffer windows and span handles.
//!
//! Stages never touch destination memory directly. They ask a
//! [`PixelWriter`] for a [`RowSpan`] or [`ColumnSpan`], fill it, and the
//! lease writes itself through on drop. Windows compose by wrapping: a
//! [`CroppedWriter`] translates and clips, an
//! [`OrientedWriter`](super::OrientedWriter) remaps coordinates.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use super::types::Pixel;

// =============================================================================
// Writer / Reader traits
// =============================================================================

/// A 2-D window that accepts pixels.
///
/// Writes take `&self` so disjoint parts of one window can be written from
/// several tasks at once. Pixels falling outside the window are dropped.
pub trait PixelBufferWriter<P: Pixel>: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Write `pixels` left to right starting at `(x, y)`.
    fn write_row(&self, x: u32, y: u32, pixels: &[P]);

    /// Write `pixels` top to bottom starting at `(x, y)`.
    fn write_column(&self, x: u32, y: u32, pixels: &[P]) {
        for (i, p) in pixels.iter().enumerate() {
            self.write_row(x, y + i as u32, std::slice::from_ref(p));
        }
    }
}

/// A 2-D window that yields pixels.
pub trait PixelBufferReader<P: Pixel>: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Fill `out` from the row starting at `(x, y)`. Pixels outside the
    /// window are left untouched.
    fn read_row(&self, x: u32, y: u32, out: &mut [P]);
}

/// Number of pixels of a span starting at `start` that fit in `extent`.
pub(super) fn clipped_len(start: u32, len: usize, extent: u32) -> usize {
    if start >= extent {
        0
    } else {
        len.min((extent - start) as usize)
    }
}

// =============================================================================
// ImageBuffer
// =============================================================================

/// In-memory image, one lock per row.
pub struct ImageBuffer<P: Pixel> {
    width: u32,
    height: u32,
    rows: Vec<Mutex<Vec<P>>>,
}

impl<P: Pixel> ImageBuffer<P> {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, P::default())
    }

    pub fn filled(width: u32, height: u32, pixel: P) -> Self {
        let rows = (0..height)
            .map(|_| Mutex::new(vec![pixel; width as usize]))
            .collect();
        Self {
            width,
            height,
            rows,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<P> {
        if x >= self.width {
            return None;
        }
        let row = self.rows.get(y as usize)?;
        let row = row.lock().unwrap_or_else(PoisonError::into_inner);
        row.get(x as usize).copied()
    }

    pub fn row(&self, y: u32) -> Vec<P> {
        match self.rows.get(y as usize) {
            Some(row) => row.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            None => Vec::new(),
        }
    }

    /// Copy out every pixel in row-major order.
    pub fn to_vec(&self) -> Vec<P> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in &self.rows {
            out.extend_from_slice(&row.lock().unwrap_or_else(PoisonError::into_inner));
        }
        out
    }
}

impl<P: Pixel> PixelBufferWriter<P> for ImageBuffer<P> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn write_row(&self, x: u32, y: u32, pixels: &[P]) {
        let Some(row) = self.rows.get(y as usize) else {
            return;
        };
        let n = clipped_len(x, pixels.len(), self.width);
        if n == 0 {
            return;
        }
        let mut row = row.lock().unwrap_or_else(PoisonError::into_inner);
        row[x as usize..x as usize + n].copy_from_slice(&pixels[..n]);
    }
}

impl<P: Pixel> PixelBufferReader<P> for ImageBuffer<P> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_row(&self, x: u32, y: u32, out: &mut [P]) {
        let Some(row) = self.rows.get(y as usize) else {
            return;
        };
        let n = clipped_len(x, out.len(), self.width);
        if n == 0 {
            return;
        }
        let row = row.lock().unwrap_or_else(PoisonError::into_inner);
        out[..n].copy_from_slice(&row[x as usize..x as usize + n]);
    }
}

// =============================================================================
// Cropping
// =============================================================================

/// A sub-window of another writer, translated to its own origin.
pub struct CroppedWriter<P: Pixel> {
    inner: Arc<dyn PixelBufferWriter<P>>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl<P: Pixel> CroppedWriter<P> {
    pub fn new(inner: Arc<dyn PixelBufferWriter<P>>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            inner,
            x,
            y,
            width,
            height,
        }
    }
}

impl<P: Pixel> PixelBufferWriter<P> for CroppedWriter<P> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn write_row(&self, x: u32, y: u32, pixels: &[P]) {
        if y >= self.height {
            return;
        }
        let n = clipped_len(x, pixels.len(), self.width);
        if n == 0 {
            return;
        }
        self.inner
            .write_row(self.x + x, self.y + y, &pixels[..n]);
    }

    fn write_column(&self, x: u32, y: u32, pixels: &[P]) {
        if x >= self.width {
            return;
        }
        let n = clipped_len(y, pixels.len(), self.height);
        if n == 0 {
            return;
        }
        self.inner
            .write_column(self.x + x, self.y + y, &pixels[..n]);
    }
}

/// A sub-window of another reader.
pub struct CroppedReader<P: Pixel> {
    inner: Arc<dyn PixelBufferReader<P>>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl<P: Pixel> CroppedReader<P> {
    pub fn new(inner: Arc<dyn PixelBufferReader<P>>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            inner,
            x,
            y,
            width,
            height,
        }
    }
}

impl<P: Pixel> PixelBufferReader<P> for CroppedReader<P> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_row(&self, x: u32, y: u32, out: &mut [P]) {
        if y >= self.height {
            return;
        }
        let n = clipped_len(x, out.len(), self.width);
        if n == 0 {
            return;
        }
        self.inner.read_row(self.x + x, self.y + y, &mut out[..n]);
    }
}

// =============================================================================
// PixelWriter and span leases
// =============================================================================

/// Handle used by stages to write into a resolved destination.
///
/// Owns the scratch storage behind its span leases; only one lease can be
/// alive at a time.
pub struct PixelWriter<P: Pixel> {
    inner: Arc<dyn PixelBufferWriter<P>>,
    scratch: Vec<P>,
}

impl<P: Pixel> PixelWriter<P> {
    pub fn new(inner: Arc<dyn PixelBufferWriter<P>>) -> Self {
        Self {
            inner,
            scratch: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Lease `len` pixels of row `y` starting at column `x`.
    pub fn row_span(&mut self, x: u32, y: u32, len: usize) -> RowSpan<'_, P> {
        reset(&mut self.scratch, len);
        RowSpan {
            target: &*self.inner,
            scratch: &mut self.scratch,
            x,
            y,
        }
    }

    /// Lease `len` pixels of column `x` starting at row `y`.
    pub fn column_span(&mut self, x: u32, y: u32, len: usize) -> ColumnSpan<'_, P> {
        reset(&mut self.scratch, len);
        ColumnSpan {
            target: &*self.inner,
            scratch: &mut self.scratch,
            x,
            y,
        }
    }

    /// Write a whole row without leasing.
    pub fn write_row(&self, x: u32, y: u32, pixels: &[P]) {
        self.inner.write_row(x, y, pixels);
    }
}

fn reset<P: Pixel>(scratch: &mut Vec<P>, len: usize) {
    scratch.clear();
    scratch.resize(len, P::default());
}

/// Mutable lease over part of a row, flushed on drop.
pub struct RowSpan<'a, P: Pixel> {
    target: &'a dyn PixelBufferWriter<P>,
    scratch: &'a mut Vec<P>,
    x: u32,
    y: u32,
}

impl<P: Pixel> Deref for RowSpan<'_, P> {
    type Target = [P];

    fn deref(&self) -> &[P] {
        self.scratch
    }
}

impl<P: Pixel> DerefMut for RowSpan<'_, P> {
    fn deref_mut(&mut self) -> &mut [P] {
        self.scratch
    }
}

impl<P: Pixel> Drop for RowSpan<'_, P> {
    fn drop(&mut self) {
        self.target.write_row(self.x, self.y, self.scratch);
    }
}

/// Mutable lease over part of a column, flushed on drop.
pub struct ColumnSpan<'a, P: Pixel> {
    target: &'a dyn PixelBufferWriter<P>,
    scratch: &'a mut Vec<P>,
    x: u32,
    y: u32,
}

impl<P: Pixel> Deref for ColumnSpan<'_, P> {
    type Target = [P];

    fn deref(&self) -> &[P] {
        self.scratch
    }
}

impl<P: Pixel> DerefMut for ColumnSpan<'_, P> {
    fn deref_mut(&mut self) -> &mut [P] {
        self.scratch
    }
}

impl<P: Pixel> Drop for ColumnSpan<'_, P> {
    fn drop(&mut self) {
        self.target.write_column(self.x, self.y, self.scratch);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Gray8;

    fn gray(values: &[u8]) -> Vec<Gray8> {
        values.iter().map(|&v| Gray8(v)).collect()
    }

    #[test]
    fn test_image_buffer_clips_writes() {
        let buffer = ImageBuffer::<Gray8>::new(3, 2);
        buffer.write_row(1, 0, &gray(&[1, 2, 3, 4]));
        buffer.write_row(0, 5, &gray(&[9]));
        buffer.write_row(7, 1, &gray(&[9]));
        assert_eq!(buffer.to_vec(), gray(&[0, 1, 2, 0, 0, 0]));
    }

    #[test]
    fn test_cropped_writer_translates_and_clips() {
        let buffer = Arc::new(ImageBuffer::<Gray8>::new(4, 4));
        let cropped = CroppedWriter::new(buffer.clone(), 1, 1, 2, 2);
        cropped.write_row(0, 0, &gray(&[1, 2, 3]));
        cropped.write_column(1, 1, &gray(&[4, 5]));
        cropped.write_row(0, 2, &gray(&[6]));

        assert_eq!(buffer.row(0), gray(&[0, 0, 0, 0]));
        assert_eq!(buffer.row(1), gray(&[0, 1, 2, 0]));
        assert_eq!(buffer.row(2), gray(&[0, 0, 4, 0]));
        assert_eq!(buffer.row(3), gray(&[0, 0, 0, 0]));
    }

    #[test]
    fn test_nested_crops_compose() {
        let buffer = Arc::new(ImageBuffer::<Gray8>::new(6, 6));
        let outer: Arc<dyn PixelBufferWriter<Gray8>> = Arc::new(CroppedWriter::new(buffer.clone(), 2, 2, 4, 4));
        let inner = CroppedWriter::new(outer, 1, 1, 2, 2);
        inner.write_row(0, 0, &gray(&[7, 8]));
        assert_eq!(buffer.get(3, 3), Some(Gray8(7)));
        assert_eq!(buffer.get(4, 3), Some(Gray8(8)));
    }

    #[test]
    fn test_spans_flush_on_drop() {
        let buffer = Arc::new(ImageBuffer::<Gray8>::new(3, 3));
        let mut writer = PixelWriter::new(buffer.clone() as Arc<dyn PixelBufferWriter<Gray8>>);
        {
            let mut span = writer.row_span(0, 1, 3);
            span[0] = Gray8(1);
            span[2] = Gray8(3);
            // Not yet visible
            assert_eq!(buffer.get(0, 1), Some(Gray8(0)));
        }
        assert_eq!(buffer.row(1), gray(&[1, 0, 3]));

        {
            let mut span = writer.column_span(2, 0, 3);
            span.copy_from_slice(&gray(&[4, 5, 6]));
        }
        assert_eq!(buffer.get(2, 0), Some(Gray8(4)));
        assert_eq!(buffer.get(2, 2), Some(Gray8(6)));
    }

    #[test]
    fn test_cropped_reader() {
        let buffer = Arc::new(ImageBuffer::<Gray8>::new(3, 3));
        buffer.write_row(0, 2, &gray(&[1, 2, 3]));
        let reader = CroppedReader::new(buffer as Arc<dyn PixelBufferReader<Gray8>>, 1, 1, 2, 2);

        let mut out = gray(&[9, 9, 9]);
        reader.read_row(0, 1, &mut out);
        assert_eq!(out, gray(&[2, 3, 9]));
        assert_eq!(PixelBufferReader::width(&reader), 2);
    }
}
