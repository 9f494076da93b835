//! Orientation-remapping writer.

use std::sync::Arc;

use crate::geometry::{Orientation, Point, Size};

use super::buffer::{clipped_len, PixelBufferWriter};
use super::types::Pixel;

/// Presents a stored-space window of `width` x `height` and forwards every
/// write to the matching displayed position in `inner`.
///
/// A stored row lands in `inner` as a row or a column depending on whether
/// the orientation transposes, reversed when it mirrors.
pub struct OrientedWriter<P: Pixel> {
    inner: Arc<dyn PixelBufferWriter<P>>,
    orientation: Orientation,
    width: u32,
    height: u32,
}

impl<P: Pixel> OrientedWriter<P> {
    pub fn new(
        inner: Arc<dyn PixelBufferWriter<P>>,
        orientation: Orientation,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            inner,
            orientation,
            width,
            height,
        }
    }

    fn stored(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Forward a run whose displayed end points are `first` and `last`.
    fn forward(&self, first: Point, last: Point, pixels: &[P]) {
        if pixels.len() == 1 {
            self.inner.write_row(first.x, first.y, pixels);
            return;
        }

        if first.y == last.y {
            if first.x <= last.x {
                self.inner.write_row(first.x, first.y, pixels);
            } else {
                let reversed: Vec<P> = pixels.iter().rev().copied().collect();
                self.inner.write_row(last.x, last.y, &reversed);
            }
        } else if first.y <= last.y {
            self.inner.write_column(first.x, first.y, pixels);
        } else {
            let reversed: Vec<P> = pixels.iter().rev().copied().collect();
            self.inner.write_column(last.x, last.y, &reversed);
        }
    }
}

impl<P: Pixel> PixelBufferWriter<P> for OrientedWriter<P> {
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
        let first = self.orientation.to_oriented(Point::new(x, y), self.stored());
        let last = self
            .orientation
            .to_oriented(Point::new(x + n as u32 - 1, y), self.stored());
        self.forward(first, last, &pixels[..n]);
    }

    fn write_column(&self, x: u32, y: u32, pixels: &[P]) {
        if x >= self.width {
            return;
        }
        let n = clipped_len(y, pixels.len(), self.height);
        if n == 0 {
            return;
        }
        let first = self.orientation.to_oriented(Point::new(x, y), self.stored());
        let last = self
            .orientation
            .to_oriented(Point::new(x, y + n as u32 - 1), self.stored());
        self.forward(first, last, &pixels[..n]);
    }
}

// =============================================================================
// Tests
// =============================================================================
