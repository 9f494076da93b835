//! Strip and tile enumeration.
//!
//! Turns a read window over the whole image into one pipeline run per
//! intersected strile. Each run sees the strile as its source image, the
//! intersected part as its read window, and a destination cropped to where
//! that part belongs in the caller's buffer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::DecodeError;
use crate::geometry::{Point, Rect, Size};
use crate::pipeline::{DecodeContext, Destination, Middleware, Next};
use crate::strile::StrileCache;

/// Grid of equally sized units covering the image.
#[derive(Debug, Clone, Copy)]
struct UnitGrid {
    image: Size,
    unit: Size,
    across: u32,
    down: u32,
    planes: usize,
    /// Strips: the last unit only holds the remaining rows
    trim_last: bool,
}

impl UnitGrid {
    fn units_per_plane(&self) -> usize {
        self.across as usize * self.down as usize
    }

    fn unit_rect(&self, col: u32, row: u32) -> Rect {
        Rect::new(col * self.unit.width, row * self.unit.height, self.unit.width, self.unit.height)
    }

    /// Size of the decompressed data of a unit.
    fn source_size(&self, row: u32) -> Size {
        if self.trim_last {
            let start = row * self.unit.height;
            Size::new(self.unit.width, self.unit.height.min(self.image.height - start))
        } else {
            self.unit
        }
    }

    fn check_table(&self, striles: &StrileCache) -> Result<(), DecodeError> {
        let needed = self.units_per_plane() * self.planes;
        if striles.len() < needed {
            return Err(DecodeError::MissingStrile {
                index: needed - 1,
                count: striles.len(),
            });
        }
        Ok(())
    }
}

async fn enumerate(
    grid: &UnitGrid,
    striles: &StrileCache,
    ctx: &mut DecodeContext,
    next: &Next,
) -> Result<(), DecodeError> {
    let window = Rect::from_parts(ctx.read_offset, ctx.read_size);
    let Some(clipped) = window.clip_to(grid.image) else {
        return Ok(());
    };

    let col_first = clipped.x / grid.unit.width;
    let col_last = ((clipped.right() - 1) / grid.unit.width as u64) as u32;
    let row_first = clipped.y / grid.unit.height;
    let row_last = ((clipped.bottom() - 1) / grid.unit.height as u64) as u32;

    let parallel = ctx.parallel.state.is_some();
    let mut reused = (!parallel).then(|| ctx.fork());

    for row in row_first..=row_last {
        for col in col_first..=col_last {
            let unit_rect = grid.unit_rect(col, row);
            let Some(part) = clipped.intersect(&unit_rect) else {
                continue;
            };

            let unit_index = row as usize * grid.across as usize + col as usize;
            let mut regions = Vec::with_capacity(grid.planes);
            for plane in 0..grid.planes {
                regions.push(striles.get(plane * grid.units_per_plane() + unit_index).await?);
            }

            trace!(
                unit = unit_index,
                x = part.x,
                y = part.y,
                width = part.width,
                height = part.height,
                "Enumerated strile"
            );

            let mut fresh;
            let unit = match reused.as_mut() {
                Some(unit) => unit,
                None => {
                    fresh = ctx.fork();
                    &mut fresh
                }
            };
            unit.regions = regions;
            unit.uncompressed = None;
            unit.source_image_size = grid.source_size(row);
            unit.read_offset = Point::new(part.x - unit_rect.x, part.y - unit_rect.y);
            unit.read_size = part.size();
            unit.destination = Destination::cropped(
                Arc::clone(&ctx.destination),
                Point::new(part.x - window.x, part.y - window.y),
                part.size(),
            );

            next.run(unit).await?;
        }
    }

    Ok(())
}

// =============================================================================
// Tiles
// =============================================================================

/// Enumerates the tiles intersecting the read window.
pub struct TileEnumerator {
    grid: UnitGrid,
    striles: Arc<StrileCache>,
}

impl TileEnumerator {
    /// # Errors
    /// - `InvalidTileSize` unless both dimensions are non-zero multiples of 16
    /// - `MissingStrile` if the tables hold fewer entries than tiles
    pub fn new(
        image: Size,
        tile_width: u32,
        tile_height: u32,
        planes: usize,
        striles: Arc<StrileCache>,
    ) -> Result<Self, DecodeError> {
        if tile_width == 0 || tile_height == 0 || tile_width % 16 != 0 || tile_height % 16 != 0 {
            return Err(DecodeError::InvalidTileSize {
                width: tile_width,
                height: tile_height,
            });
        }
        let grid = UnitGrid {
            image,
            unit: Size::new(tile_width, tile_height),
            across: image.width.div_ceil(tile_width),
            down: image.height.div_ceil(tile_height),
            planes,
            trim_last: false,
        };
        grid.check_table(&striles)?;
        Ok(Self { grid, striles })
    }
}

#[async_trait]
impl Middleware for TileEnumerator {
    fn name(&self) -> &'static str {
        "TileEnumerator"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        enumerate(&self.grid, &self.striles, ctx, next).await
    }
}

// =============================================================================
// Strips
// =============================================================================

/// Enumerates the strips intersecting the read window.
pub struct StripEnumerator {
    grid: UnitGrid,
    striles: Arc<StrileCache>,
}

impl StripEnumerator {
    /// A `rows_per_strip` of 0 or above the image height means one strip.
    ///
    /// # Errors
    /// - `MissingStrile` if the tables hold fewer entries than strips
    pub fn new(
        image: Size,
        rows_per_strip: u32,
        planes: usize,
        striles: Arc<StrileCache>,
    ) -> Result<Self, DecodeError> {
        let rows = if rows_per_strip == 0 || rows_per_strip > image.height {
            image.height
        } else {
            rows_per_strip
        };
        let grid = UnitGrid {
            image,
            unit: Size::new(image.width, rows),
            across: 1,
            down: image.height.div_ceil(rows),
            planes,
            trim_last: true,
        };
        grid.check_table(&striles)?;
        Ok(Self { grid, striles })
    }
}

#[async_trait]
impl Middleware for StripEnumerator {
    fn name(&self) -> &'static str {
        "StripEnumerator"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        enumerate(&self.grid, &self.striles, ctx, next).await
    }
}

// =============================================================================
// Tests
// =============================================================================
