//! Orientation mapping.
//!
//! Callers address the image as displayed. This stage translates the
//! displayed read window into the stored window the rest of the pipeline
//! decodes, and wraps the destination so stored pixels land at their
//! displayed position.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::DecodeError;
use crate::geometry::{Orientation, Point, Rect, Size};
use crate::pipeline::{DecodeContext, Destination, Middleware, Next};

pub struct OrientationMapper {
    orientation: Orientation,
    stored: Size,
}

impl OrientationMapper {
    /// `stored` is the image size as laid out in the file.
    pub fn new(orientation: Orientation, stored: Size) -> Self {
        Self { orientation, stored }
    }
}

#[async_trait]
impl Middleware for OrientationMapper {
    fn name(&self) -> &'static str {
        "OrientationMapper"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        let displayed = self.orientation.oriented_size(self.stored);
        let window = Rect::from_parts(ctx.read_offset, ctx.read_size);
        let Some(clipped) = window.clip_to(displayed) else {
            return Ok(());
        };
        let stored_rect = self.orientation.to_stored_rect(clipped, self.stored);

        trace!(
            orientation = self.orientation.tag_value(),
            x = stored_rect.x,
            y = stored_rect.y,
            width = stored_rect.width,
            height = stored_rect.height,
            "Mapped read window to stored space"
        );

        let cropped = Destination::cropped(
            Arc::clone(&ctx.destination),
            Point::new(clipped.x - window.x, clipped.y - window.y),
            clipped.size(),
        );

        let mut stored = ctx.fork();
        stored.source_image_size = self.stored;
        stored.read_offset = stored_rect.origin();
        stored.read_size = stored_rect.size();
        stored.destination = Destination::oriented(cropped, self.orientation, stored_rect.size());
        next.run(&mut stored).await
    }
}

// =============================================================================
// Tests
// =============================================================================
