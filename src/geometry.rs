//! Pixel-space geometry: points, sizes, rectangles and orientation.

// =============================================================================
// Point / Size / Rect
// =============================================================================

/// A pixel position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// A width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels, widened to avoid overflow.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_parts(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub const fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with another rectangle, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if (x0 as u64) >= x1 || (y0 as u64) >= y1 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }

    /// Clip to an image of the given size.
    pub fn clip_to(&self, bounds: Size) -> Option<Rect> {
        self.intersect(&Rect::new(0, 0, bounds.width, bounds.height))
    }
}

// =============================================================================
// Orientation
// =============================================================================

/// TIFF/EXIF orientation (tag 274).
///
/// Describes where the stored first row and first column belong once the
/// image is displayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Orientation {
    /// Row 0 top, column 0 left.
    #[default]
    TopLeft = 1,
    /// Mirror left-right.
    TopRight = 2,
    /// Rotate 180 degrees.
    BottomRight = 3,
    /// Mirror top-bottom.
    BottomLeft = 4,
    /// Transpose.
    LeftTop = 5,
    /// Rotate 90 degrees clockwise.
    RightTop = 6,
    /// Transverse.
    RightBottom = 7,
    /// Rotate 90 degrees counter-clockwise.
    LeftBottom = 8,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::TopLeft,
        Orientation::TopRight,
        Orientation::BottomRight,
        Orientation::BottomLeft,
        Orientation::LeftTop,
        Orientation::RightTop,
        Orientation::RightBottom,
        Orientation::LeftBottom,
    ];

    /// Create from the tag value, falling back to `TopLeft` outside 1..=8.
    pub fn from_tag(value: u16) -> Self {
        match value {
            2 => Self::TopRight,
            3 => Self::BottomRight,
            4 => Self::BottomLeft,
            5 => Self::LeftTop,
            6 => Self::RightTop,
            7 => Self::RightBottom,
            8 => Self::LeftBottom,
            _ => Self::TopLeft,
        }
    }

    pub fn tag_value(self) -> u16 {
        self as u16
    }

    pub fn is_identity(self) -> bool {
        self == Self::TopLeft
    }

    /// True for the orientations involving a quarter turn (5-8).
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::LeftTop | Self::RightTop | Self::RightBottom | Self::LeftBottom
        )
    }

    /// Size of the displayed image for a stored image of size `stored`.
    pub fn oriented_size(self, stored: Size) -> Size {
        if self.swaps_dimensions() {
            Size::new(stored.height, stored.width)
        } else {
            stored
        }
    }

    /// Map a stored pixel to its displayed position.
    ///
    /// `stored` is the size of the stored region the point lives in.
    pub fn to_oriented(self, p: Point, stored: Size) -> Point {
        let (w, h) = (stored.width, stored.height);
        let (x, y) = (p.x, p.y);
        match self {
            Self::TopLeft => Point::new(x, y),
            Self::TopRight => Point::new(w - 1 - x, y),
            Self::BottomRight => Point::new(w - 1 - x, h - 1 - y),
            Self::BottomLeft => Point::new(x, h - 1 - y),
            Self::LeftTop => Point::new(y, x),
            Self::RightTop => Point::new(h - 1 - y, x),
            Self::RightBottom => Point::new(h - 1 - y, w - 1 - x),
            Self::LeftBottom => Point::new(y, w - 1 - x),
        }
    }

    /// Map a displayed pixel back to its stored position.
    pub fn to_stored(self, p: Point, stored: Size) -> Point {
        let (w, h) = (stored.width, stored.height);
        let (x, y) = (p.x, p.y);
        match self {
            Self::TopLeft => Point::new(x, y),
            Self::TopRight => Point::new(w - 1 - x, y),
            Self::BottomRight => Point::new(w - 1 - x, h - 1 - y),
            Self::BottomLeft => Point::new(x, h - 1 - y),
            Self::LeftTop => Point::new(y, x),
            Self::RightTop => Point::new(y, h - 1 - x),
            Self::RightBottom => Point::new(w - 1 - y, h - 1 - x),
            Self::LeftBottom => Point::new(w - 1 - y, x),
        }
    }

    /// Stored-space rectangle covering the displayed rectangle `oriented`.
    ///
    /// `oriented` must lie within the displayed image.
    pub fn to_stored_rect(self, oriented: Rect, stored: Size) -> Rect {
        if oriented.is_empty() {
            return Rect::new(0, 0, 0, 0);
        }
        let a = self.to_stored(oriented.origin(), stored);
        let b = self.to_stored(
            Point::new(
                oriented.x + oriented.width - 1,
                oriented.y + oriented.height - 1,
            ),
            stored,
        );
        let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
        let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
        Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
    }
}

// =============================================================================
// Tests
// =============================================================================
