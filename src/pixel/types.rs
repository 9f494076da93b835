//! Concrete pixel types and their canonical RGBA-64 conversions.

use std::fmt::Debug;

/// A pixel format the pipeline can write.
///
/// Every format converts to and from [`Rgba64`]; that route is how a stage
/// producing one format feeds a destination expecting another.
pub trait Pixel: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Short name used in diagnostics.
    const NAME: &'static str;

    fn to_rgba64(self) -> Rgba64;
    fn from_rgba64(pixel: Rgba64) -> Self;
}

#[inline]
fn widen(v: u8) -> u16 {
    (v as u16) * 257
}

#[inline]
fn narrow(v: u16) -> u8 {
    (v >> 8) as u8
}

#[inline]
fn luma(r: u16, g: u16, b: u16) -> u16 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u16
}

// =============================================================================
// Rgba64 (canonical)
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba64 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Rgba64 {
    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// Colour written for striles that were never stored in the file.
    pub const TRANSPARENT_WHITE: Rgba64 = Rgba64::new(0xFFFF, 0xFFFF, 0xFFFF, 0);
}

impl Pixel for Rgba64 {
    const NAME: &'static str = "Rgba64";

    fn to_rgba64(self) -> Rgba64 {
        self
    }

    fn from_rgba64(pixel: Rgba64) -> Self {
        pixel
    }
}

// =============================================================================
// Gray
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Gray8(pub u8);

impl Pixel for Gray8 {
    const NAME: &'static str = "Gray8";

    fn to_rgba64(self) -> Rgba64 {
        let v = widen(self.0);
        Rgba64::new(v, v, v, u16::MAX)
    }

    fn from_rgba64(p: Rgba64) -> Self {
        Gray8(narrow(luma(p.r, p.g, p.b)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Gray16(pub u16);

impl Pixel for Gray16 {
    const NAME: &'static str = "Gray16";

    fn to_rgba64(self) -> Rgba64 {
        Rgba64::new(self.0, self.0, self.0, u16::MAX)
    }

    fn from_rgba64(p: Rgba64) -> Self {
        Gray16(luma(p.r, p.g, p.b))
    }
}

// =============================================================================
// RGB / RGBA
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb24 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb24 {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Pixel for Rgb24 {
    const NAME: &'static str = "Rgb24";

    fn to_rgba64(self) -> Rgba64 {
        Rgba64::new(widen(self.r), widen(self.g), widen(self.b), u16::MAX)
    }

    fn from_rgba64(p: Rgba64) -> Self {
        Rgb24::new(narrow(p.r), narrow(p.g), narrow(p.b))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb48 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Rgb48 {
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }
}

impl Pixel for Rgb48 {
    const NAME: &'static str = "Rgb48";

    fn to_rgba64(self) -> Rgba64 {
        Rgba64::new(self.r, self.g, self.b, u16::MAX)
    }

    fn from_rgba64(p: Rgba64) -> Self {
        Rgb48::new(p.r, p.g, p.b)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba32 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Pixel for Rgba32 {
    const NAME: &'static str = "Rgba32";

    fn to_rgba64(self) -> Rgba64 {
        Rgba64::new(widen(self.r), widen(self.g), widen(self.b), widen(self.a))
    }

    fn from_rgba64(p: Rgba64) -> Self {
        Rgba32::new(narrow(p.r), narrow(p.g), narrow(p.b), narrow(p.a))
    }
}

// =============================================================================
// CMYK
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cmyk32 {
    pub c: u8,
    pub m: u8,
    pub y: u8,
    pub k: u8,
}

impl Cmyk32 {
    pub const fn new(c: u8, m: u8, y: u8, k: u8) -> Self {
        Self { c, m, y, k }
    }
}

impl Pixel for Cmyk32 {
    const NAME: &'static str = "Cmyk32";

    fn to_rgba64(self) -> Rgba64 {
        Cmyk64::new(widen(self.c), widen(self.m), widen(self.y), widen(self.k)).to_rgba64()
    }

    fn from_rgba64(p: Rgba64) -> Self {
        let c = Cmyk64::from_rgba64(p);
        Cmyk32::new(narrow(c.c), narrow(c.m), narrow(c.y), narrow(c.k))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cmyk64 {
    pub c: u16,
    pub m: u16,
    pub y: u16,
    pub k: u16,
}

impl Cmyk64 {
    pub const fn new(c: u16, m: u16, y: u16, k: u16) -> Self {
        Self { c, m, y, k }
    }
}

impl Pixel for Cmyk64 {
    const NAME: &'static str = "Cmyk64";

    fn to_rgba64(self) -> Rgba64 {
        let ink = |v: u16| ((65535 - v as u32) * (65535 - self.k as u32) / 65535) as u16;
        Rgba64::new(ink(self.c), ink(self.m), ink(self.y), u16::MAX)
    }

    fn from_rgba64(p: Rgba64) -> Self {
        let max = p.r.max(p.g).max(p.b) as u32;
        let k = 65535 - max;
        if max == 0 {
            return Cmyk64::new(0, 0, 0, u16::MAX);
        }
        let ink = |v: u16| ((max - v as u32) * 65535 / max) as u16;
        Cmyk64::new(ink(p.r), ink(p.g), ink(p.b), k as u16)
    }
}

// =============================================================================
// Tests
// =============================================================================
