//! Photometric interpretation.
//!
//! [`select_interpretation`] is a flat table from the directory's colour
//! model and sample layout to one [`Interpretation`]; the
//! [`PhotometricInterpreter`] stage then unpacks the decompressed samples of
//! the read window into the matching pixel type.
//!
//! | Photometric           | Compression | Samples  | Bits  | Pixel                  |
//! |-----------------------|-------------|----------|-------|------------------------|
//! | WhiteIsZero/BlackIsZero | any but JPEG | 1 (+alpha) | 1-16 | Gray8/Gray16, Rgba32/Rgba64 |
//! | BlackIsZero           | JPEG        | 1        | 8     | Gray8                  |
//! | RGB                   | any but JPEG | 3 (+alpha) | 8, 16 | Rgb24/Rgb48, Rgba32/Rgba64 |
//! | RGB, YCbCr            | JPEG        | 3        | 8     | Rgb24                  |
//! | Palette               | any but JPEG | 1        | 1-8   | Rgb48                  |
//! | CMYK                  | any but JPEG | 4+       | 8, 16 | Cmyk32/Cmyk64          |
//! | YCbCr                 | any but JPEG | 3        | 8, 16 | Rgb24/Rgb48            |
//! | TransparencyMask      | any but JPEG | 1        | 1     | Gray8                  |

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DecodeError, TiffError};
use crate::format::tiff::{Compression, ExtraSample, ImageDirectory, Photometric};
use crate::pipeline::{DecodeContext, Middleware, Next};
use crate::pixel::{Cmyk32, Cmyk64, Gray16, Gray8, Pixel, Rgb24, Rgb48, Rgba32, Rgba64};

use super::samples::{max_value, SampleLayout, SampleView};

/// How the alpha channel relates to the colour samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpha {
    /// Colour samples are premultiplied by alpha
    Associated,
    Unassociated,
}

/// One row of the dispatch table.
#[derive(Debug, Clone)]
pub enum Interpretation {
    Gray {
        white_is_zero: bool,
        bits: u16,
        alpha: Option<Alpha>,
    },
    Rgb {
        bits: u16,
        alpha: Option<Alpha>,
    },
    Palette {
        bits: u16,
        color_map: Arc<[u16]>,
    },
    Cmyk {
        bits: u16,
    },
    YCbCr {
        bits: u16,
        converter: YCbCrConverter,
    },
    TransparencyMask,
}

impl Interpretation {
    /// Name of the pixel type the interpretation produces.
    pub fn pixel_name(&self) -> &'static str {
        match self {
            Interpretation::Gray { bits, alpha, .. } => match (alpha.is_some(), *bits <= 8) {
                (false, true) => Gray8::NAME,
                (false, false) => Gray16::NAME,
                (true, true) => Rgba32::NAME,
                (true, false) => Rgba64::NAME,
            },
            Interpretation::Rgb { bits, alpha } => match (alpha.is_some(), *bits == 8) {
                (false, true) => Rgb24::NAME,
                (false, false) => Rgb48::NAME,
                (true, true) => Rgba32::NAME,
                (true, false) => Rgba64::NAME,
            },
            Interpretation::Palette { .. } => Rgb48::NAME,
            Interpretation::Cmyk { bits } if *bits == 8 => Cmyk32::NAME,
            Interpretation::Cmyk { .. } => Cmyk64::NAME,
            Interpretation::YCbCr { bits, .. } if *bits == 8 => Rgb24::NAME,
            Interpretation::YCbCr { .. } => Rgb48::NAME,
            Interpretation::TransparencyMask => Gray8::NAME,
        }
    }
}

/// Select the interpretation for a directory.
///
/// # Errors
/// - `UnsupportedFormat` when no table row matches, including non-integer
///   sample formats and mixed bit depths
/// - `Tiff(MissingTag)` for a palette image without a colour map
pub fn select_interpretation(dir: &ImageDirectory) -> Result<Interpretation, DecodeError> {
    let spp = dir.samples_per_pixel;
    let bits = dir.bits();
    let jpeg = dir.compression == Compression::Jpeg.as_u16();

    let unsupported = |what: &str| {
        DecodeError::UnsupportedFormat(format!(
            "{} with {} samples of {} bits ({}, {})",
            what,
            spp,
            bits,
            if dir.is_planar() { "planar" } else { "chunky" },
            Compression::describe(dir.compression)
        ))
    };

    let Some(photometric) = dir.photometric_kind() else {
        return Err(unsupported(&format!("photometric {}", dir.photometric)));
    };
    if !dir.is_unsigned_integer() {
        return Err(unsupported("non-integer samples"));
    }
    if !dir.has_uniform_bits() {
        return Err(unsupported("mixed bit depths"));
    }

    let alpha = |colour_samples: u16| -> Option<Alpha> {
        if spp <= colour_samples {
            return None;
        }
        match dir.extra_samples.first().copied().map(ExtraSample::from_u16) {
            Some(ExtraSample::AssociatedAlpha) => Some(Alpha::Associated),
            Some(ExtraSample::UnassociatedAlpha) => Some(Alpha::Unassociated),
            _ => None,
        }
    };

    use Photometric::*;
    let interpretation = match (photometric, jpeg, spp, bits) {
        (WhiteIsZero | BlackIsZero, false, 1.., 1..=16) => Interpretation::Gray {
            white_is_zero: photometric == WhiteIsZero,
            bits,
            alpha: alpha(1),
        },
        (BlackIsZero, true, 1, 8) => Interpretation::Gray {
            white_is_zero: false,
            bits,
            alpha: None,
        },
        (Rgb, false, 3.., 8 | 16) => Interpretation::Rgb {
            bits,
            alpha: alpha(3),
        },
        (Rgb | YCbCr, true, 3, 8) => Interpretation::Rgb { bits, alpha: None },
        (Palette, false, 1, 1..=8) => {
            let color_map = dir
                .color_map
                .as_ref()
                .ok_or(TiffError::MissingTag("ColorMap"))?;
            let needed = 3usize << bits;
            if color_map.len() < needed {
                return Err(TiffError::InvalidTagValue {
                    tag: "ColorMap",
                    message: format!("expected {} values, got {}", needed, color_map.len()),
                }
                .into());
            }
            Interpretation::Palette {
                bits,
                color_map: Arc::from(color_map.as_slice()),
            }
        }
        (Cmyk, false, 4.., 8 | 16) => Interpretation::Cmyk { bits },
        (YCbCr, false, 3, 8 | 16) => Interpretation::YCbCr {
            bits,
            converter: YCbCrConverter::new(bits, dir.ycbcr_coefficients, dir.reference_black_white),
        },
        (TransparencyMask, false, 1, 1) => Interpretation::TransparencyMask,
        _ => return Err(unsupported(photometric.name())),
    };
    Ok(interpretation)
}

// =============================================================================
// YCbCr conversion
// =============================================================================

/// YCbCr to RGB conversion honouring YCbCrCoefficients and
/// ReferenceBlackWhite.
#[derive(Debug, Clone, Copy)]
pub struct YCbCrConverter {
    luma: [f64; 3],
    reference: [f64; 6],
    max: f64,
    chroma_range: f64,
}

impl YCbCrConverter {
    pub fn new(bits: u16, coefficients: Option<[f64; 3]>, reference: Option<[f64; 6]>) -> Self {
        let max = max_value(bits) as f64;
        let center = (1u64 << (bits - 1)) as f64;
        Self {
            luma: coefficients.unwrap_or([0.299, 0.587, 0.114]),
            reference: reference.unwrap_or([0.0, max, center, max, center, max]),
            max,
            chroma_range: max - center,
        }
    }

    pub fn to_rgb(&self, y: u32, cb: u32, cr: u32) -> (u32, u32, u32) {
        let span = |black: f64, white: f64| {
            let d = white - black;
            if d.abs() < f64::EPSILON {
                1.0
            } else {
                d
            }
        };
        let rb = &self.reference;
        let y = (y as f64 - rb[0]) * self.max / span(rb[0], rb[1]);
        let cb = (cb as f64 - rb[2]) * self.chroma_range / span(rb[2], rb[3]);
        let cr = (cr as f64 - rb[4]) * self.chroma_range / span(rb[4], rb[5]);

        let [lr, lg, lb] = self.luma;
        let r = cr * (2.0 - 2.0 * lr) + y;
        let b = cb * (2.0 - 2.0 * lb) + y;
        let g = (y - lb * b - lr * r) / lg;

        let clamp = |v: f64| v.round().clamp(0.0, self.max) as u32;
        (clamp(r), clamp(g), clamp(b))
    }
}

// =============================================================================
// Interpreter stage
// =============================================================================

/// Writes the read window of the decompressed unit to the destination.
pub struct PhotometricInterpreter {
    interpretation: Interpretation,
    layout: SampleLayout,
}

impl PhotometricInterpreter {
    pub fn new(interpretation: Interpretation, layout: SampleLayout) -> Self {
        Self {
            interpretation,
            layout,
        }
    }

    fn write(&self, ctx: &DecodeContext) -> Result<(), DecodeError> {
        let buffer = ctx
            .uncompressed
            .as_deref()
            .ok_or_else(|| DecodeError::InvalidGeometry("no decompressed data for unit".to_string()))?;
        let view = SampleView::new(buffer, self.layout, ctx.source_image_size, ctx.byte_order());

        match &self.interpretation {
            Interpretation::Gray {
                white_is_zero,
                bits,
                alpha,
            } => {
                let (bits, invert) = (*bits, *white_is_zero);
                let max = max_value(bits);
                let level = move |v: &SampleView<'_>, x, y| {
                    let s = v.get(x, y, 0);
                    if invert {
                        max - s.min(max)
                    } else {
                        s
                    }
                };
                match (alpha, bits <= 8) {
                    (None, true) => emit(ctx, &view, |v, x, y| Gray8(scale(level(v, x, y), bits, 8) as u8)),
                    (None, false) => emit(ctx, &view, |v, x, y| Gray16(scale(level(v, x, y), bits, 16) as u16)),
                    (Some(a), true) => emit(ctx, &view, |v, x, y| {
                        let al = scale(v.get(x, y, 1), bits, 8);
                        let g = straight(*a, scale(level(v, x, y), bits, 8), al, 255) as u8;
                        Rgba32::new(g, g, g, al as u8)
                    }),
                    (Some(a), false) => emit(ctx, &view, |v, x, y| {
                        let al = scale(v.get(x, y, 1), bits, 16);
                        let g = straight(*a, scale(level(v, x, y), bits, 16), al, 65535) as u16;
                        Rgba64::new(g, g, g, al as u16)
                    }),
                }
            }
            Interpretation::Rgb { bits, alpha } => match (alpha, *bits == 8) {
                (None, true) => emit(ctx, &view, |v, x, y| {
                    Rgb24::new(v.get(x, y, 0) as u8, v.get(x, y, 1) as u8, v.get(x, y, 2) as u8)
                }),
                (None, false) => emit(ctx, &view, |v, x, y| {
                    Rgb48::new(v.get(x, y, 0) as u16, v.get(x, y, 1) as u16, v.get(x, y, 2) as u16)
                }),
                (Some(a), true) => emit(ctx, &view, |v, x, y| {
                    let al = v.get(x, y, 3);
                    let c = |s| straight(*a, v.get(x, y, s), al, 255) as u8;
                    Rgba32::new(c(0), c(1), c(2), al as u8)
                }),
                (Some(a), false) => emit(ctx, &view, |v, x, y| {
                    let al = v.get(x, y, 3);
                    let c = |s| straight(*a, v.get(x, y, s), al, 65535) as u16;
                    Rgba64::new(c(0), c(1), c(2), al as u16)
                }),
            },
            Interpretation::Palette { bits, color_map } => {
                let n = 1usize << bits;
                let entry = |i: usize| color_map.get(i).copied().unwrap_or(0);
                emit(ctx, &view, |v, x, y| {
                    let index = v.get(x, y, 0) as usize;
                    Rgb48::new(entry(index), entry(n + index), entry(2 * n + index))
                })
            }
            Interpretation::Cmyk { bits } if *bits == 8 => emit(ctx, &view, |v, x, y| {
                Cmyk32::new(
                    v.get(x, y, 0) as u8,
                    v.get(x, y, 1) as u8,
                    v.get(x, y, 2) as u8,
                    v.get(x, y, 3) as u8,
                )
            }),
            Interpretation::Cmyk { .. } => emit(ctx, &view, |v, x, y| {
                Cmyk64::new(
                    v.get(x, y, 0) as u16,
                    v.get(x, y, 1) as u16,
                    v.get(x, y, 2) as u16,
                    v.get(x, y, 3) as u16,
                )
            }),
            Interpretation::YCbCr { bits, converter } => {
                let rgb = |v: &SampleView<'_>, x, y| converter.to_rgb(v.get(x, y, 0), v.get(x, y, 1), v.get(x, y, 2));
                if *bits == 8 {
                    emit(ctx, &view, |v, x, y| {
                        let (r, g, b) = rgb(v, x, y);
                        Rgb24::new(r as u8, g as u8, b as u8)
                    })
                } else {
                    emit(ctx, &view, |v, x, y| {
                        let (r, g, b) = rgb(v, x, y);
                        Rgb48::new(r as u16, g as u16, b as u16)
                    })
                }
            }
            Interpretation::TransparencyMask => emit(ctx, &view, |v, x, y| {
                Gray8(if v.get(x, y, 0) != 0 { 255 } else { 0 })
            }),
        }
    }
}

#[async_trait]
impl Middleware for PhotometricInterpreter {
    fn name(&self) -> &'static str {
        "PhotometricInterpreter"
    }

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
        self.write(ctx)?;
        next.run(ctx).await
    }
}

/// Write the read window row by row.
fn emit<P: Pixel>(
    ctx: &DecodeContext,
    view: &SampleView<'_>,
    pixel: impl Fn(&SampleView<'_>, u32, u32) -> P,
) -> Result<(), DecodeError> {
    let mut writer = ctx.writer::<P>()?;
    let origin = ctx.read_offset;
    let width = ctx.read_size.width as usize;
    for row in 0..ctx.read_size.height {
        let mut span = writer.row_span(0, row, width);
        for (i, out) in span.iter_mut().enumerate() {
            *out = pixel(view, origin.x + i as u32, origin.y + row);
        }
    }
    Ok(())
}

/// Rescale `value` from `from` bits to `to` bits.
fn scale(value: u32, from: u16, to: u16) -> u32 {
    if from == to {
        return value;
    }
    (value as u64 * max_value(to) as u64 / max_value(from) as u64) as u32
}

/// Undo premultiplication for associated alpha.
fn straight(alpha_kind: Alpha, colour: u32, alpha: u32, max: u32) -> u32 {
    match alpha_kind {
        Alpha::Unassociated => colour,
        Alpha::Associated if alpha == 0 => 0,
        Alpha::Associated => (colour as u64 * max as u64 / alpha as u64).min(max as u64) as u32,
    }
}

// =============================================================================
// Tests
// =============================================================================
