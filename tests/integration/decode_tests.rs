//! End-to-end decodes of synthetic files through the full pipeline.

use std::sync::Arc;

use tiff_pipeline::{
    read_directories, CancellationToken, DecodeError, DecoderOptions, Gray8, ImageBuffer,
    ImageDecoder, Orientation, Point, Rgb24, Rgba64, Size,
};

use super::test_utils::{
    build_tiff, deflate, difference_rows, lzw, open_decoder, packbits, raw_striles, FileFormat,
    SyntheticImage, Layout, TrackingMockReader, SHORT,
};

fn gray_value(x: u32, y: u32) -> u16 {
    ((x * 7 + y * 13) % 256) as u16
}

fn rgb_value(x: u32, y: u32, s: usize) -> u16 {
    ((x * 3 + y * 5 + s as u32 * 40) % 256) as u16
}

fn rgba(r: u16, g: u16, b: u16) -> Rgba64 {
    Rgba64::new(r * 257, g * 257, b * 257, 0xFFFF)
}

async fn decode_rgba(decoder: &ImageDecoder, offset: Point, size: Size) -> Vec<Rgba64> {
    let buffer = Arc::new(ImageBuffer::<Rgba64>::new(size.width, size.height));
    decoder
        .decode::<Rgba64>(offset, size, Point::new(0, 0), buffer.clone(), &CancellationToken::new())
        .await
        .unwrap();
    buffer.to_vec()
}

async fn decode_full(decoder: &ImageDecoder) -> Vec<Rgba64> {
    decode_rgba(decoder, Point::new(0, 0), Size::new(decoder.width(), decoder.height())).await
}

/// Deflated RGB strips with horizontal differencing.
fn predicted_rgb_file(width: u32, height: u32, rows_per_strip: u32) -> Vec<u8> {
    let mut image = SyntheticImage::rgb8(width, height, Layout::Strips { rows_per_strip });
    image.compression = 8;
    image.predictor = 2;
    let striles: Vec<Vec<u8>> = raw_striles(&image, FileFormat::default(), rgb_value)
        .into_iter()
        .map(|mut unit| {
            difference_rows(&mut unit, width as usize * 3, 3);
            deflate(&unit)
        })
        .collect();
    build_tiff(&image, &striles, FileFormat::default())
}

// =============================================================================
// Basic layouts
// =============================================================================

#[tokio::test]
async fn test_tiled_gray_18x18_decodes_exactly() {
    let image = SyntheticImage::gray8(18, 18, Layout::Tiles { width: 16, height: 16 });
    let file = build_tiff(
        &image,
        &raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y)),
        FileFormat::default(),
    );
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let buffer = Arc::new(ImageBuffer::<Gray8>::new(18, 18));
    decoder
        .decode::<Gray8>(
            Point::new(0, 0),
            Size::new(18, 18),
            Point::new(0, 0),
            buffer.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    for y in 0..18 {
        for x in 0..18 {
            assert_eq!(buffer.get(x, y), Some(Gray8(gray_value(x, y) as u8)), "({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn test_big_endian_bigtiff_16bit() {
    let format = FileFormat {
        little_endian: false,
        bigtiff: true,
    };
    let mut image = SyntheticImage::gray8(20, 9, Layout::Strips { rows_per_strip: 4 });
    image.bits = 16;
    let value = |x: u32, y: u32, _| (x * 1000 + y * 7) as u16;
    let file = build_tiff(&image, &raw_striles(&image, format, value), format);
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let out = decode_full(&decoder).await;
    for y in 0..9 {
        for x in 0..20 {
            let v = value(x, y, 0);
            assert_eq!(out[(y * 20 + x) as usize], Rgba64::new(v, v, v, 0xFFFF));
        }
    }
}

#[tokio::test]
async fn test_planar_rgb_strips() {
    let mut image = SyntheticImage::rgb8(7, 6, Layout::Strips { rows_per_strip: 4 });
    image.planar = true;
    let file = build_tiff(
        &image,
        &raw_striles(&image, FileFormat::default(), rgb_value),
        FileFormat::default(),
    );
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let out = decode_full(&decoder).await;
    for y in 0..6 {
        for x in 0..7 {
            let expected = rgba(rgb_value(x, y, 0), rgb_value(x, y, 1), rgb_value(x, y, 2));
            assert_eq!(out[(y * 7 + x) as usize], expected, "({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn test_compressions_agree() {
    let (width, height) = (13, 10);
    let image = SyntheticImage::rgb8(width, height, Layout::Strips { rows_per_strip: 3 });
    let raw = raw_striles(&image, FileFormat::default(), rgb_value);

    let codecs: [(u16, fn(&[u8]) -> Vec<u8>); 5] = [
        (1, |d| d.to_vec()),
        (5, lzw),
        (8, deflate),
        (32946, deflate),
        (32773, packbits),
    ];

    let mut reference = None;
    for (code, encode) in codecs {
        let mut image = image.clone();
        image.compression = code;
        let striles: Vec<Vec<u8>> = raw.iter().map(|u| encode(u)).collect();
        let file = build_tiff(&image, &striles, FileFormat::default());
        let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;
        let out = decode_full(&decoder).await;

        assert_eq!(out[0], rgba(rgb_value(0, 0, 0), rgb_value(0, 0, 1), rgb_value(0, 0, 2)));
        match &reference {
            None => reference = Some(out),
            Some(r) => assert_eq!(&out, r, "compression {}", code),
        }
    }
}

#[tokio::test]
async fn test_predictor_with_deflate() {
    let (decoder, _) = open_decoder(predicted_rgb_file(9, 5, 2), DecoderOptions::default()).await;
    assert!(decoder.stages().contains(&"PredictorReversal"));

    let buffer = Arc::new(ImageBuffer::<Rgb24>::new(9, 5));
    decoder
        .decode::<Rgb24>(
            Point::new(0, 0),
            Size::new(9, 5),
            Point::new(0, 0),
            buffer.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    for y in 0..5 {
        for x in 0..9 {
            let expected = Rgb24::new(
                rgb_value(x, y, 0) as u8,
                rgb_value(x, y, 1) as u8,
                rgb_value(x, y, 2) as u8,
            );
            assert_eq!(buffer.get(x, y), Some(expected));
        }
    }
}

#[tokio::test]
async fn test_palette_image() {
    let mut image = SyntheticImage::gray8(4, 2, Layout::Strips { rows_per_strip: 2 });
    image.bits = 2;
    image.photometric = 3;
    // 4 reds, 4 greens, 4 blues
    let map: Vec<u64> = vec![
        0, 0xFFFF, 0, 0, //
        0, 0, 0xFFFF, 0, //
        0, 0, 0, 0xFFFF,
    ];
    image.extra.push((320, SHORT, map));
    // Indices 0,1,2,3 then 3,2,1,0 packed two bits each
    let file = build_tiff(&image, &[vec![0b0001_1011, 0b1110_0100]], FileFormat::default());
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let out = decode_full(&decoder).await;
    let black = Rgba64::new(0, 0, 0, 0xFFFF);
    let red = Rgba64::new(0xFFFF, 0, 0, 0xFFFF);
    let green = Rgba64::new(0, 0xFFFF, 0, 0xFFFF);
    let blue = Rgba64::new(0, 0, 0xFFFF, 0xFFFF);
    assert_eq!(out, vec![black, red, green, blue, blue, green, red, black]);
}

// =============================================================================
// Geometry
// =============================================================================

#[tokio::test]
async fn test_partial_window_is_clipped() {
    let image = SyntheticImage::gray8(18, 18, Layout::Tiles { width: 16, height: 16 });
    let file = build_tiff(
        &image,
        &raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y)),
        FileFormat::default(),
    );
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let sentinel = Rgba64::new(1, 2, 3, 4);
    let buffer = Arc::new(ImageBuffer::<Rgba64>::filled(20, 20, sentinel));
    decoder
        .decode::<Rgba64>(
            Point::new(10, 10),
            Size::new(20, 20),
            Point::new(0, 0),
            buffer.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    for y in 0..20 {
        for x in 0..20 {
            let got = buffer.get(x, y).unwrap();
            if x < 8 && y < 8 {
                let v = gray_value(x + 10, y + 10);
                assert_eq!(got, rgba(v, v, v), "({}, {})", x, y);
            } else {
                assert_eq!(got, sentinel, "({}, {})", x, y);
            }
        }
    }

    // Touching the last pixel is fine, a window past the edge is a no-op
    let corner = decode_rgba(&decoder, Point::new(17, 17), Size::new(1, 1)).await;
    let v = gray_value(17, 17);
    assert_eq!(corner, vec![rgba(v, v, v)]);
    decode_rgba(&decoder, Point::new(18, 0), Size::new(4, 4)).await;
}

#[tokio::test]
async fn test_destination_offset() {
    let image = SyntheticImage::gray8(4, 4, Layout::Strips { rows_per_strip: 4 });
    let file = build_tiff(
        &image,
        &raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y)),
        FileFormat::default(),
    );
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let buffer = Arc::new(ImageBuffer::<Gray8>::new(6, 6));
    decoder
        .decode::<Gray8>(
            Point::new(1, 1),
            Size::new(2, 2),
            Point::new(3, 4),
            buffer.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(buffer.get(3, 4), Some(Gray8(gray_value(1, 1) as u8)));
    assert_eq!(buffer.get(4, 5), Some(Gray8(gray_value(2, 2) as u8)));
    assert_eq!(buffer.get(0, 0), Some(Gray8(0)));
}

#[tokio::test]
async fn test_every_orientation_4x3() {
    let stored = Size::new(4, 3);
    let value = |x: u32, y: u32| (y * 4 + x) as u16 * 20;

    for orientation in Orientation::ALL {
        let mut image = SyntheticImage::gray8(4, 3, Layout::Strips { rows_per_strip: 2 });
        image.orientation = orientation.tag_value();
        let file = build_tiff(
            &image,
            &raw_striles(&image, FileFormat::default(), |x, y, _| value(x, y)),
            FileFormat::default(),
        );
        let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;
        let displayed = orientation.oriented_size(stored);
        assert_eq!((decoder.width(), decoder.height()), (displayed.width, displayed.height));

        let out = decode_full(&decoder).await;
        for y in 0..displayed.height {
            for x in 0..displayed.width {
                let p = orientation.to_stored(Point::new(x, y), stored);
                let v = value(p.x, p.y);
                assert_eq!(
                    out[(y * displayed.width + x) as usize],
                    rgba(v, v, v),
                    "{:?} at ({}, {})",
                    orientation,
                    x,
                    y
                );
            }
        }
    }
}

// =============================================================================
// Strile tables
// =============================================================================

#[tokio::test]
async fn test_empty_tile_is_filled_without_reading() {
    let image = SyntheticImage::gray8(32, 16, Layout::Tiles { width: 16, height: 16 });
    let mut striles = raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y));
    striles[1].clear();
    let file = build_tiff(&image, &striles, FileFormat::default());
    let (decoder, reader) = open_decoder(file, DecoderOptions::default()).await;

    let out = decode_full(&decoder).await;
    assert_eq!(reader.request_count(), 1);
    assert_eq!(reader.get_requests()[0].1, 256);
    for y in 0..16 {
        for x in 0..32 {
            let got = out[(y * 32 + x) as usize];
            if x < 16 {
                let v = gray_value(x, y);
                assert_eq!(got, rgba(v, v, v));
            } else {
                assert_eq!(got, Rgba64::TRANSPARENT_WHITE);
            }
        }
    }
}

#[tokio::test]
async fn test_eager_and_lazy_tables_agree() {
    let image = SyntheticImage::gray8(64, 64, Layout::Tiles { width: 16, height: 16 });
    let file = build_tiff(
        &image,
        &raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y)),
        FileFormat::default(),
    );

    let (eager, _) = open_decoder(file.clone(), DecoderOptions::default()).await;
    let lazy_options = DecoderOptions {
        lazy_strile_threshold: 4,
        strile_batch_size: 3,
        ..Default::default()
    };
    let (lazy, reader) = open_decoder(file, lazy_options).await;

    let window = (Point::new(5, 9), Size::new(50, 41));
    assert_eq!(
        decode_rgba(&eager, window.0, window.1).await,
        decode_rgba(&lazy, window.0, window.1).await
    );
    // Table windows were paged in on top of the tile reads
    assert!(reader.request_count() > 16);
}

// =============================================================================
// Parallel decoding
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_and_parallel_identical() {
    let file = predicted_rgb_file(37, 29, 3);
    let (sequential, _) = open_decoder(file.clone(), DecoderOptions::default()).await;
    let expected = decode_full(&sequential).await;

    for degree in [1, 2, 8] {
        let options = DecoderOptions {
            max_degree_of_parallelism: degree,
            ..Default::default()
        };
        let (parallel, _) = open_decoder(file.clone(), options).await;
        assert_eq!(decode_full(&parallel).await, expected, "degree {}", degree);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subsampled_ycbcr_strips_5x5() {
    let (width, height, rows_per_strip) = (5u32, 5u32, 2u32);
    let mut image = SyntheticImage::rgb8(width, height, Layout::Strips { rows_per_strip });
    image.photometric = 6;
    image.extra.push((530, SHORT, vec![2, 2]));

    let luma = |x: u32, y: u32| (20 + x * 40 + y * 9) as u8;
    let striles: Vec<Vec<u8>> = (0..height.div_ceil(rows_per_strip))
        .map(|strip| {
            let mut unit = Vec::new();
            for bx in 0..width.div_ceil(2) {
                for dy in 0..2 {
                    for dx in 0..2 {
                        let (x, y) = (bx * 2 + dx, strip * rows_per_strip + dy);
                        unit.push(if x < width && y < height { luma(x, y) } else { 0 });
                    }
                }
                // neutral chroma
                unit.extend_from_slice(&[128, 128]);
            }
            unit
        })
        .collect();
    let file = build_tiff(&image, &striles, FileFormat::default());

    let (sequential, _) = open_decoder(file.clone(), DecoderOptions::default()).await;
    let expected = decode_full(&sequential).await;
    for y in 0..height {
        for x in 0..width {
            let v = luma(x, y) as u16;
            assert_eq!(expected[(y * width + x) as usize], rgba(v, v, v), "({}, {})", x, y);
        }
    }

    let options = DecoderOptions {
        max_degree_of_parallelism: 4,
        ..Default::default()
    };
    let (parallel, _) = open_decoder(file, options).await;
    assert_eq!(decode_full(&parallel).await, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reports_corrupt_strile() {
    let mut image = SyntheticImage::gray8(16, 40, Layout::Strips { rows_per_strip: 4 });
    image.compression = 8;
    let mut striles: Vec<Vec<u8>> = raw_striles(&image, FileFormat::default(), |x, y, _| gray_value(x, y))
        .iter()
        .map(|u| deflate(u))
        .collect();
    striles[6] = vec![0xDE, 0xAD, 0xBE, 0xEF];
    let file = build_tiff(&image, &striles, FileFormat::default());

    let options = DecoderOptions {
        max_degree_of_parallelism: 3,
        ..Default::default()
    };
    let (decoder, _) = open_decoder(file, options).await;
    let buffer = Arc::new(ImageBuffer::<Rgba64>::new(16, 40));
    let err = decoder
        .decode::<Rgba64>(
            Point::new(0, 0),
            Size::new(16, 40),
            Point::new(0, 0),
            buffer,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_malformed(), "{:?}", err);
}

#[tokio::test]
async fn test_cancelled_decode() {
    let file = predicted_rgb_file(16, 16, 4);
    for degree in [0, 4] {
        let options = DecoderOptions {
            max_degree_of_parallelism: degree,
            ..Default::default()
        };
        let (decoder, reader) = open_decoder(file.clone(), options).await;
        let token = CancellationToken::new();
        token.cancel();

        let buffer = Arc::new(ImageBuffer::<Rgba64>::new(16, 16));
        let err = decoder
            .decode::<Rgba64>(Point::new(0, 0), Size::new(16, 16), Point::new(0, 0), buffer, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(reader.request_count(), 0);
    }
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_unsupported_predictor_is_rejected_at_build() {
    let mut image = SyntheticImage::gray8(4, 4, Layout::Strips { rows_per_strip: 4 });
    image.predictor = 3;
    let file = build_tiff(&image, &[vec![0; 16]], FileFormat::default());

    let reader = TrackingMockReader::new(file, "mem://predictor.tif");
    let directories = read_directories(&reader).await.unwrap();
    let err = ImageDecoder::new(&directories[0], Arc::new(reader), DecoderOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DecodeError::UnsupportedPredictor(3)));
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn test_short_strile_is_malformed() {
    let image = SyntheticImage::gray8(4, 4, Layout::Strips { rows_per_strip: 4 });
    // Four bytes where sixteen are needed
    let file = build_tiff(&image, &[vec![1, 2, 3, 4]], FileFormat::default());
    let (decoder, _) = open_decoder(file, DecoderOptions::default()).await;

    let buffer = Arc::new(ImageBuffer::<Rgba64>::new(4, 4));
    let err = decoder
        .decode::<Rgba64>(
            Point::new(0, 0),
            Size::new(4, 4),
            Point::new(0, 0),
            buffer,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::DecompressedSizeMismatch {
            expected: 16,
            actual: 4
        }
    ));
}
