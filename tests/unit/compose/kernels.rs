use super::*;

const FORMATS: [PixelFormat; 3] = [
    PixelFormat::Rgba8Premul,
    PixelFormat::Rgba8,
    PixelFormat::Rgb8,
];

const FG: [u8; 3] = [37, 200, 91];

fn background(format: PixelFormat) -> Vec<u8> {
    // Four pixels: transparent, opaque, half-transparent, odd values.
    let rgba: [[u8; 4]; 4] = [
        [0, 0, 0, 0],
        [250, 10, 30, 255],
        [60, 60, 60, 128],
        [1, 2, 3, 4],
    ];
    let mut out = Vec::new();
    for px in rgba {
        out.extend_from_slice(&px[..format.bytes_per_pixel()]);
    }
    out
}

fn repeat(px: &[u8], n: usize) -> Vec<u8> {
    px.iter().copied().cycle().take(px.len() * n).collect()
}

#[derive(Clone, Copy, Debug)]
enum Variant {
    PremulPixels,
    StraightPixels,
    SolidColor,
    ColorThroughMask,
}

const VARIANTS: [Variant; 4] = [
    Variant::PremulPixels,
    Variant::StraightPixels,
    Variant::SolidColor,
    Variant::ColorThroughMask,
];

fn run(format: PixelFormat, variant: Variant, alpha: u8) -> (Vec<u8>, Vec<u8>) {
    let before = background(format);
    let mut dst = before.clone();
    let premul = repeat(
        &[
            premultiply(FG[0], alpha),
            premultiply(FG[1], alpha),
            premultiply(FG[2], alpha),
            alpha,
        ],
        4,
    );
    let straight = repeat(&[FG[0], FG[1], FG[2], alpha], 4);
    let mask = vec![alpha; 4];
    {
        let mut d = PixelsMut::packed(&mut dst, 4, 1, format).unwrap();
        match variant {
            Variant::PremulPixels => {
                let s = PixelsRef::packed(&premul, 4, 1, PixelFormat::Rgba8Premul).unwrap();
                composite(&mut d, &Source::Pixels(s), &Coverage::Opacity(255));
            }
            Variant::StraightPixels => {
                let s = PixelsRef::packed(&straight, 4, 1, PixelFormat::Rgba8).unwrap();
                composite(&mut d, &Source::Pixels(s), &Coverage::Opacity(255));
            }
            Variant::SolidColor => {
                let c = Rgba8::new(FG[0], FG[1], FG[2], alpha);
                composite(&mut d, &Source::Color(c), &Coverage::Opacity(255));
            }
            Variant::ColorThroughMask => {
                let c = Rgba8::opaque(FG[0], FG[1], FG[2]);
                let m = MaskRef::new(&mask, 4, 1, 4).unwrap();
                composite(&mut d, &Source::Color(c), &Coverage::Mask(m));
            }
        }
    }
    (before, dst)
}

#[test]
fn full_opacity_foreground_is_copied_exactly() {
    for format in FORMATS {
        for variant in VARIANTS {
            let (_, out) = run(format, variant, 255);
            let bpp = format.bytes_per_pixel();
            for px in out.chunks_exact(bpp) {
                assert_eq!(&px[..3], &FG, "{format:?} {variant:?}");
                if bpp == 4 {
                    assert_eq!(px[3], 255, "{format:?} {variant:?}");
                }
            }
        }
    }
}

#[test]
fn zero_opacity_foreground_leaves_background_untouched() {
    for format in FORMATS {
        for variant in VARIANTS {
            let (before, out) = run(format, variant, 0);
            assert_eq!(before, out, "{format:?} {variant:?}");
        }
    }
}

#[test]
fn zero_opacity_operand_is_a_no_op() {
    for format in FORMATS {
        let before = background(format);
        let mut dst = before.clone();
        let mut d = PixelsMut::packed(&mut dst, 4, 1, format).unwrap();
        composite(
            &mut d,
            &Source::Color(Rgba8::opaque(255, 255, 255)),
            &Coverage::Opacity(0),
        );
        assert_eq!(before, dst);
    }
}

#[test]
fn per_pixel_mask_selects_pixels() {
    let mut dst = repeat(&[0, 0, 255, 255], 4);
    let mask = [0u8, 255, 0, 255];
    let mut d = PixelsMut::packed(&mut dst, 4, 1, PixelFormat::Rgba8Premul).unwrap();
    let m = MaskRef::new(&mask, 4, 1, 4).unwrap();
    composite(
        &mut d,
        &Source::Color(Rgba8::opaque(255, 0, 0)),
        &Coverage::Mask(m),
    );
    assert_eq!(
        dst,
        vec![0, 0, 255, 255, 255, 0, 0, 255, 0, 0, 255, 255, 255, 0, 0, 255]
    );
}

#[test]
fn half_alpha_premul_over_premul() {
    let mut dst = vec![0, 0, 200, 200];
    let src = [100u8, 0, 0, 128];
    let mut d = PixelsMut::packed(&mut dst, 1, 1, PixelFormat::Rgba8Premul).unwrap();
    let s = PixelsRef::packed(&src, 1, 1, PixelFormat::Rgba8Premul).unwrap();
    composite(&mut d, &Source::Pixels(s), &Coverage::Opacity(255));
    // d' = s + d * (1 - 128/255)
    assert_eq!(dst, vec![100, 0, 100, 228]);
}

#[test]
fn straight_source_into_straight_destination_keeps_hue() {
    // Same color over itself stays the same color regardless of alpha.
    let mut dst = vec![40, 80, 120, 90];
    let src = [40u8, 80, 120, 70];
    let mut d = PixelsMut::packed(&mut dst, 1, 1, PixelFormat::Rgba8).unwrap();
    let s = PixelsRef::packed(&src, 1, 1, PixelFormat::Rgba8).unwrap();
    composite(&mut d, &Source::Pixels(s), &Coverage::Opacity(200));
    assert_eq!(&dst[..3], &[40, 80, 120]);
    assert!(dst[3] > 90);
}

#[test]
fn padding_bytes_between_rows_are_untouched() {
    // 2x2 pixels, stride of 12 bytes (4 padding bytes per row).
    let mut dst = vec![7u8; 24];
    let mut d = PixelsMut::new(&mut dst, 2, 2, 12, PixelFormat::Rgba8Premul).unwrap();
    composite(
        &mut d,
        &Source::Color(Rgba8::opaque(1, 2, 3)),
        &Coverage::Opacity(255),
    );
    assert_eq!(&dst[8..12], &[7, 7, 7, 7]);
    assert_eq!(&dst[20..24], &[7, 7, 7, 7]);
    assert_eq!(&dst[12..16], &[1, 2, 3, 255]);
}

#[test]
fn sub_views_composite_only_their_rect() {
    let mut dst = vec![0u8; 4 * 4 * 4];
    let mut d = PixelsMut::packed(&mut dst, 4, 4, PixelFormat::Rgba8Premul).unwrap();
    {
        let mut inner = d.view_mut(IntRect::new(1, 1, 3, 3)).unwrap();
        assert_eq!((inner.width(), inner.height()), (2, 2));
        composite(
            &mut inner,
            &Source::Color(Rgba8::opaque(9, 9, 9)),
            &Coverage::Opacity(255),
        );
    }
    let painted: Vec<(u32, u32)> = (0..4)
        .flat_map(|y| (0..4).map(move |x| (x, y)))
        .filter(|&(x, y)| dst[((y * 4 + x) * 4 + 3) as usize] == 255)
        .collect();
    assert_eq!(painted, vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
}

#[test]
fn views_outside_bounds_are_none() {
    let data = vec![0u8; 16];
    let v = PixelsRef::packed(&data, 2, 2, PixelFormat::Rgba8Premul).unwrap();
    assert!(v.view(IntRect::new(2, 0, 4, 2)).is_none());
    assert!(v.view(IntRect::new(-3, -3, 1, 1)).is_some());
}

#[test]
fn short_buffers_and_strides_are_rejected() {
    let data = vec![0u8; 15];
    assert!(PixelsRef::packed(&data, 2, 2, PixelFormat::Rgba8Premul).is_err());
    assert!(PixelsRef::new(&data, 2, 1, 7, PixelFormat::Rgba8).is_err());
    assert!(PixelsRef::packed(&data, 5, 1, PixelFormat::Rgb8).is_ok());
    assert!(MaskRef::new(&data, 4, 4, 4).is_err());
}

#[test]
fn copy_converts_straight_to_premul() {
    let src = [200u8, 100, 50, 128];
    let mut dst = vec![0u8; 4];
    let mut d = PixelsMut::packed(&mut dst, 1, 1, PixelFormat::Rgba8Premul).unwrap();
    let s = PixelsRef::packed(&src, 1, 1, PixelFormat::Rgba8).unwrap();
    copy_pixels(&mut d, &s);
    assert_eq!(dst, vec![100, 50, 25, 128]);
}

#[test]
fn copy_same_format_is_bytewise() {
    let src: Vec<u8> = (0..12).collect();
    let mut dst = vec![0u8; 12];
    let mut d = PixelsMut::packed(&mut dst, 4, 1, PixelFormat::Rgb8).unwrap();
    copy_pixels(&mut d, &PixelsRef::packed(&src, 4, 1, PixelFormat::Rgb8).unwrap());
    assert_eq!(dst, src);
}

#[test]
fn scale_alpha_by_rgba_alpha_mask() {
    let mut dst = repeat(&[200, 100, 50, 200], 2);
    let mask_px = [0u8, 0, 0, 255, 0, 0, 0, 0];
    let mut d = PixelsMut::packed(&mut dst, 2, 1, PixelFormat::Rgba8Premul).unwrap();
    let m = MaskRef::alpha_of(PixelsRef::packed(&mask_px, 2, 1, PixelFormat::Rgba8Premul).unwrap())
        .unwrap();
    scale_alpha(&mut d, &Coverage::Mask(m));
    assert_eq!(dst, vec![200, 100, 50, 200, 0, 0, 0, 0]);
}

#[test]
fn scale_alpha_clears_pixels_beyond_mask() {
    let mut dst = repeat(&[10, 10, 10, 10], 4);
    let mask = [255u8];
    let mut d = PixelsMut::packed(&mut dst, 2, 2, PixelFormat::Rgba8Premul).unwrap();
    scale_alpha(&mut d, &Coverage::Mask(MaskRef::new(&mask, 1, 1, 1).unwrap()));
    assert_eq!(&dst[..4], &[10, 10, 10, 10]);
    assert!(dst[4..].iter().all(|&b| b == 0));
}

#[test]
fn luminance_of_white_and_black() {
    let mut px = vec![255u8, 255, 255, 255, 0, 0, 0, 255, 255, 255, 255, 0];
    let mut d = PixelsMut::packed(&mut px, 3, 1, PixelFormat::Rgba8).unwrap();
    luminance_to_alpha(&mut d);
    assert_eq!(px, vec![0, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn premultiply_demultiply_in_place() {
    let mut px = vec![255u8, 128, 0, 255, 200, 100, 50, 128, 9, 9, 9, 0];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(px, vec![255, 128, 0, 255, 100, 50, 25, 128, 0, 0, 0, 0]);
    demultiply_rgba8_in_place(&mut px);
    assert_eq!(&px[..8], &[255, 128, 0, 255, 199, 100, 50, 128]);
}
