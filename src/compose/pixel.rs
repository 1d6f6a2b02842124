//! Per-pixel source-over formulas for each destination encoding.
//!
//! Foreground colors travel as [`Fore`]: premultiplied channels scaled by 255 (so straight and
//! premultiplied sources share one exact representation) plus an 8-bit alpha. Coverage `m` is
//! the 8-bit opacity or mask sample. A product of `k` 8-bit factors is normalized back to 8 bits
//! by dividing by 255^(k-1) once, rounding to nearest, so every blend rounds exactly one time.

use crate::foundation::math::{div_round, norm1, norm2};

const FULL2: u32 = 255 * 255;

/// Foreground pixel: premultiplied color scaled by 255, and alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Fore {
    pub(crate) c: [u32; 3],
    pub(crate) a: u32,
}

impl Fore {
    #[inline(always)]
    pub(crate) fn from_straight(r: u8, g: u8, b: u8, a: u8) -> Self {
        let a = u32::from(a);
        Self {
            c: [u32::from(r) * a, u32::from(g) * a, u32::from(b) * a],
            a,
        }
    }

    #[inline(always)]
    pub(crate) fn from_premul(r: u8, g: u8, b: u8, a: u8) -> Self {
        let cap = |c: u8| u32::from(c.min(a)) * 255;
        Self {
            c: [cap(r), cap(g), cap(b)],
            a: u32::from(a),
        }
    }

    #[inline(always)]
    pub(crate) fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self {
            c: [u32::from(r) * 255, u32::from(g) * 255, u32::from(b) * 255],
            a: 255,
        }
    }
}

/// Reads a source pixel into a [`Fore`].
pub(crate) trait SourcePixel {
    const BPP: usize;
    fn fore(px: &[u8]) -> Fore;
}

/// Composites a [`Fore`] scaled by coverage `m` onto one destination pixel, and stores a
/// [`Fore`] verbatim for copy operations.
pub(crate) trait DestPixel {
    const BPP: usize;
    fn over(px: &mut [u8], f: Fore, m: u32);
    fn store(px: &mut [u8], f: Fore);
}

pub(crate) struct Premul;
pub(crate) struct Straight;
pub(crate) struct Rgb;

impl SourcePixel for Premul {
    const BPP: usize = 4;

    #[inline(always)]
    fn fore(px: &[u8]) -> Fore {
        Fore::from_premul(px[0], px[1], px[2], px[3])
    }
}

impl SourcePixel for Straight {
    const BPP: usize = 4;

    #[inline(always)]
    fn fore(px: &[u8]) -> Fore {
        Fore::from_straight(px[0], px[1], px[2], px[3])
    }
}

impl SourcePixel for Rgb {
    const BPP: usize = 3;

    #[inline(always)]
    fn fore(px: &[u8]) -> Fore {
        Fore::opaque(px[0], px[1], px[2])
    }
}

impl DestPixel for Premul {
    const BPP: usize = 4;

    #[inline(always)]
    fn over(px: &mut [u8], f: Fore, m: u32) {
        let fa = f.a * m;
        if fa == 0 {
            return;
        }
        if fa == FULL2 {
            Self::store(px, f);
            return;
        }
        let inv = FULL2 - fa;
        for i in 0..3 {
            px[i] = norm2(f.c[i] * m + u32::from(px[i]) * inv) as u8;
        }
        px[3] = norm2(fa * 255 + u32::from(px[3]) * inv) as u8;
    }

    #[inline(always)]
    fn store(px: &mut [u8], f: Fore) {
        for i in 0..3 {
            px[i] = norm1(f.c[i]) as u8;
        }
        px[3] = f.a as u8;
    }
}

impl DestPixel for Straight {
    const BPP: usize = 4;

    #[inline(always)]
    fn over(px: &mut [u8], f: Fore, m: u32) {
        let fa = f.a * m;
        if fa == 0 {
            return;
        }
        if fa == FULL2 {
            Self::store(px, f);
            return;
        }
        let da = u32::from(px[3]);
        if da == 0 {
            // Nothing to blend with: the result is the demultiplied foreground.
            for i in 0..3 {
                px[i] = div_round(u64::from(f.c[i] * m), u64::from(fa)).min(255) as u8;
            }
            px[3] = norm1(fa) as u8;
            return;
        }
        let inv = FULL2 - fa;
        let a3 = fa * 255 + da * inv;
        for i in 0..3 {
            let num = u64::from(f.c[i] * m) * 255 + u64::from(px[i]) * u64::from(da * inv);
            px[i] = div_round(num, u64::from(a3)).min(255) as u8;
        }
        px[3] = norm2(a3) as u8;
    }

    #[inline(always)]
    fn store(px: &mut [u8], f: Fore) {
        if f.a == 0 {
            px[..4].fill(0);
            return;
        }
        for i in 0..3 {
            px[i] = div_round(u64::from(f.c[i]), u64::from(f.a)).min(255) as u8;
        }
        px[3] = f.a as u8;
    }
}

impl DestPixel for Rgb {
    const BPP: usize = 3;

    #[inline(always)]
    fn over(px: &mut [u8], f: Fore, m: u32) {
        let fa = f.a * m;
        if fa == 0 {
            return;
        }
        if fa == FULL2 {
            Self::store(px, f);
            return;
        }
        let inv = FULL2 - fa;
        for i in 0..3 {
            px[i] = norm2(f.c[i] * m + u32::from(px[i]) * inv) as u8;
        }
    }

    /// Without an alpha channel the stored color is the foreground over black.
    #[inline(always)]
    fn store(px: &mut [u8], f: Fore) {
        for i in 0..3 {
            px[i] = norm1(f.c[i]) as u8;
        }
    }
}
