//! Pixel composition kernels.
//!
//! Every kernel here is a total function over validated pixel views: it processes the overlap of
//! its operands' extents, never allocates, and writes only the destination view. Operand views are
//! validated when they are constructed, which is the only place these kernels can fail.

mod pixel;

use crate::foundation::core::{IntRect, Rgba8};
use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::{demultiply, mul_div255, norm1, premultiply};
use pixel::{DestPixel, Fore, Premul, Rgb, SourcePixel, Straight};
use serde::{Deserialize, Serialize};

/// 8-bit channel layouts understood by the kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGBA, color channels premultiplied by alpha.
    Rgba8Premul,
    /// RGBA, straight (non-premultiplied) color.
    Rgba8,
    /// RGB without alpha; always opaque.
    Rgb8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8Premul | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

fn check_layout(len: usize, width: u32, height: u32, stride: usize, bpp: usize) -> StrataResult<()> {
    let row = (width as usize)
        .checked_mul(bpp)
        .ok_or_else(|| StrataError::validation("pixel row size overflows usize"))?;
    if stride < row {
        return Err(StrataError::validation(format!(
            "stride {stride} is shorter than a row of {row} bytes"
        )));
    }
    if width == 0 || height == 0 {
        return Ok(());
    }
    let need = stride
        .checked_mul(height as usize - 1)
        .and_then(|v| v.checked_add(row))
        .ok_or_else(|| StrataError::validation("pixel buffer size overflows usize"))?;
    if len < need {
        return Err(StrataError::validation(format!(
            "pixel buffer holds {len} bytes, {width}x{height} with stride {stride} needs {need}"
        )));
    }
    Ok(())
}

// Byte offset of the clipped `r` inside a `width x height` view, plus the clipped extents.
fn sub_rect(
    r: IntRect,
    width: u32,
    height: u32,
    stride: usize,
    bpp: usize,
) -> Option<(usize, u32, u32)> {
    let bounds = IntRect::from_xywh(0, 0, width, height);
    let r = r.intersect(&bounds)?;
    let off = r.y0 as usize * stride + r.x0 as usize * bpp;
    Some((off, r.width(), r.height()))
}

/// Read-only view of a pixel buffer with explicit stride.
#[derive(Clone, Copy, Debug)]
pub struct PixelsRef<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> PixelsRef<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> StrataResult<Self> {
        check_layout(data.len(), width, height, stride, format.bytes_per_pixel())?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    /// A view whose rows are tightly packed.
    pub fn packed(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> StrataResult<Self> {
        let stride = (width as usize).saturating_mul(format.bytes_per_pixel());
        Self::new(data, width, height, stride, format)
    }

    /// A zero-sized premultiplied view.
    pub fn empty() -> Self {
        Self {
            data: &[],
            width: 0,
            height: 0,
            stride: 0,
            format: PixelFormat::Rgba8Premul,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixel bytes of row `y` (exactly `width * bpp` bytes).
    pub fn row(&self, y: u32) -> &'a [u8] {
        let off = y as usize * self.stride;
        &self.data[off..off + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// The part of this view inside `r`, or `None` if they do not overlap.
    pub fn view(&self, r: IntRect) -> Option<PixelsRef<'a>> {
        let bpp = self.format.bytes_per_pixel();
        let (off, width, height) = sub_rect(r, self.width, self.height, self.stride, bpp)?;
        Some(PixelsRef {
            data: &self.data[off..],
            width,
            height,
            stride: self.stride,
            format: self.format,
        })
    }
}

/// Mutable view of a pixel buffer with explicit stride.
#[derive(Debug)]
pub struct PixelsMut<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> PixelsMut<'a> {
    pub fn new(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> StrataResult<Self> {
        check_layout(data.len(), width, height, stride, format.bytes_per_pixel())?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    pub fn packed(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> StrataResult<Self> {
        let stride = (width as usize).saturating_mul(format.bytes_per_pixel());
        Self::new(data, width, height, stride, format)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let off = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[off..off + len]
    }

    pub fn as_view(&self) -> PixelsRef<'_> {
        PixelsRef {
            data: &*self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn view_mut(&mut self, r: IntRect) -> Option<PixelsMut<'_>> {
        let bpp = self.format.bytes_per_pixel();
        let (off, width, height) = sub_rect(r, self.width, self.height, self.stride, bpp)?;
        Some(PixelsMut {
            data: &mut self.data[off..],
            width,
            height,
            stride: self.stride,
            format: self.format,
        })
    }
}

/// 8-bit coverage samples, either a dedicated A8 plane or the alpha channel of an RGBA view.
#[derive(Clone, Copy, Debug)]
pub struct MaskRef<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    step: usize,
}

impl<'a> MaskRef<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: usize) -> StrataResult<Self> {
        check_layout(data.len(), width, height, stride, 1)?;
        Ok(Self {
            data,
            width,
            height,
            stride,
            step: 1,
        })
    }

    /// Reads the alpha channel of an RGBA view. `None` for RGB views.
    pub fn alpha_of(pixels: PixelsRef<'a>) -> Option<Self> {
        if pixels.format == PixelFormat::Rgb8 {
            return None;
        }
        Some(Self {
            data: pixels.data.get(3..).unwrap_or(&[]),
            width: pixels.width,
            height: pixels.height,
            stride: pixels.stride,
            step: 4,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride + x as usize * self.step]
    }

    fn row(&self, y: u32) -> &'a [u8] {
        &self.data[y as usize * self.stride..]
    }

    pub fn view(&self, r: IntRect) -> Option<MaskRef<'a>> {
        let (off, width, height) = sub_rect(r, self.width, self.height, self.stride, self.step)?;
        Some(MaskRef {
            data: &self.data[off..],
            width,
            height,
            stride: self.stride,
            step: self.step,
        })
    }
}

/// Foreground operand of [`composite`].
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    Pixels(PixelsRef<'a>),
    Color(Rgba8),
}

/// Per-pixel scale applied to the foreground's contribution.
#[derive(Clone, Copy, Debug)]
pub enum Coverage<'a> {
    Opacity(u8),
    Mask(MaskRef<'a>),
}

/// Source-over composite of `src`, scaled by `coverage`, onto `dst` in `dst`'s encoding.
///
/// Operates on the top-left aligned overlap of all operands.
pub fn composite(dst: &mut PixelsMut<'_>, src: &Source<'_>, coverage: &Coverage<'_>) {
    let (mut w, mut h) = (dst.width, dst.height);
    if let Source::Pixels(p) = src {
        w = w.min(p.width);
        h = h.min(p.height);
    }
    match coverage {
        Coverage::Opacity(0) => return,
        Coverage::Opacity(_) => {}
        Coverage::Mask(m) => {
            w = w.min(m.width);
            h = h.min(m.height);
        }
    }
    if w == 0 || h == 0 {
        return;
    }
    match dst.format {
        PixelFormat::Rgba8Premul => composite_into::<Premul>(dst, src, coverage, w, h),
        PixelFormat::Rgba8 => composite_into::<Straight>(dst, src, coverage, w, h),
        PixelFormat::Rgb8 => composite_into::<Rgb>(dst, src, coverage, w, h),
    }
}

fn composite_into<D: DestPixel>(
    dst: &mut PixelsMut<'_>,
    src: &Source<'_>,
    coverage: &Coverage<'_>,
    w: u32,
    h: u32,
) {
    match src {
        Source::Color(c) => {
            let f = Fore::from_straight(c.r, c.g, c.b, c.a);
            if f.a != 0 {
                blend_color::<D>(dst, f, coverage, w, h);
            }
        }
        Source::Pixels(p) => match p.format {
            PixelFormat::Rgba8Premul => blend_pixels::<D, Premul>(dst, p, coverage, w, h),
            PixelFormat::Rgba8 => blend_pixels::<D, Straight>(dst, p, coverage, w, h),
            PixelFormat::Rgb8 => blend_pixels::<D, Rgb>(dst, p, coverage, w, h),
        },
    }
}

fn blend_color<D: DestPixel>(
    dst: &mut PixelsMut<'_>,
    f: Fore,
    coverage: &Coverage<'_>,
    w: u32,
    h: u32,
) {
    let n = w as usize * D::BPP;
    match coverage {
        Coverage::Opacity(op) if f.a == 255 && *op == 255 => {
            let mut solid = [0u8; 4];
            D::store(&mut solid, f);
            for y in 0..h {
                for px in dst.row_mut(y)[..n].chunks_exact_mut(D::BPP) {
                    px.copy_from_slice(&solid[..D::BPP]);
                }
            }
        }
        Coverage::Opacity(op) => {
            let m = u32::from(*op);
            for y in 0..h {
                for px in dst.row_mut(y)[..n].chunks_exact_mut(D::BPP) {
                    D::over(px, f, m);
                }
            }
        }
        Coverage::Mask(mask) => {
            for y in 0..h {
                let mrow = mask.row(y);
                for (x, px) in dst.row_mut(y)[..n].chunks_exact_mut(D::BPP).enumerate() {
                    D::over(px, f, u32::from(mrow[x * mask.step]));
                }
            }
        }
    }
}

fn blend_pixels<D: DestPixel, S: SourcePixel>(
    dst: &mut PixelsMut<'_>,
    src: &PixelsRef<'_>,
    coverage: &Coverage<'_>,
    w: u32,
    h: u32,
) {
    let dn = w as usize * D::BPP;
    let sn = w as usize * S::BPP;
    for y in 0..h {
        let srow = &src.row(y)[..sn];
        let drow = &mut dst.row_mut(y)[..dn];
        let pairs = drow
            .chunks_exact_mut(D::BPP)
            .zip(srow.chunks_exact(S::BPP));
        match coverage {
            Coverage::Opacity(op) => {
                let m = u32::from(*op);
                for (d, s) in pairs {
                    D::over(d, S::fore(s), m);
                }
            }
            Coverage::Mask(mask) => {
                let mrow = mask.row(y);
                for (x, (d, s)) in pairs.enumerate() {
                    D::over(d, S::fore(s), u32::from(mrow[x * mask.step]));
                }
            }
        }
    }
}

/// Copies `src` into `dst` (the "source" operator), converting encodings.
pub fn copy_pixels(dst: &mut PixelsMut<'_>, src: &PixelsRef<'_>) {
    let w = dst.width.min(src.width);
    let h = dst.height.min(src.height);
    if w == 0 || h == 0 {
        return;
    }
    if dst.format == src.format {
        let n = w as usize * dst.format.bytes_per_pixel();
        for y in 0..h {
            dst.row_mut(y)[..n].copy_from_slice(&src.row(y)[..n]);
        }
        return;
    }
    match (dst.format, src.format) {
        (PixelFormat::Rgba8Premul, s) => store_rows::<Premul>(dst, src, s, w, h),
        (PixelFormat::Rgba8, s) => store_rows::<Straight>(dst, src, s, w, h),
        (PixelFormat::Rgb8, s) => store_rows::<Rgb>(dst, src, s, w, h),
    }
}

fn store_rows<D: DestPixel>(
    dst: &mut PixelsMut<'_>,
    src: &PixelsRef<'_>,
    format: PixelFormat,
    w: u32,
    h: u32,
) {
    let fore: fn(&[u8]) -> Fore = match format {
        PixelFormat::Rgba8Premul => Premul::fore,
        PixelFormat::Rgba8 => Straight::fore,
        PixelFormat::Rgb8 => Rgb::fore,
    };
    let sbpp = format.bytes_per_pixel();
    let n = w as usize;
    for y in 0..h {
        let srow = src.row(y);
        for (d, s) in dst.row_mut(y)[..n * D::BPP]
            .chunks_exact_mut(D::BPP)
            .zip(srow[..n * sbpp].chunks_exact(sbpp))
        {
            D::store(d, fore(s));
        }
    }
}

/// Zeroes every pixel of `dst` (transparent black, or black for RGB).
pub fn clear(dst: &mut PixelsMut<'_>) {
    for y in 0..dst.height {
        dst.row_mut(y).fill(0);
    }
}

/// Porter-Duff "in": scales each pixel's alpha (and premultiplied color) by `coverage`.
///
/// RGB views have no alpha to scale and are left unchanged.
pub fn scale_alpha(dst: &mut PixelsMut<'_>, coverage: &Coverage<'_>) {
    let format = dst.format;
    if format == PixelFormat::Rgb8 {
        return;
    }
    let (mut w, mut h) = (dst.width, dst.height);
    if let Coverage::Mask(m) = coverage {
        w = w.min(m.width);
        h = h.min(m.height);
    }
    let scale = |px: &mut [u8], m: u32| match format {
        PixelFormat::Rgba8Premul => {
            for c in px.iter_mut() {
                *c = mul_div255(u32::from(*c), m) as u8;
            }
        }
        _ => px[3] = mul_div255(u32::from(px[3]), m) as u8,
    };
    for y in 0..h {
        let row = &mut dst.row_mut(y)[..w as usize * 4];
        match coverage {
            Coverage::Opacity(255) => {}
            Coverage::Opacity(op) => {
                for px in row.chunks_exact_mut(4) {
                    scale(px, u32::from(*op));
                }
            }
            Coverage::Mask(mask) => {
                let mrow = mask.row(y);
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    scale(px, u32::from(mrow[x * mask.step]));
                }
            }
        }
    }
    // Pixels outside a mask's extent have zero coverage.
    if let Coverage::Mask(_) = coverage {
        for y in 0..dst.height {
            let row = dst.row_mut(y);
            let start = if y < h { w as usize * 4 } else { 0 };
            row[start..].fill(0);
        }
    }
}

/// Per-channel interpolation from `from` (mask 0) to the current `dst` (mask 255).
///
/// Used to confine an operation's result to a clip: `from` is the destination before the
/// operation. Operands of different formats are left untouched.
pub fn lerp_masked(dst: &mut PixelsMut<'_>, from: &PixelsRef<'_>, mask: &MaskRef<'_>) {
    if dst.format != from.format {
        return;
    }
    let w = dst.width.min(from.width).min(mask.width);
    let h = dst.height.min(from.height).min(mask.height);
    let bpp = dst.format.bytes_per_pixel();
    for y in 0..h {
        let (frow, mrow) = (from.row(y), mask.row(y));
        let drow = &mut dst.row_mut(y)[..w as usize * bpp];
        for (x, (d, f)) in drow
            .chunks_exact_mut(bpp)
            .zip(frow.chunks_exact(bpp))
            .enumerate()
        {
            let m = u32::from(mrow[x * mask.step]);
            if m == 255 {
                continue;
            }
            for (dc, fc) in d.iter_mut().zip(f) {
                *dc = norm1(u32::from(*dc) * m + u32::from(*fc) * (255 - m)) as u8;
            }
        }
    }
}

/// Replaces each pixel by an alpha-only pixel holding its luminance.
///
/// Luminance uses premultiplied color with weights 109/366/37 (out of 512), so the result is
/// directly usable as a coverage mask.
pub fn luminance_to_alpha(dst: &mut PixelsMut<'_>) {
    let format = dst.format;
    if format == PixelFormat::Rgb8 {
        return;
    }
    for y in 0..dst.height {
        for px in dst.row_mut(y).chunks_exact_mut(4) {
            let (r, g, b) = match format {
                PixelFormat::Rgba8 => (
                    premultiply(px[0], px[3]),
                    premultiply(px[1], px[3]),
                    premultiply(px[2], px[3]),
                ),
                _ => (px[0], px[1], px[2]),
            };
            let lum = (u32::from(r) * 109 + u32::from(g) * 366 + u32::from(b) * 37 + 256) >> 9;
            px.copy_from_slice(&[0, 0, 0, lum.min(255) as u8]);
        }
    }
}

/// Converts tightly packed straight RGBA8 to premultiplied in place.
pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        for c in &mut px[..3] {
            *c = premultiply(*c, a);
        }
    }
}

/// Converts tightly packed premultiplied RGBA8 to straight in place.
pub fn demultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = demultiply(*c, a);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/kernels.rs"]
mod tests;
