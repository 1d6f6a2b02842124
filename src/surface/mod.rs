//! Pixel surfaces and the logical-to-pixel mapping.

pub(crate) mod cache;
pub(crate) mod pool;
pub(crate) mod region;

use crate::compose::{PixelFormat, PixelsMut, PixelsRef};
use crate::context::DrawContext;
use crate::foundation::core::{Affine, IntRect, Point, Rect, Vec2};
use crate::foundation::error::{StrataError, StrataResult};
use crate::raster::{clear_pixmap_to_transparent, pixmap_dims};
use std::sync::Arc;

/// A premultiplied RGBA8 pixel buffer placed in a logical coordinate space.
///
/// Pixel `(0, 0)` covers the logical point `origin`; one pixel spans `1 / scale` logical units.
/// Storage is allocated lazily on first context acquisition and shared copy-on-write when the
/// surface is used as a paint source.
#[derive(Debug)]
pub struct Surface {
    pixels: Option<Arc<vello_cpu::Pixmap>>,
    width: u32,
    height: u32,
    origin: Point,
    scale: Vec2,
    device_scale: u32,
    // Storage, if any, is known to be all transparent.
    pristine: bool,
    has_context: bool,
}

impl Surface {
    /// Largest pixel width or height the rasterizer can address.
    pub const MAX_DIMENSION: u32 = u16::MAX as u32;

    /// A surface covering the pixel rectangle `area` one-to-one.
    pub fn new(area: IntRect) -> StrataResult<Self> {
        Self::with_device_scale(area, 1)
    }

    /// A surface covering `area` with `device_scale` buffer pixels per unit (HiDPI).
    pub fn with_device_scale(area: IntRect, device_scale: u32) -> StrataResult<Self> {
        if device_scale == 0 {
            return Err(StrataError::surface("device scale must be at least 1"));
        }
        let width = area.width().saturating_mul(device_scale);
        let height = area.height().saturating_mul(device_scale);
        check_dims(width, height)?;
        let s = f64::from(device_scale);
        Ok(Self::blank(
            width,
            height,
            Point::new(f64::from(area.x0), f64::from(area.y0)),
            Vec2::new(s, s),
            device_scale,
        ))
    }

    /// A surface of `width x height` pixels covering the logical rectangle `logical`.
    ///
    /// The scale is the ratio of the two, so pixel and logical extents never drift apart.
    pub fn from_logical(logical: Rect, width: u32, height: u32) -> StrataResult<Self> {
        check_dims(width, height)?;
        let (lw, lh) = (logical.width(), logical.height());
        if !(lw.is_finite() && lh.is_finite()) || lw <= 0.0 || lh <= 0.0 {
            return Err(StrataError::surface(format!(
                "logical rectangle {logical:?} must have positive finite size"
            )));
        }
        let scale = Vec2::new(f64::from(width) / lw, f64::from(height) / lh);
        Ok(Self::blank(width, height, logical.origin(), scale, 1))
    }

    /// Adopts an existing pixmap with identity placement.
    pub fn from_pixmap(pixmap: vello_cpu::Pixmap) -> Self {
        let (width, height) = (u32::from(pixmap.width()), u32::from(pixmap.height()));
        Self {
            pixels: Some(Arc::new(pixmap)),
            width,
            height,
            origin: Point::ZERO,
            scale: Vec2::new(1.0, 1.0),
            device_scale: 1,
            pristine: false,
            has_context: false,
        }
    }

    // Wraps a recycled pixmap of exactly `area * device_scale` pixels; the caller clears it.
    pub(crate) fn from_pooled(area: IntRect, device_scale: u32, pixmap: vello_cpu::Pixmap) -> Self {
        let mut s = Self::from_pixmap(pixmap);
        let d = f64::from(device_scale.max(1));
        s.origin = Point::new(f64::from(area.x0), f64::from(area.y0));
        s.scale = Vec2::new(d, d);
        s.device_scale = device_scale.max(1);
        s.pristine = true;
        s
    }

    fn blank(width: u32, height: u32, origin: Point, scale: Vec2, device_scale: u32) -> Self {
        Self {
            pixels: None,
            width,
            height,
            origin,
            scale,
            device_scale,
            pristine: true,
            has_context: false,
        }
    }

    /// Releases the pixmap, copying it only if a paint source still shares it.
    pub fn into_pixmap(self) -> Option<vello_cpu::Pixmap> {
        self.pixels
            .map(|p| Arc::try_unwrap(p).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// The logical rectangle covered by the surface.
    pub fn area(&self) -> Rect {
        Rect::from_origin_size(self.origin, self.dimensions().to_size())
    }

    /// Logical size, derived from the pixel size and scale.
    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(
            f64::from(self.width) / self.scale.x,
            f64::from(self.height) / self.scale.y,
        )
    }

    /// The rounded origin plus the size in device-independent pixels.
    pub fn pixel_area(&self) -> IntRect {
        let o = self.origin.round();
        IntRect::from_xywh(
            o.x as i32,
            o.y as i32,
            self.width / self.device_scale,
            self.height / self.device_scale,
        )
    }

    /// Maps logical coordinates to buffer pixel coordinates.
    pub fn drawing_transform(&self) -> Affine {
        Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-self.origin.to_vec2())
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn device_scale(&self) -> u32 {
        self.device_scale
    }

    pub fn pixel_width(&self) -> u32 {
        self.width
    }

    pub fn pixel_height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_allocated(&self) -> bool {
        self.pixels.is_some()
    }

    /// Whether a [`DrawContext`] is currently bound to this surface.
    pub fn has_context(&self) -> bool {
        self.has_context
    }

    /// Frees pixel storage, keeping geometry. The next context reallocates it transparent.
    pub fn drop_contents(&mut self) {
        self.pixels = None;
        self.pristine = true;
    }

    /// Binds a drawing context, allocating storage if needed.
    pub fn context(&mut self) -> DrawContext<'_> {
        DrawContext::new(self)
    }

    pub fn pixmap(&self) -> Option<&vello_cpu::Pixmap> {
        self.pixels.as_deref()
    }

    pub(crate) fn shared_pixmap(&self) -> Option<Arc<vello_cpu::Pixmap>> {
        self.pixels.clone()
    }

    /// Premultiplied view of the pixels, if allocated.
    pub fn pixels(&self) -> Option<PixelsRef<'_>> {
        let p = self.pixels.as_deref()?;
        PixelsRef::packed(
            p.data_as_u8_slice(),
            self.width,
            self.height,
            PixelFormat::Rgba8Premul,
        )
        .ok()
    }

    /// Mutable premultiplied view, allocating storage if needed. `None` for empty surfaces.
    pub fn pixels_mut(&mut self) -> Option<PixelsMut<'_>> {
        let (width, height) = (self.width, self.height);
        let p = self.pixmap_mut()?;
        PixelsMut::packed(
            p.data_as_u8_slice_mut(),
            width,
            height,
            PixelFormat::Rgba8Premul,
        )
        .ok()
    }

    /// One premultiplied RGBA pixel in buffer coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let Some(p) = self.pixels.as_deref() else {
            return Some([0; 4]);
        };
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let d = p.data_as_u8_slice();
        Some([d[i], d[i + 1], d[i + 2], d[i + 3]])
    }

    /// Fills the surface with transparent black without reallocating.
    pub fn clear(&mut self) {
        if self.pristine {
            return;
        }
        if let Some(p) = self.pixels.as_mut() {
            clear_pixmap_to_transparent(Arc::make_mut(p));
        }
        self.pristine = true;
    }

    // Writable pixmap, allocating on first use. Marks the storage as possibly non-transparent.
    pub(crate) fn pixmap_mut(&mut self) -> Option<&mut vello_cpu::Pixmap> {
        if self.is_empty() {
            return None;
        }
        if self.pixels.is_none() {
            let (w, h) = pixmap_dims(self.width, self.height).ok()?;
            self.pixels = Some(Arc::new(vello_cpu::Pixmap::new(w, h)));
            self.pristine = true;
        }
        self.pristine = false;
        self.pixels.as_mut().map(Arc::make_mut)
    }

    pub(crate) fn ensure_allocated(&mut self) {
        if self.pixels.is_none() && !self.is_empty()
            && let Ok((w, h)) = pixmap_dims(self.width, self.height)
        {
            self.pixels = Some(Arc::new(vello_cpu::Pixmap::new(w, h)));
            self.pristine = true;
        }
    }

    pub(crate) fn is_pristine(&self) -> bool {
        self.pristine
    }

    pub(crate) fn set_has_context(&mut self, bound: bool) {
        self.has_context = bound;
    }

    // Swaps the pixel storage, for transparency groups.
    pub(crate) fn replace_storage(
        &mut self,
        pixels: Option<Arc<vello_cpu::Pixmap>>,
        pristine: bool,
    ) -> (Option<Arc<vello_cpu::Pixmap>>, bool) {
        let old = (self.pixels.take(), self.pristine);
        self.pixels = pixels;
        self.pristine = pristine;
        old
    }
}

fn check_dims(width: u32, height: u32) -> StrataResult<()> {
    if width > Surface::MAX_DIMENSION || height > Surface::MAX_DIMENSION {
        return Err(StrataError::surface(format!(
            "surface of {width}x{height} pixels exceeds {} per side",
            Surface::MAX_DIMENSION
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/surface/surface.rs"]
mod tests;
