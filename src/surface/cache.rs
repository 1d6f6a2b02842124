use crate::compose::copy_pixels;
use crate::context::{DrawContext, Save};
use crate::foundation::core::{Affine, IntRect};
use crate::foundation::error::StrataResult;
use crate::foundation::math::{affine_near, integer_translation};
use crate::surface::Surface;
use crate::surface::region::Region;

const TRANSFORM_EPS: f64 = 1e-6;

/// Where a cache is in its relocation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// The clean region describes the current buffer.
    Coherent,
    /// A transform or area change is recorded and waits for [`CacheSurface::prepare`].
    PendingRelocation,
}

/// A surface that remembers which of its pixels are up to date.
///
/// The clean region is kept inside the surface's pixel area at all times.
#[derive(Debug)]
pub struct CacheSurface {
    surface: Surface,
    clean: Region,
    pending_area: IntRect,
    pending_transform: Affine,
}

impl CacheSurface {
    /// An empty (fully dirty) cache over `area`. Storage is allocated on first paint.
    pub fn new(area: IntRect, device_scale: u32) -> StrataResult<Self> {
        Ok(Self {
            surface: Surface::with_device_scale(area, device_scale)?,
            clean: Region::new(),
            pending_area: area,
            pending_transform: Affine::IDENTITY,
        })
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    pub fn pixel_area(&self) -> IntRect {
        self.surface.pixel_area()
    }

    pub fn clean_region(&self) -> &Region {
        &self.clean
    }

    /// Bytes the cache holds (or will hold once drawn into).
    pub fn byte_size(&self) -> u64 {
        u64::from(self.surface.pixel_width()) * u64::from(self.surface.pixel_height()) * 4
    }

    pub fn state(&self) -> CacheState {
        if self.pending_area == self.pixel_area()
            && affine_near(&self.pending_transform, &Affine::IDENTITY, TRANSFORM_EPS)
        {
            CacheState::Coherent
        } else {
            CacheState::PendingRelocation
        }
    }

    pub fn mark_dirty(&mut self, area: IntRect) {
        self.clean.subtract_rect(&area);
    }

    /// Marks every pixel dirty.
    pub fn invalidate(&mut self) {
        self.clean.clear();
    }

    /// Records that `area` now holds correct pixels. Parts outside the surface are ignored.
    pub fn mark_clean(&mut self, area: IntRect) {
        if let Some(r) = area.intersect(&self.pixel_area()) {
            self.clean.union_rect(r);
        }
    }

    /// Queues a move to `new_area` after the content moves by `transform`.
    ///
    /// Successive calls accumulate; `transform` applies after those already queued.
    pub fn schedule_transform(&mut self, new_area: IntRect, transform: Affine) {
        self.pending_transform = transform * self.pending_transform;
        self.pending_area = new_area;
    }

    /// Applies the queued relocation.
    ///
    /// Integer translations keep the overlapping pixels; any other transform invalidates the
    /// whole cache.
    pub fn prepare(&mut self) {
        if self.state() == CacheState::Coherent {
            self.pending_transform = Affine::IDENTITY;
            return;
        }
        let old_area = self.pixel_area();
        let new_area = self.pending_area;
        let moved = integer_translation(&self.pending_transform, TRANSFORM_EPS);
        self.pending_transform = Affine::IDENTITY;

        let ds = self.surface.device_scale();
        let mut next = match Surface::with_device_scale(new_area, ds) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "cache relocation dropped an oversized surface");
                self.clean.clear();
                let empty = IntRect::from_xywh(new_area.x0, new_area.y0, 0, 0);
                if let Ok(s) = Surface::new(empty) {
                    self.surface = s;
                }
                self.pending_area = self.surface.pixel_area();
                return;
            }
        };

        let Some((dx, dy)) = moved else {
            tracing::debug!(?old_area, ?new_area, "cache invalidated by non-translation transform");
            self.clean.clear();
            self.surface = next;
            return;
        };

        self.clean.translate(dx, dy);
        self.clean.intersect_rect(&new_area);
        if !self.clean.is_empty()
            && let Some(overlap) = old_area.translate(dx, dy).intersect(&new_area)
            && let Some(src) = self.surface.pixels()
            && let Some(mut dst) = next.pixels_mut()
        {
            let scale = ds as i32;
            let to_new = overlap.translate(-new_area.x0, -new_area.y0);
            let to_old = overlap.translate(-dx - old_area.x0, -dy - old_area.y0);
            let px = |r: IntRect| IntRect::new(r.x0 * scale, r.y0 * scale, r.x1 * scale, r.y1 * scale);
            if let (Some(s), Some(mut d)) = (src.view(px(to_old)), dst.view_mut(px(to_new))) {
                copy_pixels(&mut d, &s);
            }
        }
        tracing::debug!(dx, dy, ?new_area, clean_px = self.clean.area(), "cache relocated");
        self.surface = next;
    }

    /// Paints the clean part of `area` from the cache and leaves the rest in `area`.
    ///
    /// Afterwards `area` holds exactly the pixels the caller still has to render.
    pub fn paint_from_cache(&self, dc: &mut DrawContext<'_>, area: &mut Region) {
        let mut from_cache = area.clone();
        from_cache.intersect(&self.clean);
        area.subtract(&self.clean);
        if from_cache.is_empty() {
            return;
        }
        let mut dc = Save::new(dc);
        dc.new_path();
        dc.set_source_surface(&self.surface);
        for r in from_cache.rects() {
            dc.rectangle_int(*r);
        }
        dc.fill();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/cache.rs"]
mod tests;
