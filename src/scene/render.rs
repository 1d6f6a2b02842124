use crate::compose::{self, Coverage, MaskRef};
use crate::context::{DrawContext, PatternPaint, Save};
use crate::foundation::core::{IntRect, Rgba8};
use crate::foundation::math::{is_singular, unit_to_u8};
use crate::scene::drawing::Drawing;
use crate::scene::item::ItemKindTag;
use crate::scene::shape::ShapePaint;
use crate::scene::{ItemId, RenderFlags, RenderMode, RenderStatus};
use crate::surface::Surface;
use crate::surface::region::Region;

const SINGULAR_EPS: f64 = 1e-18;
const OUTLINE_COLOR: Rgba8 = Rgba8::opaque(0, 0, 0);
const CLIP_OUTLINE_COLOR: Rgba8 = Rgba8::opaque(0, 0, 255);
const MASK_OUTLINE_COLOR: Rgba8 = Rgba8::opaque(0, 128, 0);

enum ResolvedPaint {
    Color(Rgba8),
    Pattern(PatternPaint),
}

impl ResolvedPaint {
    fn apply(&self, dc: &mut DrawContext<'_>) {
        match self {
            Self::Color(c) => dc.set_source_rgba(*c),
            Self::Pattern(p) => dc.set_source_pattern(p),
        }
    }
}

impl Drawing {
    /// Renders one item and its subtree into `dc`, limited to `area`.
    pub(crate) fn render_node(
        &mut self,
        id: ItemId,
        dc: &mut DrawContext<'_>,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderStatus {
        if stop_at == Some(id) {
            return RenderStatus::Stop;
        }
        let Some(item) = self.get(id) else {
            return RenderStatus::Ok;
        };
        if !item.visible || is_singular(&item.ctm, SINGULAR_EPS) {
            return RenderStatus::Ok;
        }
        if self.render_mode() == RenderMode::Outline {
            self.render_outline(id, dc, area, OUTLINE_COLOR);
            return RenderStatus::Ok;
        }
        let Some(mut carea) = item.drawbox.and_then(|d| d.intersect(&area)) else {
            return RenderStatus::Ok;
        };

        let ds = dc.surface().device_scale();
        // A background render is partial: it must neither read nor fill the cache.
        let use_cache =
            item.cached && stop_at.is_none() && !flags.contains(RenderFlags::BYPASS_CACHE);
        // Set when part of the request was served from the cache.
        let mut uncached: Option<Region> = None;
        if use_cache {
            let cache_rect = self.cache_rect(id);
            if let Some(item) = self.get_mut(id) {
                match item.cache.as_mut() {
                    Some(cache) => {
                        cache.prepare();
                        let mut remaining = Region::from_rect(carea);
                        cache.paint_from_cache(dc, &mut remaining);
                        let Some(b) = remaining.bounds() else {
                            return RenderStatus::Ok;
                        };
                        carea = b;
                        uncached = Some(remaining);
                    }
                    None => {
                        if let Some(rect) = cache_rect {
                            match crate::surface::cache::CacheSurface::new(rect, ds) {
                                Ok(c) => item.cache = Some(c),
                                Err(e) => tracing::warn!(error = %e, ?id, "item cache rejected"),
                            }
                        }
                    }
                }
            }
        }

        let Some(item) = self.get(id) else {
            return RenderStatus::Ok;
        };
        let opacity = item.opacity;
        let needs_opacity = opacity < 1.0 - self.opts.item_opacity_epsilon;
        let has_cache = use_cache && item.cache.is_some();
        let needs_intermediate =
            item.clip.is_some() || item.mask.is_some() || needs_opacity || has_cache;

        if flags.contains(RenderFlags::FILTER_BACKGROUND) || !needs_intermediate {
            return self.render_item(
                id,
                dc,
                carea,
                flags - RenderFlags::FILTER_BACKGROUND,
                stop_at,
            );
        }

        let mut intermediate = match self.pool.borrow(carea, ds) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, ?id, "intermediate surface rejected");
                return RenderStatus::Ok;
            }
        };
        let status = {
            let mut ict = intermediate.context();
            self.render_item(id, &mut ict, carea, flags, stop_at)
        };

        if let Some(coverage) = self.coverage(id, carea, ds, flags) {
            apply_coverage(&mut intermediate, &coverage);
            self.pool.release(coverage);
        }
        if needs_opacity && let Some(mut px) = intermediate.pixels_mut() {
            compose::scale_alpha(&mut px, &Coverage::Opacity(unit_to_u8(opacity)));
        }

        if has_cache && let Some(cache) = self.get_mut(id).and_then(|i| i.cache.as_mut()) {
            store_in_cache(cache, &intermediate, carea);
        }

        match uncached {
            // Pixels outside the remainder were already painted from the cache.
            Some(region) if region.rects().len() > 1 => {
                let mut dc = Save::new(dc);
                dc.new_path();
                dc.set_source_surface(&intermediate);
                for r in region.rects() {
                    dc.rectangle_int(*r);
                }
                dc.fill();
            }
            _ => dc.blend_surface(&intermediate, 1.0),
        }
        self.pool.release(intermediate);
        status
    }

    /// Renders the item's own content, without clip, mask, opacity or cache.
    fn render_item(
        &mut self,
        id: ItemId,
        dc: &mut DrawContext<'_>,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderStatus {
        let Some(item) = self.get(id) else {
            return RenderStatus::Ok;
        };
        match item.kind.tag() {
            ItemKindTag::Shape => {
                self.render_shape(id, dc);
                RenderStatus::Ok
            }
            ItemKindTag::Group | ItemKindTag::Pattern => {
                let children = item.kind.group().map(|g| g.children.clone()).unwrap_or_default();
                let Some(stop) = stop_at else {
                    for c in children {
                        self.render_node(c, dc, area, flags, None);
                    }
                    return RenderStatus::Ok;
                };
                for c in children {
                    if c == stop {
                        return RenderStatus::Stop;
                    }
                    if self.is_ancestor_of(c, stop) {
                        // Everything before `stop` inside this child is backdrop.
                        return self.render_node(
                            c,
                            dc,
                            area,
                            flags | RenderFlags::FILTER_BACKGROUND,
                            stop_at,
                        );
                    }
                    self.render_node(c, dc, area, flags, None);
                }
                RenderStatus::Ok
            }
        }
    }

    fn resolve_paint(&mut self, paint: ShapePaint) -> Option<ResolvedPaint> {
        match paint {
            ShapePaint::Color(c) => Some(ResolvedPaint::Color(c)),
            ShapePaint::Pattern { pattern, opacity } => self
                .render_pattern(pattern, opacity)
                .map(ResolvedPaint::Pattern),
        }
    }

    fn render_shape(&mut self, id: ItemId, dc: &mut DrawContext<'_>) {
        let Some(shape) = self.get(id).and_then(|i| i.kind.shape()) else {
            return;
        };
        let (fill, stroke) = (shape.fill, shape.stroke);
        let fill = fill.and_then(|f| self.resolve_paint(f));
        let stroke = stroke.and_then(|s| Some((self.resolve_paint(s.paint)?, s.style)));

        let Some(item) = self.get(id) else {
            return;
        };
        let Some(shape) = item.kind.shape() else {
            return;
        };
        let mut dc = Save::new(dc);
        dc.transform(item.ctm);
        dc.new_path();
        match shape.as_rect() {
            Some(r) => dc.rectangle(r),
            None => dc.path(&shape.path),
        }
        if let Some(paint) = fill {
            paint.apply(&mut dc);
            dc.set_fill_rule(shape.fill_rule);
            dc.fill_preserve();
        }
        if let Some((paint, style)) = stroke {
            paint.apply(&mut dc);
            dc.set_line_style(style);
            dc.stroke_preserve();
        }
        dc.new_path();
    }

    /// Combined clip and mask coverage over `area`, or `None` when the item has neither.
    fn coverage(
        &mut self,
        id: ItemId,
        area: IntRect,
        ds: u32,
        flags: RenderFlags,
    ) -> Option<Surface> {
        let item = self.get(id)?;
        let (clip, mask) = (item.clip, item.mask);
        if clip.is_none() && mask.is_none() {
            return None;
        }
        let mut coverage = self.pool.borrow(area, ds).ok()?;
        match clip {
            Some(c) => self.render_clip(c, &mut coverage, area),
            None => {
                let mut dc = coverage.context();
                dc.set_source_rgba(Rgba8::BLACK);
                dc.paint(1.0);
            }
        }
        if let Some(m) = mask {
            let Ok(mut mask_surface) = self.pool.borrow(area, ds) else {
                return Some(coverage);
            };
            {
                let mut mdc = mask_surface.context();
                self.render_node(m, &mut mdc, area, flags, None);
            }
            if let Some(mut px) = mask_surface.pixels_mut() {
                compose::luminance_to_alpha(&mut px);
            }
            apply_coverage(&mut coverage, &mask_surface);
            self.pool.release(mask_surface);
        }
        Some(coverage)
    }

    /// Accumulates the clip geometry of `id` into `target` as opaque black.
    pub(crate) fn render_clip(&mut self, id: ItemId, target: &mut Surface, area: IntRect) {
        let Some(item) = self.get(id) else {
            return;
        };
        if !item.visible || !item.visual_bbox.is_some_and(|b| b.intersects(&area)) {
            return;
        }
        let Some(own_clip) = item.clip else {
            self.render_clip_contents(id, target, area);
            return;
        };
        // A clipped clip path: build it apart, then intersect with its own clip.
        let ds = target.device_scale();
        let (Ok(mut contents), Ok(mut clip)) =
            (self.pool.borrow(area, ds), self.pool.borrow(area, ds))
        else {
            return;
        };
        self.render_clip_contents(id, &mut contents, area);
        self.render_clip(own_clip, &mut clip, area);
        apply_coverage(&mut contents, &clip);
        target.context().blend_surface(&contents, 1.0);
        self.pool.release(contents);
        self.pool.release(clip);
    }

    fn render_clip_contents(&mut self, id: ItemId, target: &mut Surface, area: IntRect) {
        let Some(item) = self.get(id) else {
            return;
        };
        if let Some(shape) = item.kind.shape() {
            let mut dc = target.context();
            dc.transform(item.ctm);
            match shape.as_rect() {
                Some(r) => dc.rectangle(r),
                None => dc.path(&shape.path),
            }
            dc.set_fill_rule(shape.clip_rule);
            dc.set_source_rgba(Rgba8::BLACK);
            dc.fill();
            return;
        }
        let children = item.kind.group().map(|g| g.children.clone()).unwrap_or_default();
        for c in children {
            self.render_clip(c, target, area);
        }
    }

    /// Hairline outlines of the item's geometry, its clip and its mask.
    fn render_outline(&self, id: ItemId, dc: &mut DrawContext<'_>, area: IntRect, color: Rgba8) {
        let Some(item) = self.get(id) else {
            return;
        };
        if !item.visible || !item.visual_bbox.is_some_and(|b| b.intersects(&area)) {
            return;
        }
        let (clip, mask) = (item.clip, item.mask);
        match item.kind.shape() {
            Some(shape) => {
                let mut dc = Save::new(dc);
                dc.transform(item.ctm);
                dc.new_path();
                dc.path(&shape.path);
                dc.set_hairline(true);
                dc.set_source_rgba(color);
                dc.stroke();
            }
            None => {
                let children = item.kind.group().map(|g| g.children.clone()).unwrap_or_default();
                for c in children {
                    self.render_outline(c, dc, area, color);
                }
            }
        }
        if let Some(c) = clip {
            self.render_outline(c, dc, area, CLIP_OUTLINE_COLOR);
        }
        if let Some(m) = mask {
            self.render_outline(m, dc, area, MASK_OUTLINE_COLOR);
        }
    }
}

/// Multiplies `target`'s pixels by the alpha of `coverage` (same placement and size).
fn apply_coverage(target: &mut Surface, coverage: &Surface) {
    let Some(mut dst) = target.pixels_mut() else {
        return;
    };
    match coverage.pixels().and_then(MaskRef::alpha_of) {
        Some(mask) => compose::scale_alpha(&mut dst, &Coverage::Mask(mask)),
        None => compose::clear(&mut dst),
    }
}

/// Copies the rendered `area` of an item into its cache and marks it clean.
fn store_in_cache(cache: &mut crate::surface::cache::CacheSurface, src: &Surface, area: IntRect) {
    let Some(target) = area.intersect(&cache.pixel_area()) else {
        return;
    };
    let Some(from) = src.pixels() else {
        return;
    };
    let cache_area = cache.pixel_area();
    let scale = cache.surface().device_scale() as i32;
    let px = |r: IntRect, x: i32, y: i32| {
        let r = r.translate(-x, -y);
        IntRect::new(r.x0 * scale, r.y0 * scale, r.x1 * scale, r.y1 * scale)
    };
    let Some(mut dst) = cache.surface_mut().pixels_mut() else {
        return;
    };
    if let (Some(s), Some(mut d)) = (
        from.view(px(target, area.x0, area.y0)),
        dst.view_mut(px(target, cache_area.x0, cache_area.y0)),
    ) {
        compose::copy_pixels(&mut d, &s);
    }
    cache.mark_clean(target);
}
