//! A stateful drawing cursor bound to one [`Surface`].
//!
//! All geometry is given in logical (user) coordinates; the surface's drawing transform is
//! applied underneath. Path coordinates are converted to buffer pixels as they are added, so a
//! later transform change never moves geometry that was already emitted.
//!
//! Drawing goes through one of two routes:
//! - pixel-aligned rectangles filled from a solid color or an integer-placed surface are
//!   composited directly with the [`crate::compose`] kernels (exact, no resampling);
//! - everything else is rasterized by `vello_cpu`, seeded with the surface's current pixels and
//!   written back on [`DrawContext::flush`].
//!
//! Clips never live inside the rasterizer. A clipped operation runs unclipped and its result is
//! then interpolated with the previous pixels through the clip coverage, which gives every
//! operator the same clip semantics.

mod paint;
mod save;

pub use paint::{FillRule, LineCap, LineJoin, LineStyle, Operator, PatternPaint, TileExtend};
pub use save::Save;

use crate::compose::{self, Coverage, MaskRef, PixelFormat, PixelsRef, Source};
use crate::foundation::core::{Affine, BezPath, IntRect, Point, Rect, Rgba8};
use crate::foundation::math::{integer_translation, is_singular, unit_to_u8};
use crate::raster::{affine_to_cpu, bezpath_to_cpu, image_paint, pixmap_dims};
use crate::surface::Surface;
use kurbo::{PathEl, Shape};
use smallvec::SmallVec;
use std::sync::Arc;
use vello_cpu::peniko::{Extend, ImageQuality};

const PIXEL_EPS: f64 = 1e-6;
const ARC_TOLERANCE: f64 = 0.05;

#[derive(Clone, Debug)]
enum Paint {
    Solid(Rgba8),
    Image(ImagePaint),
}

#[derive(Clone, Debug)]
struct ImagePaint {
    pixmap: Arc<vello_cpu::Pixmap>,
    // Source pixels to target buffer pixels.
    to_device: Affine,
    extend: Extend,
    // Transparent outside the source rectangle.
    bounded: bool,
    quality: ImageQuality,
}

impl ImagePaint {
    fn new(pixmap: Arc<vello_cpu::Pixmap>, to_device: Affine, extend: Extend, bounded: bool) -> Self {
        let quality = if integer_translation(&to_device, PIXEL_EPS).is_some() {
            ImageQuality::Low
        } else {
            ImageQuality::Medium
        };
        Self {
            pixmap,
            to_device,
            extend,
            bounded,
            quality,
        }
    }

    fn size(&self) -> (u32, u32) {
        (
            u32::from(self.pixmap.width()),
            u32::from(self.pixmap.height()),
        )
    }

    fn device_outline(&self) -> vello_cpu::kurbo::BezPath {
        let (w, h) = self.size();
        let r = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        bezpath_to_cpu(&(self.to_device * r.to_path(0.1)))
    }

    // Integer placement of the source, when the kernels can read it directly.
    fn pixel_placement(&self) -> Option<IntRect> {
        let (tx, ty) = integer_translation(&self.to_device, PIXEL_EPS)?;
        let (w, h) = self.size();
        Some(IntRect::from_xywh(tx, ty, w, h))
    }
}

#[derive(Debug)]
struct ClipPath {
    path: vello_cpu::kurbo::BezPath,
    fill: FillRule,
}

#[derive(Clone, Debug)]
struct DrawState {
    transform: Affine,
    paint: Paint,
    operator: Operator,
    fill_rule: FillRule,
    line: LineStyle,
    hairline: bool,
    clips: Vec<Arc<ClipPath>>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            paint: Paint::Solid(Rgba8::BLACK),
            operator: Operator::Over,
            fill_rule: FillRule::NonZero,
            line: LineStyle::default(),
            hairline: false,
            clips: Vec::new(),
        }
    }
}

enum Emit {
    Fill(vello_cpu::kurbo::BezPath),
    Stroke {
        path: vello_cpu::kurbo::BezPath,
        transform: Affine,
        style: vello_cpu::kurbo::Stroke,
    },
    Paint,
}

impl Emit {
    fn transform(&self) -> Affine {
        match self {
            Emit::Stroke { transform, .. } => *transform,
            Emit::Fill(_) | Emit::Paint => Affine::IDENTITY,
        }
    }

    fn draw(&self, ctx: &mut vello_cpu::RenderContext, w: u16, h: u16) {
        match self {
            Emit::Fill(path) => {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.fill_path(path);
            }
            Emit::Stroke {
                path,
                transform,
                style,
            } => {
                ctx.set_transform(affine_to_cpu(*transform));
                ctx.set_stroke(style.clone());
                ctx.stroke_path(path);
            }
            Emit::Paint => {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.fill_rect(&full_rect(w, h));
            }
        }
    }
}

struct GroupFrame {
    depth: usize,
    storage: (Option<Arc<vello_cpu::Pixmap>>, bool),
}

/// Drawing cursor over a mutably borrowed [`Surface`].
///
/// Dropping the context restores every saved state, abandons unfinished groups, writes pending
/// rasterization back to the surface and clears the surface's context flag.
pub struct DrawContext<'s> {
    surface: &'s mut Surface,
    raster: Option<vello_cpu::RenderContext>,
    base: Affine,
    state: DrawState,
    saved: Vec<DrawState>,
    // Device-space path under construction.
    path: BezPath,
    current: Option<Point>,
    subpath_start: Option<Point>,
    // Set while the path is a list of pixel-aligned device rectangles.
    path_rects: Option<SmallVec<[IntRect; 4]>>,
    groups: Vec<GroupFrame>,
}

impl<'s> DrawContext<'s> {
    pub(crate) fn new(surface: &'s mut Surface) -> Self {
        if surface.has_context() {
            tracing::warn!("surface already has a bound drawing context");
        }
        surface.set_has_context(true);
        surface.ensure_allocated();
        let base = surface.drawing_transform();
        Self {
            surface,
            raster: None,
            base,
            state: DrawState::default(),
            saved: Vec::new(),
            path: BezPath::new(),
            current: None,
            subpath_start: None,
            path_rects: Some(SmallVec::new()),
            groups: Vec::new(),
        }
    }

    /// The surface this context draws into.
    pub fn surface(&self) -> &Surface {
        self.surface
    }

    /// Logical rectangle covered by the target surface.
    pub fn target_logical_bounds(&self) -> Rect {
        self.surface.area()
    }

    // ---- state stack ----

    pub fn save(&mut self) {
        self.saved.push(self.state.clone());
    }

    /// Pops the innermost saved state. Unbalanced calls are ignored.
    pub fn restore(&mut self) {
        if self.saved.len() <= self.group_floor() {
            tracing::warn!("restore without matching save");
            return;
        }
        if let Some(s) = self.saved.pop() {
            self.state = s;
        }
    }

    /// Number of saved states.
    pub fn save_depth(&self) -> usize {
        self.saved.len()
    }

    /// Restores until at most `depth` states remain saved.
    pub fn restore_to(&mut self, depth: usize) {
        let depth = depth.max(self.group_floor());
        self.unwind(depth);
    }

    fn unwind(&mut self, depth: usize) {
        while self.saved.len() > depth {
            if let Some(s) = self.saved.pop() {
                self.state = s;
            }
        }
    }

    fn group_floor(&self) -> usize {
        self.groups.last().map_or(0, |g| g.depth + 1)
    }

    // ---- transforms ----

    /// Current user-to-logical transform.
    pub fn ctm(&self) -> Affine {
        self.state.transform
    }

    /// Current user-to-buffer-pixel transform.
    pub fn user_to_device(&self) -> Affine {
        self.base * self.state.transform
    }

    /// Prepends `m`: subsequent user coordinates pass through `m` first.
    pub fn transform(&mut self, m: Affine) {
        self.state.transform *= m;
    }

    pub fn set_transform(&mut self, m: Affine) {
        self.state.transform = m;
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform(Affine::translate((dx, dy)));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform(Affine::scale_non_uniform(sx, sy));
    }

    // ---- paint state ----

    pub fn set_source_rgba(&mut self, color: Rgba8) {
        self.state.paint = Paint::Solid(color);
    }

    /// Uses `src` as paint, placed at its logical area in the current user space.
    ///
    /// The source is transparent outside its area.
    pub fn set_source_surface(&mut self, src: &Surface) {
        let Some(pixmap) = src.shared_pixmap() else {
            self.state.paint = Paint::Solid(Rgba8::TRANSPARENT);
            return;
        };
        let to_device = self.user_to_device() * src.drawing_transform().inverse();
        self.state.paint = Paint::Image(ImagePaint::new(pixmap, to_device, Extend::Pad, true));
    }

    /// Uses a rendered pattern tile as paint, placed in the current user space.
    pub fn set_source_pattern(&mut self, pattern: &PatternPaint) {
        let to_device = self.user_to_device() * pattern.tile_to_user();
        let (extend, bounded) = match pattern.extend() {
            TileExtend::Repeat => (Extend::Repeat, false),
            TileExtend::None => (Extend::Pad, true),
        };
        self.state.paint = Paint::Image(ImagePaint::new(
            pattern.shared_pixmap(),
            to_device,
            extend,
            bounded,
        ));
    }

    /// A two-color checkerboard of `cell`-pixel squares anchored at the logical origin.
    pub fn set_source_checkerboard(&mut self, light: Rgba8, dark: Rgba8, cell: u32) {
        let cell = cell.clamp(1, u32::from(u16::MAX) / 2);
        let side = cell * 2;
        let Ok((w, h)) = pixmap_dims(side, side) else {
            return;
        };
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        let (l, d) = (premultiplied(light), premultiplied(dark));
        for (i, px) in pixmap.data_as_u8_slice_mut().chunks_exact_mut(4).enumerate() {
            let (x, y) = (i as u32 % side, i as u32 / side);
            let c = if (x / cell + y / cell) % 2 == 0 { l } else { d };
            px.copy_from_slice(&c);
        }
        let anchor = self.base * Point::ZERO;
        self.state.paint = Paint::Image(ImagePaint::new(
            Arc::new(pixmap),
            Affine::translate(anchor.round().to_vec2()),
            Extend::Repeat,
            false,
        ));
    }

    pub fn set_operator(&mut self, op: Operator) {
        self.state.operator = op;
    }

    pub fn operator(&self) -> Operator {
        self.state.operator
    }

    pub fn set_fill_rule(&mut self, rule: FillRule) {
        self.state.fill_rule = rule;
    }

    pub fn set_line_style(&mut self, style: LineStyle) {
        self.state.line = style;
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.state.line.width = width;
    }

    /// Strokes become one buffer pixel wide regardless of the transform.
    pub fn set_hairline(&mut self, on: bool) {
        self.state.hairline = on;
    }

    // ---- path construction ----

    pub fn new_path(&mut self) {
        self.path = BezPath::new();
        self.current = None;
        self.subpath_start = None;
        self.path_rects = Some(SmallVec::new());
    }

    pub fn has_path(&self) -> bool {
        !self.path.elements().is_empty()
    }

    pub fn move_to(&mut self, p: impl Into<Point>) {
        let d = self.user_to_device() * p.into();
        self.path.move_to(d);
        self.current = Some(d);
        self.subpath_start = Some(d);
        self.path_rects = None;
    }

    pub fn line_to(&mut self, p: impl Into<Point>) {
        let d = self.user_to_device() * p.into();
        self.device_line_to(d);
        self.path_rects = None;
    }

    pub fn quad_to(&mut self, p1: impl Into<Point>, p2: impl Into<Point>) {
        let m = self.user_to_device();
        let (d1, d2) = (m * p1.into(), m * p2.into());
        self.ensure_current(d1);
        self.path.quad_to(d1, d2);
        self.current = Some(d2);
        self.path_rects = None;
    }

    pub fn curve_to(&mut self, p1: impl Into<Point>, p2: impl Into<Point>, p3: impl Into<Point>) {
        let m = self.user_to_device();
        let (d1, d2, d3) = (m * p1.into(), m * p2.into(), m * p3.into());
        self.ensure_current(d1);
        self.path.curve_to(d1, d2, d3);
        self.current = Some(d3);
        self.path_rects = None;
    }

    /// Circular arc around `center` from angle `a0` to `a1` (radians, increasing).
    ///
    /// Connected to the current point by a straight line, if there is one.
    pub fn arc(&mut self, center: impl Into<Point>, radius: f64, a0: f64, a1: f64) {
        let center = center.into();
        let mut sweep = a1 - a0;
        if sweep < 0.0 {
            sweep = sweep.rem_euclid(std::f64::consts::TAU);
        }
        let arc = kurbo::Arc::new(center, (radius, radius), a0, sweep, 0.0);
        let m = self.user_to_device();
        for el in arc.path_elements(ARC_TOLERANCE) {
            match el {
                PathEl::MoveTo(p) => {
                    let d = m * p;
                    if self.current.is_some() {
                        self.device_line_to(d);
                    } else {
                        self.path.move_to(d);
                        self.current = Some(d);
                        self.subpath_start = Some(d);
                    }
                }
                PathEl::LineTo(p) => self.device_line_to(m * p),
                PathEl::QuadTo(p1, p2) => {
                    self.path.quad_to(m * p1, m * p2);
                    self.current = Some(m * p2);
                }
                PathEl::CurveTo(p1, p2, p3) => {
                    self.path.curve_to(m * p1, m * p2, m * p3);
                    self.current = Some(m * p3);
                }
                PathEl::ClosePath => {}
            }
        }
        self.path_rects = None;
    }

    /// Adds a closed rectangle.
    pub fn rectangle(&mut self, r: Rect) {
        let m = self.user_to_device();
        let rects = self.path_rects.take();
        let corners = [
            Point::new(r.x0, r.y0),
            Point::new(r.x1, r.y0),
            Point::new(r.x1, r.y1),
            Point::new(r.x0, r.y1),
        ];
        self.path.move_to(m * corners[0]);
        for c in &corners[1..] {
            self.path.line_to(m * *c);
        }
        self.path.close_path();
        self.current = Some(m * corners[0]);
        self.subpath_start = self.current;
        self.path_rects = rects.and_then(|mut list| {
            let d = device_int_rect(&m, r)?;
            if !d.is_empty() {
                list.push(d);
            }
            Some(list)
        });
    }

    pub fn rectangle_int(&mut self, r: IntRect) {
        self.rectangle(r.to_rect());
    }

    pub fn close_path(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.path.close_path();
        self.current = self.subpath_start;
        self.path_rects = None;
    }

    /// Appends a user-space path.
    pub fn path(&mut self, path: &BezPath) {
        for el in path.elements() {
            match *el {
                PathEl::MoveTo(p) => self.move_to(p),
                PathEl::LineTo(p) => self.line_to(p),
                PathEl::QuadTo(p1, p2) => self.quad_to(p1, p2),
                PathEl::CurveTo(p1, p2, p3) => self.curve_to(p1, p2, p3),
                PathEl::ClosePath => self.close_path(),
            }
        }
    }

    fn ensure_current(&mut self, d: Point) {
        if self.current.is_none() {
            self.path.move_to(d);
            self.current = Some(d);
            self.subpath_start = Some(d);
        }
    }

    fn device_line_to(&mut self, d: Point) {
        if self.current.is_none() {
            self.path.move_to(d);
            self.subpath_start = Some(d);
        } else {
            self.path.line_to(d);
        }
        self.current = Some(d);
    }

    // ---- painting ----

    pub fn fill(&mut self) {
        self.fill_preserve();
        self.new_path();
    }

    pub fn fill_preserve(&mut self) {
        self.fill_with_alpha(1.0);
    }

    fn fill_with_alpha(&mut self, alpha: f32) {
        if !self.has_path() {
            return;
        }
        if let Some(rects) = self.kernel_rects() {
            self.composite_rects(&rects, unit_to_u8(alpha));
            return;
        }
        let path = bezpath_to_cpu(&self.path);
        self.draw(Emit::Fill(path), alpha);
    }

    pub fn stroke(&mut self) {
        self.stroke_preserve();
        self.new_path();
    }

    pub fn stroke_preserve(&mut self) {
        if !self.has_path() {
            return;
        }
        if self.state.hairline {
            let emit = Emit::Stroke {
                path: bezpath_to_cpu(&self.path),
                transform: Affine::IDENTITY,
                style: vello_cpu::kurbo::Stroke::new(1.0),
            };
            self.draw(emit, 1.0);
            return;
        }
        let ctm = self.user_to_device();
        if self.state.line.width <= 0.0 || is_singular(&ctm, 1e-12) {
            return;
        }
        let user = ctm.inverse() * self.path.clone();
        let emit = Emit::Stroke {
            path: bezpath_to_cpu(&user),
            transform: ctm,
            style: self.state.line.to_cpu(),
        };
        self.draw(emit, 1.0);
    }

    /// Intersects the clip with the current path, then clears the path.
    pub fn clip(&mut self) {
        self.clip_preserve();
        self.new_path();
    }

    pub fn clip_preserve(&mut self) {
        self.state.clips.push(Arc::new(ClipPath {
            path: bezpath_to_cpu(&self.path),
            fill: self.state.fill_rule,
        }));
    }

    /// Paints the source over the whole clip region with uniform `alpha`.
    pub fn paint(&mut self, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if unit_to_u8(alpha) == 0 && self.state.operator != Operator::Source {
            return;
        }
        let full = IntRect::from_xywh(
            0,
            0,
            self.surface.pixel_width(),
            self.surface.pixel_height(),
        );
        if self.state.clips.is_empty() && self.kernel_paint_ok(&[full]) {
            self.composite_rects(&[full], unit_to_u8(alpha));
            return;
        }
        self.draw(Emit::Paint, alpha);
    }

    /// Composites `src` at its logical area with uniform `opacity`.
    pub fn blend_surface(&mut self, src: &Surface, opacity: f32) {
        let depth = self.save_depth();
        self.save();
        self.set_source_surface(src);
        self.new_path();
        self.rectangle(src.area());
        self.fill_with_alpha(opacity.clamp(0.0, 1.0));
        self.new_path();
        self.restore_to(depth);
    }

    // ---- groups ----

    /// Redirects drawing into a fresh transparent layer until [`Self::pop_group_to_source`].
    ///
    /// Implies a [`Self::save`].
    pub fn push_group(&mut self) {
        self.flush();
        let depth = self.saved.len();
        self.save();
        let storage = self.surface.replace_storage(None, true);
        self.surface.ensure_allocated();
        self.groups.push(GroupFrame { depth, storage });
    }

    /// Ends the innermost group, restores the state saved by `push_group` and makes the group's
    /// pixels the current source.
    pub fn pop_group_to_source(&mut self) {
        let Some(frame) = self.groups.pop() else {
            tracing::warn!("pop_group_to_source without push_group");
            return;
        };
        self.flush();
        self.unwind(frame.depth);
        let (group, _) = self.surface.replace_storage(frame.storage.0, frame.storage.1);
        self.state.paint = match group {
            Some(p) => Paint::Image(ImagePaint::new(p, Affine::IDENTITY, Extend::Pad, true)),
            None => Paint::Solid(Rgba8::TRANSPARENT),
        };
    }

    // ---- rasterization ----

    /// Writes pending rasterized content back to the surface.
    pub fn flush(&mut self) {
        let Some(mut ctx) = self.raster.take() else {
            return;
        };
        let Ok((w, h)) = pixmap_dims(self.surface.pixel_width(), self.surface.pixel_height())
        else {
            return;
        };
        ctx.flush();
        let mut out = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut out);
        drop(ctx);
        self.surface.replace_storage(Some(Arc::new(out)), false);
    }

    fn dims(&self) -> Option<(u16, u16)> {
        let (w, h) =
            pixmap_dims(self.surface.pixel_width(), self.surface.pixel_height()).ok()?;
        (w > 0 && h > 0).then_some((w, h))
    }

    fn raster(&mut self) -> Option<&mut vello_cpu::RenderContext> {
        if self.raster.is_none() {
            let (w, h) = self.dims()?;
            let mut ctx = vello_cpu::RenderContext::new(w, h);
            if !self.surface.is_pristine()
                && let Some(p) = self.surface.shared_pixmap()
            {
                ctx.set_paint(image_paint(p, Extend::Pad, ImageQuality::Low));
                ctx.fill_rect(&full_rect(w, h));
            }
            self.raster = Some(ctx);
        }
        self.raster.as_mut()
    }

    // A one-off transparent canvas the size of the surface.
    fn offscreen(
        &self,
        draw: impl FnOnce(&mut vello_cpu::RenderContext, u16, u16),
    ) -> Option<vello_cpu::Pixmap> {
        let (w, h) = self.dims()?;
        let mut ctx = vello_cpu::RenderContext::new(w, h);
        draw(&mut ctx, w, h);
        ctx.flush();
        let mut out = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut out);
        Some(out)
    }

    fn clip_mask(&self) -> Option<vello_cpu::Pixmap> {
        let clips = &self.state.clips;
        self.offscreen(|ctx, w, h| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            for c in clips {
                ctx.set_fill_rule(c.fill.to_cpu());
                ctx.push_clip_layer(&c.path);
            }
            ctx.set_paint(vello_cpu::peniko::Color::BLACK);
            ctx.fill_rect(&full_rect(w, h));
            for _ in clips {
                ctx.pop_layer();
            }
        })
    }

    fn draw(&mut self, emit: Emit, alpha: f32) {
        if self.state.clips.is_empty() {
            self.draw_unclipped(&emit, alpha);
        } else {
            self.draw_clipped(&emit, alpha);
        }
    }

    fn draw_clipped(&mut self, emit: &Emit, alpha: f32) {
        let Some(mask) = self.clip_mask() else {
            return;
        };
        self.flush();
        // Copy-on-write keeps this snapshot intact while the surface is drawn on.
        let before = self.surface.shared_pixmap();
        self.draw_unclipped(emit, alpha);
        self.flush();
        let (w, h) = (self.surface.pixel_width(), self.surface.pixel_height());
        let Some(mask) = PixelsRef::packed(mask.data_as_u8_slice(), w, h, PixelFormat::Rgba8Premul)
            .ok()
            .and_then(MaskRef::alpha_of)
        else {
            return;
        };
        let Some(mut dst) = self.surface.pixels_mut() else {
            return;
        };
        match before
            .as_deref()
            .and_then(|b| PixelsRef::packed(b.data_as_u8_slice(), w, h, PixelFormat::Rgba8Premul).ok())
        {
            Some(from) => compose::lerp_masked(&mut dst, &from, &mask),
            None => compose::scale_alpha(&mut dst, &Coverage::Mask(mask)),
        }
    }

    fn draw_unclipped(&mut self, emit: &Emit, alpha: f32) {
        let op = self.state.operator;
        if matches!(op, Operator::Source | Operator::Clear) {
            self.erase(emit);
            if op == Operator::Clear {
                return;
            }
        }
        let paint = self.state.paint.clone();
        let fill = self.state.fill_rule.to_cpu();
        let Some((w, h)) = self.dims() else {
            return;
        };
        let Some(ctx) = self.raster() else {
            return;
        };
        ctx.set_fill_rule(fill);
        let mut layers = 0;
        if let Some(mode) = op.blend_mode() {
            ctx.push_blend_layer(mode);
            layers += 1;
        }
        if let Paint::Image(img) = &paint
            && img.bounded
        {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_fill_rule(vello_cpu::peniko::Fill::NonZero);
            ctx.push_clip_layer(&img.device_outline());
            ctx.set_fill_rule(fill);
            layers += 1;
        }
        if alpha < 1.0 {
            ctx.push_opacity_layer(alpha);
            layers += 1;
        }
        match &paint {
            Paint::Solid(c) => {
                ctx.set_paint(c.to_cpu_color());
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            }
            Paint::Image(img) => {
                ctx.set_paint(image_paint(Arc::clone(&img.pixmap), img.extend, img.quality));
                // The rasterizer applies the geometry transform after the paint transform.
                let geometry = emit.transform();
                ctx.set_paint_transform(affine_to_cpu(geometry.inverse() * img.to_device));
            }
        }
        emit.draw(ctx, w, h);
        for _ in 0..layers {
            ctx.pop_layer();
        }
    }

    // Removes destination coverage under the shape (Porter-Duff "dest-out" with an opaque shape).
    fn erase(&mut self, emit: &Emit) {
        let fill = self.state.fill_rule.to_cpu();
        let Some(cov) = self.offscreen(|ctx, w, h| {
            ctx.set_fill_rule(fill);
            ctx.set_paint(vello_cpu::peniko::Color::BLACK);
            emit.draw(ctx, w, h);
        }) else {
            return;
        };
        self.flush();
        let keep: Vec<u8> = cov
            .data_as_u8_slice()
            .chunks_exact(4)
            .map(|px| 255 - px[3])
            .collect();
        let w = self.surface.pixel_width();
        let h = self.surface.pixel_height();
        let Ok(mask) = MaskRef::new(&keep, w, h, w as usize) else {
            return;
        };
        if let Some(mut dst) = self.surface.pixels_mut() {
            compose::scale_alpha(&mut dst, &Coverage::Mask(mask));
        }
    }

    // Pixel-aligned device rectangles the kernels can fill exactly, if any.
    fn kernel_rects(&self) -> Option<SmallVec<[IntRect; 4]>> {
        if !self.state.clips.is_empty() {
            return None;
        }
        let rects = self.path_rects.as_ref()?;
        if rects.is_empty() {
            return None;
        }
        for (i, a) in rects.iter().enumerate() {
            if rects[i + 1..].iter().any(|b| a.intersects(b)) {
                return None;
            }
        }
        self.kernel_paint_ok(rects).then(|| rects.clone())
    }

    fn kernel_paint_ok(&self, rects: &[IntRect]) -> bool {
        if !matches!(
            self.state.operator,
            Operator::Over | Operator::Source | Operator::Clear
        ) {
            return false;
        }
        match &self.state.paint {
            Paint::Solid(_) => true,
            Paint::Image(img) => match img.pixel_placement() {
                Some(_) if img.bounded => true,
                Some(placed) => rects.iter().all(|r| placed.contains_rect(r)),
                None => false,
            },
        }
    }

    fn composite_rects(&mut self, rects: &[IntRect], alpha: u8) {
        self.flush();
        let op = self.state.operator;
        let paint = self.state.paint.clone();
        let bounds = IntRect::from_xywh(
            0,
            0,
            self.surface.pixel_width(),
            self.surface.pixel_height(),
        );
        let Some(mut dst) = self.surface.pixels_mut() else {
            return;
        };
        for r in rects {
            let Some(r) = r.intersect(&bounds) else {
                continue;
            };
            if op != Operator::Over
                && let Some(mut v) = dst.view_mut(r)
            {
                compose::clear(&mut v);
            }
            if op == Operator::Clear {
                continue;
            }
            match &paint {
                Paint::Solid(c) => {
                    if let Some(mut v) = dst.view_mut(r) {
                        compose::composite(&mut v, &Source::Color(*c), &Coverage::Opacity(alpha));
                    }
                }
                Paint::Image(img) => {
                    let Some(placed) = img.pixel_placement() else {
                        continue;
                    };
                    let Some(r) = r.intersect(&placed) else {
                        continue;
                    };
                    let (sw, sh) = img.size();
                    let Ok(src) = PixelsRef::packed(
                        img.pixmap.data_as_u8_slice(),
                        sw,
                        sh,
                        PixelFormat::Rgba8Premul,
                    ) else {
                        continue;
                    };
                    let (dx, dy) = placed.min();
                    let (Some(s), Some(mut v)) = (src.view(r.translate(-dx, -dy)), dst.view_mut(r))
                    else {
                        continue;
                    };
                    compose::composite(&mut v, &Source::Pixels(s), &Coverage::Opacity(alpha));
                }
            }
        }
    }
}

impl Drop for DrawContext<'_> {
    fn drop(&mut self) {
        while let Some(frame) = self.groups.pop() {
            tracing::warn!("drawing context dropped with an unfinished group");
            self.raster = None;
            self.unwind(frame.depth);
            self.surface.replace_storage(frame.storage.0, frame.storage.1);
        }
        self.unwind(0);
        self.flush();
        self.surface.set_has_context(false);
    }
}

fn full_rect(w: u16, h: u16) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(w), f64::from(h))
}

fn premultiplied(c: Rgba8) -> [u8; 4] {
    use crate::foundation::math::premultiply;
    [
        premultiply(c.r, c.a),
        premultiply(c.g, c.a),
        premultiply(c.b, c.a),
        c.a,
    ]
}

// `r` in device pixels, if `m` maps it onto whole pixels without rotation or skew.
fn device_int_rect(m: &Affine, r: Rect) -> Option<IntRect> {
    let [_, b, c, _, _, _] = m.as_coeffs();
    if b.abs() > PIXEL_EPS || c.abs() > PIXEL_EPS {
        return None;
    }
    let d = m.transform_rect_bbox(r);
    let snap = |v: f64| {
        let n = v.round();
        ((v - n).abs() <= PIXEL_EPS && n.abs() < f64::from(i32::MAX)).then_some(n as i32)
    };
    Some(IntRect::new(
        snap(d.x0)?,
        snap(d.y0)?,
        snap(d.x1)?,
        snap(d.y1)?,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/context/context.rs"]
mod tests;
