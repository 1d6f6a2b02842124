use crate::context::{PatternPaint, TileExtend};
use crate::foundation::core::{Affine, IntRect, Rect, Rgba8, Vec2};
use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::expansion;
use crate::scene::drawing::Drawing;
use crate::scene::{ItemId, RenderFlags, StateFlags};
use crate::surface::Surface;
use serde::{Deserialize, Serialize};

// Tiles painted in debug mode are filled with this first so their extent is obvious.
const DEBUG_TILE_COLOR: Rgba8 = Rgba8::opaque(204, 0, 204);

/// Coordinate system a pattern tile rectangle is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternUnits {
    /// The tile is given in the user space of the painted shape.
    #[default]
    UserSpaceOnUse,
    /// The tile is given as fractions of the painted shape's bounding box.
    ObjectBoundingBox,
}

impl PatternUnits {
    /// The tile in user space, given the painted shape's user-space bounds.
    pub fn resolve(self, tile: Rect, extents: Option<Rect>) -> Option<Rect> {
        match self {
            Self::UserSpaceOnUse => Some(tile),
            Self::ObjectBoundingBox => {
                let e = extents?;
                Some(Rect::new(
                    e.x0 + tile.x0 * e.width(),
                    e.y0 + tile.y0 * e.height(),
                    e.x0 + tile.x1 * e.width(),
                    e.y0 + tile.y1 * e.height(),
                ))
            }
        }
    }
}

/// Repeated rendering of a pattern's children inside one tile (hatches).
///
/// The children are drawn `steps` times: first under `initial`, then with `step` composed on
/// after each pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overflow {
    pub initial: Affine,
    pub steps: u32,
    pub step: Affine,
}

impl Overflow {
    pub fn new(initial: Affine, steps: u32, step: Affine) -> Self {
        Self {
            initial,
            steps: steps.max(1),
            step,
        }
    }

    /// Rejects zero steps and non-finite transforms.
    pub fn validate(&self) -> StrataResult<()> {
        if self.steps == 0 {
            return Err(StrataError::validation("overflow steps must be >= 1"));
        }
        let finite = |t: &Affine| t.as_coeffs().iter().all(|c| c.is_finite());
        if !finite(&self.initial) || !finite(&self.step) {
            return Err(StrataError::validation(
                "overflow transforms must have finite coefficients",
            ));
        }
        Ok(())
    }

    /// `steps` copies of the content spaced `pitch` apart along x.
    pub fn hatch(pitch: f64, steps: u32) -> Self {
        Self::new(
            Affine::IDENTITY,
            steps,
            Affine::translate(Vec2::new(pitch, 0.0)),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PatternData {
    pub(crate) tile: Option<Rect>,
    pub(crate) pattern_to_user: Option<Affine>,
    pub(crate) overflow: Option<Overflow>,
    pub(crate) debug: bool,
    /// Tile pixel size chosen by the last update.
    pub(crate) resolution: Option<(u32, u32)>,
}

impl PatternData {
    pub(crate) fn usable_tile(&self) -> Option<Rect> {
        self.tile
            .filter(|t| t.width().is_finite() && t.height().is_finite())
            .filter(|t| t.width() > 0.0 && t.height() > 0.0)
    }

    /// Tile resolution for a pattern painted under `ctm`.
    pub(crate) fn resolution_for(
        &self,
        tile: Rect,
        ctm: Affine,
        child_transform: Option<Affine>,
        oversampling: f64,
        max_scale: f64,
    ) -> (u32, u32) {
        let mut scale = expansion(&ctm)
            * self.pattern_to_user.map_or(1.0, |t| expansion(&t))
            * child_transform.map_or(1.0, |t| expansion(&t))
            * oversampling;
        if !scale.is_finite() || scale > max_scale {
            scale = max_scale;
        }
        let px = |v: f64| {
            let p = (v * scale * oversampling).ceil();
            if p.is_finite() {
                p.clamp(1.0, f64::from(Surface::MAX_DIMENSION)) as u32
            } else {
                1
            }
        };
        (px(tile.width()), px(tile.height()))
    }
}

/// Maps tile coordinates to tile pixels.
fn tile_to_pixels(tile: Rect, (w, h): (u32, u32)) -> Affine {
    Affine::scale_non_uniform(f64::from(w) / tile.width(), f64::from(h) / tile.height())
        * Affine::translate(-tile.origin().to_vec2())
}

impl Drawing {
    /// Chooses the tile resolution and updates the pattern's children in tile pixel space.
    pub(super) fn update_pattern(
        &mut self,
        id: ItemId,
        ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> StateFlags {
        let (oversampling, max_scale) = (
            self.opts.pattern.oversampling,
            self.opts.pattern.max_scale,
        );
        let Some(item) = self.get_mut(id) else {
            return StateFlags::empty();
        };
        let child_transform = item.kind.group().and_then(|g| g.child_transform);
        let crate::scene::item::ItemKind::Pattern(_, data) = &mut item.kind else {
            return StateFlags::empty();
        };
        let Some(tile) = data.usable_tile() else {
            data.resolution = None;
            return StateFlags::empty();
        };
        let res = data.resolution_for(tile, ctm, child_transform, oversampling, max_scale);
        data.resolution = Some(res);
        self.update_group(id, IntRect::infinite(), tile_to_pixels(tile, res), flags, reset)
    }

    /// Renders one tile of pattern `id` and returns it as paint.
    ///
    /// Returns `None` when the pattern is effectively invisible, has no usable tile or has not
    /// been updated yet.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn render_pattern(&mut self, id: ItemId, opacity: f32) -> Option<PatternPaint> {
        let popts = self.opts.pattern;
        if !(opacity >= popts.invisible_epsilon) {
            return None;
        }
        let needs_opacity = 1.0 - opacity >= popts.opaque_epsilon;
        let data = self.get(id)?.kind.pattern()?;
        let tile = data.usable_tile()?;
        let res = data.resolution?;
        let (overflow, debug, pattern_to_user) = (data.overflow, data.debug, data.pattern_to_user);

        let mut surface = match Surface::from_logical(tile, res.0, res.1) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "pattern tile surface rejected");
                return None;
            }
        };
        let dt = surface.drawing_transform();
        let one_tile = IntRect::from_xywh(0, 0, res.0, res.1);
        {
            let mut dc = surface.context();
            dc.transform(dt.inverse());
            if needs_opacity {
                dc.push_group();
            }
            if debug {
                dc.set_source_rgba(DEBUG_TILE_COLOR);
                dc.paint(1.0);
            }
            match overflow {
                None => {
                    self.render_node(id, &mut dc, one_tile, RenderFlags::BYPASS_CACHE, None);
                }
                Some(o) => {
                    dc.transform(dt * o.initial * dt.inverse());
                    for _ in 0..o.steps {
                        self.render_node(id, &mut dc, one_tile, RenderFlags::BYPASS_CACHE, None);
                        dc.transform(dt * o.step * dt.inverse());
                    }
                }
            }
            if needs_opacity {
                dc.pop_group_to_source();
                dc.paint(opacity);
            }
        }

        let tile_to_user = pattern_to_user.unwrap_or(Affine::IDENTITY) * dt.inverse();
        let extend = if debug {
            TileExtend::None
        } else {
            TileExtend::Repeat
        };
        PatternPaint::from_surface(surface, tile_to_user, extend)
    }
}
