//! Declarative item descriptions and their projection into a [`Drawing`].
//!
//! Descriptions arrive with style and transforms already resolved. Paths are SVG path data.

use crate::context::{FillRule, LineStyle};
use crate::foundation::core::{Affine, BezPath, Rect, Rgba8};
use crate::foundation::error::{StrataError, StrataResult};
use crate::scene::drawing::Drawing;
use crate::scene::pattern::{Overflow, PatternUnits};
use crate::scene::shape::{ShapeData, ShapePaint, ShapeStroke};
use crate::scene::{ItemId, ViewKey};
use kurbo::Shape as _;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDesc {
    #[serde(flatten)]
    pub kind: ItemDescKind,
    #[serde(default)]
    pub transform: Option<Affine>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub sensitive: bool,
    #[serde(default)]
    pub clip: Option<Box<ItemDesc>>,
    #[serde(default)]
    pub mask: Option<Box<ItemDesc>>,
    /// Always cache this item, regardless of automatic selection.
    #[serde(default)]
    pub cached: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemDescKind {
    Group {
        #[serde(default)]
        children: Vec<ItemDesc>,
        #[serde(default)]
        child_transform: Option<Affine>,
        #[serde(default = "default_true")]
        pick_children: bool,
    },
    Shape(ShapeDesc),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeDesc {
    /// SVG path data.
    pub d: String,
    #[serde(default)]
    pub fill: Option<PaintDesc>,
    #[serde(default)]
    pub stroke: Option<StrokeDesc>,
    #[serde(default)]
    pub fill_rule: FillRule,
    #[serde(default)]
    pub clip_rule: FillRule,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeDesc {
    pub paint: PaintDesc,
    #[serde(default)]
    pub style: LineStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintDesc {
    Color(Rgba8),
    Pattern {
        pattern: Box<PatternDesc>,
        #[serde(default = "default_opacity")]
        opacity: f32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternDesc {
    pub tile: Rect,
    #[serde(default)]
    pub units: PatternUnits,
    #[serde(default)]
    pub pattern_to_user: Option<Affine>,
    #[serde(default)]
    pub child_transform: Option<Affine>,
    #[serde(default)]
    pub overflow: Option<Overflow>,
    #[serde(default)]
    pub children: Vec<ItemDesc>,
    #[serde(default)]
    pub debug: bool,
}

impl ItemDesc {
    fn with_kind(kind: ItemDescKind) -> Self {
        Self {
            kind,
            transform: None,
            opacity: 1.0,
            visible: true,
            sensitive: true,
            clip: None,
            mask: None,
            cached: false,
        }
    }

    pub fn group(children: Vec<ItemDesc>) -> Self {
        Self::with_kind(ItemDescKind::Group {
            children,
            child_transform: None,
            pick_children: true,
        })
    }

    pub fn shape(shape: ShapeDesc) -> Self {
        Self::with_kind(ItemDescKind::Shape(shape))
    }

    pub fn with_transform(mut self, t: Affine) -> Self {
        self.transform = Some(t);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_clip(mut self, clip: ItemDesc) -> Self {
        self.clip = Some(Box::new(clip));
        self
    }

    pub fn with_mask(mut self, mask: ItemDesc) -> Self {
        self.mask = Some(Box::new(mask));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Checks the description as [`Drawing::show`] would with no `extents` override.
    pub fn validate(&self) -> StrataResult<()> {
        self.check(None)
    }

    fn check(&self, extents: Option<Rect>) -> StrataResult<()> {
        if !(self.opacity.is_finite() && (0.0..=1.0).contains(&self.opacity)) {
            return Err(StrataError::validation("opacity must be in [0, 1]"));
        }
        check_affine(self.transform, "transform")?;
        match &self.kind {
            ItemDescKind::Group {
                children,
                child_transform,
                ..
            } => {
                check_affine(*child_transform, "child_transform")?;
                children.iter().try_for_each(|c| c.check(extents))?;
            }
            ItemDescKind::Shape(s) => s.check(extents)?,
        }
        for owned in self.clip.iter().chain(self.mask.iter()) {
            owned.check(extents)?;
        }
        Ok(())
    }
}

impl ShapeDesc {
    pub fn new(d: impl Into<String>) -> Self {
        Self {
            d: d.into(),
            fill: None,
            stroke: None,
            fill_rule: FillRule::NonZero,
            clip_rule: FillRule::NonZero,
        }
    }

    pub fn from_path(path: &BezPath) -> Self {
        Self::new(path.to_svg())
    }

    pub fn rect(r: Rect) -> Self {
        Self::from_path(&r.to_path(0.1))
    }

    pub fn with_fill(mut self, paint: PaintDesc) -> Self {
        self.fill = Some(paint);
        self
    }

    pub fn with_stroke(mut self, paint: PaintDesc, style: LineStyle) -> Self {
        self.stroke = Some(StrokeDesc { paint, style });
        self
    }

    pub fn path(&self) -> StrataResult<BezPath> {
        BezPath::from_svg(&self.d)
            .map_err(|e| StrataError::validation(format!("invalid path data: {e}")))
    }

    /// The extent object-bounding-box pattern tiles resolve against.
    fn paint_extent(path: &BezPath, extents: Option<Rect>) -> Option<Rect> {
        extents.or_else(|| {
            let b = path.bounding_box();
            (b.width() > 0.0 && b.height() > 0.0).then_some(b)
        })
    }

    fn check(&self, extents: Option<Rect>) -> StrataResult<()> {
        let path = self.path()?;
        let bounds = Self::paint_extent(&path, extents);
        if let Some(s) = &self.stroke {
            if !(s.style.width.is_finite() && s.style.width >= 0.0) {
                return Err(StrataError::validation("stroke width must be finite and >= 0"));
            }
            s.paint.check(bounds)?;
        }
        if let Some(f) = &self.fill {
            f.check(bounds)?;
        }
        Ok(())
    }
}

impl PaintDesc {
    fn check(&self, bounds: Option<Rect>) -> StrataResult<()> {
        let Self::Pattern { pattern, opacity } = self else {
            return Ok(());
        };
        if pattern.units.resolve(pattern.tile, bounds).is_none() {
            return Err(StrataError::validation(
                "object bounding box pattern on a shape without extent",
            ));
        }
        if !(opacity.is_finite() && (0.0..=1.0).contains(opacity)) {
            return Err(StrataError::validation("pattern opacity must be in [0, 1]"));
        }
        let t = pattern.tile;
        if ![t.x0, t.y0, t.x1, t.y1].iter().all(|v| v.is_finite()) {
            return Err(StrataError::validation("pattern tile must be finite"));
        }
        check_affine(pattern.pattern_to_user, "pattern_to_user")?;
        check_affine(pattern.child_transform, "pattern child_transform")?;
        if let Some(o) = &pattern.overflow {
            o.validate()?;
        }
        pattern.children.iter().try_for_each(|c| c.check(None))
    }
}

fn check_affine(t: Option<Affine>, what: &str) -> StrataResult<()> {
    match t {
        Some(t) if !t.as_coeffs().iter().all(|c| c.is_finite()) => Err(StrataError::validation(
            format!("{what} must have finite coefficients"),
        )),
        _ => Ok(()),
    }
}

impl Drawing {
    /// Builds an item tree for `desc` tagged with `key` and returns its (unattached) top item.
    ///
    /// `extents` overrides the bounding box that object-bounding-box pattern tiles resolve
    /// against; by default each shape uses its own path bounds.
    #[tracing::instrument(level = "debug", skip(self, desc))]
    pub fn show(
        &mut self,
        key: ViewKey,
        desc: &ItemDesc,
        extents: Option<Rect>,
    ) -> StrataResult<ItemId> {
        desc.check(extents)?;
        let before: HashSet<ItemId> = self.live_ids().into_iter().collect();
        let built = self
            .build(desc, extents)
            .and_then(|id| self.set_key(id, Some(key)).map(|()| id));
        if built.is_err() {
            self.discard_new_items(&before);
        }
        built
    }

    /// Destroys the parentless items created since `before` was taken, with their subtrees.
    pub(crate) fn discard_new_items(&mut self, before: &HashSet<ItemId>) {
        let tops: Vec<ItemId> = self
            .live_ids()
            .into_iter()
            .filter(|id| !before.contains(id) && self.parent(*id).is_none())
            .collect();
        tracing::debug!(count = tops.len(), "discarding partially built items");
        for id in tops {
            let _ = self.destroy(id);
        }
    }

    /// Destroys every tree shown under `key`. Returns how many were removed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn hide(&mut self, key: ViewKey) -> usize {
        let shown: Vec<ItemId> = self
            .live_ids()
            .into_iter()
            .filter(|id| self.key(*id) == Some(key))
            .collect();
        let mut removed = 0;
        for id in shown {
            if self.destroy(id).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn build(&mut self, desc: &ItemDesc, extents: Option<Rect>) -> StrataResult<ItemId> {
        let id = match &desc.kind {
            ItemDescKind::Group {
                children,
                child_transform,
                pick_children,
            } => {
                let g = self.new_group();
                for c in children {
                    let child = self.build(c, extents)?;
                    self.append_child(g, child)?;
                }
                self.set_child_transform(g, *child_transform)?;
                self.set_pick_children(g, *pick_children)?;
                g
            }
            ItemDescKind::Shape(s) => {
                let path = s.path()?;
                let bounds = ShapeDesc::paint_extent(&path, extents);
                let fill = match &s.fill {
                    Some(p) => Some(self.build_paint(p, bounds)?),
                    None => None,
                };
                let stroke = match &s.stroke {
                    Some(st) => Some(ShapeStroke {
                        paint: self.build_paint(&st.paint, bounds)?,
                        style: st.style,
                    }),
                    None => None,
                };
                self.new_shape(ShapeData {
                    path,
                    fill,
                    stroke,
                    fill_rule: s.fill_rule,
                    clip_rule: s.clip_rule,
                })?
            }
        };
        self.set_transform(id, desc.transform)?;
        self.set_opacity(id, desc.opacity)?;
        self.set_visible(id, desc.visible)?;
        self.set_sensitive(id, desc.sensitive)?;
        if let Some(c) = &desc.clip {
            let clip = self.build(c, extents)?;
            self.set_clip(id, Some(clip))?;
        }
        if let Some(m) = &desc.mask {
            let mask = self.build(m, extents)?;
            self.set_mask(id, Some(mask))?;
        }
        if desc.cached {
            self.set_cached(id, true)?;
        }
        Ok(id)
    }

    fn build_paint(&mut self, paint: &PaintDesc, bounds: Option<Rect>) -> StrataResult<ShapePaint> {
        let (pattern, opacity) = match paint {
            PaintDesc::Color(c) => return Ok(ShapePaint::Color(*c)),
            PaintDesc::Pattern { pattern, opacity } => (pattern, *opacity),
        };
        let tile = pattern.units.resolve(pattern.tile, bounds).ok_or_else(|| {
            StrataError::validation("object bounding box pattern on a shape without extent")
        })?;
        let p = self.new_pattern(tile);
        for c in &pattern.children {
            let child = self.build(c, None)?;
            self.append_child(p, child)?;
        }
        self.set_child_transform(p, pattern.child_transform)?;
        self.set_pattern_transform(p, pattern.pattern_to_user)?;
        self.set_overflow(p, pattern.overflow)?;
        self.set_pattern_debug(p, pattern.debug)?;
        Ok(ShapePaint::Pattern {
            pattern: p,
            opacity,
        })
    }
}
