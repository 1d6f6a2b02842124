use crate::context::{FillRule, LineJoin, LineStyle};
use crate::foundation::core::{Affine, BezPath, IntRect, Point, Rect, Rgba8};
use crate::foundation::math::expansion;
use crate::scene::ItemId;
use smallvec::SmallVec;
use kurbo::{ParamCurveNearest, PathEl, Shape as _};

const NEAREST_ACCURACY: f64 = 1e-3;

/// Paint for a shape's fill or stroke.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapePaint {
    Color(Rgba8),
    /// A pattern item owned by the shape, painted with the given opacity.
    Pattern { pattern: ItemId, opacity: f32 },
}

impl ShapePaint {
    fn is_visible(&self) -> bool {
        match *self {
            Self::Color(c) => c.a > 0,
            Self::Pattern { opacity, .. } => opacity > 0.0,
        }
    }

    pub(crate) fn pattern(&self) -> Option<ItemId> {
        match *self {
            Self::Pattern { pattern, .. } => Some(pattern),
            Self::Color(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeStroke {
    pub paint: ShapePaint,
    pub style: LineStyle,
}

/// Geometry and style of a shape item. The path is in the item's own coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeData {
    pub path: BezPath,
    pub fill: Option<ShapePaint>,
    pub stroke: Option<ShapeStroke>,
    pub fill_rule: FillRule,
    pub clip_rule: FillRule,
}

impl ShapeData {
    pub fn new(path: BezPath) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub fn with_fill(mut self, paint: ShapePaint) -> Self {
        self.fill = Some(paint);
        self
    }

    pub fn with_stroke(mut self, paint: ShapePaint, style: LineStyle) -> Self {
        self.stroke = Some(ShapeStroke { paint, style });
        self
    }

    pub fn with_fill_rule(mut self, rule: FillRule) -> Self {
        self.fill_rule = rule;
        self
    }

    pub(crate) fn patterns(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.fill
            .iter()
            .filter_map(ShapePaint::pattern)
            .chain(self.stroke.iter().filter_map(|s| s.paint.pattern()))
    }

    /// The path as an axis-aligned rectangle, if it is exactly one closed four-corner loop.
    pub(crate) fn as_rect(&self) -> Option<Rect> {
        let mut pts: SmallVec<[Point; 5]> = SmallVec::new();
        let mut closed = false;
        for (i, el) in self.path.elements().iter().enumerate() {
            match (i, *el) {
                (0, PathEl::MoveTo(p)) => pts.push(p),
                (1..=4, PathEl::LineTo(p)) if !closed => pts.push(p),
                (_, PathEl::ClosePath) if !closed && i >= 4 => closed = true,
                _ => return None,
            }
        }
        if !closed {
            return None;
        }
        if pts.len() == 5 {
            if pts[4] != pts[0] {
                return None;
            }
            pts.pop();
        }
        if pts.len() != 4 {
            return None;
        }
        let aligned = |a: Point, b: Point| a.x == b.x || a.y == b.y;
        let turns = (0..4).all(|i| aligned(pts[i], pts[(i + 1) % 4]))
            && (0..4).all(|i| {
                let (a, b, c) = (pts[i], pts[(i + 1) % 4], pts[(i + 2) % 4]);
                (a.x == b.x) != (b.x == c.x)
            });
        let r = Rect::from_points(pts[0], pts[2]);
        (turns && r.area() > 0.0).then_some(r)
    }

    fn device_bounds(&self, ctm: Affine) -> Option<Rect> {
        if self.path.elements().is_empty() {
            return None;
        }
        let b = (ctm * self.path.clone()).bounding_box();
        [b.x0, b.y0, b.x1, b.y1]
            .iter()
            .all(|v| v.is_finite())
            .then_some(b)
    }

    /// Device bounds of the path outline under `ctm`. Degenerate (zero-area) outlines have none.
    pub(crate) fn geometric_bounds(&self, ctm: Affine) -> Option<IntRect> {
        IntRect::round_out(self.device_bounds(ctm)?)
    }

    /// Device bounds including the stroke, if any.
    ///
    /// Joins are covered by growing the box by the miter length.
    pub(crate) fn visual_bounds(&self, ctm: Affine) -> Option<IntRect> {
        let outline = self.device_bounds(ctm)?;
        let Some(stroke) = self.stroke.filter(|s| s.paint.is_visible()) else {
            return IntRect::round_out(outline);
        };
        let width = (stroke.style.width * expansion(&ctm)).max(0.125);
        let mut grow = width;
        if stroke.style.join == LineJoin::Miter {
            grow += width * stroke.style.miter_limit.max(1.0);
        }
        IntRect::round_out(outline.inflate(grow, grow))
    }

    /// Whether device point `p` hits the shape under `ctm`.
    ///
    /// `as_clip` tests the filled clip geometry only; `outline` uses a fixed half-pixel band.
    pub(crate) fn hit(
        &self,
        ctm: Affine,
        p: Point,
        delta: f64,
        min_stroke_width: f64,
        as_clip: bool,
        outline: bool,
    ) -> bool {
        let device = ctm * self.path.clone();
        let half_width = if as_clip {
            0.0
        } else if outline {
            0.5
        } else {
            match self.stroke.filter(|s| s.paint.is_visible()) {
                Some(s) => (s.style.width * expansion(&ctm)).max(min_stroke_width) / 2.0,
                None => 0.0,
            }
        };
        let fill_visible = self.fill.is_some_and(|f| f.is_visible());
        if !as_clip && !outline && !fill_visible && half_width == 0.0 {
            return false;
        }
        if as_clip || (fill_visible && !outline) {
            let rule = if as_clip { self.clip_rule } else { self.fill_rule };
            let w = device.winding(p);
            let inside = match rule {
                FillRule::NonZero => w != 0,
                FillRule::EvenOdd => w % 2 != 0,
            };
            if inside {
                return true;
            }
        }
        let dist = device
            .segments()
            .map(|seg| seg.nearest(p, NEAREST_ACCURACY).distance_sq)
            .fold(f64::INFINITY, f64::min)
            .sqrt();
        half_width > 0.0 && dist - half_width < delta
    }
}

impl From<BezPath> for ShapeData {
    fn from(path: BezPath) -> Self {
        Self::new(path)
    }
}

impl ShapeStroke {
    pub fn solid(color: Rgba8, width: f64) -> Self {
        Self {
            paint: ShapePaint::Color(color),
            style: LineStyle::with_width(width),
        }
    }
}
