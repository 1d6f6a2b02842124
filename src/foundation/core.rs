use serde::{Deserialize, Serialize};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Axis-aligned integer rectangle in pixel units, half-open on the max edges.
///
/// A rectangle with `x1 <= x0` or `y1 <= y0` is empty. Most operations return `Option` rather
/// than an empty rectangle so callers cannot accidentally paint through one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRect {
    /// Left edge (inclusive).
    pub x0: i32,
    /// Top edge (inclusive).
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
}

// Leaves headroom so width/height and small translations never overflow i32.
const INFINITE_EXTENT: i32 = i32::MAX / 4;

impl IntRect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_xywh(x: i32, y: i32, w: u32, h: u32) -> Self {
        let w = i32::try_from(w).unwrap_or(i32::MAX);
        let h = i32::try_from(h).unwrap_or(i32::MAX);
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    /// The rectangle used to request a full-tree update or an unclipped render.
    pub const fn infinite() -> Self {
        Self::new(
            -INFINITE_EXTENT,
            -INFINITE_EXTENT,
            INFINITE_EXTENT,
            INFINITE_EXTENT,
        )
    }

    pub fn is_infinite(&self) -> bool {
        *self == Self::infinite()
    }

    pub fn width(&self) -> u32 {
        (i64::from(self.x1) - i64::from(self.x0)).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (i64::from(self.y1) - i64::from(self.y0)).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn min(&self) -> (i32, i32) {
        (self.x0, self.y0)
    }

    pub fn intersect(&self, other: &IntRect) -> Option<IntRect> {
        let r = IntRect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (!r.is_empty()).then_some(r)
    }

    pub fn intersects(&self, other: &IntRect) -> bool {
        self.intersect(other).is_some()
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IntRect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn contains_rect(&self, other: &IntRect) -> bool {
        other.is_empty()
            || (other.x0 >= self.x0
                && other.y0 >= self.y0
                && other.x1 <= self.x1
                && other.y1 <= self.y1)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(
            self.x0.saturating_add(dx),
            self.y0.saturating_add(dy),
            self.x1.saturating_add(dx),
            self.y1.saturating_add(dy),
        )
    }

    pub fn expand(&self, n: i32) -> IntRect {
        IntRect::new(
            self.x0.saturating_sub(n),
            self.y0.saturating_sub(n),
            self.x1.saturating_add(n),
            self.y1.saturating_add(n),
        )
    }

    /// Smallest integer rectangle covering `r`, or `None` when `r` is empty or not finite.
    pub fn round_out(r: Rect) -> Option<IntRect> {
        if !(r.x0.is_finite() && r.y0.is_finite() && r.x1.is_finite() && r.y1.is_finite()) {
            return None;
        }
        let lim = f64::from(INFINITE_EXTENT);
        let out = IntRect::new(
            r.x0.floor().clamp(-lim, lim) as i32,
            r.y0.floor().clamp(-lim, lim) as i32,
            r.x1.ceil().clamp(-lim, lim) as i32,
            r.y1.ceil().clamp(-lim, lim) as i32,
        );
        (!out.is_empty()).then_some(out)
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// Union of two optional boxes, treating `None` as the empty set.
pub fn union_opt(a: Option<IntRect>, b: Option<IntRect>) -> Option<IntRect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Intersection of two optional boxes, treating `None` as the empty set.
pub fn intersect_opt(a: Option<IntRect>, b: Option<IntRect>) -> Option<IntRect> {
    match (a, b) {
        (Some(a), Some(b)) => a.intersect(&b),
        _ => None,
    }
}

/// Straight (non-premultiplied) RGBA8 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Rgba8 = Rgba8::new(0, 0, 0, 0);
    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Same color with its alpha scaled by `opacity` (clamped to `0..=1`).
    pub fn with_opacity(self, opacity: f32) -> Self {
        let op = crate::foundation::math::unit_to_u8(opacity);
        Self {
            a: crate::foundation::math::premultiply(self.a, op),
            ..self
        }
    }

    pub(crate) fn to_cpu_color(self) -> vello_cpu::peniko::Color {
        vello_cpu::peniko::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
