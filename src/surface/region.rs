use crate::foundation::core::IntRect;
use smallvec::{SmallVec, smallvec};

/// A set of pixels stored as disjoint, non-empty integer rectangles.
///
/// The rectangle decomposition is not canonical: two regions covering the same pixels compare
/// equal even if their `rects()` differ.
#[derive(Clone, Debug, Default)]
pub struct Region {
    rects: Vec<IntRect>,
}

fn rect_minus(a: IntRect, b: &IntRect) -> SmallVec<[IntRect; 4]> {
    let Some(i) = a.intersect(b) else {
        return smallvec![a];
    };
    let mut out = SmallVec::new();
    if a.y0 < i.y0 {
        out.push(IntRect::new(a.x0, a.y0, a.x1, i.y0));
    }
    if i.y1 < a.y1 {
        out.push(IntRect::new(a.x0, i.y1, a.x1, a.y1));
    }
    if a.x0 < i.x0 {
        out.push(IntRect::new(a.x0, i.y0, i.x0, i.y1));
    }
    if i.x1 < a.x1 {
        out.push(IntRect::new(i.x1, i.y0, a.x1, i.y1));
    }
    out
}

// Two rects that share a complete edge can be replaced by their union.
fn merge_adjacent(a: &IntRect, b: &IntRect) -> Option<IntRect> {
    let same_rows = a.y0 == b.y0 && a.y1 == b.y1;
    let same_cols = a.x0 == b.x0 && a.x1 == b.x1;
    if (same_rows && (a.x1 == b.x0 || b.x1 == a.x0))
        || (same_cols && (a.y1 == b.y0 || b.y1 == a.y0))
    {
        Some(a.union(b))
    } else {
        None
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(r: IntRect) -> Self {
        let rects = if r.is_empty() { Vec::new() } else { vec![r] };
        Self { rects }
    }

    pub fn rects(&self) -> &[IntRect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Number of pixels in the set.
    pub fn area(&self) -> u64 {
        self.rects.iter().map(IntRect::area).sum()
    }

    pub fn bounds(&self) -> Option<IntRect> {
        self.rects.iter().copied().reduce(|a, b| a.union(&b))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    pub fn contains_rect(&self, r: &IntRect) -> bool {
        let mut rest = Region::from_rect(*r);
        rest.subtract(self);
        rest.is_empty()
    }

    pub fn union_rect(&mut self, r: IntRect) {
        if r.is_empty() {
            return;
        }
        let mut pieces: SmallVec<[IntRect; 4]> = smallvec![r];
        for e in &self.rects {
            if !pieces.iter().any(|p| p.intersects(e)) {
                continue;
            }
            pieces = pieces.into_iter().flat_map(|p| rect_minus(p, e)).collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
        self.coalesce();
    }

    pub fn subtract_rect(&mut self, r: &IntRect) {
        if r.is_empty() || !self.rects.iter().any(|e| e.intersects(r)) {
            return;
        }
        self.rects = self
            .rects
            .iter()
            .flat_map(|&e| rect_minus(e, r))
            .collect();
        self.coalesce();
    }

    pub fn intersect_rect(&mut self, r: &IntRect) {
        self.rects.retain_mut(|e| match e.intersect(r) {
            Some(i) => {
                *e = i;
                true
            }
            None => false,
        });
    }

    pub fn union(&mut self, other: &Region) {
        for r in &other.rects {
            self.union_rect(*r);
        }
    }

    pub fn subtract(&mut self, other: &Region) {
        for r in &other.rects {
            self.subtract_rect(r);
        }
    }

    pub fn intersect(&mut self, other: &Region) {
        self.rects = self
            .rects
            .iter()
            .flat_map(|a| other.rects.iter().filter_map(move |b| a.intersect(b)))
            .collect();
        self.coalesce();
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            *r = r.translate(dx, dy);
        }
    }

    fn coalesce(&mut self) {
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..self.rects.len() {
                for j in (i + 1)..self.rects.len() {
                    if let Some(u) = merge_adjacent(&self.rects[i], &self.rects[j]) {
                        self.rects[i] = u;
                        self.rects.swap_remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }
}

impl From<IntRect> for Region {
    fn from(r: IntRect) -> Self {
        Region::from_rect(r)
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        if self.area() != other.area() {
            return false;
        }
        let mut rest = self.clone();
        rest.subtract(other);
        rest.is_empty()
    }
}

impl Eq for Region {}

#[cfg(test)]
#[path = "../../tests/unit/surface/region.rs"]
mod tests;
