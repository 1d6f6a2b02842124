use super::DrawContext;
use std::ops::{Deref, DerefMut};

/// Scoped [`DrawContext::save`]: the matching restore runs exactly once when the guard drops,
/// on every exit path.
pub struct Save<'c, 's> {
    dc: &'c mut DrawContext<'s>,
    depth: usize,
}

impl<'c, 's> Save<'c, 's> {
    pub fn new(dc: &'c mut DrawContext<'s>) -> Self {
        let depth = dc.save_depth();
        dc.save();
        Self { dc, depth }
    }

    /// Restores the guarded state and saves again.
    pub fn resave(&mut self) {
        self.dc.restore_to(self.depth);
        self.dc.save();
    }
}

impl<'s> Deref for Save<'_, 's> {
    type Target = DrawContext<'s>;

    fn deref(&self) -> &Self::Target {
        self.dc
    }
}

impl DerefMut for Save<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dc
    }
}

impl Drop for Save<'_, '_> {
    fn drop(&mut self) {
        self.dc.restore_to(self.depth);
    }
}
