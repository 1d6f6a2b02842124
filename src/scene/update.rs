use crate::foundation::core::{Affine, IntRect, intersect_opt, union_opt};
use crate::scene::drawing::Drawing;
use crate::scene::item::ItemKindTag;
use crate::scene::{ItemId, RenderMode, StateFlags};

impl Drawing {
    /// Brings the item's derived state up to `flags` under the parent transform `parent_ctm`.
    ///
    /// Items whose valid bounds miss `area` are left stale.
    pub(super) fn update_node(
        &mut self,
        id: ItemId,
        area: IntRect,
        parent_ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> StateFlags {
        let outline = self.render_mode() == RenderMode::Outline;
        let threshold = self.opts.cache_score_threshold;
        let Some(item) = self.get_mut(id) else {
            return StateFlags::empty();
        };

        let reset = reset | item.propagate;
        item.propagate = StateFlags::empty();
        item.state.remove(reset);

        if (flags - item.state).is_empty() {
            return item.state;
        }
        if item.state.contains(StateFlags::BBOX) {
            let bounds = if outline {
                item.visual_bbox
            } else {
                item.drawbox
            };
            if !bounds.is_some_and(|b| b.intersects(&area)) {
                return item.state;
            }
        }

        let to_update = flags - item.state;
        let old_ctm = item.ctm;
        let ctm = match item.transform {
            Some(t) => parent_ctm * t,
            None => parent_ctm,
        };
        item.ctm = ctm;
        let tag = item.kind.tag();

        let state = match tag {
            ItemKindTag::Group => self.update_group(id, area, ctm, flags, reset),
            ItemKindTag::Pattern => self.update_pattern(id, ctm, flags, reset),
            ItemKindTag::Shape => self.update_shape(id, ctm, flags, reset),
        };
        if let Some(item) = self.get_mut(id) {
            item.state = state;
        }

        if to_update.contains(StateFlags::BBOX) {
            self.update_drawbox(id, area, ctm, flags, reset, outline);
        }

        if to_update.contains(StateFlags::CACHE) {
            let score = self.cache_score(id).filter(|s| *s >= threshold);
            let cache_rect = self.cache_rect(id);
            if let Some(item) = self.get_mut(id) {
                item.cache_score = score;
                if !item.visible || cache_rect.is_none() {
                    item.cache = None;
                } else if let (Some(cache), Some(rect)) = (item.cache.as_mut(), cache_rect) {
                    cache.schedule_transform(rect, ctm * old_ctm.inverse());
                }
            }
        }

        if to_update.contains(StateFlags::RENDER) && tag == ItemKindTag::Shape {
            self.mark_for_rendering(id);
        }

        self.get(id).map_or(StateFlags::empty(), |i| i.state)
    }

    /// Narrows (or, in outline mode, widens) the item's box by its clip and mask.
    fn update_drawbox(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
        outline: bool,
    ) {
        let Some(item) = self.get(id) else {
            return;
        };
        let (clip, mask) = (item.clip, item.mask);
        let mut visual = item.visual_bbox;
        let mut drawbox = visual;
        for owned in clip.into_iter().chain(mask) {
            self.update_node(owned, area, ctm, flags, reset);
            let b = self.get(owned).and_then(|o| o.visual_bbox);
            if outline {
                visual = union_opt(visual, b);
            } else {
                drawbox = intersect_opt(drawbox, b);
            }
        }
        if let Some(item) = self.get_mut(id) {
            item.visual_bbox = visual;
            item.drawbox = if outline { visual } else { drawbox };
        }
    }

    pub(super) fn update_group(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> StateFlags {
        let outline = self.render_mode() == RenderMode::Outline;
        let Some(group) = self.get(id).and_then(|i| i.kind.group()) else {
            return StateFlags::empty();
        };
        let children = group.children.clone();
        let child_ctm = match group.child_transform {
            Some(t) => ctm * t,
            None => ctm,
        };

        for c in &children {
            self.update_node(*c, area, child_ctm, flags, reset);
        }

        let (mut geometric, mut visual) = (None, None);
        for c in &children {
            let Some(child) = self.get(*c).filter(|c| c.visible) else {
                continue;
            };
            geometric = union_opt(geometric, child.geometric_bbox);
            let v = if outline {
                child.geometric_bbox
            } else {
                child.visual_bbox
            };
            visual = union_opt(visual, v);
        }
        if let Some(item) = self.get_mut(id) {
            item.geometric_bbox = geometric;
            item.visual_bbox = visual;
        }
        StateFlags::ALL
    }

    fn update_shape(
        &mut self,
        id: ItemId,
        ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> StateFlags {
        let outline = self.render_mode() == RenderMode::Outline;
        let patterns: Vec<ItemId> = self
            .get(id)
            .and_then(|i| i.kind.shape())
            .map(|s| s.patterns().collect())
            .unwrap_or_default();
        // Pattern contents live in tile space, so the drawing-space area says nothing about them.
        for p in patterns {
            self.update_node(p, IntRect::infinite(), ctm, flags, reset);
        }

        let Some(item) = self.get_mut(id) else {
            return StateFlags::empty();
        };
        let Some(shape) = item.kind.shape() else {
            return StateFlags::empty();
        };
        let geometric = shape.geometric_bounds(ctm);
        let visual = if outline {
            geometric
        } else {
            shape.visual_bounds(ctm)
        };
        item.geometric_bbox = geometric;
        item.visual_bbox = visual;
        StateFlags::ALL
    }
}
