use crate::foundation::core::Point;
use crate::scene::drawing::Drawing;
use crate::scene::item::ItemKind;
use crate::scene::{ItemId, PickFlags, RenderMode, StateFlags};

impl Drawing {
    pub(super) fn pick_node(
        &self,
        id: ItemId,
        p: Point,
        delta: f64,
        flags: PickFlags,
    ) -> Option<ItemId> {
        let item = self.get(id)?;
        if !item.state.contains(StateFlags::BBOX | StateFlags::PICK) {
            tracing::warn!(?id, "pick on an item that was not updated for picking");
            return None;
        }
        if !flags.contains(PickFlags::STICKY) && !(item.visible && item.sensitive) {
            return None;
        }
        let outline = self.render_mode() == RenderMode::Outline;
        let as_clip = flags.contains(PickFlags::AS_CLIP);

        if !outline {
            if let Some(clip) = item.clip {
                self.pick_node(clip, p, delta, flags | PickFlags::AS_CLIP)?;
            }
            if let Some(mask) = item.mask {
                self.pick_node(mask, p, delta, flags)?;
            }
        }

        let bounds = if outline || as_clip {
            item.visual_bbox
        } else {
            item.drawbox
        }?;
        if !bounds.to_rect().inflate(delta, delta).contains(p) {
            return None;
        }

        match &item.kind {
            ItemKind::Shape(shape) => shape
                .hit(
                    item.ctm,
                    p,
                    delta,
                    self.opts.pick_min_stroke_width,
                    as_clip,
                    outline,
                )
                .then_some(id),
            ItemKind::Group(group) | ItemKind::Pattern(group, _) => {
                let hit = group
                    .children
                    .iter()
                    .find_map(|c| self.pick_node(*c, p, delta, flags))?;
                Some(if group.pick_children { hit } else { id })
            }
        }
    }
}
