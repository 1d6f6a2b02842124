use crate::context::DrawContext;
use crate::foundation::core::{Affine, BezPath, IntRect, Point, Rect};
use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::affine_near;
use crate::foundation::opts::DrawingOpts;
use crate::scene::item::{ChildType, GroupData, Item, ItemKind, Slot};
use crate::scene::pattern::{Overflow, PatternData};
use crate::scene::shape::{ShapeData, ShapePaint, ShapeStroke};
use crate::scene::{
    ItemId, ItemKindTag, PickFlags, RenderFlags, RenderMode, RenderStatus, StateFlags, ViewKey,
};
use crate::surface::cache::CacheSurface;
use crate::surface::pool::{PoolStats, SurfacePool};
use crate::surface::region::Region;
use std::collections::HashSet;

const TRANSFORM_EPS: f64 = 1e-9;

/// A retained tree of drawing items plus the resources shared by all of them.
///
/// Mutations mark derived state stale and record damage; nothing is recomputed until the next
/// [`Drawing::update`].
pub struct Drawing {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<ItemId>,
    pub(crate) opts: DrawingOpts,
    pub(crate) pool: SurfacePool,
    render_mode: RenderMode,
    cache_limit: Option<IntRect>,
    damage: Region,
    root_ctm: Option<Affine>,
}

impl std::fmt::Debug for Drawing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drawing")
            .field("items", &self.len())
            .field("root", &self.root)
            .field("render_mode", &self.render_mode)
            .field("cache_limit", &self.cache_limit)
            .finish_non_exhaustive()
    }
}

impl Drawing {
    pub fn new(opts: DrawingOpts) -> StrataResult<Self> {
        opts.validate()?;
        Ok(Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            opts,
            pool: SurfacePool::new(opts.pool),
            render_mode: RenderMode::Normal,
            cache_limit: None,
            damage: Region::new(),
            root_ctm: None,
        })
    }

    pub fn opts(&self) -> &DrawingOpts {
        &self.opts
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ---- arena ----

    pub(crate) fn get(&self, id: ItemId) -> Option<&Item> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_mut()
    }

    fn item(&self, id: ItemId) -> StrataResult<&Item> {
        self.get(id)
            .ok_or_else(|| StrataError::validation(format!("stale item handle {id:?}")))
    }

    fn item_mut(&mut self, id: ItemId) -> StrataResult<&mut Item> {
        self.get_mut(id)
            .ok_or_else(|| StrataError::validation(format!("stale item handle {id:?}")))
    }

    fn insert(&mut self, item: Item) -> ItemId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            return ItemId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            item: Some(item),
        });
        ItemId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn live_ids(&self) -> Vec<ItemId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.item.is_some())
            .map(|(i, s)| ItemId {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live items, attached or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.item.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- creation ----

    pub fn new_group(&mut self) -> ItemId {
        self.insert(Item::new(ItemKind::Group(GroupData::default())))
    }

    /// A pattern over `tile` (in pattern coordinates). Its children are added like a group's.
    pub fn new_pattern(&mut self, tile: Rect) -> ItemId {
        let data = PatternData {
            tile: Some(tile),
            ..PatternData::default()
        };
        self.insert(Item::new(ItemKind::Pattern(
            GroupData::default(),
            Box::new(data),
        )))
    }

    /// A shape item. Pattern paints must name unattached pattern items; the shape adopts them.
    pub fn new_shape(&mut self, shape: ShapeData) -> StrataResult<ItemId> {
        self.check_paints(&shape, None)?;
        let id = self.insert(Item::new(ItemKind::Shape(Box::new(ShapeData::default()))));
        self.install_shape(id, shape);
        Ok(id)
    }

    fn check_paints(&self, shape: &ShapeData, owner: Option<ItemId>) -> StrataResult<()> {
        let mut seen = HashSet::new();
        for p in shape.patterns() {
            if !seen.insert(p) {
                return Err(StrataError::validation(
                    "a pattern item can paint only one of fill and stroke",
                ));
            }
            let item = self.item(p)?;
            if item.kind.tag() != ItemKindTag::Pattern {
                return Err(StrataError::validation(format!("{p:?} is not a pattern")));
            }
            let owned_here = owner.is_some() && item.parent == owner && item.is_paint_root();
            if (item.parent.is_some() || self.root == Some(p)) && !owned_here {
                return Err(StrataError::validation(format!(
                    "pattern {p:?} is already attached"
                )));
            }
        }
        Ok(())
    }

    fn install_shape(&mut self, id: ItemId, shape: ShapeData) {
        let fill = shape.fill.and_then(|f| f.pattern());
        let stroke = shape.stroke.and_then(|s| s.paint.pattern());
        let previous: Vec<ItemId> = match self.get(id).and_then(|i| i.kind.shape()) {
            Some(old) => old.patterns().collect(),
            None => Vec::new(),
        };
        for (p, child_type) in [(fill, ChildType::Fill), (stroke, ChildType::Stroke)] {
            if let Some(p) = p
                && let Some(item) = self.get_mut(p)
            {
                item.parent = Some(id);
                item.child_type = child_type;
                item.state = StateFlags::ALL;
                self.mark_for_update(p, StateFlags::ALL, true);
            }
        }
        for old in previous {
            if Some(old) != fill && Some(old) != stroke {
                self.free_subtree(old);
            }
        }
        if let Some(item) = self.get_mut(id) {
            item.kind = ItemKind::Shape(Box::new(shape));
        }
    }

    // ---- structure ----

    pub fn root(&self) -> Option<ItemId> {
        self.root
    }

    /// Makes `root` the top of the rendered tree, replacing (but not destroying) the old root.
    pub fn set_root(&mut self, root: Option<ItemId>) -> StrataResult<()> {
        if let Some(r) = root {
            let item = self.item(r)?;
            if item.parent.is_some() {
                return Err(StrataError::validation("root item must not have a parent"));
            }
        }
        if let Some(old) = self.root {
            self.mark_for_rendering(old);
        }
        self.root = root;
        if let Some(r) = root {
            self.mark_for_update(r, StateFlags::ALL, true);
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: ItemId, child: ItemId) -> StrataResult<()> {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    /// Inserts `child` at `index` among `parent`'s children (clamped to the end).
    pub fn insert_child(&mut self, parent: ItemId, index: usize, child: ItemId) -> StrataResult<()> {
        self.check_adoptable(parent, child)?;
        let group = self
            .item_mut(parent)?
            .kind
            .group_mut()
            .ok_or_else(|| StrataError::validation("only groups and patterns have children"))?;
        let index = index.min(group.children.len());
        group.children.insert(index, child);
        self.attach(parent, child, ChildType::Normal);
        Ok(())
    }

    fn check_adoptable(&self, parent: ItemId, child: ItemId) -> StrataResult<()> {
        self.item(parent)?;
        let c = self.item(child)?;
        if c.parent.is_some() || self.root == Some(child) {
            return Err(StrataError::validation(format!(
                "{child:?} is already attached"
            )));
        }
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(StrataError::validation("attaching would create a cycle"));
        }
        Ok(())
    }

    fn attach(&mut self, parent: ItemId, child: ItemId, child_type: ChildType) {
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
            c.child_type = child_type;
            // Lets the update mark below travel up to the new parent.
            c.state = StateFlags::ALL;
        }
        self.mark_for_update(child, StateFlags::ALL, true);
    }

    /// Detaches `id` from its parent (or from the root slot). The item stays alive.
    pub fn unlink(&mut self, id: ItemId) -> StrataResult<()> {
        let item = self.item(id)?;
        let (parent, child_type) = (item.parent, item.child_type);
        self.mark_for_rendering(id);
        if self.root == Some(id) {
            self.root = None;
        }
        let Some(parent) = parent else {
            return Ok(());
        };
        if let Some(p) = self.get_mut(parent) {
            match child_type {
                ChildType::Normal => {
                    if let Some(g) = p.kind.group_mut() {
                        g.children.retain(|c| *c != id);
                    }
                }
                ChildType::Clip => p.clip = None,
                ChildType::Mask => p.mask = None,
                ChildType::Fill => {
                    if let ItemKind::Shape(s) = &mut p.kind {
                        s.fill = None;
                    }
                }
                ChildType::Stroke => {
                    if let ItemKind::Shape(s) = &mut p.kind {
                        s.stroke = None;
                    }
                }
                ChildType::Orphan => {}
            }
        }
        if let Some(c) = self.get_mut(id) {
            c.parent = None;
            c.child_type = ChildType::Orphan;
        }
        self.mark_for_update(parent, StateFlags::ALL, false);
        Ok(())
    }

    /// Unlinks `id` and destroys it with everything it owns.
    pub fn destroy(&mut self, id: ItemId) -> StrataResult<()> {
        self.unlink(id)?;
        self.free_subtree(id);
        Ok(())
    }

    fn free_subtree(&mut self, id: ItemId) {
        let Some(item) = self.get(id) else {
            return;
        };
        let mut owned: Vec<ItemId> = item.clip.into_iter().chain(item.mask).collect();
        if let Some(g) = item.kind.group() {
            owned.extend_from_slice(&g.children);
        }
        if let Some(s) = item.kind.shape() {
            owned.extend(s.patterns());
        }
        for o in owned {
            self.free_subtree(o);
        }
        if self.root == Some(id) {
            self.root = None;
        }
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            slot.item = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    /// Whether the item is drawn into a pattern tile rather than the drawing.
    pub(crate) fn inside_pattern(&self, id: ItemId) -> bool {
        let mut cur = Some(id);
        while let Some(i) = cur {
            let Some(item) = self.get(i) else {
                return false;
            };
            if item.is_paint_root() {
                return true;
            }
            cur = item.parent;
        }
        false
    }

    /// Whether `ancestor` is a strict ancestor of `id`, following any kind of parent link.
    pub fn is_ancestor_of(&self, ancestor: ItemId, id: ItemId) -> bool {
        let mut cur = self.get(id).and_then(|i| i.parent);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.get(p).and_then(|i| i.parent);
        }
        false
    }

    pub fn children(&self, id: ItemId) -> &[ItemId] {
        self.get(id)
            .and_then(|i| i.kind.group())
            .map_or(&[], |g| g.children.as_slice())
    }

    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.get(id)?.parent
    }

    pub fn kind(&self, id: ItemId) -> Option<ItemKindTag> {
        Some(self.get(id)?.kind.tag())
    }

    pub fn key(&self, id: ItemId) -> Option<ViewKey> {
        self.get(id)?.key
    }

    pub fn set_key(&mut self, id: ItemId, key: Option<ViewKey>) -> StrataResult<()> {
        self.item_mut(id)?.key = key;
        Ok(())
    }

    // ---- item properties ----

    /// Sets the item's own transform; `None` and the identity are equivalent.
    pub fn set_transform(&mut self, id: ItemId, transform: Option<Affine>) -> StrataResult<()> {
        let transform = transform.filter(|t| !affine_near(t, &Affine::IDENTITY, TRANSFORM_EPS));
        let current = self.item(id)?.transform.unwrap_or(Affine::IDENTITY);
        if affine_near(&current, &transform.unwrap_or(Affine::IDENTITY), TRANSFORM_EPS) {
            return Ok(());
        }
        self.mark_for_rendering(id);
        self.item_mut(id)?.transform = transform;
        self.mark_for_update(id, StateFlags::ALL, true);
        Ok(())
    }

    /// Transform applied between a group (or pattern) and its children.
    pub fn set_child_transform(&mut self, id: ItemId, transform: Option<Affine>) -> StrataResult<()> {
        let transform = transform.filter(|t| !affine_near(t, &Affine::IDENTITY, TRANSFORM_EPS));
        let group = self
            .item(id)?
            .kind
            .group()
            .ok_or_else(|| StrataError::validation("child transform needs a group"))?;
        let current = group.child_transform.unwrap_or(Affine::IDENTITY);
        if affine_near(&current, &transform.unwrap_or(Affine::IDENTITY), TRANSFORM_EPS) {
            return Ok(());
        }
        self.mark_for_rendering(id);
        if let Some(g) = self.item_mut(id)?.kind.group_mut() {
            g.child_transform = transform;
        }
        self.mark_for_update(id, StateFlags::ALL, true);
        Ok(())
    }

    pub fn set_opacity(&mut self, id: ItemId, opacity: f32) -> StrataResult<()> {
        if !opacity.is_finite() {
            return Err(StrataError::validation("opacity must be finite"));
        }
        self.item_mut(id)?.opacity = opacity.clamp(0.0, 1.0);
        self.mark_for_rendering(id);
        Ok(())
    }

    pub fn set_visible(&mut self, id: ItemId, visible: bool) -> StrataResult<()> {
        if self.item(id)?.visible == visible {
            return Ok(());
        }
        self.mark_for_rendering(id);
        self.item_mut(id)?.visible = visible;
        self.mark_for_rendering(id);
        // The parent's bounds depend on which children are visible.
        self.mark_for_update(id, StateFlags::ALL, false);
        Ok(())
    }

    pub fn set_sensitive(&mut self, id: ItemId, sensitive: bool) -> StrataResult<()> {
        self.item_mut(id)?.sensitive = sensitive;
        Ok(())
    }

    /// Whether a group reports the hit child (true) or itself (false) from picks.
    pub fn set_pick_children(&mut self, id: ItemId, pick_children: bool) -> StrataResult<()> {
        let g = self
            .item_mut(id)?
            .kind
            .group_mut()
            .ok_or_else(|| StrataError::validation("pick_children needs a group"))?;
        g.pick_children = pick_children;
        Ok(())
    }

    /// Replaces the item's clip. The previous clip item is destroyed.
    pub fn set_clip(&mut self, id: ItemId, clip: Option<ItemId>) -> StrataResult<()> {
        self.set_owned(id, clip, ChildType::Clip)
    }

    /// Replaces the item's luminance mask. The previous mask item is destroyed.
    pub fn set_mask(&mut self, id: ItemId, mask: Option<ItemId>) -> StrataResult<()> {
        self.set_owned(id, mask, ChildType::Mask)
    }

    fn set_owned(&mut self, id: ItemId, new: Option<ItemId>, which: ChildType) -> StrataResult<()> {
        if let Some(n) = new {
            self.check_adoptable(id, n)?;
        } else {
            self.item(id)?;
        }
        self.mark_for_rendering(id);
        let item = self.item_mut(id)?;
        let slot = match which {
            ChildType::Clip => &mut item.clip,
            _ => &mut item.mask,
        };
        let old = std::mem::replace(slot, new);
        if let Some(old) = old {
            self.free_subtree(old);
        }
        match new {
            Some(n) => self.attach(id, n, which),
            None => self.mark_for_update(id, StateFlags::ALL, true),
        }
        Ok(())
    }

    /// Requests caching of the item regardless of the automatic selection.
    ///
    /// Disabling drops the cache; the item may still be picked by automatic selection later.
    pub fn set_cached(&mut self, id: ItemId, cached: bool) -> StrataResult<()> {
        let item = self.item_mut(id)?;
        item.cache_persistent = cached;
        item.cached = cached;
        if !cached {
            item.cache = None;
        }
        Ok(())
    }

    /// Replaces a shape's geometry and paints.
    pub fn set_shape(&mut self, id: ItemId, shape: ShapeData) -> StrataResult<()> {
        if self.item(id)?.kind.tag() != ItemKindTag::Shape {
            return Err(StrataError::validation(format!("{id:?} is not a shape")));
        }
        self.check_paints(&shape, Some(id))?;
        self.mark_for_rendering(id);
        self.install_shape(id, shape);
        self.mark_for_update(id, StateFlags::ALL, false);
        Ok(())
    }

    pub fn set_path(&mut self, id: ItemId, path: BezPath) -> StrataResult<()> {
        let shape = self.shape_data(id)?;
        self.set_shape(id, ShapeData { path, ..shape })
    }

    pub fn set_fill(&mut self, id: ItemId, fill: Option<ShapePaint>) -> StrataResult<()> {
        let shape = self.shape_data(id)?;
        self.set_shape(id, ShapeData { fill, ..shape })
    }

    pub fn set_stroke(&mut self, id: ItemId, stroke: Option<ShapeStroke>) -> StrataResult<()> {
        let shape = self.shape_data(id)?;
        self.set_shape(id, ShapeData { stroke, ..shape })
    }

    /// A copy of a shape's data.
    pub fn shape_data(&self, id: ItemId) -> StrataResult<ShapeData> {
        self.item(id)?
            .kind
            .shape()
            .cloned()
            .ok_or_else(|| StrataError::validation(format!("{id:?} is not a shape")))
    }

    // ---- pattern properties ----

    fn pattern_mut(&mut self, id: ItemId) -> StrataResult<&mut PatternData> {
        match &mut self.item_mut(id)?.kind {
            ItemKind::Pattern(_, p) => Ok(p),
            _ => Err(StrataError::validation(format!("{id:?} is not a pattern"))),
        }
    }

    fn pattern_changed(&mut self, id: ItemId) {
        self.mark_for_rendering(id);
        self.mark_for_update(id, StateFlags::ALL, true);
    }

    pub fn set_tile_rect(&mut self, id: ItemId, tile: Option<Rect>) -> StrataResult<()> {
        self.pattern_mut(id)?.tile = tile;
        self.pattern_changed(id);
        Ok(())
    }

    /// Maps pattern coordinates into the user space of the painted shape.
    pub fn set_pattern_transform(&mut self, id: ItemId, t: Option<Affine>) -> StrataResult<()> {
        self.pattern_mut(id)?.pattern_to_user =
            t.filter(|t| !affine_near(t, &Affine::IDENTITY, TRANSFORM_EPS));
        self.pattern_changed(id);
        Ok(())
    }

    pub fn set_overflow(&mut self, id: ItemId, overflow: Option<Overflow>) -> StrataResult<()> {
        if let Some(o) = &overflow {
            o.validate()?;
        }
        self.pattern_mut(id)?.overflow = overflow;
        self.pattern_changed(id);
        Ok(())
    }

    /// Debug tiles are painted once, unrepeated, over a solid background.
    pub fn set_pattern_debug(&mut self, id: ItemId, debug: bool) -> StrataResult<()> {
        self.pattern_mut(id)?.debug = debug;
        self.pattern_changed(id);
        Ok(())
    }

    pub fn pattern_resolution(&self, id: ItemId) -> Option<(u32, u32)> {
        self.get(id)?.kind.pattern()?.resolution
    }

    // ---- drawing-wide settings ----

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        if self.render_mode == mode {
            return;
        }
        if let Some(r) = self.root {
            self.mark_for_rendering(r);
        }
        self.render_mode = mode;
        if let Some(r) = self.root {
            self.mark_for_update(r, StateFlags::ALL, true);
        }
    }

    pub fn cache_limit(&self) -> Option<IntRect> {
        self.cache_limit
    }

    /// Restricts caches to `limit` (usually the visible area). `None` lifts the restriction.
    pub fn set_cache_limit(&mut self, limit: Option<IntRect>) {
        self.cache_limit = limit;
        if let Some(r) = self.root {
            self.mark_for_update(r, StateFlags::CACHE, true);
        }
    }

    pub fn set_cache_budget(&mut self, bytes: usize) {
        self.opts.cache_budget_bytes = bytes;
        if let Some(r) = self.root {
            self.mark_for_update(r, StateFlags::CACHE, true);
        }
    }

    /// Returns and clears the area repainting is owed for.
    pub fn take_damage(&mut self) -> Region {
        std::mem::take(&mut self.damage)
    }

    pub fn damage(&self) -> &Region {
        &self.damage
    }

    // ---- queries ----

    pub fn ctm(&self, id: ItemId) -> Option<Affine> {
        Some(self.get(id)?.ctm)
    }

    pub fn transform(&self, id: ItemId) -> Option<Affine> {
        self.get(id)?.transform
    }

    pub fn geometric_bbox(&self, id: ItemId) -> Option<IntRect> {
        self.get(id)?.geometric_bbox
    }

    pub fn visual_bbox(&self, id: ItemId) -> Option<IntRect> {
        self.get(id)?.visual_bbox
    }

    /// The visual bounds narrowed to the clip and mask.
    pub fn drawbox(&self, id: ItemId) -> Option<IntRect> {
        self.get(id)?.drawbox
    }

    pub fn state(&self, id: ItemId) -> StateFlags {
        self.get(id).map_or(StateFlags::empty(), |i| i.state)
    }

    pub fn is_visible(&self, id: ItemId) -> bool {
        self.get(id).is_some_and(|i| i.visible)
    }

    pub fn opacity(&self, id: ItemId) -> Option<f32> {
        Some(self.get(id)?.opacity)
    }

    pub fn clip(&self, id: ItemId) -> Option<ItemId> {
        self.get(id)?.clip
    }

    pub fn mask(&self, id: ItemId) -> Option<ItemId> {
        self.get(id)?.mask
    }

    /// Whether the item currently renders through a cache.
    pub fn is_cached(&self, id: ItemId) -> bool {
        self.get(id).is_some_and(|i| i.cached)
    }

    pub fn cache(&self, id: ItemId) -> Option<&CacheSurface> {
        self.get(id)?.cache.as_ref()
    }

    /// Items currently rendering through a cache, in arena order.
    pub fn cached_items(&self) -> Vec<ItemId> {
        self.live_ids()
            .into_iter()
            .filter(|id| self.is_cached(*id))
            .collect()
    }

    /// Bytes held by allocated item caches.
    pub fn cache_bytes(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.item.as_ref()?.cache.as_ref())
            .filter(|c| c.surface().is_allocated())
            .map(CacheSurface::byte_size)
            .sum()
    }

    // ---- invalidation ----

    /// Reports the item's current area as needing repaint and dirties the caches that hold it.
    pub(crate) fn mark_for_rendering(&mut self, id: ItemId) {
        let outline = self.render_mode == RenderMode::Outline;
        let Some(item) = self.get(id) else {
            return;
        };
        let dirty = if outline {
            item.visual_bbox
        } else {
            item.drawbox
        };
        let Some(dirty) = dirty else {
            return;
        };
        let mut cur = Some(id);
        while let Some(i) = cur {
            let Some(item) = self.get_mut(i) else {
                break;
            };
            if item.is_paint_root() {
                // Tile-space contents: repaint whatever the pattern fills instead.
                if let Some(owner) = item.parent {
                    self.mark_for_rendering(owner);
                }
                return;
            }
            if let Some(cache) = item.cache.as_mut() {
                cache.mark_dirty(dirty);
            }
            cur = item.parent;
        }
        self.damage.union_rect(dirty);
    }

    /// Invalidates `flags` on the item and, when that changed anything, on its ancestors.
    ///
    /// With `propagate` the whole subtree is reset too on the next update.
    pub(crate) fn mark_for_update(&mut self, id: ItemId, flags: StateFlags, propagate: bool) {
        let mut cur = id;
        let mut propagate = propagate;
        loop {
            let Some(item) = self.get_mut(cur) else {
                return;
            };
            if propagate {
                item.propagate |= flags;
            }
            if !item.state.intersects(flags) {
                return;
            }
            item.state.remove(flags);
            match item.parent {
                Some(p) => {
                    cur = p;
                    propagate = false;
                }
                None => return,
            }
        }
    }

    // ---- caching policy ----

    pub(crate) fn cache_rect(&self, id: ItemId) -> Option<IntRect> {
        let drawbox = self.get(id)?.drawbox?;
        match self.cache_limit {
            Some(limit) => drawbox.intersect(&limit),
            None => Some(drawbox),
        }
    }

    /// Rough repaint cost of the item: its cacheable area plus clip and mask overhead.
    pub(crate) fn cache_score(&self, id: ItemId) -> Option<f64> {
        let rect = self.cache_rect(id)?;
        let item = self.get(id)?;
        let mut score = rect.area() as f64;
        if let Some(b) = item.clip.and_then(|c| self.get(c)?.visual_bbox) {
            score += b.area() as f64 * 0.5;
        }
        if let Some(m) = item.mask {
            score += self.cache_score(m).unwrap_or(0.0);
        }
        Some(score)
    }

    /// Selects the highest-scoring candidates that fit in the cache budget.
    fn select_cached_items(&mut self) {
        let budget = self.opts.cache_budget_bytes as u64;
        let mut candidates: Vec<(f64, u64, ItemId)> = self
            .live_ids()
            .into_iter()
            .filter_map(|id| {
                let item = self.get(id)?;
                if item.cache_persistent || self.inside_pattern(id) {
                    return None;
                }
                let score = item.cache_score?;
                let bytes = self.cache_rect(id)?.area().saturating_mul(4);
                Some((score, bytes, id))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut used = 0u64;
        let mut chosen = HashSet::new();
        for (_, bytes, id) in candidates {
            if used.saturating_add(bytes) > budget {
                break;
            }
            used += bytes;
            chosen.insert(id);
        }

        for id in self.live_ids() {
            let Some(item) = self.get_mut(id) else {
                continue;
            };
            if item.cache_persistent {
                continue;
            }
            let want = chosen.contains(&id);
            if item.cached != want {
                tracing::debug!(?id, cached = want, "cache selection changed");
                item.cached = want;
                if !want {
                    item.cache = None;
                }
            }
        }
    }

    // ---- entry points ----

    /// Recomputes stale state for the tree under `ctm`, limited to items touching `area`.
    ///
    /// `flags` names the state wanted; `reset` forces it stale first. A `ctm` different from the
    /// previous update's resets everything.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn update(
        &mut self,
        area: IntRect,
        ctm: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> StateFlags {
        let Some(root) = self.root else {
            return StateFlags::empty();
        };
        let mut reset = reset;
        if self
            .root_ctm
            .is_none_or(|prev| !affine_near(&prev, &ctm, TRANSFORM_EPS))
        {
            // Caches relocate on their own; only the old area is owed.
            if self.root_ctm.is_some()
                && let Some(old) = self.get(root).and_then(|r| r.drawbox)
            {
                self.damage.union_rect(old);
            }
            self.root_ctm = Some(ctm);
            reset |= StateFlags::ALL;
        }
        let state = self.update_node(root, area, ctm, flags, reset);
        if flags.contains(StateFlags::CACHE) {
            self.select_cached_items();
        }
        state
    }

    /// Renders the whole tree into `dc`, restricted to the pixel rectangle `area`.
    #[tracing::instrument(level = "debug", skip(self, dc))]
    pub fn render(
        &mut self,
        dc: &mut DrawContext<'_>,
        area: IntRect,
        flags: RenderFlags,
    ) -> RenderStatus {
        self.render_until(dc, area, flags, None)
    }

    /// Like [`Drawing::render`] but halts just before `stop_at` is drawn.
    ///
    /// Item caches are neither read nor updated while stopping. A `stop_at` outside the
    /// rendered tree gives a normal render.
    #[tracing::instrument(level = "debug", skip(self, dc))]
    pub fn render_until(
        &mut self,
        dc: &mut DrawContext<'_>,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderStatus {
        let Some(root) = self.root else {
            return RenderStatus::Ok;
        };
        let stop_at = stop_at.filter(|&s| s == root || self.is_ancestor_of(root, s));
        self.render_node(root, dc, area, flags, stop_at)
    }

    /// The topmost item at device point `p`, within `delta` device pixels.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn pick(&self, p: Point, delta: f64, flags: PickFlags) -> Option<ItemId> {
        self.pick_node(self.root?, p, delta, flags)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/drawing.rs"]
mod tests;
