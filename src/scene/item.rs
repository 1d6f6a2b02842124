use crate::foundation::core::{Affine, IntRect};
use crate::scene::StateFlags;
use crate::scene::pattern::PatternData;
use crate::scene::shape::ShapeData;
use crate::surface::cache::CacheSurface;

/// Stable handle to an item in a [`crate::Drawing`].
///
/// Handles carry a generation, so a handle to a destroyed item never aliases a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Caller-chosen tag identifying which view of a document an item tree was shown for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ViewKey(pub u32);

/// The kind of an item, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKindTag {
    Group,
    Pattern,
    Shape,
}

/// How an item hangs off its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChildType {
    /// Not attached, or the root.
    Orphan,
    Normal,
    Clip,
    Mask,
    Fill,
    Stroke,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct GroupData {
    pub(crate) children: Vec<ItemId>,
    pub(crate) child_transform: Option<Affine>,
    pub(crate) pick_children: bool,
}

pub(crate) enum ItemKind {
    Group(GroupData),
    /// A group rendered into a repeating tile rather than directly.
    Pattern(GroupData, Box<PatternData>),
    Shape(Box<ShapeData>),
}

impl ItemKind {
    pub(crate) fn tag(&self) -> ItemKindTag {
        match self {
            Self::Group(_) => ItemKindTag::Group,
            Self::Pattern(..) => ItemKindTag::Pattern,
            Self::Shape(_) => ItemKindTag::Shape,
        }
    }

    pub(crate) fn group(&self) -> Option<&GroupData> {
        match self {
            Self::Group(g) | Self::Pattern(g, _) => Some(g),
            Self::Shape(_) => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut GroupData> {
        match self {
            Self::Group(g) | Self::Pattern(g, _) => Some(g),
            Self::Shape(_) => None,
        }
    }

    pub(crate) fn shape(&self) -> Option<&ShapeData> {
        match self {
            Self::Shape(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn pattern(&self) -> Option<&PatternData> {
        match self {
            Self::Pattern(_, p) => Some(p),
            _ => None,
        }
    }
}

pub(crate) struct Item {
    pub(crate) kind: ItemKind,
    pub(crate) parent: Option<ItemId>,
    pub(crate) child_type: ChildType,
    pub(crate) key: Option<ViewKey>,

    pub(crate) transform: Option<Affine>,
    pub(crate) ctm: Affine,
    pub(crate) geometric_bbox: Option<IntRect>,
    pub(crate) visual_bbox: Option<IntRect>,
    pub(crate) drawbox: Option<IntRect>,

    /// Valid derived state.
    pub(crate) state: StateFlags,
    /// State to reset in this item's subtree on the next update.
    pub(crate) propagate: StateFlags,

    pub(crate) visible: bool,
    pub(crate) sensitive: bool,
    pub(crate) opacity: f32,
    pub(crate) clip: Option<ItemId>,
    pub(crate) mask: Option<ItemId>,

    pub(crate) cached: bool,
    // Caching requested by the owner; survives automatic cache selection.
    pub(crate) cache_persistent: bool,
    pub(crate) cache: Option<CacheSurface>,
    pub(crate) cache_score: Option<f64>,
}

impl Item {
    pub(crate) fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            parent: None,
            child_type: ChildType::Orphan,
            key: None,
            transform: None,
            ctm: Affine::IDENTITY,
            geometric_bbox: None,
            visual_bbox: None,
            drawbox: None,
            state: StateFlags::empty(),
            propagate: StateFlags::empty(),
            visible: true,
            sensitive: true,
            opacity: 1.0,
            clip: None,
            mask: None,
            cached: false,
            cache_persistent: false,
            cache: None,
            cache_score: None,
        }
    }

    /// Items painted into a pattern tile live in tile space, not drawing space.
    pub(crate) fn is_paint_root(&self) -> bool {
        matches!(self.child_type, ChildType::Fill | ChildType::Stroke)
    }
}

pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) item: Option<Item>,
}
