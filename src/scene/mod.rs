//! The retained-mode drawing tree.
//!
//! A [`Drawing`] owns every item in an arena addressed by generational [`ItemId`]s. Items form a
//! strict tree: each has at most one parent, which is either a group (normal child), the item it
//! clips or masks, or the shape whose fill or stroke it paints (pattern roots).
//!
//! Work happens in two passes driven by the caller:
//! - [`Drawing::update`] pushes transforms down and bounding boxes up, and schedules cache moves;
//! - [`Drawing::render`] paints into a [`crate::DrawContext`], reusing cached pixels where clean.
//!
//! [`Drawing::pick`] is a read-only geometric query over the same tree.

mod desc;
mod drawing;
mod item;
mod pattern;
mod pick;
mod render;
mod shape;
mod update;

pub use desc::{ItemDesc, ItemDescKind, PaintDesc, PatternDesc, ShapeDesc, StrokeDesc};
pub use drawing::Drawing;
pub use item::{ItemId, ItemKindTag, ViewKey};
pub use pattern::{Overflow, PatternUnits};
pub use shape::{ShapeData, ShapePaint, ShapeStroke};

use bitflags::bitflags;

bitflags! {
    /// Per-item derived state that can be independently valid or stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        /// Bounding boxes and drawbox.
        const BBOX = 1 << 0;
        /// Cache scoring and scheduled cache relocation.
        const CACHE = 1 << 1;
        /// Pick geometry.
        const PICK = 1 << 2;
        /// The item's current area was reported for repainting.
        const RENDER = 1 << 3;
        const ALL = Self::BBOX.bits() | Self::CACHE.bits() | Self::PICK.bits() | Self::RENDER.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u8 {
        /// Neither read nor write item caches.
        const BYPASS_CACHE = 1 << 0;
        /// Render without clip, mask or opacity (backdrop for a filtered descendant).
        const FILTER_BACKGROUND = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PickFlags: u8 {
        /// Consider invisible and insensitive items too.
        const STICKY = 1 << 0;
        /// Picking inside a clip path: fill geometry only, no stroke tolerance.
        const AS_CLIP = 1 << 1;
    }
}

/// Whether a render pass ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Ok,
    /// Rendering halted at the requested stop item.
    Stop,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Normal,
    /// Hairline outlines of geometric boxes; caches, clips and masks are drawn as outlines.
    Outline,
}
