//! Strata is a retained-mode scene graph renderer and compositor for the CPU.
//!
//! The crate is layered bottom-up:
//!
//! - [`compose`]: exact 8-bit pixel kernels (source-over, copy, masks, alpha scaling)
//! - [`Surface`] and [`CacheSurface`]: pixel buffers placed in logical space, and buffers that
//!   remember which of their pixels are clean
//! - [`DrawContext`]: a stateful drawing cursor over a surface
//! - [`Drawing`]: the item tree with its update, render and pick passes, pattern tiles included
#![forbid(unsafe_code)]

mod foundation;
mod raster;

pub mod compose;
mod context;
/// PNG export and cache visualization helpers.
pub mod diag;
mod scene;
mod surface;

pub use crate::foundation::core::{Affine, BezPath, IntRect, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::core::{intersect_opt, union_opt};
pub use crate::foundation::error::{StrataError, StrataResult};
pub use crate::foundation::math::{demultiply, expansion, premultiply};
pub use crate::foundation::opts::{DrawingOpts, PatternOpts, PoolOpts};

pub use crate::context::{
    DrawContext, FillRule, LineCap, LineJoin, LineStyle, Operator, PatternPaint, Save, TileExtend,
};
pub use crate::scene::{
    Drawing, ItemDesc, ItemDescKind, ItemId, ItemKindTag, Overflow, PaintDesc, PatternDesc,
    PatternUnits, PickFlags, RenderFlags, RenderMode, RenderStatus, ShapeData, ShapeDesc,
    ShapePaint, ShapeStroke, StateFlags, StrokeDesc, ViewKey,
};
pub use crate::surface::Surface;
pub use crate::surface::cache::{CacheState, CacheSurface};
pub use crate::surface::pool::PoolStats;
pub use crate::surface::region::Region;
