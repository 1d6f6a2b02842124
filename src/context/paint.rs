use crate::compose::{PixelFormat, PixelsRef};
use crate::foundation::core::{Affine, IntRect};
use crate::surface::Surface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How drawn pixels combine with what is already on the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Over,
    /// Replace the destination inside the drawn shape.
    Source,
    /// Erase the destination inside the drawn shape.
    Clear,
    Multiply,
    Screen,
    Darken,
    Lighten,
}

impl Operator {
    pub(crate) fn blend_mode(self) -> Option<vello_cpu::peniko::BlendMode> {
        use vello_cpu::peniko::{BlendMode, Compose, Mix};
        let mix = match self {
            Operator::Over | Operator::Source | Operator::Clear => return None,
            Operator::Multiply => Mix::Multiply,
            Operator::Screen => Mix::Screen,
            Operator::Darken => Mix::Darken,
            Operator::Lighten => Mix::Lighten,
        };
        Some(BlendMode::new(mix, Compose::SrcOver))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub(crate) fn to_cpu(self) -> vello_cpu::peniko::Fill {
        match self {
            FillRule::NonZero => vello_cpu::peniko::Fill::NonZero,
            FillRule::EvenOdd => vello_cpu::peniko::Fill::EvenOdd,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Stroke geometry in user units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineStyle {
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 4.0,
        }
    }
}

impl LineStyle {
    pub fn with_width(width: f64) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    pub(crate) fn to_cpu(self) -> vello_cpu::kurbo::Stroke {
        use vello_cpu::kurbo::{Cap, Join, Stroke};
        let cap = match self.cap {
            LineCap::Butt => Cap::Butt,
            LineCap::Round => Cap::Round,
            LineCap::Square => Cap::Square,
        };
        let join = match self.join {
            LineJoin::Miter => Join::Miter,
            LineJoin::Round => Join::Round,
            LineJoin::Bevel => Join::Bevel,
        };
        let mut s = Stroke::new(self.width);
        s.start_cap = cap;
        s.end_cap = cap;
        s.join = join;
        s.miter_limit = self.miter_limit;
        s
    }
}

/// Edge behavior of a pattern tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileExtend {
    Repeat,
    /// Transparent outside the tile.
    None,
}

/// A rendered pattern tile ready to be used as a paint source.
///
/// `tile_to_user` maps tile pixel coordinates into the user space of whatever the pattern fills;
/// it absorbs both the oversampling factor and the pattern-to-user transform.
#[derive(Clone, Debug)]
pub struct PatternPaint {
    pixels: Arc<vello_cpu::Pixmap>,
    tile_to_user: Affine,
    extend: TileExtend,
}

impl PatternPaint {
    pub(crate) fn from_surface(
        surface: Surface,
        tile_to_user: Affine,
        extend: TileExtend,
    ) -> Option<Self> {
        let (w, h) = (surface.pixel_width(), surface.pixel_height());
        let pixels = match surface.into_pixmap() {
            Some(p) => p,
            None => vello_cpu::Pixmap::new(w.try_into().ok()?, h.try_into().ok()?),
        };
        Some(Self {
            pixels: Arc::new(pixels),
            tile_to_user,
            extend,
        })
    }

    pub fn tile_to_user(&self) -> Affine {
        self.tile_to_user
    }

    pub fn extend(&self) -> TileExtend {
        self.extend
    }

    /// Tile size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (
            u32::from(self.pixels.width()),
            u32::from(self.pixels.height()),
        )
    }

    pub fn bounds(&self) -> IntRect {
        let (w, h) = self.size();
        IntRect::from_xywh(0, 0, w, h)
    }

    /// Premultiplied tile pixels.
    pub fn pixels(&self) -> PixelsRef<'_> {
        let (w, h) = self.size();
        // A pixmap's buffer always matches its own dimensions.
        PixelsRef::packed(
            self.pixels.data_as_u8_slice(),
            w,
            h,
            PixelFormat::Rgba8Premul,
        )
        .unwrap_or_else(|_| PixelsRef::empty())
    }

    pub(crate) fn shared_pixmap(&self) -> Arc<vello_cpu::Pixmap> {
        Arc::clone(&self.pixels)
    }
}
