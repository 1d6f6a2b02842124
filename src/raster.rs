//! Glue between our geometry types and the `vello_cpu` rasterizer.

use crate::foundation::core::{Affine, BezPath};
use crate::foundation::error::{StrataError, StrataResult};

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Checks that `width x height` fits the rasterizer's u16 pixmap dimensions.
pub(crate) fn pixmap_dims(width: u32, height: u32) -> StrataResult<(u16, u16)> {
    let w: u16 = width
        .try_into()
        .map_err(|_| StrataError::surface(format!("pixmap width {width} exceeds u16")))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| StrataError::surface(format!("pixmap height {height} exceeds u16")))?;
    Ok((w, h))
}

pub(crate) fn clear_pixmap_to_transparent(pixmap: &mut vello_cpu::Pixmap) {
    pixmap.data_as_u8_slice_mut().fill(0);
}

/// Image paint over a shared pixmap.
pub(crate) fn image_paint(
    pixmap: std::sync::Arc<vello_cpu::Pixmap>,
    extend: vello_cpu::peniko::Extend,
    quality: vello_cpu::peniko::ImageQuality,
) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(pixmap),
        sampler: vello_cpu::peniko::ImageSampler {
            x_extend: extend,
            y_extend: extend,
            quality,
            ..vello_cpu::peniko::ImageSampler::default()
        },
    }
}
