use crate::compose::{self, Coverage, PixelsMut, Source};
use crate::foundation::core::{IntRect, Rgba8};
use crate::foundation::error::{StrataError, StrataResult};
use crate::surface::Surface;
use crate::surface::region::Region;
use std::path::Path;

/// Straight-alpha RGBA8 copy of the surface's pixels (transparent if never drawn).
pub fn to_straight_rgba8(surface: &Surface) -> Vec<u8> {
    let (w, h) = (surface.pixel_width(), surface.pixel_height());
    let mut out = vec![0u8; w as usize * h as usize * 4];
    if let Some(px) = surface.pixels() {
        for y in 0..h {
            let row = px.row(y);
            let start = y as usize * w as usize * 4;
            out[start..start + row.len()].copy_from_slice(row);
        }
    }
    compose::demultiply_rgba8_in_place(&mut out);
    out
}

/// Writes the surface as a straight-alpha PNG.
pub fn write_png(surface: &Surface, path: &Path) -> StrataResult<()> {
    let data = to_straight_rgba8(surface);
    image::save_buffer_with_format(
        path,
        &data,
        surface.pixel_width(),
        surface.pixel_height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| StrataError::Other(anyhow::anyhow!("write png '{}': {e}", path.display())))
}

/// Washes `tint` over the parts of `surface` covered by `region`, e.g. to show which areas a
/// cache could serve.
pub fn tint_region(surface: &mut Surface, region: &Region, tint: Rgba8) {
    let origin = surface.pixel_area();
    let ds = surface.device_scale() as i32;
    let Some(mut px) = surface.pixels_mut() else {
        return;
    };
    for r in region.rects() {
        let Some(local) = r.intersect(&origin) else {
            continue;
        };
        let local = local.translate(-origin.x0, -origin.y0);
        let local = IntRect::new(local.x0 * ds, local.y0 * ds, local.x1 * ds, local.y1 * ds);
        if let Some(mut view) = px.view_mut(local) {
            tint_view(&mut view, tint);
        }
    }
}

fn tint_view(view: &mut PixelsMut<'_>, tint: Rgba8) {
    compose::composite(view, &Source::Color(tint), &Coverage::Opacity(255));
}

/// One-line summary of a region, for logs and CLI output.
pub fn describe_region(region: &Region) -> String {
    match region.bounds() {
        Some(IntRect { x0, y0, x1, y1 }) => format!(
            "{} rects, {} px, bounds ({x0},{y0})-({x1},{y1})",
            region.rects().len(),
            region.area()
        ),
        None => "empty".to_string(),
    }
}
