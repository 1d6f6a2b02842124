use super::*;

fn surface(x0: i32, y0: i32, x1: i32, y1: i32) -> Surface {
    Surface::new(IntRect::new(x0, y0, x1, y1)).unwrap()
}

const RED: Rgba8 = Rgba8::opaque(255, 0, 0);
const BLUE: Rgba8 = Rgba8::opaque(0, 0, 255);

#[test]
fn aligned_fill_uses_exact_kernel_numerics() {
    let mut s = surface(0, 0, 8, 8);
    {
        let mut dc = s.context();
        dc.set_source_rgba(Rgba8::new(255, 0, 0, 128));
        dc.rectangle(Rect::new(2.0, 2.0, 4.0, 4.0));
        dc.fill();
    }
    assert_eq!(s.pixel(2, 2), Some([128, 0, 0, 128]));
    assert_eq!(s.pixel(3, 3), Some([128, 0, 0, 128]));
    assert_eq!(s.pixel(4, 4), Some([0, 0, 0, 0]));
    assert_eq!(s.pixel(1, 2), Some([0, 0, 0, 0]));
}

#[test]
fn geometry_is_logical_not_pixel() {
    let mut s = surface(10, 10, 20, 20);
    {
        let mut dc = s.context();
        dc.set_source_rgba(RED);
        dc.translate(2.0, 0.0);
        dc.rectangle(Rect::new(10.0, 12.0, 11.0, 13.0));
        dc.fill();
        assert_eq!(dc.target_logical_bounds(), Rect::new(10.0, 10.0, 20.0, 20.0));
    }
    assert_eq!(s.pixel(2, 2), Some([255, 0, 0, 255]));
    assert_eq!(s.pixel(0, 2), Some([0, 0, 0, 0]));
}

#[test]
fn scaled_surface_maps_logical_units() {
    let mut s = Surface::from_logical(Rect::new(0.0, 0.0, 2.0, 2.0), 8, 8).unwrap();
    {
        let mut dc = s.context();
        dc.set_source_rgba(BLUE);
        dc.rectangle(Rect::new(1.0, 1.0, 2.0, 2.0));
        dc.fill();
    }
    assert_eq!(s.pixel(4, 4), Some([0, 0, 255, 255]));
    assert_eq!(s.pixel(7, 7), Some([0, 0, 255, 255]));
    assert_eq!(s.pixel(3, 3), Some([0, 0, 0, 0]));
}

#[test]
fn restore_pops_transform_and_source() {
    let mut s = surface(0, 0, 4, 4);
    let mut dc = s.context();
    dc.set_source_rgba(RED);
    dc.save();
    dc.translate(5.0, 5.0);
    dc.set_source_rgba(BLUE);
    dc.set_operator(Operator::Source);
    dc.restore();
    assert_eq!(dc.ctm(), Affine::IDENTITY);
    assert_eq!(dc.operator(), Operator::Over);
    dc.rectangle(Rect::new(0.0, 0.0, 1.0, 1.0));
    dc.fill();
    drop(dc);
    assert_eq!(s.pixel(0, 0), Some([255, 0, 0, 255]));
}

#[test]
fn unbalanced_restore_is_absorbed() {
    let mut s = surface(0, 0, 2, 2);
    let mut dc = s.context();
    dc.translate(1.0, 0.0);
    dc.restore();
    assert_eq!(dc.save_depth(), 0);
    assert_eq!(dc.ctm(), Affine::translate((1.0, 0.0)));
}

fn draw_with_early_exit(dc: &mut DrawContext<'_>, bail: bool) -> Option<()> {
    let mut g = Save::new(dc);
    g.translate(3.0, 3.0);
    if bail {
        return None;
    }
    g.scale(2.0, 2.0);
    Some(())
}

#[test]
fn save_guard_restores_on_every_exit() {
    let mut s = surface(0, 0, 2, 2);
    let mut dc = s.context();
    assert!(draw_with_early_exit(&mut dc, true).is_none());
    assert_eq!((dc.ctm(), dc.save_depth()), (Affine::IDENTITY, 0));
    assert!(draw_with_early_exit(&mut dc, false).is_some());
    assert_eq!((dc.ctm(), dc.save_depth()), (Affine::IDENTITY, 0));
}

#[test]
fn resave_restores_before_saving_again() {
    let mut s = surface(0, 0, 2, 2);
    let mut dc = s.context();
    {
        let mut g = Save::new(&mut dc);
        g.translate(1.0, 1.0);
        g.resave();
        assert_eq!(g.ctm(), Affine::IDENTITY);
        assert_eq!(g.save_depth(), 1);
    }
    assert_eq!(dc.save_depth(), 0);
}

#[test]
fn dropping_the_context_releases_the_surface() {
    let mut s = surface(0, 0, 2, 2);
    {
        let mut dc = s.context();
        dc.save();
        dc.save();
        assert!(dc.surface().has_context());
    }
    assert!(!s.has_context());
    let dc = s.context();
    assert!(dc.surface().has_context());
}

#[test]
fn integer_placed_surface_copies_bytes_exactly() {
    let mut src = surface(0, 0, 4, 4);
    {
        let mut dc = src.context();
        dc.set_source_rgba(Rgba8::new(10, 200, 30, 77));
        dc.paint(1.0);
    }
    let expected = src.pixel(0, 0);
    let mut dst = surface(-2, -2, 6, 6);
    {
        let mut dc = dst.context();
        dc.blend_surface(&src, 1.0);
    }
    assert_eq!(dst.pixel(2, 2), expected);
    assert_eq!(dst.pixel(5, 5), expected);
    assert_eq!(dst.pixel(1, 1), Some([0, 0, 0, 0]));
    assert_eq!(dst.pixel(6, 6), Some([0, 0, 0, 0]));
}

#[test]
fn source_and_clear_operators_replace_coverage() {
    let mut s = surface(0, 0, 4, 1);
    let mut dc = s.context();
    dc.set_source_rgba(RED);
    dc.paint(1.0);
    dc.set_operator(Operator::Source);
    dc.set_source_rgba(Rgba8::new(0, 0, 255, 51));
    dc.rectangle(Rect::new(0.0, 0.0, 1.0, 1.0));
    dc.fill();
    dc.set_operator(Operator::Clear);
    dc.rectangle(Rect::new(1.0, 0.0, 2.0, 1.0));
    dc.fill();
    drop(dc);
    assert_eq!(s.pixel(0, 0), Some([0, 0, 51, 51]));
    assert_eq!(s.pixel(1, 0), Some([0, 0, 0, 0]));
    assert_eq!(s.pixel(2, 0), Some([255, 0, 0, 255]));
}

#[test]
fn clip_confines_paint() {
    let mut s = surface(0, 0, 8, 8);
    {
        let mut dc = s.context();
        dc.rectangle(Rect::new(0.0, 0.0, 4.0, 8.0));
        dc.clip();
        dc.set_source_rgba(RED);
        dc.paint(1.0);
    }
    assert_eq!(s.pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(s.pixel(6, 1), Some([0, 0, 0, 0]));
}

#[test]
fn clip_is_restored_with_state() {
    let mut s = surface(0, 0, 8, 8);
    {
        let mut dc = s.context();
        dc.save();
        dc.rectangle(Rect::new(0.0, 0.0, 1.0, 1.0));
        dc.clip();
        dc.restore();
        dc.set_source_rgba(BLUE);
        dc.paint(1.0);
    }
    assert_eq!(s.pixel(7, 7), Some([0, 0, 255, 255]));
}

#[test]
fn arc_fill_covers_center_only() {
    let mut s = surface(0, 0, 32, 32);
    {
        let mut dc = s.context();
        dc.set_source_rgba(RED);
        dc.arc((16.0, 16.0), 8.0, 0.0, std::f64::consts::TAU);
        dc.close_path();
        dc.fill();
    }
    assert_eq!(s.pixel(16, 16), Some([255, 0, 0, 255]));
    assert_eq!(s.pixel(1, 1), Some([0, 0, 0, 0]));
}

#[test]
fn group_opacity_applies_once() {
    let mut s = surface(0, 0, 4, 4);
    {
        let mut dc = s.context();
        dc.push_group();
        dc.set_source_rgba(RED);
        dc.rectangle(Rect::new(0.0, 0.0, 2.0, 2.0));
        dc.fill();
        // Overlapping fill inside the group does not double the alpha.
        dc.rectangle(Rect::new(1.0, 1.0, 3.0, 3.0));
        dc.fill();
        dc.pop_group_to_source();
        dc.paint(128.0 / 255.0);
    }
    assert_eq!(s.pixel(1, 1), Some([128, 0, 0, 128]));
    assert_eq!(s.pixel(0, 0), Some([128, 0, 0, 128]));
    assert_eq!(s.pixel(3, 3), Some([0, 0, 0, 0]));
}

#[test]
fn unfinished_group_is_discarded_on_drop() {
    let mut s = surface(0, 0, 2, 2);
    {
        let mut dc = s.context();
        dc.set_source_rgba(BLUE);
        dc.paint(1.0);
        dc.push_group();
        dc.set_source_rgba(RED);
        dc.paint(1.0);
    }
    assert_eq!(s.pixel(0, 0), Some([0, 0, 255, 255]));
}

#[test]
fn checkerboard_alternates_cells() {
    let mut s = surface(0, 0, 8, 8);
    {
        let mut dc = s.context();
        dc.set_source_checkerboard(Rgba8::opaque(255, 255, 255), Rgba8::opaque(0, 0, 0), 2);
        dc.paint(1.0);
    }
    assert_eq!(s.pixel(0, 0), Some([255, 255, 255, 255]));
    assert_eq!(s.pixel(2, 0), Some([0, 0, 0, 255]));
    assert_eq!(s.pixel(2, 2), Some([255, 255, 255, 255]));
}

#[test]
fn rect_paths_are_tracked_only_when_pixel_aligned() {
    let mut s = surface(0, 0, 4, 4);
    let mut dc = s.context();
    dc.rectangle(Rect::new(0.0, 0.0, 2.0, 2.0));
    assert!(dc.kernel_rects().is_some());
    dc.rectangle(Rect::new(0.5, 0.0, 2.0, 2.0));
    assert!(dc.kernel_rects().is_none());
    dc.new_path();
    dc.rectangle(Rect::new(0.0, 0.0, 2.0, 2.0));
    dc.rectangle(Rect::new(1.0, 1.0, 3.0, 3.0));
    assert!(dc.kernel_rects().is_none(), "overlapping rects fall back");
}
