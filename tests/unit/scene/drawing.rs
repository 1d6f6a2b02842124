use super::*;
use crate::context::LineStyle;
use crate::foundation::core::Rgba8;
use crate::surface::Surface;
use kurbo::Shape as _;

const RED: Rgba8 = Rgba8::opaque(255, 0, 0);
const BLUE: Rgba8 = Rgba8::opaque(0, 0, 255);
const CLEAR: Option<[u8; 4]> = Some([0, 0, 0, 0]);

fn drawing() -> Drawing {
    Drawing::new(DrawingOpts::default()).unwrap()
}

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
    Rect::new(x0, y0, x1, y1).to_path(0.1)
}

fn filled(d: &mut Drawing, path: BezPath, color: Rgba8) -> ItemId {
    d.new_shape(ShapeData::new(path).with_fill(ShapePaint::Color(color)))
        .unwrap()
}

/// A root group holding `children` in order.
fn root_of(d: &mut Drawing, children: &[ItemId]) -> ItemId {
    let g = d.new_group();
    for c in children {
        d.append_child(g, *c).unwrap();
    }
    d.set_root(Some(g)).unwrap();
    g
}

fn update(d: &mut Drawing) {
    d.update(
        IntRect::infinite(),
        Affine::IDENTITY,
        StateFlags::ALL,
        StateFlags::empty(),
    );
}

fn render(d: &mut Drawing, area: IntRect) -> Surface {
    let mut s = Surface::new(area).unwrap();
    {
        let mut dc = s.context();
        d.render(&mut dc, area, RenderFlags::empty());
    }
    s
}

#[test]
fn group_bbox_is_the_union_of_visible_children() {
    let mut d = drawing();
    let a = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let b = filled(&mut d, rect(20.0, 5.0, 30.0, 15.0), RED);
    let g = root_of(&mut d, &[a, b]);
    update(&mut d);
    assert_eq!(d.geometric_bbox(g), Some(IntRect::new(0, 0, 30, 15)));
    assert_eq!(d.visual_bbox(g), Some(IntRect::new(0, 0, 30, 15)));
    assert_eq!(d.state(g), StateFlags::ALL);

    d.set_visible(b, false).unwrap();
    assert!(!d.state(g).contains(StateFlags::BBOX));
    update(&mut d);
    assert_eq!(d.geometric_bbox(g), Some(IntRect::new(0, 0, 10, 10)));
}

#[test]
fn stroke_grows_the_visual_box_only() {
    let mut d = drawing();
    let s = d
        .new_shape(
            ShapeData::new(rect(10.0, 10.0, 20.0, 20.0))
                .with_stroke(ShapePaint::Color(RED), LineStyle::with_width(2.0)),
        )
        .unwrap();
    root_of(&mut d, &[s]);
    update(&mut d);
    let geometric = d.geometric_bbox(s).unwrap();
    let visual = d.visual_bbox(s).unwrap();
    assert_eq!(geometric, IntRect::new(10, 10, 20, 20));
    assert!(visual.contains_rect(&geometric));
    assert!(visual.area() > geometric.area());
}

#[test]
fn stroked_line_has_visual_bounds_without_area() {
    let mut d = drawing();
    let mut line = BezPath::new();
    line.move_to((0.0, 10.0));
    line.line_to((100.0, 10.0));
    let s = d
        .new_shape(ShapeData::new(line).with_stroke(ShapePaint::Color(RED), LineStyle::with_width(4.0)))
        .unwrap();
    root_of(&mut d, &[s]);
    update(&mut d);
    assert_eq!(d.geometric_bbox(s), None);
    assert!(d.visual_bbox(s).unwrap().contains_rect(&IntRect::new(0, 8, 100, 12)));
}

#[test]
fn transforms_compose_parent_first() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 5.0, 5.0), RED);
    d.set_transform(s, Some(Affine::translate((1.0, 1.0)))).unwrap();
    let g = root_of(&mut d, &[s]);
    d.set_transform(g, Some(Affine::translate((10.0, 0.0)))).unwrap();
    d.set_child_transform(g, Some(Affine::scale(2.0))).unwrap();
    update(&mut d);
    assert_eq!(d.geometric_bbox(s), Some(IntRect::new(12, 2, 22, 12)));
    assert_eq!(d.ctm(s).unwrap() * Point::ZERO, Point::new(12.0, 2.0));
}

#[test]
fn identity_transform_is_stored_as_none() {
    let mut d = drawing();
    let g = d.new_group();
    d.set_transform(g, Some(Affine::IDENTITY)).unwrap();
    assert_eq!(d.transform(g), None);
}

#[test]
fn moving_an_item_damages_old_and_new_areas() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 4.0, 4.0), RED);
    root_of(&mut d, &[s]);
    update(&mut d);
    assert!(d.take_damage().contains_rect(&IntRect::new(0, 0, 4, 4)));

    d.set_transform(s, Some(Affine::translate((10.0, 0.0)))).unwrap();
    update(&mut d);
    let damage = d.take_damage();
    assert!(damage.contains_rect(&IntRect::new(0, 0, 4, 4)));
    assert!(damage.contains_rect(&IntRect::new(10, 0, 14, 4)));
    assert!(!damage.contains(6, 2));
    assert!(d.damage().is_empty());
}

#[test]
fn root_transform_change_resets_everything() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 4.0, 4.0), RED);
    root_of(&mut d, &[s]);
    update(&mut d);
    d.update(
        IntRect::infinite(),
        Affine::translate((5.0, 5.0)),
        StateFlags::ALL,
        StateFlags::empty(),
    );
    assert_eq!(d.geometric_bbox(s), Some(IntRect::new(5, 5, 9, 9)));
}

#[test]
fn stale_handles_are_rejected() {
    let mut d = drawing();
    let a = d.new_group();
    d.destroy(a).unwrap();
    assert!(!d.contains(a));
    assert!(d.set_opacity(a, 0.5).is_err());
    assert!(d.destroy(a).is_err());

    let b = d.new_group();
    assert_ne!(a, b);
    assert!(d.contains(b));
    assert_eq!(d.len(), 1);
}

#[test]
fn destroy_frees_the_whole_subtree() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 4.0, 4.0), RED);
    let clip = d.new_shape(ShapeData::new(rect(0.0, 0.0, 2.0, 2.0))).unwrap();
    d.set_clip(s, Some(clip)).unwrap();
    let g = root_of(&mut d, &[s]);
    assert_eq!(d.len(), 3);
    d.destroy(g).unwrap();
    assert!(d.is_empty());
    assert_eq!(d.root(), None);
}

#[test]
fn attaching_rejects_cycles_and_second_parents() {
    let mut d = drawing();
    let g1 = d.new_group();
    let g2 = d.new_group();
    d.append_child(g1, g2).unwrap();
    assert!(d.append_child(g2, g1).is_err());
    assert!(d.append_child(g1, g1).is_err());

    let g3 = d.new_group();
    assert!(d.append_child(g3, g2).is_err());
    assert!(d.set_root(Some(g2)).is_err());

    d.unlink(g2).unwrap();
    assert_eq!(d.parent(g2), None);
    assert!(d.children(g1).is_empty());
    d.append_child(g3, g2).unwrap();
    assert_eq!(d.children(g3), &[g2]);
}

#[test]
fn shapes_cannot_have_children() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 4.0, 4.0), RED);
    let g = d.new_group();
    assert!(d.append_child(s, g).is_err());
    assert_eq!(d.parent(g), None);
}

#[test]
fn insert_child_clamps_the_index() {
    let mut d = drawing();
    let g = d.new_group();
    let a = d.new_group();
    let b = d.new_group();
    let c = d.new_group();
    d.append_child(g, a).unwrap();
    d.insert_child(g, 99, b).unwrap();
    d.insert_child(g, 0, c).unwrap();
    assert_eq!(d.children(g), &[c, a, b]);
}

#[test]
fn clip_narrows_the_drawbox() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    let clip = d.new_shape(ShapeData::new(rect(15.0, 15.0, 30.0, 30.0))).unwrap();
    d.set_clip(s, Some(clip)).unwrap();
    root_of(&mut d, &[s]);
    update(&mut d);
    assert_eq!(d.visual_bbox(s), Some(IntRect::new(0, 0, 20, 20)));
    assert_eq!(d.drawbox(s), Some(IntRect::new(15, 15, 20, 20)));

    d.set_render_mode(RenderMode::Outline);
    update(&mut d);
    assert_eq!(d.visual_bbox(s), Some(IntRect::new(0, 0, 30, 30)));
    assert_eq!(d.drawbox(s), d.visual_bbox(s));
}

#[test]
fn replacing_a_clip_destroys_the_old_one() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    let c1 = d.new_shape(ShapeData::new(rect(0.0, 0.0, 5.0, 5.0))).unwrap();
    let c2 = d.new_shape(ShapeData::new(rect(0.0, 0.0, 8.0, 8.0))).unwrap();
    d.set_clip(s, Some(c1)).unwrap();
    d.set_clip(s, Some(c2)).unwrap();
    assert!(!d.contains(c1));
    assert_eq!(d.clip(s), Some(c2));
    assert_eq!(d.parent(c2), Some(s));
}

#[test]
fn pick_returns_the_group_unless_it_picks_children() {
    let mut d = drawing();
    let a = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let b = filled(&mut d, rect(5.0, 5.0, 15.0, 15.0), BLUE);
    let g = root_of(&mut d, &[a, b]);
    update(&mut d);

    assert_eq!(d.pick(Point::new(7.5, 7.5), 0.0, PickFlags::empty()), Some(g));
    d.set_pick_children(g, true).unwrap();
    assert_eq!(d.pick(Point::new(7.5, 7.5), 0.0, PickFlags::empty()), Some(a));
    assert_eq!(d.pick(Point::new(12.5, 12.5), 0.0, PickFlags::empty()), Some(b));
    assert_eq!(d.pick(Point::new(50.0, 50.0), 0.0, PickFlags::empty()), None);
}

#[test]
fn pick_skips_hidden_and_insensitive_items_unless_sticky() {
    let mut d = drawing();
    let a = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let g = root_of(&mut d, &[a]);
    d.set_pick_children(g, true).unwrap();
    update(&mut d);
    let p = Point::new(5.0, 5.0);

    d.set_sensitive(a, false).unwrap();
    assert_eq!(d.pick(p, 0.0, PickFlags::empty()), None);
    assert_eq!(d.pick(p, 0.0, PickFlags::STICKY), Some(a));

    d.set_sensitive(a, true).unwrap();
    d.set_visible(a, false).unwrap();
    update(&mut d);
    assert_eq!(d.pick(p, 0.0, PickFlags::empty()), None);
}

#[test]
fn pick_requires_an_update() {
    let mut d = drawing();
    let a = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    root_of(&mut d, &[a]);
    assert_eq!(d.pick(Point::new(5.0, 5.0), 0.0, PickFlags::empty()), None);
}

#[test]
fn pick_honours_the_clip() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    let clip = d.new_shape(ShapeData::new(rect(0.0, 0.0, 10.0, 10.0))).unwrap();
    d.set_clip(s, Some(clip)).unwrap();
    let g = root_of(&mut d, &[s]);
    d.set_pick_children(g, true).unwrap();
    update(&mut d);
    assert_eq!(d.pick(Point::new(5.0, 5.0), 0.0, PickFlags::empty()), Some(s));
    assert_eq!(d.pick(Point::new(15.0, 15.0), 0.0, PickFlags::empty()), None);
}

#[test]
fn stroke_pick_uses_half_width_and_tolerance() {
    let mut d = drawing();
    let mut line = BezPath::new();
    line.move_to((0.0, 10.0));
    line.line_to((100.0, 10.0));
    let s = d
        .new_shape(ShapeData::new(line).with_stroke(ShapePaint::Color(RED), LineStyle::with_width(4.0)))
        .unwrap();
    let g = root_of(&mut d, &[s]);
    d.set_pick_children(g, true).unwrap();
    update(&mut d);

    assert_eq!(d.pick(Point::new(50.0, 11.5), 0.0, PickFlags::empty()), Some(s));
    assert_eq!(d.pick(Point::new(50.0, 14.0), 0.0, PickFlags::empty()), None);
    assert_eq!(d.pick(Point::new(50.0, 14.0), 2.5, PickFlags::empty()), Some(s));
}

#[test]
fn unfilled_unstroked_shape_is_not_pickable() {
    let mut d = drawing();
    let s = d.new_shape(ShapeData::new(rect(0.0, 0.0, 10.0, 10.0))).unwrap();
    let g = root_of(&mut d, &[s]);
    d.set_pick_children(g, true).unwrap();
    update(&mut d);
    assert_eq!(d.pick(Point::new(5.0, 5.0), 1.0, PickFlags::empty()), None);
}

fn cache_opts(budget: usize) -> DrawingOpts {
    DrawingOpts {
        cache_budget_bytes: budget,
        cache_score_threshold: 1.0,
        ..DrawingOpts::default()
    }
}

#[test]
fn cache_selection_takes_best_scores_within_budget() {
    // Group: 700 px (2800 bytes), big: 400 px (1600 bytes), small: 25 px (100 bytes).
    let mut d = Drawing::new(cache_opts(4400)).unwrap();
    let big = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    let small = filled(&mut d, rect(30.0, 0.0, 35.0, 5.0), RED);
    let g = root_of(&mut d, &[big, small]);
    update(&mut d);
    assert!(d.is_cached(g));
    assert!(d.is_cached(big));
    assert!(!d.is_cached(small));
    assert_eq!(d.cached_items().len(), 2);
}

#[test]
fn score_threshold_filters_candidates() {
    let mut d = Drawing::new(DrawingOpts::default()).unwrap();
    let s = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    root_of(&mut d, &[s]);
    update(&mut d);
    assert!(d.cached_items().is_empty());
}

#[test]
fn persistent_cache_survives_selection() {
    let mut d = Drawing::new(cache_opts(4400)).unwrap();
    let big = filled(&mut d, rect(0.0, 0.0, 20.0, 20.0), RED);
    let small = filled(&mut d, rect(30.0, 0.0, 35.0, 5.0), RED);
    let g = root_of(&mut d, &[big, small]);
    d.set_cached(small, true).unwrap();
    update(&mut d);

    d.set_cache_budget(0);
    update(&mut d);
    assert!(!d.is_cached(g));
    assert!(!d.is_cached(big));
    assert!(d.is_cached(small));

    d.set_cached(small, false).unwrap();
    assert!(d.cache(small).is_none());
}

#[test]
fn cache_limit_bounds_cache_rects() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 100.0, 100.0), RED);
    root_of(&mut d, &[s]);
    d.set_cache_limit(Some(IntRect::new(0, 0, 10, 10)));
    update(&mut d);
    assert_eq!(d.cache_rect(s), Some(IntRect::new(0, 0, 10, 10)));
    assert_eq!(d.cache_score(s), Some(100.0));
}

#[test]
fn cached_group_is_stored_then_served() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let g = root_of(&mut d, &[s]);
    d.set_cached(g, true).unwrap();
    update(&mut d);
    let area = IntRect::new(0, 0, 20, 20);

    let first = render(&mut d, area);
    assert_eq!(first.pixel(5, 5), Some([255, 0, 0, 255]));
    assert_eq!(first.pixel(15, 5), CLEAR);
    let cache = d.cache(g).unwrap();
    assert_eq!(cache.clean_region().area(), 100);
    assert!(d.cache_bytes() >= 400);

    update(&mut d);
    let second = render(&mut d, area);
    assert_eq!(second.pixel(5, 5), Some([255, 0, 0, 255]));
    assert_eq!(second.pixel(15, 5), CLEAR);
}

#[test]
fn changing_a_child_dirties_the_ancestor_cache() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let g = root_of(&mut d, &[s]);
    d.set_cached(g, true).unwrap();
    update(&mut d);
    let area = IntRect::new(0, 0, 20, 20);
    render(&mut d, area);

    d.set_fill(s, Some(ShapePaint::Color(BLUE))).unwrap();
    assert!(d.cache(g).unwrap().clean_region().is_empty());
    update(&mut d);
    let out = render(&mut d, area);
    assert_eq!(out.pixel(5, 5), Some([0, 0, 255, 255]));
    assert_eq!(d.cache(g).unwrap().clean_region().area(), 100);
}

#[test]
fn panned_cached_group_renders_at_the_new_place() {
    let mut d = drawing();
    let s = filled(&mut d, rect(0.0, 0.0, 10.0, 10.0), RED);
    let g = root_of(&mut d, &[s]);
    d.set_cached(g, true).unwrap();
    update(&mut d);
    let area = IntRect::new(0, 0, 20, 20);
    render(&mut d, area);

    d.update(
        IntRect::infinite(),
        Affine::translate((3.0, 0.0)),
        StateFlags::ALL,
        StateFlags::empty(),
    );
    assert_eq!(d.cache(g).unwrap().state(), crate::surface::cache::CacheState::PendingRelocation);
    let out = render(&mut d, area);
    assert_eq!(out.pixel(2, 5), CLEAR);
    assert_eq!(out.pixel(3, 5), Some([255, 0, 0, 255]));
    assert_eq!(out.pixel(12, 5), Some([255, 0, 0, 255]));
    assert_eq!(out.pixel(13, 5), CLEAR);
    assert_eq!(d.cache(g).unwrap().pixel_area(), IntRect::new(3, 0, 13, 10));
}

#[test]
fn show_builds_a_keyed_tree_and_hide_removes_it() {
    let mut d = drawing();
    let desc = crate::scene::ItemDesc::group(vec![
        crate::scene::ItemDesc::shape(
            crate::scene::ShapeDesc::rect(Rect::new(0.0, 0.0, 4.0, 4.0))
                .with_fill(crate::scene::PaintDesc::Color(RED)),
        ),
        crate::scene::ItemDesc::shape(crate::scene::ShapeDesc::new("M0,0 L8,0 L8,8 Z")),
    ]);
    let top = d.show(ViewKey(7), &desc, None).unwrap();
    assert_eq!(d.key(top), Some(ViewKey(7)));
    assert_eq!(d.children(top).len(), 2);
    assert_eq!(d.kind(d.children(top)[0]), Some(ItemKindTag::Shape));

    assert_eq!(d.hide(ViewKey(3)), 0);
    assert_eq!(d.hide(ViewKey(7)), 1);
    assert!(d.is_empty());
}

#[test]
fn show_rejects_invalid_descriptions() {
    let mut d = drawing();
    let bad_path = crate::scene::ItemDesc::shape(crate::scene::ShapeDesc::new("M0,0 Q"));
    assert!(d.show(ViewKey(0), &bad_path, None).is_err());
    let bad_opacity =
        crate::scene::ItemDesc::group(Vec::new()).with_opacity(1.5);
    assert!(d.show(ViewKey(0), &bad_opacity, None).is_err());
    assert!(d.is_empty());
}

#[test]
fn discarding_new_items_frees_only_their_subtrees() {
    let mut d = drawing();
    let kept = filled(&mut d, rect(0.0, 0.0, 4.0, 4.0), RED);
    let stray = d.new_group();
    let before: std::collections::HashSet<ItemId> = d.live_ids().into_iter().collect();

    let tile = d.new_pattern(Rect::new(0.0, 0.0, 4.0, 4.0));
    let painted = d
        .new_shape(ShapeData::new(rect(0.0, 0.0, 8.0, 8.0)).with_fill(ShapePaint::Pattern {
            pattern: tile,
            opacity: 1.0,
        }))
        .unwrap();
    let g = d.new_group();
    d.append_child(g, painted).unwrap();
    let clip = d.new_shape(ShapeData::new(rect(0.0, 0.0, 2.0, 2.0))).unwrap();
    d.set_clip(g, Some(clip)).unwrap();
    let loose = filled(&mut d, rect(0.0, 0.0, 1.0, 1.0), BLUE);
    assert_eq!(d.len(), 7);

    d.discard_new_items(&before);
    assert_eq!(d.len(), 2);
    assert!(d.contains(kept) && d.contains(stray));
    for id in [tile, painted, g, clip, loose] {
        assert!(!d.contains(id));
    }
}
