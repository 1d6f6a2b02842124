use super::*;

fn disjoint(r: &Region) -> bool {
    let rs = r.rects();
    rs.iter()
        .enumerate()
        .all(|(i, a)| rs[i + 1..].iter().all(|b| !a.intersects(b)))
}

#[test]
fn union_of_overlapping_rects_counts_pixels_once() {
    let mut r = Region::from_rect(IntRect::new(0, 0, 10, 10));
    r.union_rect(IntRect::new(5, 5, 15, 15));
    assert_eq!(r.area(), 100 + 100 - 25);
    assert!(disjoint(&r));
    assert_eq!(r.bounds(), Some(IntRect::new(0, 0, 15, 15)));
}

#[test]
fn subtract_punches_a_hole() {
    let mut r = Region::from_rect(IntRect::new(0, 0, 10, 10));
    r.subtract_rect(&IntRect::new(3, 3, 6, 6));
    assert_eq!(r.area(), 91);
    assert!(!r.contains(4, 4));
    assert!(r.contains(0, 0) && r.contains(9, 9) && r.contains(6, 4));
    assert!(disjoint(&r));
}

#[test]
fn adjacent_rects_coalesce() {
    let mut r = Region::new();
    r.union_rect(IntRect::new(0, 0, 5, 4));
    r.union_rect(IntRect::new(5, 0, 9, 4));
    r.union_rect(IntRect::new(0, 4, 9, 6));
    assert_eq!(r.rects(), &[IntRect::new(0, 0, 9, 6)]);
}

#[test]
fn equality_is_set_equality() {
    let mut a = Region::from_rect(IntRect::new(0, 0, 4, 2));
    a.union_rect(IntRect::new(0, 2, 2, 4));
    let mut b = Region::from_rect(IntRect::new(0, 0, 2, 4));
    b.union_rect(IntRect::new(2, 0, 4, 2));
    assert_eq!(a, b);
    b.subtract_rect(&IntRect::new(3, 1, 4, 2));
    assert_ne!(a, b);
}

#[test]
fn intersect_with_region() {
    let mut a = Region::from_rect(IntRect::new(0, 0, 10, 10));
    let mut b = Region::from_rect(IntRect::new(-5, -5, 2, 2));
    b.union_rect(IntRect::new(8, 8, 20, 20));
    a.intersect(&b);
    assert_eq!(a.area(), 4 + 4);
    assert!(a.contains(1, 1) && a.contains(9, 9) && !a.contains(5, 5));
}

#[test]
fn translate_moves_every_rect() {
    let mut r = Region::from_rect(IntRect::new(0, 0, 2, 2));
    r.union_rect(IntRect::new(4, 4, 6, 6));
    r.translate(10, -1);
    assert!(r.contains(10, -1) && r.contains(15, 4));
    assert!(!r.contains(0, 0));
}

#[test]
fn contains_rect_checks_full_coverage() {
    let mut r = Region::from_rect(IntRect::new(0, 0, 5, 10));
    r.union_rect(IntRect::new(5, 0, 10, 5));
    assert!(r.contains_rect(&IntRect::new(2, 2, 8, 4)));
    assert!(!r.contains_rect(&IntRect::new(2, 2, 8, 6)));
}

#[test]
fn union_of_covered_rect_is_noop() {
    let mut r = Region::from_rect(IntRect::new(0, 0, 10, 10));
    let before = r.clone();
    r.union_rect(IntRect::new(2, 2, 4, 4));
    assert_eq!(r.rects(), before.rects());
}

#[test]
fn empty_operands() {
    let mut r = Region::from_rect(IntRect::new(3, 3, 3, 8));
    assert!(r.is_empty());
    r.union_rect(IntRect::new(0, 0, 0, 0));
    assert!(r.is_empty());
    assert_eq!(r.bounds(), None);
    assert_eq!(r, Region::new());
}
