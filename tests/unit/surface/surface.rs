use super::*;

fn near(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn logical_rect_round_trips_through_pixels() {
    let cases = [
        (Rect::new(0.0, 0.0, 10.0, 5.0), (40, 20)),
        (Rect::new(-3.25, 7.5, 9.0, 8.75), (49, 5)),
        (Rect::new(100.0, 100.0, 101.0, 133.0), (3, 1000)),
    ];
    for (r, (w, h)) in cases {
        let s = Surface::from_logical(r, w, h).unwrap();
        let a = s.area();
        assert!(near(a.x0, r.x0) && near(a.y0, r.y0), "{r:?}");
        assert!(near(a.x1, r.x1) && near(a.y1, r.y1), "{r:?}");
        assert_eq!((s.pixel_width(), s.pixel_height()), (w, h));
        let pa = s.pixel_area();
        assert_eq!(pa.min(), (r.x0.round() as i32, r.y0.round() as i32));
        assert_eq!((pa.width(), pa.height()), (w, h));
        // The logical corners land on the pixel corners.
        let far = s.drawing_transform() * Point::new(r.x1, r.y1);
        assert!(near(far.x, f64::from(w)) && near(far.y, f64::from(h)));
    }
}

#[test]
fn pixel_rect_surface_is_one_to_one() {
    let area = IntRect::new(-4, 10, 12, 18);
    let s = Surface::new(area).unwrap();
    assert_eq!(s.pixel_area(), area);
    assert_eq!(s.area(), area.to_rect());
    assert_eq!(s.drawing_transform() * Point::new(-4.0, 10.0), Point::ZERO);
}

#[test]
fn device_scale_multiplies_pixels_only() {
    let area = IntRect::new(2, 3, 12, 8);
    let s = Surface::with_device_scale(area, 2).unwrap();
    assert_eq!((s.pixel_width(), s.pixel_height()), (20, 10));
    assert_eq!(s.pixel_area(), area);
    assert_eq!(s.area(), area.to_rect());
    assert!(Surface::with_device_scale(area, 0).is_err());
}

#[test]
fn storage_is_allocated_lazily() {
    let mut s = Surface::new(IntRect::new(0, 0, 8, 8)).unwrap();
    assert!(!s.is_allocated());
    assert_eq!(s.pixel(3, 3), Some([0, 0, 0, 0]));
    {
        let _dc = s.context();
    }
    assert!(s.is_allocated());
    s.drop_contents();
    assert!(!s.is_allocated());
    assert_eq!(s.pixel_area(), IntRect::new(0, 0, 8, 8));
}

#[test]
fn empty_surfaces_never_allocate() {
    let mut s = Surface::new(IntRect::new(5, 5, 5, 9)).unwrap();
    assert!(s.is_empty());
    {
        let mut dc = s.context();
        dc.set_source_rgba(crate::foundation::core::Rgba8::opaque(255, 0, 0));
        dc.paint(1.0);
    }
    assert!(!s.is_allocated());
    assert!(s.pixels_mut().is_none());
}

#[test]
fn oversized_surfaces_are_rejected() {
    let err = Surface::new(IntRect::new(0, 0, 70_000, 10)).unwrap_err();
    assert!(err.to_string().contains("surface error:"));
    assert!(Surface::from_logical(Rect::new(0.0, 0.0, 0.0, 1.0), 4, 4).is_err());
}

#[test]
fn context_flag_tracks_binding() {
    let mut s = Surface::new(IntRect::new(0, 0, 4, 4)).unwrap();
    assert!(!s.has_context());
    {
        let dc = s.context();
        assert!(dc.surface().has_context());
    }
    assert!(!s.has_context());
}

#[test]
fn into_pixmap_survives_shared_storage() {
    let mut s = Surface::new(IntRect::new(0, 0, 2, 2)).unwrap();
    s.pixels_mut().unwrap().row_mut(0)[..4].copy_from_slice(&[1, 2, 3, 4]);
    let shared = s.shared_pixmap().unwrap();
    let p = s.into_pixmap().unwrap();
    assert_eq!(&p.data_as_u8_slice()[..4], &[1, 2, 3, 4]);
    assert_eq!(&shared.data_as_u8_slice()[..4], &[1, 2, 3, 4]);
}
