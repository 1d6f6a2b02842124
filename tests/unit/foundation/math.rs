use super::*;

#[test]
fn premultiply_rounds_to_nearest() {
    assert_eq!(premultiply(255, 255), 255);
    assert_eq!(premultiply(255, 0), 0);
    assert_eq!(premultiply(128, 128), 64);
    // 3 * 170 / 255 = 2.0, 1 * 128 / 255 = 0.502
    assert_eq!(premultiply(3, 170), 2);
    assert_eq!(premultiply(1, 128), 1);
}

#[test]
fn demultiply_inverts_premultiply_for_opaque_and_zero() {
    for c in 0..=255u8 {
        assert_eq!(demultiply(c, 255), c);
        assert_eq!(demultiply(c, 0), 0);
    }
    assert_eq!(demultiply(64, 128), 128);
    assert_eq!(demultiply(200, 100), 255);
}

#[test]
fn premultiply_then_demultiply_is_close() {
    for a in 1..=255u8 {
        for c in (0..=255u8).step_by(17) {
            let back = demultiply(premultiply(c, a), a);
            let err = (i32::from(back) - i32::from(c)).abs();
            assert!(err <= 255 / i32::from(a) + 1, "c={c} a={a} back={back}");
        }
    }
}

#[test]
fn normalizers_round_each_domain() {
    assert_eq!(norm1(255 * 200), 200);
    assert_eq!(norm2(65_025 * 17), 17);
    assert_eq!(norm1(127), 0);
    assert_eq!(norm1(128), 1);
    assert_eq!(div_round(7, 2), 4);
}

#[test]
fn integer_translation_detection() {
    assert_eq!(
        integer_translation(&Affine::translate((3.0, -4.0)), 1e-9),
        Some((3, -4))
    );
    assert_eq!(
        integer_translation(&Affine::translate((3.5, 0.0)), 1e-9),
        None
    );
    assert_eq!(integer_translation(&Affine::rotate(0.1), 1e-9), None);
    assert_eq!(integer_translation(&Affine::IDENTITY, 1e-9), Some((0, 0)));
}

#[test]
fn expansion_is_geometric_mean_of_scales() {
    let a = Affine::scale_non_uniform(2.0, 8.0);
    assert!((expansion(&a) - 4.0).abs() < 1e-12);
    assert!(is_singular(&Affine::scale_non_uniform(0.0, 1.0), 1e-18));
    assert!(unit_to_u8(2.0) == 255 && unit_to_u8(-1.0) == 0 && unit_to_u8(0.5) == 128);
}
