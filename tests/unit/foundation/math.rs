use super::*;

#[test]
fn mul_div255_rounds_to_nearest() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(255, 128), 128);
    assert_eq!(mul_div255_u16(0, 200), 0);
    assert_eq!(mul_div255_u8(100, 255), 100);
}

#[test]
fn opacity_is_clamped_before_scaling() {
    assert_eq!(opacity_to_u8(1.5), 255);
    assert_eq!(opacity_to_u8(-1.0), 0);
    assert_eq!(opacity_to_u8(0.5), 128);
}
