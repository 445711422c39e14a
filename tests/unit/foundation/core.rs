use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert_eq!(Fps::new(30, 1).unwrap(), CAPTURE_FPS);
}

#[test]
fn capture_fps_frame_duration() {
    assert!((CAPTURE_FPS.frame_duration_secs() - 1.0 / 30.0).abs() < 1e-12);
    assert_eq!(CAPTURE_FPS.as_f64(), 30.0);
}

#[test]
fn target_canvas_is_vertical_full_hd() {
    assert_eq!(TARGET_CANVAS.width, 1080);
    assert_eq!(TARGET_CANVAS.height, 1920);
    assert_eq!(TARGET_CANVAS.rgba8_len(), 1080 * 1920 * 4);
}

#[test]
fn premultiply_rounds_half_alpha() {
    let c = Rgba8Premul::from_straight_rgba(255, 0, 100, 128);
    assert_eq!(c.to_array(), [128, 0, 50, 128]);
}
