use super::*;
use crate::foundation::core::TARGET_CANVAS;

fn logo(w: u32, h: u32, rgb: [u8; 3]) -> LogoImage {
    let px = [rgb[0], rgb[1], rgb[2], 255];
    LogoImage {
        width: w,
        height: h,
        rgba8_premul: Arc::new(px.repeat((w * h) as usize)),
    }
}

fn compositor(logo: Option<&LogoImage>, wm: &WatermarkSettings) -> FrameCompositor {
    FrameCompositor::new(
        TARGET_CANVAS,
        logo,
        wm,
        &TextOverlaySettings::default(),
        None,
    )
    .unwrap()
}

fn close(a: [u8; 4], b: [u8; 4], tol: u8) -> bool {
    a.iter().zip(b).all(|(x, y)| x.abs_diff(y) <= tol)
}

#[test]
fn landscape_source_is_letterboxed_in_black() {
    let mut c = compositor(None, &WatermarkSettings::default());
    let frame = c.compose(&SourceFrame::solid(192, 108, [255, 0, 0])).unwrap();

    assert_eq!((frame.width, frame.height), (1080, 1920));
    assert_eq!(frame.data.len(), 1080 * 1920 * 4);
    assert!(frame.premultiplied);

    // Bars are 656px tall; stay a couple of rows away from the anti-aliased edge.
    assert_eq!(frame.pixel(540, 0), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(540, 650), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(540, 1270), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(540, 1919), [0, 0, 0, 255]);
    assert!(close(frame.pixel(540, 960), [255, 0, 0, 255], 1));
    assert!(close(frame.pixel(3, 700), [255, 0, 0, 255], 1));
    assert!(close(frame.pixel(540, 1258), [255, 0, 0, 255], 1));
}

#[test]
fn portrait_source_fills_whole_target() {
    let mut c = compositor(None, &WatermarkSettings::default());
    let frame = c.compose(&SourceFrame::solid(54, 96, [0, 0, 255])).unwrap();
    for (x, y) in [(0, 0), (1079, 0), (0, 1919), (1079, 1919), (540, 960)] {
        assert!(close(frame.pixel(x, y), [0, 0, 255, 255], 1), "({x}, {y})");
    }
}

#[test]
fn tall_source_is_pillarboxed() {
    let mut c = compositor(None, &WatermarkSettings::default());
    // 1:4 source -> 480x1920 centered, 300px bars left and right.
    let frame = c.compose(&SourceFrame::solid(50, 200, [255, 255, 255])).unwrap();
    assert_eq!(frame.pixel(10, 960), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(295, 960), [0, 0, 0, 255]);
    assert!(close(frame.pixel(305, 960), [255, 255, 255, 255], 1));
    assert_eq!(frame.pixel(1075, 960), [0, 0, 0, 255]);
}

#[test]
fn logo_lands_bottom_right_with_margins() {
    let wm = WatermarkSettings {
        size: 20.0,
        opacity: 1.0,
        margin_right: 40.0,
        margin_bottom: 100.0,
    };
    let green = logo(10, 10, [0, 255, 0]);
    let mut c = compositor(Some(&green), &wm);
    let frame = c.compose(&SourceFrame::solid(192, 108, [255, 0, 0])).unwrap();

    // Logo rect is (824, 1604) .. (1040, 1820).
    assert!(close(frame.pixel(900, 1700), [0, 255, 0, 255], 1));
    assert!(close(frame.pixel(826, 1606), [0, 255, 0, 255], 1));
    assert!(close(frame.pixel(1038, 1818), [0, 255, 0, 255], 1));
    assert_eq!(frame.pixel(820, 1700), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(1045, 1700), [0, 0, 0, 255]);
    assert_eq!(frame.pixel(900, 1825), [0, 0, 0, 255]);
}

#[test]
fn logo_opacity_blends_over_background() {
    let wm = WatermarkSettings {
        size: 20.0,
        opacity: 0.5,
        margin_right: 40.0,
        margin_bottom: 100.0,
    };
    let white = logo(8, 8, [255, 255, 255]);
    let mut c = compositor(Some(&white), &wm);
    let frame = c.compose(&SourceFrame::solid(192, 108, [0, 0, 0])).unwrap();
    assert!(close(frame.pixel(900, 1700), [128, 128, 128, 255], 3));
}

#[test]
fn compose_is_deterministic_and_stateless() {
    let wm = WatermarkSettings::default();
    let l = logo(4, 2, [10, 200, 30]);
    let mut c = compositor(Some(&l), &wm);

    let a = c.compose(&SourceFrame::solid(64, 36, [9, 9, 9])).unwrap().clone();
    let _ = c.compose(&SourceFrame::solid(36, 64, [200, 100, 0])).unwrap();
    let b = c.compose(&SourceFrame::solid(64, 36, [9, 9, 9])).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn zero_sized_source_renders_background_only() {
    let mut c = compositor(None, &WatermarkSettings::default());
    let empty = SourceFrame {
        width: 0,
        height: 0,
        data: Arc::new(Vec::new()),
    };
    let frame = c.compose(&empty).unwrap();
    assert!(frame.data.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
}

#[test]
fn mismatched_source_buffer_is_rejected() {
    let mut c = compositor(None, &WatermarkSettings::default());
    let bad = SourceFrame {
        width: 4,
        height: 4,
        data: Arc::new(vec![0u8; 7]),
    };
    assert!(c.compose(&bad).is_err());
}

#[test]
fn reused_context_matches_a_fresh_compositor() {
    let wm = WatermarkSettings {
        opacity: 0.6,
        ..WatermarkSettings::default()
    };
    let l = logo(6, 6, [240, 240, 240]);
    let mut reused = compositor(Some(&l), &wm);
    for i in 0..5u8 {
        let src = SourceFrame::solid(48, 27, [i * 40, 0, 255 - i * 40]);
        let _ = reused.compose(&src).unwrap();
    }
    // A rejected frame leaves queued commands behind; the next frame must not see them.
    let bad = SourceFrame {
        width: 4,
        height: 4,
        data: Arc::new(vec![0u8; 7]),
    };
    assert!(reused.compose(&bad).is_err());

    let src = SourceFrame::solid(27, 48, [30, 160, 90]);
    let got = reused.compose(&src).unwrap().clone();
    let mut fresh = compositor(Some(&l), &wm);
    assert_eq!(got.data, fresh.compose(&src).unwrap().data);
}
