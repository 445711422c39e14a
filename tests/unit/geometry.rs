use super::*;
use crate::foundation::core::TARGET_CANVAS;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn landscape_source_gets_letterboxed() {
    let fit = ContainFit::compute(TARGET_CANVAS, 1920, 1080);
    assert!(approx(fit.scale, 0.5625));
    assert!(approx(fit.rect.width(), 1080.0));
    assert!(approx(fit.rect.height(), 607.5));
    assert!(approx(fit.rect.x0, 0.0));
    assert!(approx(fit.rect.y0, 656.25));
}

#[test]
fn exact_target_aspect_is_not_boxed() {
    let fit = ContainFit::compute(TARGET_CANVAS, 1080, 1920);
    assert!(approx(fit.scale, 1.0));
    assert!(approx(fit.rect.x0, 0.0));
    assert!(approx(fit.rect.y0, 0.0));

    let fit = ContainFit::compute(TARGET_CANVAS, 540, 960);
    assert!(approx(fit.scale, 2.0));
    assert!(approx(fit.rect.width(), 1080.0));
    assert!(approx(fit.rect.height(), 1920.0));
}

#[test]
fn contain_rect_stays_inside_target_for_many_aspects() {
    let sizes = [
        (1, 1),
        (1, 10_000),
        (10_000, 1),
        (640, 480),
        (720, 1280),
        (1080, 1350),
        (3840, 2160),
        (17, 31),
        (4096, 4095),
    ];
    for (w, h) in sizes {
        let fit = ContainFit::compute(TARGET_CANVAS, w, h);
        let r = fit.rect;
        assert!(r.x0 >= 0.0 && r.y0 >= 0.0, "{w}x{h}: {r:?}");
        assert!(r.x1 <= 1080.0 + 1e-9 && r.y1 <= 1920.0 + 1e-9, "{w}x{h}: {r:?}");
        assert!(approx(r.x0, 1080.0 - r.x1), "{w}x{h} not centered horizontally");
        assert!(approx(r.y0, 1920.0 - r.y1), "{w}x{h} not centered vertically");
        // One axis always touches the canvas edges.
        assert!(approx(r.width(), 1080.0) || approx(r.height(), 1920.0));
    }
}

#[test]
fn zero_sized_source_draws_nothing() {
    let fit = ContainFit::compute(TARGET_CANVAS, 0, 1080);
    assert_eq!(fit.scale, 0.0);
    assert!(fit.rect.is_zero_area());
}

#[test]
fn square_logo_scenario() {
    let wm = WatermarkSettings {
        size: 20.0,
        opacity: 1.0,
        margin_right: 40.0,
        margin_bottom: 100.0,
    };
    let r = logo_rect(TARGET_CANVAS, 500, 500, &wm).unwrap();
    assert!(approx(r.width(), 216.0));
    assert!(approx(r.height(), 216.0));
    assert!(approx(r.x0, 824.0));
    assert!(approx(r.y0, 1604.0));
}

#[test]
fn logo_stays_inside_target_across_valid_settings() {
    let logos = [(500, 500), (1000, 250), (64, 32), (300, 100)];
    for (lw, lh) in logos {
        for size in [5.0, 20.0, 50.0, 80.0] {
            for margin_right in [0.0, 100.0, 200.0] {
                for margin_bottom in [0.0, 200.0, 400.0] {
                    let wm = WatermarkSettings {
                        size,
                        opacity: 1.0,
                        margin_right,
                        margin_bottom,
                    };
                    let r = logo_rect(TARGET_CANVAS, lw, lh, &wm).unwrap();
                    assert!(r.x0 >= 0.0 && r.y0 >= 0.0, "{lw}x{lh} {wm:?}: {r:?}");
                    assert!(r.x1 <= 1080.0 && r.y1 <= 1920.0, "{lw}x{lh} {wm:?}: {r:?}");
                }
            }
        }
    }
}

#[test]
fn empty_logo_has_no_rect() {
    assert!(logo_rect(TARGET_CANVAS, 0, 10, &WatermarkSettings::default()).is_none());
}

#[test]
fn two_line_text_scenario() {
    let t = TextOverlaySettings {
        enabled: true,
        content: "LINE1\nLINE2".to_string(),
        font_size: 3.0,
        y_position: 80.0,
        ..TextOverlaySettings::default()
    };
    let layout = TextBlockLayout::compute(TARGET_CANVAS, &t, t.lines().len());
    assert!(approx(layout.font_px, 57.6));
    assert!(approx(layout.line_height, 69.12));
    assert!(approx(layout.center_y, 1536.0));
    assert!(approx(layout.center_x, 540.0));
    assert_eq!(layout.baselines.len(), 2);
    assert!(approx(layout.baselines[0], 1501.44));
    assert!(approx(layout.baselines[1], 1570.56));
}

#[test]
fn text_block_is_centered_with_uniform_spacing() {
    for n in 1..=6usize {
        let t = TextOverlaySettings {
            font_size: 5.0,
            y_position: 40.0,
            ..TextOverlaySettings::default()
        };
        let layout = TextBlockLayout::compute(TARGET_CANVAS, &t, n);
        assert_eq!(layout.baselines.len(), n);
        let mid = (layout.baselines[0] + layout.baselines[n - 1]) / 2.0;
        assert!(approx(mid, layout.center_y));
        for pair in layout.baselines.windows(2) {
            assert!(approx(pair[1] - pair[0], layout.font_px * 1.2));
        }
    }
}
