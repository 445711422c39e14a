use std::path::Path;
use std::sync::Arc;

use super::*;
use crate::assets::font::load_font_file;
use crate::foundation::core::TARGET_CANVAS;

fn bold_sans() -> ResolvedFont {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts/DejaVuSans-Bold.ttf");
    load_font_file(&path).unwrap()
}

fn caption(content: &str) -> TextOverlaySettings {
    TextOverlaySettings {
        enabled: true,
        content: content.to_string(),
        font_size: 3.0,
        y_position: 80.0,
        ..TextOverlaySettings::default()
    }
}

fn no_font() -> ResolvedFont {
    ResolvedFont {
        bytes: Arc::new(Vec::new()),
        index: 0,
    }
}

#[test]
fn disabled_or_empty_caption_prepares_nothing() {
    let mut t = caption("hello");
    t.enabled = false;
    assert!(TextOverlay::prepare(TARGET_CANVAS, &t, &no_font()).unwrap().is_none());

    let t = caption("");
    assert!(TextOverlay::prepare(TARGET_CANVAS, &t, &no_font()).unwrap().is_none());
}

#[test]
fn caption_layers_are_centered_on_the_configured_position() {
    let font = bold_sans();
    let t = caption("LINE1\nLINE2");
    let Some(overlay) = TextOverlay::prepare(TARGET_CANVAS, &t, &font).unwrap() else {
        panic!("expected a caption layer");
    };

    let g = &overlay.glyphs;
    // Two lines 69.12 px apart, each about 57.6 px tall.
    assert!(g.height > 120, "height = {}", g.height);
    // The block straddles the 80% line and is roughly centered horizontally.
    assert!(g.y < 1536 && g.y + g.height as i32 > 1536);
    let mid_x = g.x + g.width as i32 / 2;
    assert!((mid_x - 540).abs() <= 4, "mid_x = {mid_x}");
    assert!(g.data.chunks_exact(4).any(|px| px[3] > 0));

    assert_eq!(overlay.shadow.x, g.x + SHADOW_OFFSET_PX);
    assert_eq!(overlay.shadow.y, g.y + SHADOW_OFFSET_PX);
    assert!(overlay.shadow.coverage.iter().any(|&c| c > 0));
}

#[test]
fn drawing_caption_changes_pixels_inside_its_box_only() {
    let font = bold_sans();
    let t = caption("HELLO");
    let overlay = TextOverlay::prepare(TARGET_CANVAS, &t, &font)
        .unwrap()
        .unwrap();
    let mut frame = [0u8, 0, 0, 255].repeat(1080 * 1920);
    overlay.draw_over(&mut frame, TARGET_CANVAS);

    let g = &overlay.glyphs;
    for (i, px) in frame.chunks_exact(4).enumerate() {
        if px[0] == 0 {
            continue;
        }
        let (x, y) = ((i % 1080) as i32, (i / 1080) as i32);
        assert!(x >= g.x && x < g.x + g.width as i32, "x = {x}");
        assert!(y >= g.y && y < g.y + g.height as i32, "y = {y}");
    }
    assert!(frame.chunks_exact(4).any(|px| px[0] > 0));
}

#[test]
fn over_wide_caption_is_clipped_to_the_canvas() {
    let font = bold_sans();
    let mut t = caption(&"W".repeat(400));
    t.font_size = 10.0;
    let overlay = TextOverlay::prepare(TARGET_CANVAS, &t, &font)
        .unwrap()
        .unwrap();

    let g = &overlay.glyphs;
    let pad = 8;
    assert!(g.x >= -pad, "x = {}", g.x);
    assert!(g.x + g.width as i32 <= 1080 + pad, "right = {}", g.x + g.width as i32);
    assert_eq!(overlay.shadow.coverage.len(), (g.width * g.height) as usize);

    let mut frame = [0u8, 0, 0, 255].repeat(1080 * 1920);
    overlay.draw_over(&mut frame, TARGET_CANVAS);
    assert!(frame.chunks_exact(4).any(|px| px[0] > 0));
}

#[test]
fn over_tall_caption_is_clipped_to_the_canvas() {
    let font = bold_sans();
    let mut t = caption(&["A"; 400].join("\n"));
    t.font_size = 10.0;
    t.y_position = 100.0;
    let overlay = TextOverlay::prepare(TARGET_CANVAS, &t, &font)
        .unwrap()
        .unwrap();

    let g = &overlay.glyphs;
    assert!(g.y >= -8, "y = {}", g.y);
    assert!(g.y + g.height as i32 <= 1920 + 8, "bottom = {}", g.y + g.height as i32);
}
