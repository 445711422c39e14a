use std::io::Cursor;

use super::*;

fn png_bytes(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(px));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[test]
fn decodes_png_and_premultiplies() {
    let logo = load_logo(&png_bytes(4, 2, [255, 0, 0, 128])).unwrap();
    assert_eq!((logo.width, logo.height), (4, 2));
    assert_eq!(logo.rgba8_premul.len(), 4 * 2 * 4);
    assert_eq!(&logo.rgba8_premul[0..4], &[128, 0, 0, 128]);
    assert!((logo.aspect_ratio() - 2.0).abs() < 1e-12);
}

#[test]
fn garbage_bytes_are_an_image_load_error() {
    let err = load_logo(b"definitely not an image").unwrap_err();
    assert!(matches!(err, ReelmarkError::ImageLoad(_)));
}

#[test]
fn premultiply_zeroes_transparent_pixels() {
    let mut px = vec![10, 20, 30, 0, 40, 50, 60, 255];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(px, vec![0, 0, 0, 0, 40, 50, 60, 255]);
}
