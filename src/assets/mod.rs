/// CSS-style color values used by the text overlay.
pub mod color;
/// Logo decoding.
pub mod decode;
/// Font discovery for the text overlay.
pub(crate) mod font;
