use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use usvg::fontdb;

use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// Families tried, in order, when the generic sans-serif alias has no installed face.
const SANS_FALLBACKS: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Helvetica",
    "Roboto",
];

/// Raw font face bytes used for both shaping and rasterization.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedFont {
    pub(crate) bytes: Arc<Vec<u8>>,
    /// Face index inside a font collection.
    pub(crate) index: u32,
}

/// Load a font file supplied by the caller.
pub(crate) fn load_font_file(path: &Path) -> ReelmarkResult<ResolvedFont> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font file '{}'", path.display()))?;
    Ok(ResolvedFont {
        bytes: Arc::new(bytes),
        index: 0,
    })
}

/// Find a bold sans-serif face among the system fonts.
///
/// Falls back to well-known sans families, then to any installed face at all.
pub(crate) fn resolve_bold_sans() -> ReelmarkResult<ResolvedFont> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let mut candidates = vec![fontdb::Family::SansSerif];
    candidates.extend(SANS_FALLBACKS.iter().copied().map(fontdb::Family::Name));

    let id = candidates
        .iter()
        .find_map(|family| {
            db.query(&fontdb::Query {
                families: std::slice::from_ref(family),
                weight: fontdb::Weight::BOLD,
                ..fontdb::Query::default()
            })
        })
        .or_else(|| db.faces().next().map(|face| face.id))
        .ok_or_else(|| ReelmarkError::validation("no system fonts available for text overlay"))?;

    let (bytes, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| ReelmarkError::validation("failed to read system font data"))?;
    tracing::debug!(?id, index, len = bytes.len(), "resolved overlay font");

    Ok(ResolvedFont {
        bytes: Arc::new(bytes),
        index,
    })
}
