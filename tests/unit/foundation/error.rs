use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelmarkError::media_load("x")
            .to_string()
            .contains("media load error:")
    );
    assert!(
        ReelmarkError::image_load("x")
            .to_string()
            .contains("image load error:")
    );
    assert!(
        ReelmarkError::playback("x")
            .to_string()
            .contains("playback error:")
    );
    assert!(
        ReelmarkError::encoder("x")
            .to_string()
            .contains("encoder error:")
    );
    assert!(
        ReelmarkError::validation("x")
            .to_string()
            .contains("validation error:")
    );
}

#[test]
fn empty_output_names_the_mime_type() {
    let err = ReelmarkError::empty_output("video/webm");
    assert!(err.to_string().contains("video/webm"));
}

#[test]
fn timeout_reports_the_limit() {
    let err = ReelmarkError::Timeout {
        limit: Duration::from_secs(12),
    };
    assert!(err.to_string().contains("12s"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ReelmarkError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
