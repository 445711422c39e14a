use std::cell::RefCell;

use super::*;

struct Probe {
    supported: Vec<&'static str>,
    asked: RefCell<Vec<String>>,
}

impl Probe {
    fn new(supported: &[&'static str]) -> Self {
        Self {
            supported: supported.to_vec(),
            asked: RefCell::new(Vec::new()),
        }
    }
}

impl CapabilityProbe for Probe {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.asked.borrow_mut().push(mime.to_string());
        self.supported.contains(&mime)
    }
}

#[test]
fn first_supported_candidate_wins() {
    let probe = Probe::new(&["video/webm;codecs=vp9,opus", "video/mp4"]);
    let n = negotiate(&probe);
    assert_eq!(n.mime_type, "video/mp4");
    assert!(!n.fallback);
    // Stops querying after the first hit.
    assert_eq!(probe.asked.borrow().len(), 4);
}

#[test]
fn baseline_h264_is_preferred() {
    let probe = Probe::new(CANDIDATES);
    let n = negotiate(&probe);
    assert_eq!(n.mime_type, CANDIDATES[0]);
    assert_eq!(probe.asked.borrow().len(), 1);
}

#[test]
fn nothing_supported_falls_back_without_failing() {
    let probe = Probe::new(&[]);
    let n = negotiate(&probe);
    assert_eq!(n.mime_type, FALLBACK_MIME);
    assert!(n.fallback);
    assert_eq!(*probe.asked.borrow(), CANDIDATES.to_vec());
}

#[test]
fn parses_every_candidate() {
    for mime in CANDIDATES {
        MimeType::parse(mime).unwrap();
    }
}

#[test]
fn parses_avc_profiles_and_audio() {
    let m = MimeType::parse("video/mp4;codecs=avc1.4D401E,mp4a.40.2").unwrap();
    assert_eq!(m.container, Container::Mp4);
    assert_eq!(m.video, Some(VideoCodec::H264(Some(H264Profile::Main))));
    assert_eq!(m.audio, Some(AudioCodec::Aac));
    assert_eq!(m.file_extension(), "mp4");

    let m = MimeType::parse("video/mp4; codecs=\"avc1.64001E\"").unwrap();
    assert_eq!(m.video, Some(VideoCodec::H264(Some(H264Profile::High))));
    assert_eq!(m.audio, None);
}

#[test]
fn parses_webm_variants() {
    let m = MimeType::parse("video/webm;codecs=vp9,opus").unwrap();
    assert_eq!(m.container, Container::WebM);
    assert_eq!(m.video, Some(VideoCodec::Vp9));
    assert_eq!(m.audio, Some(AudioCodec::Opus));
    assert_eq!(m.file_extension(), "webm");

    let m = MimeType::parse("video/webm;codecs=h264").unwrap();
    assert_eq!(m.video, Some(VideoCodec::H264(None)));

    let m = MimeType::parse("VIDEO/WEBM").unwrap();
    assert_eq!(m.video, None);
}

#[test]
fn rejects_unknown_types() {
    assert!(MimeType::parse("video/quicktime").is_err());
    assert!(MimeType::parse("video/mp4;codecs=hev1.1.6.L93.B0").is_err());
    assert!(MimeType::parse("video/mp4;codecs=avc1.58A01E").is_err());
}
