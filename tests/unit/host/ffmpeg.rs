use super::*;

const ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libopus              libopus Opus (codec opus)
";

const MUXERS: &str = "\
File formats:
 D. = Demuxing supported
 .E = Muxing supported
 --
  E mp4             MP4 (MPEG-4 Part 14)
  E webm            WebM
 DE matroska,webm   Matroska / WebM
";

fn caps() -> Capabilities {
    Capabilities {
        encoders: parse_component_table(ENCODERS),
        muxers: parse_component_table(MUXERS),
    }
}

fn plan(mime: &str) -> Option<EncoderPlan> {
    EncoderPlan::for_mime(&MimeType::parse(mime).unwrap())
}

#[test]
fn component_table_skips_the_legend() {
    let enc = parse_component_table(ENCODERS);
    assert!(enc.contains("libx264"));
    assert!(enc.contains("libopus"));
    assert!(!enc.contains("="));
    assert_eq!(enc.len(), 4);

    let mux = parse_component_table(MUXERS);
    assert!(mux.contains("mp4"));
    assert!(mux.contains("matroska"));
    assert!(mux.contains("webm"));
}

#[test]
fn mp4_candidates_map_to_x264_profiles() {
    let p = plan("video/mp4;codecs=avc1.42E01E,mp4a.40.2").unwrap();
    assert_eq!(p.muxer, "mp4");
    assert_eq!(p.video, "libx264");
    assert_eq!(p.profile, Some(H264Profile::ConstrainedBaseline));
    assert_eq!(p.audio, "aac");

    let p = plan("video/mp4").unwrap();
    assert_eq!(p.profile, None);
}

#[test]
fn webm_with_h264_has_no_plan() {
    assert_eq!(plan("video/webm;codecs=h264"), None);
    let p = plan("video/webm;codecs=vp9,opus").unwrap();
    assert_eq!((p.muxer, p.video, p.audio), ("webm", "libvpx-vp9", "libopus"));
}

#[test]
fn support_requires_muxer_and_both_encoders() {
    let caps = caps();
    assert!(caps.supports(&plan("video/mp4;codecs=avc1.64001E,mp4a.40.2").unwrap()));
    assert!(caps.supports(&plan("video/webm").unwrap()));
    assert!(!caps.supports(&plan("video/webm;codecs=vp8").unwrap()));
}

#[test]
fn missing_binary_supports_nothing() {
    let host = FfmpegHost::new(FfmpegHostOpts {
        ffmpeg: PathBuf::from("/nonexistent/reelmark-ffmpeg"),
        ffprobe: PathBuf::from("/nonexistent/reelmark-ffprobe"),
    });
    assert!(!host.opts().tools_available());
    assert!(!host.is_type_supported("video/mp4"));
    assert!(!host.is_type_supported("not a mime type"));
}

#[test]
fn sink_rejects_odd_dimensions_and_unknown_types() {
    let mut host = FfmpegHost::new(FfmpegHostOpts::default());
    let mut cfg = SinkConfig {
        width: 1081,
        height: 1920,
        fps: CAPTURE_FPS,
        mime_type: "video/mp4".to_string(),
        video_bits_per_second: None,
    };
    assert!(matches!(
        host.create_sink(&cfg, None),
        Err(ReelmarkError::Encoder(_))
    ));

    cfg.width = 1080;
    cfg.mime_type = "video/webm;codecs=h264".to_string();
    assert!(matches!(
        host.create_sink(&cfg, None),
        Err(ReelmarkError::Encoder(_))
    ));
}

#[test]
fn empty_buffer_is_a_media_load_error() {
    let mut host = FfmpegHost::new(FfmpegHostOpts::default());
    assert!(matches!(
        host.load_video(Arc::from(Vec::<u8>::new())),
        Err(ReelmarkError::MediaLoad(_))
    ));
}
