//! Output container/codec negotiation.
//!
//! The candidate list is walked once per run, before the encoder is opened; the first type the
//! host reports as supported wins.

use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// Container identifier used when the host supports none of the explicit candidates.
pub const FALLBACK_MIME: &str = "video/webm";

/// Candidate output types in descending priority.
pub const CANDIDATES: &[&str] = &[
    "video/mp4;codecs=avc1.42E01E,mp4a.40.2",
    "video/mp4;codecs=avc1.4D401E,mp4a.40.2",
    "video/mp4;codecs=avc1.64001E,mp4a.40.2",
    "video/mp4",
    "video/webm;codecs=h264",
    "video/webm;codecs=vp9,opus",
    "video/webm",
];

/// Host capability query for output mime types.
pub trait CapabilityProbe {
    fn is_type_supported(&self, mime: &str) -> bool;
}

/// Result of [`negotiate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Negotiated {
    pub mime_type: String,
    /// `true` when no candidate was supported and [`FALLBACK_MIME`] was chosen blindly.
    pub fallback: bool,
}

/// Pick the best supported output type.
pub fn negotiate<P: CapabilityProbe + ?Sized>(probe: &P) -> Negotiated {
    match CANDIDATES.iter().find(|m| probe.is_type_supported(m)) {
        Some(mime) => {
            tracing::info!(mime_type = %mime, "negotiated output type");
            Negotiated {
                mime_type: (*mime).to_string(),
                fallback: false,
            }
        }
        None => {
            tracing::warn!(
                mime_type = FALLBACK_MIME,
                "no candidate output type reported as supported, using fallback"
            );
            Negotiated {
                mime_type: FALLBACK_MIME.to_string(),
                fallback: true,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Mp4,
    WebM,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum H264Profile {
    ConstrainedBaseline,
    Main,
    High,
}

impl H264Profile {
    /// Profile name as understood by x264.
    pub fn x264_name(self) -> &'static str {
        match self {
            Self::ConstrainedBaseline => "baseline",
            Self::Main => "main",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264; `None` when the mime type names no profile.
    H264(Option<H264Profile>),
    Vp8,
    Vp9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Opus,
    Vorbis,
}

/// Parsed form of an output mime type such as `video/mp4;codecs=avc1.42E01E,mp4a.40.2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimeType {
    pub container: Container,
    /// `None` leaves the choice to the host's default for the container.
    pub video: Option<VideoCodec>,
    pub audio: Option<AudioCodec>,
}

impl MimeType {
    pub fn parse(mime: &str) -> ReelmarkResult<Self> {
        let mut parts = mime.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let container = match essence.as_str() {
            "video/mp4" => Container::Mp4,
            "video/webm" => Container::WebM,
            other => {
                return Err(ReelmarkError::validation(format!(
                    "unsupported container type '{other}'"
                )));
            }
        };

        let mut out = Self {
            container,
            video: None,
            audio: None,
        };

        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("codecs") {
                continue;
            }
            let value = value.trim().trim_matches('"');
            for codec in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                parse_codec(codec, &mut out)?;
            }
        }
        Ok(out)
    }

    pub fn file_extension(&self) -> &'static str {
        match self.container {
            Container::Mp4 => "mp4",
            Container::WebM => "webm",
        }
    }
}

fn parse_codec(codec: &str, out: &mut MimeType) -> ReelmarkResult<()> {
    let lower = codec.to_ascii_lowercase();
    let (family, detail) = lower.split_once('.').unwrap_or((lower.as_str(), ""));
    match family {
        "avc1" | "avc3" | "h264" => {
            let profile = if detail.is_empty() {
                None
            } else {
                Some(parse_avc_profile(detail)?)
            };
            out.video = Some(VideoCodec::H264(profile));
        }
        "vp8" => out.video = Some(VideoCodec::Vp8),
        "vp9" | "vp09" => out.video = Some(VideoCodec::Vp9),
        "mp4a" => out.audio = Some(AudioCodec::Aac),
        "opus" => out.audio = Some(AudioCodec::Opus),
        "vorbis" => out.audio = Some(AudioCodec::Vorbis),
        _ => {
            return Err(ReelmarkError::validation(format!(
                "unsupported codec '{codec}'"
            )));
        }
    }
    Ok(())
}

/// Decode the `PPCCLL` hex triplet of an `avc1.` codec string.
fn parse_avc_profile(detail: &str) -> ReelmarkResult<H264Profile> {
    let idc = detail
        .get(0..2)
        .and_then(|pp| u8::from_str_radix(pp, 16).ok())
        .ok_or_else(|| ReelmarkError::validation(format!("malformed avc1 profile '{detail}'")))?;
    match idc {
        0x42 => Ok(H264Profile::ConstrainedBaseline),
        0x4d => Ok(H264Profile::Main),
        0x64 => Ok(H264Profile::High),
        other => Err(ReelmarkError::validation(format!(
            "unsupported H.264 profile_idc 0x{other:02x}"
        ))),
    }
}

#[cfg(test)]
#[path = "../tests/unit/codec.rs"]
mod tests;
