//! Reelmark composites a logo watermark and a text caption onto a video, contain-fits it into a
//! vertical 1080x1920 frame and re-encodes the result.
//!
//! - Describe the run with a [`ProcessRequest`] ([`WatermarkSettings`], [`TextOverlaySettings`])
//! - Pick a [`Host`]: [`FfmpegHost`] for real media, [`MemoryHost`] for scripted runs
//! - Drive a [`Pipeline`] with [`Pipeline::process`] or the incremental
//!   [`Pipeline::start`] / [`Pipeline::poll_step`] pair
#![forbid(unsafe_code)]

mod assets;
mod foundation;

/// Output container/codec negotiation.
pub mod codec;
pub(crate) mod geometry;
/// Host boundary: playback sources, capture sinks and the event queue.
pub mod host;
/// The capture pipeline and its state machine.
pub mod pipeline;
/// Frame compositing onto the fixed render target.
pub mod render;
/// Run settings loaded from JSON.
pub mod settings;

pub use crate::assets::color::ColorDef;
pub use crate::assets::decode::{LogoImage, load_logo};
pub use crate::foundation::core::{
    CAPTURE_FPS, Canvas, Fps, Rect, Rgba8Premul, TARGET_CANVAS, TARGET_VIDEO_BITRATE,
};
pub use crate::foundation::error::{ReelmarkError, ReelmarkResult};

pub use crate::codec::{CapabilityProbe, MimeType, Negotiated, negotiate};
pub use crate::host::ffmpeg::{FfmpegHost, FfmpegHostOpts};
pub use crate::host::memory::{MemoryHost, MemoryScript, MemoryStats};
pub use crate::host::{
    AudioTrack, CaptureSink, Host, HostEvent, PlaybackSource, PlaybackState, SinkConfig,
    SourceInfo,
};
pub use crate::pipeline::progress::{MAX_IN_FLIGHT_PROGRESS, ProgressTracker};
pub use crate::pipeline::{CaptureState, Pipeline, PipelineOpts, ProcessOutput, ProcessRequest};
pub use crate::render::compose::FrameCompositor;
pub use crate::render::{FrameRGBA, SourceFrame};
pub use crate::settings::{RunSettings, TextOverlaySettings, WatermarkSettings};
