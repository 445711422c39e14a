//! Boundary to the media stack that decodes, schedules and encodes on the pipeline's behalf.
//!
//! A [`Host`] owns the event queue. The pipeline never blocks on a host object directly; it
//! asks for the next [`HostEvent`] and reacts to it, so decode progress, frame cadence and
//! encoder chunk delivery all arrive through one ordered stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::CapabilityProbe;
use crate::foundation::core::Fps;
use crate::foundation::error::ReelmarkResult;
use crate::render::{FrameRGBA, SourceFrame};

/// Native host built on the system `ffmpeg` / `ffprobe` binaries.
pub mod ffmpeg;
/// Scriptable in-memory host.
pub mod memory;

/// Metadata available once a source finished loading.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds; may be `0.0` or non-finite for broken sources.
    pub duration: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Unstarted,
    Playing,
    Paused,
    Ended,
    Errored,
}

/// Audio that can be muxed next to the captured video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioTrack {
    /// Audio streams of a media file on disk.
    File(PathBuf),
    /// Opaque handle understood only by the host that produced it.
    Handle(u64),
}

/// A loaded, playable source video.
pub trait PlaybackSource {
    fn info(&self) -> &SourceInfo;
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    fn state(&self) -> PlaybackState;
    /// Start the playback clock.
    fn play(&mut self) -> ReelmarkResult<()>;
    /// Move the position of a source that is not playing; clamped to `[0, duration]`.
    fn seek(&mut self, position: f64) -> ReelmarkResult<()>;
    /// Frame at the current playback position.
    fn current_frame(&mut self) -> ReelmarkResult<SourceFrame>;
    /// Audio capture of this source, when the host can provide one.
    fn audio_track(&self) -> Option<AudioTrack>;
    /// Revoke the host's reference to the loaded bytes. Called exactly once per source.
    fn release(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Inactive,
    Recording,
    Stopping,
    Stopped,
}

/// Encoder parameters for one capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub mime_type: String,
    /// Requested video bitrate; `None` uses the host default.
    pub video_bits_per_second: Option<u32>,
}

/// Incremental encoder fed with composited frames.
pub trait CaptureSink {
    /// Mime type actually produced, which may differ from the requested one.
    fn mime_type(&self) -> &str;
    fn state(&self) -> SinkState;
    /// Begin recording, delivering encoded data at least every `timeslice`.
    fn start(&mut self, timeslice: Duration) -> ReelmarkResult<()>;
    fn push_frame(&mut self, frame: &FrameRGBA) -> ReelmarkResult<()>;
    /// Request finalization; completion arrives later as [`SinkEvent::Stopped`].
    fn stop(&mut self) -> ReelmarkResult<()>;
}

/// Playback clock stepped once per animation frame.
///
/// Each tick presents the frame at the current position; the position moves on at the start of
/// the following tick, so the first frame after `play` is the one at the start position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FrameClock {
    start: f64,
    step: f64,
    presented: u64,
}

impl FrameClock {
    pub(crate) fn starting_at(start: f64, step: f64) -> Self {
        Self {
            start,
            step,
            presented: 0,
        }
    }

    pub(crate) fn step(&self) -> f64 {
        self.step
    }

    /// Position of the frame the next tick presents; `true` when it moved past a presented one.
    pub(crate) fn tick(&mut self) -> (f64, bool) {
        let advanced = self.presented > 0;
        let position = self.start + self.presented as f64 * self.step;
        self.presented += 1;
        (position, advanced)
    }

    /// Whether a frame at `position` falls outside a source of `duration` seconds.
    ///
    /// Frames are centered on their interval, so a source yields `round(duration / step)` frames.
    pub(crate) fn is_past_end(&self, position: f64, duration: f64) -> bool {
        duration.is_finite() && duration > 0.0 && position + self.step / 2.0 > duration
    }
}

/// Handle of a scheduled animation-frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequestId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    Ended,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// One encoded fragment, in delivery order.
    Data(Vec<u8>),
    Stopped,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    AnimationFrame(FrameRequestId),
    Source(SourceEvent),
    Sink(SinkEvent),
}

/// The media stack and event loop a pipeline runs on.
pub trait Host: CapabilityProbe {
    type Source: PlaybackSource;
    type Sink: CaptureSink;

    /// Bind `bytes` to a playable source and wait for its metadata.
    fn load_video(&mut self, bytes: Arc<[u8]>) -> ReelmarkResult<Self::Source>;

    /// Construct an encoder bound to the render target's frames and an optional audio track.
    ///
    /// Fails with [`crate::ReelmarkError::Encoder`] when the configuration is rejected.
    fn create_sink(
        &mut self,
        cfg: &SinkConfig,
        audio: Option<AudioTrack>,
    ) -> ReelmarkResult<Self::Sink>;

    fn request_animation_frame(&mut self) -> FrameRequestId;

    fn cancel_animation_frame(&mut self, id: FrameRequestId);

    /// Wait for the next event of the current run.
    ///
    /// Returns `None` when nothing further can ever happen (the run would stall forever).
    fn next_event(
        &mut self,
        source: &mut Self::Source,
        sink: &mut Self::Sink,
    ) -> Option<HostEvent>;

    /// Run time as measured by the host's clock since the last `load_video`.
    fn elapsed(&self) -> Duration;
}

#[cfg(test)]
#[path = "../../tests/unit/host/mod.rs"]
mod tests;
