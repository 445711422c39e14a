//! In-memory [`Host`] with a virtual clock and scriptable failures.
//!
//! Frames are solid colors derived from the frame index, encoded "chunks" are the little-endian
//! indices of the frames pushed since the previous flush. Everything is deterministic.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::CapabilityProbe;
use crate::foundation::core::CAPTURE_FPS;
use crate::foundation::error::{ReelmarkError, ReelmarkResult};
use crate::render::{FrameRGBA, SourceFrame};

use super::{
    AudioTrack, CaptureSink, FrameClock, FrameRequestId, Host, HostEvent, PlaybackSource,
    PlaybackState, SinkConfig, SinkEvent, SinkState, SourceEvent, SourceInfo,
};

/// Behavior of a [`MemoryHost`] and the sources and sinks it creates.
#[derive(Clone, Debug)]
pub struct MemoryScript {
    pub width: u32,
    pub height: u32,
    /// Reported duration in seconds.
    pub duration: f64,
    /// Playback clock advance per animation frame.
    pub tick: Duration,
    pub has_audio: bool,
    /// Mime types reported as supported.
    pub supported: HashSet<String>,
    /// Mime type the sink reports instead of the requested one.
    pub actual_mime: Option<String>,
    pub load_error: Option<String>,
    pub play_error: Option<String>,
    /// Source raises an error once its position reaches this time.
    pub playback_error_at: Option<f64>,
    /// Source pauses once its position reaches this time.
    pub pause_at: Option<f64>,
    /// Source keeps playing past its duration and never signals the end.
    pub never_ends: bool,
    /// Sink reports an error after this many pushed frames.
    pub encoder_error_after: Option<usize>,
    /// Sink finalizes without ever delivering data.
    pub empty_output: bool,
    /// `create_sink` fails whenever an explicit bitrate is requested.
    pub reject_bitrate: bool,
}

impl Default for MemoryScript {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            duration: 1.0,
            tick: Duration::from_secs_f64(CAPTURE_FPS.frame_duration_secs()),
            has_audio: false,
            supported: ["video/mp4".to_string(), "video/webm".to_string()]
                .into_iter()
                .collect(),
            actual_mime: None,
            load_error: None,
            play_error: None,
            playback_error_at: None,
            pause_at: None,
            never_ends: false,
            encoder_error_after: None,
            empty_output: false,
            reject_bitrate: false,
        }
    }
}

/// Call counters shared by a host and everything it created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub loads: usize,
    pub releases: usize,
    pub plays: usize,
    pub sinks_created: usize,
    pub sink_rejections: usize,
    pub frames_pushed: usize,
    /// Center pixel of the first frame any sink received.
    pub first_frame_center: Option<[u8; 4]>,
    pub stops: usize,
    pub frame_requests: usize,
    pub cancels: usize,
}

type SharedStats = Rc<RefCell<MemoryStats>>;

#[derive(Debug)]
pub struct MemoryHost {
    script: MemoryScript,
    stats: SharedStats,
    next_request: u64,
    pending: Option<FrameRequestId>,
    clock: Duration,
    last_sink_config: Option<SinkConfig>,
    last_audio: Option<AudioTrack>,
}

impl MemoryHost {
    pub fn new(script: MemoryScript) -> Self {
        Self {
            script,
            stats: SharedStats::default(),
            next_request: 0,
            pending: None,
            clock: Duration::ZERO,
            last_sink_config: None,
            last_audio: None,
        }
    }

    pub fn script_mut(&mut self) -> &mut MemoryScript {
        &mut self.script
    }

    pub fn stats(&self) -> MemoryStats {
        *self.stats.borrow()
    }

    /// Configuration of the most recently created sink.
    pub fn last_sink_config(&self) -> Option<&SinkConfig> {
        self.last_sink_config.as_ref()
    }

    /// Audio track handed to the most recently created sink.
    pub fn last_audio(&self) -> Option<&AudioTrack> {
        self.last_audio.as_ref()
    }

    fn tick(&mut self, source: &mut MemorySource, id: FrameRequestId) -> HostEvent {
        let (position, advanced) = source.clock.tick();
        if advanced {
            self.clock += self.script.tick;
        }
        source.position = position;

        if let Some(at) = self.script.playback_error_at
            && source.position >= at
        {
            source.state = PlaybackState::Errored;
            return HostEvent::Source(SourceEvent::Error(format!(
                "decode failure at {at:.3}s"
            )));
        }
        if !self.script.never_ends && source.clock.is_past_end(position, source.info.duration) {
            source.position = source.info.duration;
            source.state = PlaybackState::Ended;
            return HostEvent::Source(SourceEvent::Ended);
        }
        if let Some(at) = self.script.pause_at
            && source.position >= at
        {
            source.state = PlaybackState::Paused;
        }

        self.pending = None;
        HostEvent::AnimationFrame(id)
    }
}

impl CapabilityProbe for MemoryHost {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.script.supported.contains(mime)
    }
}

impl Host for MemoryHost {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn load_video(&mut self, bytes: Arc<[u8]>) -> ReelmarkResult<MemorySource> {
        self.stats.borrow_mut().loads += 1;
        self.clock = Duration::ZERO;
        self.pending = None;

        if let Some(msg) = &self.script.load_error {
            return Err(ReelmarkError::media_load(msg.clone()));
        }
        if bytes.is_empty() {
            return Err(ReelmarkError::media_load("empty source buffer"));
        }

        Ok(MemorySource {
            info: SourceInfo {
                width: self.script.width,
                height: self.script.height,
                duration: self.script.duration,
            },
            position: 0.0,
            clock: FrameClock::starting_at(0.0, self.script.tick.as_secs_f64()),
            state: PlaybackState::Unstarted,
            has_audio: self.script.has_audio,
            play_error: self.script.play_error.clone(),
            bytes: Some(bytes),
            stats: Rc::clone(&self.stats),
        })
    }

    fn create_sink(
        &mut self,
        cfg: &SinkConfig,
        audio: Option<AudioTrack>,
    ) -> ReelmarkResult<MemorySink> {
        if self.script.reject_bitrate && cfg.video_bits_per_second.is_some() {
            self.stats.borrow_mut().sink_rejections += 1;
            return Err(ReelmarkError::encoder("requested bitrate is not supported"));
        }
        self.stats.borrow_mut().sinks_created += 1;
        self.last_sink_config = Some(cfg.clone());
        self.last_audio = audio;

        Ok(MemorySink {
            mime_type: self
                .script
                .actual_mime
                .clone()
                .unwrap_or_else(|| cfg.mime_type.clone()),
            width: cfg.width,
            height: cfg.height,
            state: SinkState::Inactive,
            frames_per_chunk: 1,
            buffered: Vec::new(),
            pushed: 0,
            error_after: self.script.encoder_error_after,
            empty_output: self.script.empty_output,
            events: VecDeque::new(),
            stats: Rc::clone(&self.stats),
        })
    }

    fn request_animation_frame(&mut self) -> FrameRequestId {
        self.next_request += 1;
        let id = FrameRequestId(self.next_request);
        self.pending = Some(id);
        self.stats.borrow_mut().frame_requests += 1;
        id
    }

    fn cancel_animation_frame(&mut self, id: FrameRequestId) {
        self.stats.borrow_mut().cancels += 1;
        if self.pending == Some(id) {
            self.pending = None;
        }
    }

    fn next_event(
        &mut self,
        source: &mut MemorySource,
        sink: &mut MemorySink,
    ) -> Option<HostEvent> {
        if let Some(ev) = sink.events.pop_front() {
            if ev == SinkEvent::Stopped {
                sink.state = SinkState::Stopped;
            }
            return Some(HostEvent::Sink(ev));
        }
        match (self.pending, source.state) {
            (Some(id), PlaybackState::Playing) => Some(self.tick(source, id)),
            _ => None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.clock
    }
}

#[derive(Debug)]
pub struct MemorySource {
    info: SourceInfo,
    position: f64,
    clock: FrameClock,
    state: PlaybackState,
    has_audio: bool,
    play_error: Option<String>,
    bytes: Option<Arc<[u8]>>,
    stats: SharedStats,
}

impl MemorySource {
    pub fn is_released(&self) -> bool {
        self.bytes.is_none()
    }
}

impl PlaybackSource for MemorySource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn play(&mut self) -> ReelmarkResult<()> {
        self.stats.borrow_mut().plays += 1;
        if let Some(msg) = &self.play_error {
            self.state = PlaybackState::Errored;
            return Err(ReelmarkError::playback(msg.clone()));
        }
        self.clock = FrameClock::starting_at(self.position, self.clock.step());
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn seek(&mut self, position: f64) -> ReelmarkResult<()> {
        if self.state == PlaybackState::Playing {
            return Err(ReelmarkError::playback("cannot seek while playing"));
        }
        self.position = position.clamp(0.0, self.info.duration.max(0.0));
        Ok(())
    }

    fn current_frame(&mut self) -> ReelmarkResult<SourceFrame> {
        if self.bytes.is_none() {
            return Err(ReelmarkError::playback("source was released"));
        }
        Ok(SourceFrame::solid(
            self.info.width,
            self.info.height,
            frame_color(self.position),
        ))
    }

    fn audio_track(&self) -> Option<AudioTrack> {
        self.has_audio.then_some(AudioTrack::Handle(1))
    }

    fn release(&mut self) {
        if self.bytes.take().is_some() {
            self.stats.borrow_mut().releases += 1;
        }
    }
}

/// Deterministic source color for a playback position.
pub fn frame_color(position: f64) -> [u8; 3] {
    let idx = (position * f64::from(CAPTURE_FPS.num) / f64::from(CAPTURE_FPS.den)).round() as u64;
    [(idx * 37 % 256) as u8, 96, 160]
}

#[derive(Debug)]
pub struct MemorySink {
    mime_type: String,
    width: u32,
    height: u32,
    state: SinkState,
    frames_per_chunk: usize,
    buffered: Vec<u8>,
    pushed: usize,
    error_after: Option<usize>,
    empty_output: bool,
    events: VecDeque<SinkEvent>,
    stats: SharedStats,
}

impl MemorySink {
    fn flush(&mut self) {
        if self.buffered.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.buffered);
        if !self.empty_output {
            self.events.push_back(SinkEvent::Data(chunk));
        }
    }
}

impl CaptureSink for MemorySink {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> SinkState {
        self.state
    }

    fn start(&mut self, timeslice: Duration) -> ReelmarkResult<()> {
        if self.state != SinkState::Inactive {
            return Err(ReelmarkError::encoder("sink already started"));
        }
        let frames = timeslice.as_secs_f64() * CAPTURE_FPS.as_f64();
        self.frames_per_chunk = (frames.round() as usize).max(1);
        self.state = SinkState::Recording;
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> ReelmarkResult<()> {
        if self.state != SinkState::Recording {
            return Err(ReelmarkError::encoder("sink is not recording"));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(ReelmarkError::encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        self.buffered
            .extend_from_slice(&(self.pushed as u32).to_le_bytes());
        self.pushed += 1;
        {
            let mut stats = self.stats.borrow_mut();
            stats.frames_pushed += 1;
            stats
                .first_frame_center
                .get_or_insert_with(|| frame.pixel(frame.width / 2, frame.height / 2));
        }

        if self.error_after.is_some_and(|n| self.pushed >= n) {
            self.state = SinkState::Inactive;
            self.events
                .push_back(SinkEvent::Error("encoder crashed".to_string()));
            return Ok(());
        }
        if self.pushed.is_multiple_of(self.frames_per_chunk) {
            self.flush();
        }
        Ok(())
    }

    fn stop(&mut self) -> ReelmarkResult<()> {
        self.stats.borrow_mut().stops += 1;
        if self.state != SinkState::Recording {
            return Ok(());
        }
        self.flush();
        self.events.push_back(SinkEvent::Stopped);
        self.state = SinkState::Stopping;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/memory.rs"]
mod tests;
