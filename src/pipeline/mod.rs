//! The compositing/capture pipeline: loads media, drives playback, composites every frame and
//! feeds the encoder until the run resolves exactly once.

pub mod progress;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::decode::{LogoImage, load_logo};
use crate::codec::negotiate;
use crate::foundation::core::{CAPTURE_FPS, TARGET_CANVAS, TARGET_VIDEO_BITRATE};
use crate::foundation::error::{ReelmarkError, ReelmarkResult};
use crate::host::{
    CaptureSink, FrameRequestId, Host, HostEvent, PlaybackSource, PlaybackState, SinkConfig,
    SinkEvent, SinkState, SourceEvent, SourceInfo,
};
use crate::render::FrameRGBA;
use crate::render::compose::FrameCompositor;
use crate::settings::{TextOverlaySettings, WatermarkSettings};

use progress::ProgressTracker;
pub use session::ProcessOutput;
use session::CaptureSession;

/// Tuning knobs of a [`Pipeline`].
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOpts {
    /// Encoder flush cadence.
    pub timeslice: Duration,
    /// Run time allowed beyond the source duration before the run fails with a timeout.
    pub timeout_margin: Duration,
    /// Requested bitrate; `None` leaves it to the host.
    pub video_bits_per_second: Option<u32>,
    /// Font file for the caption instead of the system bold sans-serif face.
    pub font_path: Option<PathBuf>,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_millis(100),
            timeout_margin: Duration::from_secs(10),
            video_bits_per_second: Some(TARGET_VIDEO_BITRATE),
            font_path: None,
        }
    }
}

/// Inputs of one run.
#[derive(Clone, Debug, Default)]
pub struct ProcessRequest {
    pub video: Arc<[u8]>,
    pub logo: Option<Arc<[u8]>>,
    pub watermark: WatermarkSettings,
    pub text: TextOverlaySettings,
}

/// Lifecycle of the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Loading,
    Recording,
    Finalizing,
    Completed,
    Failed,
}

impl CaptureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

struct ActiveRun<H: Host> {
    source: H::Source,
    sink: H::Sink,
    session: CaptureSession,
    compositor: FrameCompositor,
    pending_frame: Option<FrameRequestId>,
    progress: ProgressTracker,
    deadline: Duration,
}

/// Stateful pipeline bound to one [`Host`].
///
/// A new run tears down whatever the previous run left behind, so a pipeline is reused across
/// runs without manual cleanup. Loaded sources are released lazily: at the start of the next
/// run or when the pipeline is dropped.
pub struct Pipeline<H: Host> {
    host: H,
    opts: PipelineOpts,
    state: CaptureState,
    run: Option<ActiveRun<H>>,
    retired: Option<H::Source>,
}

impl<H: Host> std::fmt::Debug for Pipeline<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("opts", &self.opts)
            .field("state", &self.state)
            .field("active", &self.run.is_some())
            .field("retired_source", &self.retired.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: Host> Pipeline<H> {
    pub fn new(host: H, opts: PipelineOpts) -> Self {
        Self {
            host,
            opts,
            state: CaptureState::Idle,
            run: None,
            retired: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Run one request to completion, reporting progress in `[0, 99.9]`.
    #[tracing::instrument(skip_all, fields(video_bytes = req.video.len()))]
    pub fn process(
        &mut self,
        req: ProcessRequest,
        mut on_progress: impl FnMut(f32),
    ) -> ReelmarkResult<ProcessOutput> {
        self.start(req)?;
        loop {
            if let Some(outcome) = self.poll_step(&mut on_progress) {
                return outcome;
            }
        }
    }

    /// Begin a run, tearing down any previous one.
    ///
    /// On success the pipeline is `Recording` and [`Pipeline::poll_step`] drives it to its
    /// outcome. Load and encoder-setup failures are returned directly and leave it `Failed`.
    #[tracing::instrument(skip_all, fields(video_bytes = req.video.len(), logo = req.logo.is_some()))]
    pub fn start(&mut self, req: ProcessRequest) -> ReelmarkResult<()> {
        self.reset();
        self.transition(CaptureState::Loading);

        match self.open_run(req) {
            Ok(run) => {
                self.run = Some(run);
                self.transition(CaptureState::Recording);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "run failed during setup");
                self.transition(CaptureState::Failed);
                Err(e)
            }
        }
    }

    /// Handle one host event.
    ///
    /// Returns `Some` exactly once per started run, carrying its outcome. Returns `None` while
    /// the run is still in flight, and always when no run is active.
    pub fn poll_step(
        &mut self,
        on_progress: &mut dyn FnMut(f32),
    ) -> Option<ReelmarkResult<ProcessOutput>> {
        let run = self.run.as_mut()?;

        if self.host.elapsed() > run.deadline {
            let limit = run.deadline;
            return Some(self.fail(ReelmarkError::Timeout { limit }));
        }
        let Some(event) = self.host.next_event(&mut run.source, &mut run.sink) else {
            tracing::warn!("host has no further events for an unresolved run");
            let limit = run.deadline;
            return Some(self.fail(ReelmarkError::Timeout { limit }));
        };

        match event {
            HostEvent::AnimationFrame(id) => self.on_animation_frame(id, on_progress),
            HostEvent::Source(SourceEvent::Ended) => self.on_source_ended(),
            HostEvent::Source(SourceEvent::Error(msg)) => self.on_source_error(msg),
            HostEvent::Sink(SinkEvent::Data(bytes)) => {
                if matches!(self.state, CaptureState::Recording | CaptureState::Finalizing)
                    && let Some(run) = self.run.as_mut()
                {
                    run.session.push(bytes);
                }
                None
            }
            HostEvent::Sink(SinkEvent::Stopped) => self.on_sink_stopped(),
            HostEvent::Sink(SinkEvent::Error(msg)) => {
                if matches!(self.state, CaptureState::Recording | CaptureState::Finalizing) {
                    Some(self.fail(ReelmarkError::encoder(msg)))
                } else {
                    None
                }
            }
        }
    }

    /// Composite a single frame of `req.video` at `position` seconds.
    ///
    /// Independent of any run in flight; the source is released before returning.
    #[tracing::instrument(skip_all, fields(position = position))]
    pub fn render_still(&mut self, req: &ProcessRequest, position: f64) -> ReelmarkResult<FrameRGBA> {
        req.watermark.validate()?;
        req.text.validate()?;
        let logo = req.logo.as_deref().map(load_logo).transpose()?;
        let mut compositor = build_compositor(&self.opts, logo.as_ref(), req)?;

        let mut source = self.host.load_video(Arc::clone(&req.video))?;
        let frame = source
            .seek(position)
            .and_then(|()| source.current_frame());
        source.release();

        Ok(compositor.compose(&frame?)?.clone())
    }

    /// Tear down any run in flight and release retained sources.
    ///
    /// Idempotent: cancellation, encoder stop and source release each happen at most once.
    pub fn reset(&mut self) {
        self.teardown();
        if let Some(mut source) = self.retired.take() {
            source.release();
        }
        self.state = CaptureState::Idle;
    }

    fn transition(&mut self, to: CaptureState) {
        tracing::debug!(from = ?self.state, to = ?to, "capture state");
        self.state = to;
    }

    fn open_run(&mut self, req: ProcessRequest) -> ReelmarkResult<ActiveRun<H>> {
        req.watermark.validate()?;
        req.text.validate()?;

        let mut source = self.host.load_video(Arc::clone(&req.video))?;
        let info = source.info().clone();
        tracing::info!(
            width = info.width,
            height = info.height,
            duration = info.duration,
            "source loaded"
        );

        match open_recording(&mut self.host, &self.opts, &req, &mut source, &info) {
            Ok(parts) => Ok(ActiveRun {
                source,
                sink: parts.sink,
                session: parts.session,
                compositor: parts.compositor,
                pending_frame: Some(parts.first_frame),
                progress: ProgressTracker::new(),
                deadline: run_deadline(info.duration, self.opts.timeout_margin),
            }),
            Err(e) => {
                self.retire(source);
                Err(e)
            }
        }
    }

    fn on_animation_frame(
        &mut self,
        id: FrameRequestId,
        on_progress: &mut dyn FnMut(f32),
    ) -> Option<ReelmarkResult<ProcessOutput>> {
        if self.state != CaptureState::Recording {
            return None;
        }
        let run = self.run.as_mut()?;
        if run.pending_frame != Some(id) {
            tracing::trace!(id = id.0, "stale animation frame ignored");
            return None;
        }
        run.pending_frame = None;
        if run.source.state() != PlaybackState::Playing {
            tracing::debug!(state = ?run.source.state(), "source not playing, draw loop idles");
            return None;
        }

        let drawn = draw_frame(run);
        if let Err(e) = drawn {
            return Some(self.fail(e));
        }
        let progress = run
            .progress
            .observe(run.source.position(), run.source.info().duration);
        on_progress(progress);
        run.pending_frame = Some(self.host.request_animation_frame());
        None
    }

    fn on_source_ended(&mut self) -> Option<ReelmarkResult<ProcessOutput>> {
        if self.state != CaptureState::Recording {
            return None;
        }
        let run = self.run.as_mut()?;
        if let Some(id) = run.pending_frame.take() {
            self.host.cancel_animation_frame(id);
        }
        if let Err(e) = run.sink.stop() {
            return Some(self.fail(e));
        }
        tracing::info!(
            bytes_so_far = run.session.total_len(),
            "source ended, finalizing encoder"
        );
        self.transition(CaptureState::Finalizing);
        None
    }

    fn on_source_error(&mut self, msg: String) -> Option<ReelmarkResult<ProcessOutput>> {
        if self.state != CaptureState::Recording {
            tracing::debug!(state = ?self.state, error = %msg, "late source error ignored");
            return None;
        }
        Some(self.fail(ReelmarkError::playback(msg)))
    }

    fn on_sink_stopped(&mut self) -> Option<ReelmarkResult<ProcessOutput>> {
        match self.state {
            CaptureState::Finalizing => {}
            CaptureState::Recording => {
                return Some(self.fail(ReelmarkError::encoder(
                    "encoder stopped before the source ended",
                )));
            }
            _ => return None,
        }

        let run = self.run.take()?;
        self.retire(run.source);
        match run.session.finish() {
            Ok(out) => {
                tracing::info!(
                    bytes = out.bytes.len(),
                    mime_type = %out.mime_type,
                    "capture completed"
                );
                self.transition(CaptureState::Completed);
                Some(Ok(out))
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture finalized without output");
                self.transition(CaptureState::Failed);
                Some(Err(e))
            }
        }
    }

    fn fail(&mut self, err: ReelmarkError) -> ReelmarkResult<ProcessOutput> {
        tracing::warn!(error = %err, state = ?self.state, "run failed");
        self.teardown();
        self.transition(CaptureState::Failed);
        Err(err)
    }

    /// Cancel the pending frame, stop a recording encoder and retire the source.
    fn teardown(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        if let Some(id) = run.pending_frame.take() {
            self.host.cancel_animation_frame(id);
        }
        if run.sink.state() == SinkState::Recording
            && let Err(e) = run.sink.stop()
        {
            tracing::warn!(error = %e, "failed to stop encoder during teardown");
        }
        self.retire(run.source);
    }

    /// Keep `source` until the next reset, releasing whatever was kept before.
    fn retire(&mut self, source: H::Source) {
        if let Some(mut previous) = self.retired.replace(source) {
            previous.release();
        }
    }
}

impl<H: Host> Drop for Pipeline<H> {
    fn drop(&mut self) {
        self.reset();
    }
}

fn build_compositor(
    opts: &PipelineOpts,
    logo: Option<&LogoImage>,
    req: &ProcessRequest,
) -> ReelmarkResult<FrameCompositor> {
    FrameCompositor::new(
        TARGET_CANVAS,
        logo,
        &req.watermark,
        &req.text,
        opts.font_path.as_deref(),
    )
}

struct OpenedRecording<S> {
    sink: S,
    session: CaptureSession,
    compositor: FrameCompositor,
    first_frame: FrameRequestId,
}

/// Everything between a loaded source and a running draw loop.
fn open_recording<H: Host>(
    host: &mut H,
    opts: &PipelineOpts,
    req: &ProcessRequest,
    source: &mut H::Source,
    info: &SourceInfo,
) -> ReelmarkResult<OpenedRecording<H::Sink>> {
    let logo = req.logo.as_deref().map(load_logo).transpose()?;
    let compositor = build_compositor(opts, logo.as_ref(), req)?;
    tracing::debug!(
        source_w = info.width,
        source_h = info.height,
        logo = logo.is_some(),
        text = req.text.is_visible(),
        "compositor ready"
    );

    let negotiated = negotiate(&*host);
    let audio = source.audio_track();
    if audio.is_none() {
        tracing::info!("source exposes no audio track, capturing video only");
    }

    let mut cfg = SinkConfig {
        width: TARGET_CANVAS.width,
        height: TARGET_CANVAS.height,
        fps: CAPTURE_FPS,
        mime_type: negotiated.mime_type,
        video_bits_per_second: opts.video_bits_per_second,
    };
    let mut sink = match host.create_sink(&cfg, audio.clone()) {
        Ok(sink) => sink,
        Err(e) if cfg.video_bits_per_second.is_some() => {
            tracing::warn!(error = %e, "encoder rejected explicit bitrate, using host default");
            cfg.video_bits_per_second = None;
            host.create_sink(&cfg, audio)?
        }
        Err(e) => return Err(e),
    };

    let session = CaptureSession::new(sink.mime_type());
    sink.start(opts.timeslice)?;

    if let Err(e) = source.play() {
        if let Err(stop_err) = sink.stop() {
            tracing::warn!(error = %stop_err, "failed to stop encoder after playback failure");
        }
        return Err(match e {
            ReelmarkError::Playback(_) => e,
            other => ReelmarkError::playback(other.to_string()),
        });
    }

    let first_frame = host.request_animation_frame();
    Ok(OpenedRecording {
        sink,
        session,
        compositor,
        first_frame,
    })
}

fn draw_frame<H: Host>(run: &mut ActiveRun<H>) -> ReelmarkResult<()> {
    let frame = run.source.current_frame().map_err(|e| match e {
        ReelmarkError::Playback(_) => e,
        other => ReelmarkError::playback(other.to_string()),
    })?;
    let composed = run.compositor.compose(&frame)?;
    run.sink.push_frame(composed)
}

fn run_deadline(duration: f64, margin: Duration) -> Duration {
    let media = if duration.is_finite() && duration > 0.0 {
        Duration::from_secs_f64(duration)
    } else {
        Duration::ZERO
    };
    media + margin
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/mod.rs"]
mod tests;
