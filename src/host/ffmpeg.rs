//! [`Host`] backed by the system `ffmpeg` and `ffprobe` binaries.
//!
//! Source bytes are spooled to a temporary file, probed with `ffprobe`, and decoded by a
//! long-lived `ffmpeg` child streaming raw RGBA at the capture rate. The playback clock is
//! virtual: every animation frame advances it by one capture interval, so a run produces
//! exactly one output frame per source interval regardless of how fast compositing is.
//!
//! Encoding uses a second `ffmpeg` child reading raw RGBA on stdin and writing a fragmented
//! container to stdout, which a reader thread forwards as ordered chunks.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::codec::{AudioCodec, CapabilityProbe, Container, H264Profile, MimeType, VideoCodec};
use crate::foundation::core::{CAPTURE_FPS, Fps};
use crate::foundation::error::{ReelmarkError, ReelmarkResult};
use crate::render::composite::flatten_premul_over_bg;
use crate::render::{FrameRGBA, SourceFrame};

use super::{
    AudioTrack, CaptureSink, FrameClock, FrameRequestId, Host, HostEvent, PlaybackSource,
    PlaybackState, SinkConfig, SinkEvent, SinkState, SourceEvent, SourceInfo,
};

/// Size of one read from the encoder's stdout.
const READ_CHUNK: usize = 64 * 1024;

/// Locations of the media binaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FfmpegHostOpts {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegHostOpts {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegHostOpts {
    /// Defaults, overridden by `REELMARK_FFMPEG` / `REELMARK_FFPROBE` when set.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(p) = std::env::var_os("REELMARK_FFMPEG").filter(|v| !v.is_empty()) {
            opts.ffmpeg = PathBuf::from(p);
        }
        if let Some(p) = std::env::var_os("REELMARK_FFPROBE").filter(|v| !v.is_empty()) {
            opts.ffprobe = PathBuf::from(p);
        }
        opts
    }

    /// Return `true` when both binaries can be invoked.
    pub fn tools_available(&self) -> bool {
        runs_ok(&self.ffmpeg) && runs_ok(&self.ffprobe)
    }
}

fn runs_ok(bin: &Path) -> bool {
    Command::new(bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encoders and muxers compiled into the `ffmpeg` binary.
#[derive(Clone, Debug, Default)]
struct Capabilities {
    encoders: HashSet<String>,
    muxers: HashSet<String>,
}

impl Capabilities {
    fn probe(ffmpeg: &Path) -> Self {
        let caps = Self {
            encoders: list_components(ffmpeg, "-encoders"),
            muxers: list_components(ffmpeg, "-muxers"),
        };
        tracing::debug!(
            encoders = caps.encoders.len(),
            muxers = caps.muxers.len(),
            "probed ffmpeg capabilities"
        );
        caps
    }

    fn supports(&self, plan: &EncoderPlan) -> bool {
        self.muxers.contains(plan.muxer)
            && self.encoders.contains(plan.video)
            && self.encoders.contains(plan.audio)
    }
}

/// Parse the table printed by `ffmpeg -encoders` / `-muxers`: a legend, a `--` separator, then
/// one `<flags> <name[,name]> <description>` row per component.
fn list_components(ffmpeg: &Path, flag: &str) -> HashSet<String> {
    let out = match Command::new(ffmpeg).args(["-hide_banner", flag]).output() {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            tracing::warn!(flag, status = %out.status, "ffmpeg capability listing failed");
            return HashSet::new();
        }
        Err(e) => {
            tracing::warn!(flag, error = %e, "failed to run ffmpeg for capability listing");
            return HashSet::new();
        }
    };
    parse_component_table(&String::from_utf8_lossy(&out.stdout))
}

fn parse_component_table(text: &str) -> HashSet<String> {
    text.lines()
        .skip_while(|l| !l.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|l| l.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .map(str::to_string)
        .collect()
}

/// How one output mime type maps onto ffmpeg components.
#[derive(Clone, Debug, PartialEq, Eq)]
struct EncoderPlan {
    muxer: &'static str,
    video: &'static str,
    profile: Option<H264Profile>,
    audio: &'static str,
}

impl EncoderPlan {
    fn for_mime(mime: &MimeType) -> Option<Self> {
        match mime.container {
            Container::Mp4 => {
                let profile = match mime.video {
                    None => None,
                    Some(VideoCodec::H264(profile)) => profile,
                    Some(VideoCodec::Vp8 | VideoCodec::Vp9) => return None,
                };
                match mime.audio {
                    None | Some(AudioCodec::Aac) => {}
                    Some(_) => return None,
                }
                Some(Self {
                    muxer: "mp4",
                    video: "libx264",
                    profile,
                    audio: "aac",
                })
            }
            Container::WebM => {
                let video = match mime.video {
                    None | Some(VideoCodec::Vp9) => "libvpx-vp9",
                    Some(VideoCodec::Vp8) => "libvpx",
                    Some(VideoCodec::H264(_)) => return None,
                };
                let audio = match mime.audio {
                    None | Some(AudioCodec::Opus) => "libopus",
                    Some(AudioCodec::Vorbis) => "libvorbis",
                    Some(AudioCodec::Aac) => return None,
                };
                Some(Self {
                    muxer: "webm",
                    video,
                    profile: None,
                    audio,
                })
            }
        }
    }
}

pub struct FfmpegHost {
    opts: FfmpegHostOpts,
    caps: OnceCell<Capabilities>,
    next_request: u64,
    pending: Option<FrameRequestId>,
    ticks: u64,
}

impl std::fmt::Debug for FfmpegHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegHost")
            .field("opts", &self.opts)
            .field("pending", &self.pending)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl FfmpegHost {
    pub fn new(opts: FfmpegHostOpts) -> Self {
        Self {
            opts,
            caps: OnceCell::new(),
            next_request: 0,
            pending: None,
            ticks: 0,
        }
    }

    pub fn opts(&self) -> &FfmpegHostOpts {
        &self.opts
    }

    fn caps(&self) -> &Capabilities {
        self.caps.get_or_init(|| Capabilities::probe(&self.opts.ffmpeg))
    }

    fn tick(&mut self, source: &mut FfmpegSource, id: FrameRequestId) -> HostEvent {
        let (position, advanced) = source.clock.tick();
        if advanced {
            self.ticks += 1;
        }
        source.position = position;

        let duration = source.info.duration;
        let past_end = source.clock.is_past_end(position, duration);
        if past_end || source.decoder_eof {
            if duration.is_finite() && duration > 0.0 {
                source.position = source.position.min(duration);
            }
            source.state = PlaybackState::Ended;
            source.stop_decoder();
            return HostEvent::Source(SourceEvent::Ended);
        }

        self.pending = None;
        HostEvent::AnimationFrame(id)
    }
}

impl CapabilityProbe for FfmpegHost {
    fn is_type_supported(&self, mime: &str) -> bool {
        let Ok(parsed) = MimeType::parse(mime) else {
            return false;
        };
        EncoderPlan::for_mime(&parsed).is_some_and(|plan| self.caps().supports(&plan))
    }
}

impl Host for FfmpegHost {
    type Source = FfmpegSource;
    type Sink = FfmpegSink;

    #[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
    fn load_video(&mut self, bytes: Arc<[u8]>) -> ReelmarkResult<FfmpegSource> {
        self.ticks = 0;
        self.pending = None;

        if bytes.is_empty() {
            return Err(ReelmarkError::media_load("empty source buffer"));
        }
        let mut file = tempfile::Builder::new()
            .prefix("reelmark-src-")
            .tempfile()
            .map_err(|e| ReelmarkError::media_load(format!("failed to create temp file: {e}")))?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .map_err(|e| ReelmarkError::media_load(format!("failed to spool source: {e}")))?;

        let probe = probe_video(&self.opts.ffprobe, file.path())?;
        tracing::debug!(
            width = probe.width,
            height = probe.height,
            duration = probe.duration,
            has_audio = probe.has_audio,
            "source metadata loaded"
        );

        Ok(FfmpegSource {
            ffmpeg: self.opts.ffmpeg.clone(),
            file: Some(file),
            info: SourceInfo {
                width: probe.width,
                height: probe.height,
                duration: probe.duration,
            },
            has_audio: probe.has_audio,
            position: 0.0,
            clock: FrameClock::starting_at(0.0, CAPTURE_FPS.frame_duration_secs()),
            state: PlaybackState::Unstarted,
            decoder: None,
            decoder_eof: false,
            last_frame: None,
        })
    }

    fn create_sink(
        &mut self,
        cfg: &SinkConfig,
        audio: Option<AudioTrack>,
    ) -> ReelmarkResult<FfmpegSink> {
        let mime = MimeType::parse(&cfg.mime_type)
            .map_err(|e| ReelmarkError::encoder(format!("unusable output type: {e}")))?;
        let plan = EncoderPlan::for_mime(&mime).ok_or_else(|| {
            ReelmarkError::encoder(format!("no ffmpeg encoder for '{}'", cfg.mime_type))
        })?;
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelmarkError::encoder("sink width/height must be non-zero"));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelmarkError::encoder(
                "sink width/height must be even (required for yuv420p output)",
            ));
        }
        if cfg.video_bits_per_second == Some(0) {
            return Err(ReelmarkError::encoder("video bitrate must be positive"));
        }
        let audio = match audio {
            Some(AudioTrack::File(path)) => Some(path),
            Some(AudioTrack::Handle(h)) => {
                tracing::warn!(handle = h, "foreign audio handle ignored by ffmpeg host");
                None
            }
            None => None,
        };

        Ok(FfmpegSink {
            ffmpeg: self.opts.ffmpeg.clone(),
            mime_type: cfg.mime_type.clone(),
            plan,
            cfg: cfg.clone(),
            audio,
            state: SinkState::Inactive,
            child: None,
            stdin: None,
            chunks: None,
            reader: None,
            stderr_drain: None,
            scratch: Vec::new(),
        })
    }

    fn request_animation_frame(&mut self) -> FrameRequestId {
        self.next_request += 1;
        let id = FrameRequestId(self.next_request);
        self.pending = Some(id);
        id
    }

    fn cancel_animation_frame(&mut self, id: FrameRequestId) {
        if self.pending == Some(id) {
            self.pending = None;
        }
    }

    fn next_event(
        &mut self,
        source: &mut FfmpegSource,
        sink: &mut FfmpegSink,
    ) -> Option<HostEvent> {
        if let Some(ev) = sink.poll() {
            return Some(HostEvent::Sink(ev));
        }
        if let (Some(id), PlaybackState::Playing) = (self.pending, source.state) {
            return Some(self.tick(source, id));
        }
        if sink.state == SinkState::Stopping {
            return Some(HostEvent::Sink(sink.wait()));
        }
        None
    }

    fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.ticks as f64 * CAPTURE_FPS.frame_duration_secs())
    }
}

struct ProbeInfo {
    width: u32,
    height: u32,
    duration: f64,
    has_audio: bool,
}

fn probe_video(ffprobe: &Path, path: &Path) -> ReelmarkResult<ProbeInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReelmarkError::media_load(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelmarkError::media_load(format!(
            "ffprobe rejected the source: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelmarkError::media_load(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ReelmarkError::media_load("no video stream found"))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ReelmarkError::media_load("source has no usable dimensions")),
    };

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(ProbeInfo {
        width,
        height,
        duration,
        has_audio,
    })
}

/// Long-lived decoder streaming frames from `start` onwards at the capture rate.
struct FrameDecoder {
    child: Child,
    stdout: ChildStdout,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    start: f64,
    frames_read: u64,
}

impl FrameDecoder {
    fn spawn(ffmpeg: &Path, path: &Path, start: f64) -> ReelmarkResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-v", "error", "-ss", &format!("{start:.6}")])
            .arg("-i")
            .arg(path)
            .args([
                "-an",
                "-vf",
                &format!("fps={}/{}", CAPTURE_FPS.num, CAPTURE_FPS.den),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelmarkError::playback(format!("failed to spawn ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelmarkError::playback("failed to open decoder stdout"))?;
        let stderr_drain = child.stderr.take().map(spawn_stderr_drain);

        Ok(Self {
            child,
            stdout,
            stderr_drain,
            start,
            frames_read: 0,
        })
    }

    /// Read the next frame into `buf`; `Ok(false)` on end of stream.
    fn read_frame(&mut self, buf: &mut [u8]) -> ReelmarkResult<bool> {
        match self.stdout.read_exact(buf) {
            Ok(()) => {
                self.frames_read += 1;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(ReelmarkError::playback(format!("decoder read failed: {e}"))),
        }
    }

    fn finish(mut self) -> String {
        let _ = self.child.kill();
        let _ = self.child.wait();
        join_stderr(self.stderr_drain.take())
    }
}

pub struct FfmpegSource {
    ffmpeg: PathBuf,
    file: Option<tempfile::NamedTempFile>,
    info: SourceInfo,
    has_audio: bool,
    position: f64,
    clock: FrameClock,
    state: PlaybackState,
    decoder: Option<FrameDecoder>,
    decoder_eof: bool,
    last_frame: Option<SourceFrame>,
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("info", &self.info)
            .field("position", &self.position)
            .field("state", &self.state)
            .field("released", &self.file.is_none())
            .finish_non_exhaustive()
    }
}

impl FfmpegSource {
    fn path(&self) -> ReelmarkResult<&Path> {
        self.file
            .as_ref()
            .map(|f| f.path())
            .ok_or_else(|| ReelmarkError::playback("source was released"))
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 4
    }

    fn stop_decoder(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            let stderr = decoder.finish();
            if !stderr.is_empty() {
                tracing::debug!(stderr = %stderr, "decoder stderr");
            }
        }
    }

    /// Decode a single frame at the current position without a running decoder.
    fn decode_still(&mut self) -> ReelmarkResult<SourceFrame> {
        let out = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{:.6}", self.position)])
            .arg("-i")
            .arg(self.path()?)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .output()
            .map_err(|e| ReelmarkError::playback(format!("failed to run ffmpeg decode: {e}")))?;
        if !out.status.success() {
            return Err(ReelmarkError::playback(format!(
                "ffmpeg frame decode failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        if out.stdout.len() < self.frame_len() {
            return Err(ReelmarkError::playback(format!(
                "no frame decoded at {:.3}s",
                self.position
            )));
        }
        let mut data = out.stdout;
        data.truncate(self.frame_len());
        Ok(SourceFrame {
            width: self.info.width,
            height: self.info.height,
            data: Arc::new(data),
        })
    }
}

impl PlaybackSource for FfmpegSource {
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
        if self.state == PlaybackState::Playing {
            return Ok(());
        }
        let decoder = FrameDecoder::spawn(&self.ffmpeg, self.path()?, self.position);
        match decoder {
            Ok(d) => {
                self.decoder = Some(d);
                self.decoder_eof = false;
                self.clock = FrameClock::starting_at(self.position, self.clock.step());
                self.state = PlaybackState::Playing;
                Ok(())
            }
            Err(e) => {
                self.state = PlaybackState::Errored;
                Err(e)
            }
        }
    }

    fn seek(&mut self, position: f64) -> ReelmarkResult<()> {
        if self.state == PlaybackState::Playing {
            return Err(ReelmarkError::playback("cannot seek while playing"));
        }
        let end = if self.info.duration.is_finite() {
            self.info.duration.max(0.0)
        } else {
            f64::MAX
        };
        self.position = position.clamp(0.0, end);
        self.last_frame = None;
        Ok(())
    }

    fn current_frame(&mut self) -> ReelmarkResult<SourceFrame> {
        let frame_len = self.frame_len();
        let Some(decoder) = self.decoder.as_mut() else {
            if let Some(frame) = &self.last_frame {
                return Ok(frame.clone());
            }
            let frame = self.decode_still()?;
            self.last_frame = Some(frame.clone());
            return Ok(frame);
        };

        let want = ((self.position - decoder.start) * CAPTURE_FPS.as_f64()).round().max(0.0) as u64;
        while !self.decoder_eof && decoder.frames_read <= want {
            let mut buf = vec![0u8; frame_len];
            if decoder.read_frame(&mut buf)? {
                self.last_frame = Some(SourceFrame {
                    width: self.info.width,
                    height: self.info.height,
                    data: Arc::new(buf),
                });
            } else {
                self.decoder_eof = true;
            }
        }

        self.last_frame.clone().ok_or_else(|| {
            self.state = PlaybackState::Errored;
            ReelmarkError::playback("decoder produced no frames")
        })
    }

    fn audio_track(&self) -> Option<AudioTrack> {
        if !self.has_audio {
            return None;
        }
        self.file
            .as_ref()
            .map(|f| AudioTrack::File(f.path().to_path_buf()))
    }

    fn release(&mut self) {
        self.stop_decoder();
        self.last_frame = None;
        if let Some(file) = self.file.take()
            && let Err(e) = file.close()
        {
            tracing::warn!(error = %e, "failed to delete spooled source");
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop_decoder();
    }
}

type ChunkRx = Receiver<std::io::Result<Vec<u8>>>;

pub struct FfmpegSink {
    ffmpeg: PathBuf,
    mime_type: String,
    plan: EncoderPlan,
    cfg: SinkConfig,
    audio: Option<PathBuf>,
    state: SinkState,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<ChunkRx>,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
}

impl std::fmt::Debug for FfmpegSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSink")
            .field("mime_type", &self.mime_type)
            .field("state", &self.state)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl FfmpegSink {
    fn command(&self, timeslice: Duration) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", self.cfg.width, self.cfg.height),
        ]);
        push_input_fps(&mut cmd, self.cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        if let Some(audio) = &self.audio {
            cmd.arg("-i")
                .arg(audio)
                .args(["-map", "0:v:0", "-map", "1:a:0?", "-c:a", self.plan.audio])
                .arg("-shortest");
        } else {
            cmd.arg("-an");
        }

        cmd.args(["-c:v", self.plan.video, "-pix_fmt", "yuv420p"]);
        if let Some(profile) = self.plan.profile {
            cmd.args(["-profile:v", profile.x264_name()]);
        }
        if let Some(bps) = self.cfg.video_bits_per_second {
            cmd.args(["-b:v", &bps.to_string()]);
        }

        match self.plan.muxer {
            "mp4" => {
                cmd.args([
                    "-movflags",
                    "frag_keyframe+empty_moov+default_base_moof",
                    "-frag_duration",
                    &timeslice.as_micros().to_string(),
                    "-f",
                    "mp4",
                ]);
            }
            muxer => {
                cmd.args([
                    "-deadline",
                    "realtime",
                    "-cpu-used",
                    "8",
                    "-cluster_time_limit",
                    &timeslice.as_millis().to_string(),
                    "-f",
                    muxer,
                ]);
            }
        }
        cmd.arg("pipe:1");
        cmd
    }

    /// Next delivery without blocking.
    fn poll(&mut self) -> Option<SinkEvent> {
        if self.state != SinkState::Recording {
            return None;
        }
        let rx = self.chunks.as_ref()?;
        match rx.try_recv() {
            Ok(Ok(bytes)) => Some(SinkEvent::Data(bytes)),
            Ok(Err(e)) => {
                self.abort();
                Some(SinkEvent::Error(format!("encoder output read failed: {e}")))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                let stderr = self.abort();
                Some(SinkEvent::Error(format!(
                    "encoder exited while recording: {stderr}"
                )))
            }
        }
    }

    /// Block until the finalizing encoder delivers its next chunk or exits.
    fn wait(&mut self) -> SinkEvent {
        if let Some(rx) = self.chunks.as_ref() {
            match rx.recv() {
                Ok(Ok(bytes)) => return SinkEvent::Data(bytes),
                Ok(Err(e)) => {
                    self.abort();
                    return SinkEvent::Error(format!("encoder output read failed: {e}"));
                }
                Err(_) => {}
            }
        }
        self.chunks = None;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let status = self.child.take().map(|mut c| c.wait());
        let stderr = join_stderr(self.stderr_drain.take());
        self.state = SinkState::Stopped;
        match status {
            Some(Ok(s)) if s.success() => SinkEvent::Stopped,
            Some(Ok(s)) => SinkEvent::Error(format!("ffmpeg exited with status {s}: {stderr}")),
            Some(Err(e)) => SinkEvent::Error(format!("failed to wait for ffmpeg: {e}")),
            None => SinkEvent::Error("encoder was never started".to_string()),
        }
    }

    /// Kill the encoder and return what it wrote to stderr.
    fn abort(&mut self) -> String {
        drop(self.stdin.take());
        self.chunks = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.state = SinkState::Inactive;
        join_stderr(self.stderr_drain.take())
    }
}

impl CaptureSink for FfmpegSink {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> SinkState {
        self.state
    }

    fn start(&mut self, timeslice: Duration) -> ReelmarkResult<()> {
        if self.state != SinkState::Inactive || self.child.is_some() {
            return Err(ReelmarkError::encoder("sink already started"));
        }

        let mut child = self.command(timeslice).spawn().map_err(|e| {
            ReelmarkError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelmarkError::encoder("failed to open ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelmarkError::encoder("failed to open ffmpeg stdout"))?;
        let stderr_drain = child.stderr.take().map(spawn_stderr_drain);

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        tracing::debug!(
            mime_type = %self.mime_type,
            video = self.plan.video,
            audio = self.audio.is_some(),
            "encoder started"
        );
        self.scratch = vec![0u8; self.cfg.width as usize * self.cfg.height as usize * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks = Some(rx);
        self.reader = Some(reader);
        self.stderr_drain = stderr_drain;
        self.state = SinkState::Recording;
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> ReelmarkResult<()> {
        if self.state != SinkState::Recording {
            return Err(ReelmarkError::encoder("sink is not recording"));
        }
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(ReelmarkError::encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(ReelmarkError::encoder(
                "frame.data size mismatch with width*height*4",
            ));
        }

        if frame.premultiplied {
            flatten_premul_over_bg(&mut self.scratch, &frame.data, [0, 0, 0]);
        } else {
            self.scratch.copy_from_slice(&frame.data);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelmarkError::encoder("ffmpeg stdin is closed"));
        };
        stdin
            .write_all(&self.scratch)
            .map_err(|e| ReelmarkError::encoder(format!("failed to write frame to ffmpeg: {e}")))
    }

    fn stop(&mut self) -> ReelmarkResult<()> {
        if self.state != SinkState::Recording {
            return Ok(());
        }
        drop(self.stdin.take());
        self.state = SinkState::Stopping;
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` before `-i` sets the input frame rate.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn spawn_stderr_drain(
    mut stderr: std::process::ChildStderr,
) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    })
}

fn join_stderr(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> String {
    match handle.map(JoinHandle::join) {
        Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Some(Ok(Err(e))) => format!("<stderr read failed: {e}>"),
        Some(Err(_)) => "<stderr drain thread panicked>".to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/ffmpeg.rs"]
mod tests;
