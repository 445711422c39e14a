use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reelmark::{
    CapabilityProbe as _, FfmpegHost, FfmpegHostOpts, MimeType, Pipeline, PipelineOpts,
    ProcessRequest, RunSettings,
};

#[derive(Parser, Debug)]
#[command(name = "reelmark", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite overlays onto a video and re-encode it at 1080x1920 (requires `ffmpeg`).
    Render(RenderArgs),
    /// Composite a single frame as a PNG.
    Frame(FrameArgs),
    /// Show which output types the local `ffmpeg` can produce.
    Codecs,
}

#[derive(Parser, Debug)]
struct InputArgs {
    /// Source video.
    #[arg(long)]
    video: PathBuf,

    /// Logo image (PNG, JPEG, ...).
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Run settings JSON; missing fields use defaults.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Caption text; enables the text overlay and replaces the settings' content.
    #[arg(long)]
    text: Option<String>,

    /// Font file for the caption instead of the system bold sans-serif.
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output path; the extension should match the negotiated container.
    #[arg(long)]
    out: PathBuf,

    /// Target video bitrate in bits per second.
    #[arg(long, default_value_t = reelmark::TARGET_VIDEO_BITRATE)]
    bitrate: u32,

    /// Seconds allowed beyond the source duration before giving up.
    #[arg(long, default_value_t = 10.0)]
    timeout_margin: f64,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Source position in seconds.
    #[arg(long, default_value_t = 0.0)]
    at: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Codecs => cmd_codecs(),
    }
}

fn read_settings(path: Option<&Path>) -> anyhow::Result<RunSettings> {
    let Some(path) = path else {
        return Ok(RunSettings::default());
    };
    let f = File::open(path).with_context(|| format!("open settings '{}'", path.display()))?;
    let settings: RunSettings = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse settings JSON '{}'", path.display()))?;
    Ok(settings)
}

fn build_request(input: &InputArgs) -> anyhow::Result<ProcessRequest> {
    let mut settings = read_settings(input.settings.as_deref())?;
    if let Some(text) = &input.text {
        settings.text.enabled = true;
        settings.text.content = text.clone();
    }
    settings.validate()?;

    let video = std::fs::read(&input.video)
        .with_context(|| format!("read video '{}'", input.video.display()))?;
    let logo = input
        .logo
        .as_ref()
        .map(|p| std::fs::read(p).with_context(|| format!("read logo '{}'", p.display())))
        .transpose()?;

    Ok(ProcessRequest {
        video: Arc::from(video),
        logo: logo.map(Arc::from),
        watermark: settings.watermark,
        text: settings.text,
    })
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    if !args.timeout_margin.is_finite() || args.timeout_margin < 0.0 {
        anyhow::bail!("--timeout-margin must be a non-negative number of seconds");
    }
    let req = build_request(&args.input)?;
    let opts = PipelineOpts {
        timeout_margin: Duration::from_secs_f64(args.timeout_margin),
        video_bits_per_second: Some(args.bitrate),
        font_path: args.input.font.clone(),
        ..PipelineOpts::default()
    };

    let mut pipeline = Pipeline::new(FfmpegHost::new(FfmpegHostOpts::from_env()), opts);
    let out = pipeline.process(req, |p| eprint!("\rprogress {p:5.1}%"))?;
    eprintln!();

    let ext = MimeType::parse(&out.mime_type)?.file_extension();
    let requested = args.out.extension().and_then(|e| e.to_str());
    if !requested.is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
        tracing::warn!(
            out = %args.out.display(),
            mime_type = %out.mime_type,
            "output extension does not match the produced container (.{ext})"
        );
    }

    ensure_parent_dir(&args.out)?;
    std::fs::write(&args.out, &out.bytes)
        .with_context(|| format!("write output '{}'", args.out.display()))?;
    eprintln!(
        "wrote {} ({} bytes, {})",
        args.out.display(),
        out.bytes.len(),
        out.mime_type
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let req = build_request(&args.input)?;
    let opts = PipelineOpts {
        font_path: args.input.font.clone(),
        ..PipelineOpts::default()
    };
    let mut pipeline = Pipeline::new(FfmpegHost::new(FfmpegHostOpts::from_env()), opts);
    let frame = pipeline.render_still(&req, args.at)?;

    ensure_parent_dir(&args.out)?;
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_codecs() -> anyhow::Result<()> {
    let host = FfmpegHost::new(FfmpegHostOpts::from_env());
    for mime in reelmark::codec::CANDIDATES {
        let mark = if host.is_type_supported(mime) { "yes" } else { "no" };
        println!("{mark:>3}  {mime}");
    }
    let negotiated = reelmark::negotiate(&host);
    println!(
        "selected: {}{}",
        negotiated.mime_type,
        if negotiated.fallback { " (fallback)" } else { "" }
    );
    Ok(())
}
