use crate::cli::{Cli, Commands, EncodeArgs};
use anyhow::{Context, Result, anyhow, bail};
use ffclip::config::Config;
use ffclip::engine::{
    self, Container, EncodeJob, EncodeOptions, EncodeOutcome, EncodePlan, EncodeSession,
    MediaInfo, MediaProber, SessionEvent, TrimRange, ValidationError, VideoCodec,
};
use ffclip::upload::{self, HttpUploader};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tracing::{debug, warn};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

pub fn run(cli: Cli) {
    let result = match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::Probe { file } => handle_probe(&file),
        Commands::DryRun(args) => handle_dry_run(&args),
        Commands::Encode(args) => handle_encode(&args),
        Commands::Upload { file, service } => handle_upload(&file, service.as_deref()),
        Commands::Services => handle_services(),
        Commands::InitConfig => handle_init_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        warn!("Ignoring unreadable config: {:#}", e);
        Config::default()
    })
}

fn handle_check_ffmpeg() -> Result<()> {
    let tools = load_config().tools();
    let version = engine::ffmpeg_version(&tools)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&tools)?;
    println!("ffprobe found: {}", probe_version);
    Ok(())
}

fn handle_probe(file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let prober = MediaProber::new(load_config().tools());
    let media = prober.probe(file);

    match media.duration_s {
        Some(duration) => println!(
            "Duration: {} ({:.2} seconds)",
            engine::format_time(duration),
            duration
        ),
        None => println!("Duration: unknown"),
    }
    match &media.video {
        Some(video) => println!(
            "Video: {}x{} @ {:.2} fps",
            video.width, video.height, video.fps
        ),
        None => println!("Video: none"),
    }
    if media.audio_streams.is_empty() {
        println!("Audio: none");
    }
    for stream in &media.audio_streams {
        println!("Audio #{}: {} [{}]", stream.index, stream.label(), stream.codec_name);
    }
    for stream in &media.subtitle_streams {
        println!(
            "Subtitle #{}: {} [{}]",
            stream.index,
            stream.label(),
            stream.codec_name
        );
    }
    Ok(())
}

/// A job ready to hand to the session, plus what the planner decided
struct PreparedJob {
    job: EncodeJob,
    plan: EncodePlan,
}

fn handle_dry_run(args: &EncodeArgs) -> Result<()> {
    let config = load_config();
    let prepared = prepare_job(args, &config)?;
    let program = config.tools().ffmpeg_program();

    println!("Input:  {}", prepared.job.input_path.display());
    println!("Output: {}", prepared.job.output_path.display());
    println!("Strategy: {:?}", prepared.plan.strategy);
    if let Some(trim) = prepared.plan.trim_strategy {
        println!("Trim: {:?}", trim);
    }
    if let Some(subtitles) = prepared.plan.subtitle_strategy {
        println!("Subtitles: {:?}", subtitles);
    }
    println!("{}", engine::format_command(&program, &prepared.plan.args));
    Ok(())
}

fn handle_encode(args: &EncodeArgs) -> Result<()> {
    let config = load_config();
    let tools = config.tools();
    if !engine::check_ffmpeg_installation(&tools) {
        bail!(
            "ffmpeg/ffprobe not found. Install ffmpeg or set tools.bin_dir in {}",
            Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".to_string())
        );
    }

    let prepared = prepare_job(args, &config)?;
    let interrupts = interrupt_channel();
    let mut session = EncodeSession::new(config.session_settings());
    session.start(prepared.job, prepared.plan)?;

    let mut stderr = std::io::stderr();
    let outcome = session
        .wait_for_outcome(&interrupts, |event| match event {
            SessionEvent::Started { job_id } => debug!("Job {} started", job_id),
            SessionEvent::Progress { percent, .. } => {
                let _ = write!(stderr, "\rProgress: {}%", percent);
                let _ = stderr.flush();
            }
            SessionEvent::Finished { .. } => {}
        })
        .ok_or_else(|| anyhow!("Encoder thread exited without reporting a result"))?;
    let _ = writeln!(stderr);
    session.join();

    match outcome {
        EncodeOutcome::Completed { output } => {
            println!("Encoded: {}", output.display());
            if let Some(service) = &args.upload {
                let url = upload_with_progress(&output, service)?;
                println!("{}", url);
            }
            Ok(())
        }
        EncodeOutcome::Failed(e) => Err(e.into()),
        EncodeOutcome::Cancelled => {
            eprintln!("Encoding cancelled");
            process::exit(130);
        }
    }
}

/// Ctrl-C cancels the encode through the session instead of killing
/// ffclip with ffmpeg still running.
fn interrupt_channel() -> Receiver<()> {
    let (tx, rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
    rx
}

fn handle_upload(file: &Path, service: Option<&str>) -> Result<()> {
    let service = match service {
        Some(key) => key.to_string(),
        None => load_config().defaults.upload_service,
    };
    let url = upload_with_progress(file, &service)?;
    println!("{}", url);
    Ok(())
}

fn upload_with_progress(file: &Path, service: &str) -> Result<String> {
    let uploader = HttpUploader::new(UPLOAD_TIMEOUT)?;
    eprintln!("Uploading {}...", file.display());
    let url = upload::upload_file(&uploader, file, service)
        .with_context(|| format!("Upload of {} failed", file.display()))?;
    Ok(url)
}

fn handle_services() -> Result<()> {
    for service in upload::SERVICES {
        println!("{:<8} {}", service.key, service);
    }
    Ok(())
}

fn handle_init_config() -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() {
        let config = Config::load_from(&path)?;
        println!("Config loaded successfully from {}", path.display());
        println!("{}", toml::to_string_pretty(&config)?);
    } else {
        let path = Config::default().save()?;
        println!("Created default config at {}", path.display());
    }
    Ok(())
}

/// Turn command-line arguments into a validated job and its ffmpeg plan.
fn prepare_job(args: &EncodeArgs, config: &Config) -> Result<PreparedJob> {
    let input = args.input.clone();
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    if !engine::is_video_file(&input) {
        warn!("{} does not look like a video file", input.display());
    }

    let media = MediaProber::new(config.tools()).probe(&input);
    let trim = resolve_trim(args, &media)?;
    let options = resolve_options(args, config)?;

    let container = match &options {
        Some(options) => options.container,
        None => args
            .output
            .as_deref()
            .and_then(Container::from_path)
            .or_else(|| Container::from_path(&input))
            .unwrap_or(Container::Mp4),
    };

    let output = match &args.output {
        Some(path) => engine::with_container_extension(path, container),
        None => engine::derive_output_path(&input, container, trim.as_ref(), None),
    };
    if same_file(&input, &output) {
        bail!(
            "Output {} would overwrite the input; pass a different --output",
            output.display()
        );
    }

    let mut job = EncodeJob::new(input, output);
    if let Some(options) = options {
        job = job.with_options(options);
    }
    if let Some(trim) = trim {
        job = job.with_trim(trim);
    }

    let plan = engine::build_encode_plan(&job, &media).map_err(validation_report)?;
    Ok(PreparedJob { job, plan })
}

fn resolve_trim(args: &EncodeArgs, media: &MediaInfo) -> Result<Option<TrimRange>> {
    let parse = |label: &str, text: &str| {
        engine::parse_time_strict(text).with_context(|| format!("Invalid {} time '{}'", label, text))
    };

    match (&args.start, &args.end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => Ok(Some(TrimRange::new(
            parse("start", start)?,
            parse("end", end)?,
        ))),
        (Some(start), None) => {
            let end = media
                .duration_s
                .context("--end is required when the source duration is unknown")?;
            Ok(Some(TrimRange::new(parse("start", start)?, end)))
        }
        (None, Some(end)) => Ok(Some(TrimRange::new(0.0, parse("end", end)?))),
    }
}

/// Explicit options when the user (or their config) asked for anything
/// beyond the defaults; `None` leaves the job eligible for passthrough.
fn resolve_options(args: &EncodeArgs, config: &Config) -> Result<Option<EncodeOptions>> {
    let base = config.default_options();
    if !args.has_advanced() && base == EncodeOptions::default() {
        return Ok(None);
    }

    let mut options = base;
    if let Some(codec) = args.codec {
        options.video_codec = codec;
    }
    if let Some(crf) = args.crf {
        options.crf = crf;
    }
    if let Some(preset) = args.preset {
        options.preset = preset;
    }
    if let Some(bitrate) = args.audio_bitrate {
        options.audio_bitrate = bitrate;
    }
    options.fps = args.fps;
    options.resolution = args.resolution;
    options.subtitle_track = args.subtitle_track;
    options.audio_track = args.audio_track;
    if let Some(speed) = &args.speed {
        options.speed = engine::parse_speed(speed)?;
    }

    if let Some(container) = args.container {
        options.container = container;
    } else if let Some(container) = args.output.as_deref().and_then(Container::from_path) {
        options.container = container;
    }

    // Follow the container when the codec was not chosen explicitly
    if args.codec.is_none() && !options.container.supports_codec(options.video_codec) {
        options.video_codec = if options.container.supports_codec(VideoCodec::H264) {
            VideoCodec::H264
        } else {
            VideoCodec::Vp9
        };
    }

    Ok(Some(options))
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canonical =
        |p: &Path| -> PathBuf { std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()) };
    canonical(a) == canonical(b)
}

fn validation_report(errors: Vec<ValidationError>) -> anyhow::Error {
    let lines: Vec<String> = errors
        .iter()
        .map(|e| format!("  {}: {}", e.field, e.message))
        .collect();
    anyhow!("Invalid encode settings:\n{}", lines.join("\n"))
}
