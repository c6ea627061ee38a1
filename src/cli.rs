use clap::{Args, Parser, Subcommand};
use ffclip::engine::{AudioBitrate, Container, Preset, Resolution, VideoCodec};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffclip")]
#[command(about = "Trim and re-encode video clips with ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug output to stderr (RUST_LOG also works)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show duration and streams of a video file
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show the ffmpeg command for a clip without running it
    DryRun(EncodeArgs),

    /// Cut and encode a clip
    Encode(EncodeArgs),

    /// Upload a file to a public file host
    Upload {
        file: PathBuf,

        /// Service key (see `ffclip services`)
        #[arg(long)]
        service: Option<String>,
    },

    /// List upload services and their limits
    Services,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

#[derive(Args, Debug, Clone)]
pub struct EncodeArgs {
    /// Source video
    pub input: PathBuf,

    /// Clip start, M:SS or H:MM:SS
    #[arg(long)]
    pub start: Option<String>,

    /// Clip end, M:SS or H:MM:SS
    #[arg(long)]
    pub end: Option<String>,

    /// Output file (default: <input>-<start>-<end>-clip.<ext> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// h264, h265 or vp9
    #[arg(long)]
    pub codec: Option<VideoCodec>,

    #[arg(long)]
    pub crf: Option<u8>,

    /// veryfast, fast, medium, slow or veryslow
    #[arg(long)]
    pub preset: Option<Preset>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// WIDTHxHEIGHT, e.g. 1280x720
    #[arg(long)]
    pub resolution: Option<Resolution>,

    /// e.g. 128k, or "remove" to drop audio
    #[arg(long)]
    pub audio_bitrate: Option<AudioBitrate>,

    /// mp4, mkv or webm
    #[arg(long)]
    pub container: Option<Container>,

    /// Playback speed, e.g. 1.5x or 0.75
    #[arg(long)]
    pub speed: Option<String>,

    /// Global stream index of the subtitle track to keep or burn in
    #[arg(long)]
    pub subtitle_track: Option<u32>,

    /// Global stream index of the audio track to keep
    #[arg(long)]
    pub audio_track: Option<u32>,

    /// Upload the finished clip to this service
    #[arg(long)]
    pub upload: Option<String>,
}

impl EncodeArgs {
    /// Whether the user asked for anything beyond a plain cut
    pub fn has_advanced(&self) -> bool {
        self.codec.is_some()
            || self.crf.is_some()
            || self.preset.is_some()
            || self.fps.is_some()
            || self.resolution.is_some()
            || self.audio_bitrate.is_some()
            || self.container.is_some()
            || self.speed.is_some()
            || self.subtitle_track.is_some()
            || self.audio_track.is_some()
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
