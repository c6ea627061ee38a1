use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::options::{
    AudioBitrate, Container, EncodeJob, EncodeOptions, Preset, Resolution, TrimRange, VideoCodec,
};
use crate::engine::probe::MediaInfo;
use crate::engine::validate::{ValidationError, validate_job};

/// How far before the requested start the fast input seek lands in a hybrid trim
pub const HYBRID_PREROLL_S: f64 = 3.0;

/// Format seconds for `-ss`/`-t`: millisecond precision, no trailing zeros
pub fn seconds_arg(seconds: f64) -> String {
    let s = format!("{:.3}", seconds.max(0.0));
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Decompose a speed factor into `atempo` stages, each within 0.5x-2.0x.
///
/// Out-of-range factors are split into 2.0 (or 0.5) stages and a final
/// stage carrying the remainder, e.g. 4.0 -> `[2.00, 2.00]` and
/// 0.3 -> `[0.50, 0.60]`.
pub fn atempo_chain(speed: f64) -> Vec<String> {
    let mut stages = Vec::new();
    let mut remaining = speed;

    if !remaining.is_finite() || remaining <= 0.0 {
        return stages;
    }

    while remaining > 2.0 {
        stages.push("atempo=2.00".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.50".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={:.2}", remaining));
    stages
}

/// Escape a file path for use inside a quoted filter argument
/// (`subtitles='<path>'`).
///
/// Windows separators become `/`; elsewhere a backslash is part of the
/// file name and is escaped.
pub fn escape_filter_path(path: &str) -> String {
    let path = if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.replace('\\', "\\\\")
    };
    path.replace(':', "\\:").replace('\'', "'\\''")
}

/// Subtitle codec families that decide how a track can reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleKind {
    /// Text formats that libass can render (srt, ass, ...)
    Text,
    /// MP4-native text
    MovText,
    WebVtt,
    /// Image-based (PGS, VobSub, DVB)
    Bitmap,
}

impl SubtitleKind {
    pub fn from_codec(codec_name: &str) -> Self {
        match codec_name.to_ascii_lowercase().as_str() {
            "mov_text" => SubtitleKind::MovText,
            "webvtt" => SubtitleKind::WebVtt,
            "hdmv_pgs_subtitle" | "pgssub" | "dvd_subtitle" | "dvdsub" | "dvb_subtitle"
            | "dvbsub" | "xsub" => SubtitleKind::Bitmap,
            _ => SubtitleKind::Text,
        }
    }
}

/// What happens to a selected subtitle track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleStrategy {
    /// Render into the video frames; no subtitle stream in the output
    BurnIn,
    /// Carry the stream over unchanged
    SoftCopy,
    /// Neither renderable nor storable; skipped with a warning
    Drop,
}

/// Container x subtitle kind lookup table
pub fn subtitle_strategy(container: Container, kind: SubtitleKind) -> SubtitleStrategy {
    match (container, kind) {
        (Container::Mkv, SubtitleKind::MovText) => SubtitleStrategy::BurnIn,
        (Container::Mkv, _) => SubtitleStrategy::SoftCopy,
        (Container::Mp4, SubtitleKind::MovText) => SubtitleStrategy::SoftCopy,
        (Container::Webm, SubtitleKind::WebVtt) => SubtitleStrategy::SoftCopy,
        (_, SubtitleKind::Bitmap) => SubtitleStrategy::Drop,
        (_, _) => SubtitleStrategy::BurnIn,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimStrategy {
    /// `-ss`/`-t` after `-i`: decode from the start, frame accurate
    Simple,
    /// Fast `-ss` before `-i` plus a precise `-ss`/`-t` after it
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// Stream copy into the new container
    Passthrough,
    Reencode,
}

/// Ordered ffmpeg argument assembly.
///
/// Video filters are held in fixed slots so the chain always comes out as
/// subtitles, scale, fps, setpts regardless of call order.
#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    input: PathBuf,
    pre_input: Vec<OsString>,
    post_input: Vec<OsString>,
    /// Where the input seek landed; frame timestamps restart at 0 there
    input_seek_s: f64,
    subtitle_filter: Option<String>,
    scale: Option<Resolution>,
    fps: Option<u32>,
    speed: Option<f64>,
    maps: Vec<OsString>,
    subtitle_args: Vec<OsString>,
    codec_args: Vec<OsString>,
    audio_args: Vec<OsString>,
    audio_removed: bool,
}

impl FfmpegCommandBuilder {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            pre_input: Vec::new(),
            post_input: Vec::new(),
            input_seek_s: 0.0,
            subtitle_filter: None,
            scale: None,
            fps: None,
            speed: None,
            maps: Vec::new(),
            subtitle_args: Vec::new(),
            codec_args: Vec::new(),
            audio_args: Vec::new(),
            audio_removed: false,
        }
    }

    /// Seek and duration both after `-i`
    pub fn simple_trim(mut self, trim: &TrimRange) -> Self {
        self.pre_input.clear();
        self.input_seek_s = 0.0;
        self.post_input = vec![
            "-ss".into(),
            seconds_arg(trim.start_s).into(),
            "-t".into(),
            seconds_arg(trim.duration_s()).into(),
        ];
        self
    }

    /// Coarse input seek to shortly before `start`, then a precise output
    /// seek relative to where the input seek landed.
    pub fn hybrid_trim(mut self, trim: &TrimRange) -> Self {
        let coarse = (trim.start_s - HYBRID_PREROLL_S).max(0.0);
        self.pre_input = vec!["-ss".into(), seconds_arg(coarse).into()];
        self.input_seek_s = coarse;
        self.post_input = vec![
            "-ss".into(),
            seconds_arg(trim.start_s - coarse).into(),
            "-t".into(),
            seconds_arg(trim.duration_s()).into(),
        ];
        self
    }

    pub fn trim(self, trim: &TrimRange, strategy: TrimStrategy) -> Self {
        match strategy {
            TrimStrategy::Simple => self.simple_trim(trim),
            TrimStrategy::Hybrid => self.hybrid_trim(trim),
        }
    }

    /// Render subtitle stream `si` (position among subtitle streams) of `path`
    pub fn burn_subtitles(mut self, path: &Path, si: u32) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.subtitle_filter = Some(format!(
            "subtitles='{}':si={}",
            escape_filter_path(&absolute.to_string_lossy()),
            si
        ));
        self.subtitle_args = vec!["-sn".into()];
        self
    }

    pub fn copy_subtitles(mut self, map_index: u32) -> Self {
        self.subtitle_args = vec![
            "-map".into(),
            format!("0:s:{}", map_index).into(),
            "-c:s".into(),
            "copy".into(),
        ];
        self
    }

    pub fn no_subtitles(mut self) -> Self {
        self.subtitle_args = vec!["-sn".into()];
        self
    }

    pub fn scale(mut self, resolution: Resolution) -> Self {
        self.scale = Some(resolution);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Playback speed: `setpts` on video and an `atempo` chain on audio
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn map(mut self, selector: &str) -> Self {
        self.maps.push("-map".into());
        self.maps.push(selector.into());
        self
    }

    pub fn stream_copy(mut self) -> Self {
        self.codec_args = ["-c:v", "copy", "-c:a", "copy"]
            .into_iter()
            .map(OsString::from)
            .collect();
        self
    }

    /// Video codec, CRF and preset
    pub fn video_codec(mut self, codec: VideoCodec, crf: u8, preset: Preset) -> Self {
        let mut args = vec![
            "-c:v".to_string(),
            codec.encoder().to_string(),
            "-crf".to_string(),
            crf.to_string(),
        ];
        match codec {
            VideoCodec::Vp9 => {
                // Constant quality mode needs an explicit zero bitrate
                args.push("-b:v".to_string());
                args.push("0".to_string());
                args.push("-deadline".to_string());
                args.push("good".to_string());
                args.push("-cpu-used".to_string());
                args.push(preset.vp9_cpu_used().to_string());
            }
            VideoCodec::H264 | VideoCodec::H265 => {
                args.push("-preset".to_string());
                args.push(preset.as_str().to_string());
            }
        }
        self.codec_args = args.into_iter().map(OsString::from).collect();
        self
    }

    pub fn audio(mut self, encoder: &str, bitrate_kbps: u32) -> Self {
        self.audio_removed = false;
        self.audio_args = vec![
            "-c:a".into(),
            encoder.into(),
            "-b:a".into(),
            format!("{}k", bitrate_kbps).into(),
        ];
        self
    }

    pub fn remove_audio(mut self) -> Self {
        self.audio_removed = true;
        self.audio_args = vec!["-an".into()];
        self
    }

    fn video_filter_chain(&self) -> Vec<String> {
        let mut filters = Vec::new();
        if let Some(subtitles) = &self.subtitle_filter {
            // The subtitles filter re-reads the source and picks cues by frame
            // time, so shift frames back onto the source clock around it
            if self.input_seek_s > 0.0 {
                filters.push(format!("setpts=PTS+{}/TB", seconds_arg(self.input_seek_s)));
                filters.push(subtitles.clone());
                filters.push("setpts=PTS-STARTPTS".to_string());
            } else {
                filters.push(subtitles.clone());
            }
        }
        if let Some(resolution) = self.scale {
            filters.push(format!("scale={}", resolution.scale_arg()));
        }
        if let Some(fps) = self.fps {
            filters.push(format!("fps={}", fps));
        }
        if let Some(speed) = self.speed {
            filters.push(format!("setpts=PTS/{}", speed));
        }
        filters
    }

    /// Full argument vector (program name excluded), output path last
    pub fn build(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];
        args.extend(self.pre_input.iter().cloned());
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());
        args.extend(self.post_input.iter().cloned());

        let video_filters = self.video_filter_chain();
        if !video_filters.is_empty() {
            args.push("-vf".into());
            args.push(video_filters.join(",").into());
        }

        if !self.audio_removed {
            if let Some(speed) = self.speed {
                let chain = atempo_chain(speed);
                if !chain.is_empty() {
                    args.push("-filter:a".into());
                    args.push(chain.join(",").into());
                }
            }
        }

        args.extend(self.maps.iter().cloned());
        args.extend(self.subtitle_args.iter().cloned());
        args.extend(self.codec_args.iter().cloned());
        args.extend(self.audio_args.iter().cloned());
        args.push(output.as_os_str().to_os_string());
        args
    }
}

/// A validated, ready-to-run encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodePlan {
    pub args: Vec<OsString>,
    pub strategy: EncodeStrategy,
    pub trim_strategy: Option<TrimStrategy>,
    pub subtitle_strategy: Option<SubtitleStrategy>,
    /// Output duration used as the progress denominator (0 when unknown)
    pub expected_duration_s: f64,
}

fn passthrough_allowed(job: &EncodeJob, media: &MediaInfo) -> bool {
    job.options.is_none() && job.trim.is_none() && media.video.is_some() && media.duration_s.is_some()
}

/// Filters that shift output timing relative to the input need the
/// input-relative precise seek of a hybrid trim.
fn needs_hybrid_trim(builder: &FfmpegCommandBuilder) -> bool {
    builder.subtitle_filter.is_some()
        || builder.scale.is_some()
        || builder.fps.is_some()
        || builder.speed.is_some()
}

fn apply_filters(
    mut builder: FfmpegCommandBuilder,
    job: &EncodeJob,
    options: &EncodeOptions,
    media: &MediaInfo,
) -> (FfmpegCommandBuilder, Option<SubtitleStrategy>) {
    let mut chosen = None;

    if let Some(stream) = options.subtitle_track.and_then(|i| media.subtitle_stream(i)) {
        let kind = SubtitleKind::from_codec(&stream.codec_name);
        let strategy = subtitle_strategy(options.container, kind);
        builder = match strategy {
            SubtitleStrategy::BurnIn => builder.burn_subtitles(&job.input_path, stream.map_index),
            SubtitleStrategy::SoftCopy => builder.copy_subtitles(stream.map_index),
            SubtitleStrategy::Drop => {
                warn!(
                    "Subtitle stream #{} ({}) cannot be burned in or stored in {}; dropping it",
                    stream.index, stream.codec_name, options.container
                );
                builder.no_subtitles()
            }
        };
        chosen = Some(strategy);
    }

    if let Some(resolution) = options.resolution {
        let same = media
            .video
            .is_some_and(|v| v.width == resolution.width && v.height == resolution.height);
        if !same {
            builder = builder.scale(resolution);
        }
    }

    if let Some(fps) = options.fps {
        let same = media.video.is_some_and(|v| (v.fps - fps as f64).abs() < 0.01);
        if !same {
            builder = builder.fps(fps);
        }
    }

    if options.changes_speed() {
        builder = builder.speed(options.speed);
    }

    (builder, chosen)
}

/// Validate `job` against the probed source and build its ffmpeg arguments.
pub fn build_encode_plan(job: &EncodeJob, media: &MediaInfo) -> Result<EncodePlan, Vec<ValidationError>> {
    validate_job(job, media)?;

    if passthrough_allowed(job, media) {
        let args = FfmpegCommandBuilder::new(&job.input_path)
            .map("0:v")
            .map("0:a?")
            .stream_copy()
            .build(&job.output_path);
        debug!("Passthrough plan for {}", job.input_path.display());
        return Ok(EncodePlan {
            args,
            strategy: EncodeStrategy::Passthrough,
            trim_strategy: None,
            subtitle_strategy: None,
            expected_duration_s: media.duration_s.unwrap_or(0.0),
        });
    }

    let options = job.effective_options();
    let builder = FfmpegCommandBuilder::new(&job.input_path);
    let (mut builder, subtitle_strategy) = apply_filters(builder, job, &options, media);

    let mut trim_strategy = None;
    if let Some(trim) = &job.trim {
        let strategy = if needs_hybrid_trim(&builder) {
            TrimStrategy::Hybrid
        } else {
            TrimStrategy::Simple
        };
        builder = builder.trim(trim, strategy);
        trim_strategy = Some(strategy);
    }

    builder = builder.map("0:v");
    builder = match options.audio_bitrate {
        AudioBitrate::Remove => builder.remove_audio(),
        AudioBitrate::Kbps(kbps) => {
            let builder = match media.audio_map_index(options.audio_track) {
                Some(position) => builder.map(&format!("0:a:{}", position)),
                None => builder.map("0:a:0?"),
            };
            builder.audio(options.video_codec.audio_encoder(), kbps)
        }
    };
    builder = builder.video_codec(options.video_codec, options.crf, options.preset);

    let source_span = match &job.trim {
        Some(trim) => trim.duration_s(),
        None => media.duration_s.unwrap_or(0.0),
    };

    Ok(EncodePlan {
        args: builder.build(&job.output_path),
        strategy: EncodeStrategy::Reencode,
        trim_strategy,
        subtitle_strategy,
        expected_duration_s: source_span / options.speed,
    })
}
