use crate::engine::validate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use super::timecode::{TimeParseError, parse_time_strict};

/// Video encoders the clipper can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 3] = [VideoCodec::H264, VideoCodec::H265, VideoCodec::Vp9];

    /// ffmpeg encoder name passed to `-c:v`
    pub fn encoder(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::H265 => "H.265 (HEVC)",
            VideoCodec::Vp9 => "VP9",
        }
    }

    /// Valid CRF range for this encoder (inclusive)
    pub fn crf_range(self) -> (u8, u8) {
        match self {
            VideoCodec::H264 | VideoCodec::H265 => (0, 51),
            VideoCodec::Vp9 => (0, 63),
        }
    }

    /// Audio encoder paired with this video codec
    pub fn audio_encoder(self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libopus",
            VideoCodec::H264 | VideoCodec::H265 => "aac",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VideoCodec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "x264" | "libx264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "h.265" | "h.265 (hevc)" | "x265" | "libx265" | "hevc" => {
                Ok(VideoCodec::H265)
            }
            "vp9" | "libvpx-vp9" => Ok(VideoCodec::Vp9),
            other => Err(ValidationError::new(
                "video_codec",
                format!("Unknown video codec '{}' (expected h264, h265 or vp9)", other),
            )),
        }
    }
}

/// Output container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
    Webm,
}

impl Container {
    pub const ALL: [Container; 3] = [Container::Mp4, Container::Mkv, Container::Webm];

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
        }
    }

    /// Whether the container can carry the given video codec
    pub fn supports_codec(self, codec: VideoCodec) -> bool {
        match self {
            Container::Mp4 | Container::Mkv => true,
            Container::Webm => codec == VideoCodec::Vp9,
        }
    }

    /// Container implied by a file extension, if it is one we produce
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "mkv" => Ok(Container::Mkv),
            "webm" => Ok(Container::Webm),
            other => Err(ValidationError::new(
                "container",
                format!("Unknown container '{}' (expected mp4, mkv or webm)", other),
            )),
        }
    }
}

/// Encoder speed/efficiency tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    VeryFast,
    Fast,
    Medium,
    Slow,
    VerySlow,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::VeryFast => "veryfast",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::VerySlow => "veryslow",
        }
    }

    /// libvpx-vp9 has no `-preset`; map onto `-cpu-used` (higher is faster)
    pub fn vp9_cpu_used(self) -> u8 {
        match self {
            Preset::VeryFast => 5,
            Preset::Fast => 4,
            Preset::Medium => 3,
            Preset::Slow => 2,
            Preset::VerySlow => 1,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        match normalized.as_str() {
            "veryfast" => Ok(Preset::VeryFast),
            "fast" => Ok(Preset::Fast),
            "medium" => Ok(Preset::Medium),
            "slow" => Ok(Preset::Slow),
            "veryslow" => Ok(Preset::VerySlow),
            _ => Err(ValidationError::new(
                "preset",
                format!(
                    "Unknown preset '{}' (expected veryfast, fast, medium, slow or veryslow)",
                    s.trim()
                ),
            )),
        }
    }
}

/// Audio bitrate, or the request to drop audio entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBitrate {
    Kbps(u32),
    Remove,
}

impl AudioBitrate {
    pub const MIN_KBPS: u32 = 8;
    pub const MAX_KBPS: u32 = 512;
}

impl fmt::Display for AudioBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioBitrate::Kbps(k) => write!(f, "{}k", k),
            AudioBitrate::Remove => f.write_str("remove"),
        }
    }
}

impl FromStr for AudioBitrate {
    type Err = ValidationError;

    /// Accepts `<digits>k` or the remove sentinel (`remove`, `Remove Audio`).
    /// Range checking happens in validation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        if lower == "remove" || lower == "remove audio" || lower == "none" {
            return Ok(AudioBitrate::Remove);
        }
        let invalid = || {
            ValidationError::new(
                "audio_bitrate",
                format!(
                    "Audio bitrate must look like 128k (between {}k and {}k), got '{}'",
                    AudioBitrate::MIN_KBPS,
                    AudioBitrate::MAX_KBPS,
                    s
                ),
            )
        };
        let digits = lower.strip_suffix('k').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse::<u32>().map(AudioBitrate::Kbps).map_err(|_| invalid())
    }
}

impl Serialize for AudioBitrate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AudioBitrate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Target frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const WIDTH_RANGE: (u32, u32) = (16, 7680);
    pub const HEIGHT_RANGE: (u32, u32) = (16, 4320);

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `W:H` form used by the scale filter
    pub fn scale_arg(self) -> String {
        format!("{}:{}", self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    /// Accepts `1920x1080`, `1920 x 1080` or `1920:1080`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ValidationError::new(
                "resolution",
                format!(
                    "Resolution must be in the form WIDTHxHEIGHT, e.g. 1920x1080, got '{}'",
                    s.trim()
                ),
            )
        };
        let lower = s.trim().to_ascii_lowercase();
        let (w, h) = lower
            .split_once('x')
            .or_else(|| lower.split_once(':'))
            .ok_or_else(invalid)?;
        let (w, h) = (w.trim(), h.trim());
        let is_number = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
        if !is_number(w) || !is_number(h) {
            return Err(invalid());
        }
        let width = w.parse().map_err(|_| invalid())?;
        let height = h.parse().map_err(|_| invalid())?;
        Ok(Resolution { width, height })
    }
}

/// Playback speed choices offered to users.
pub const SPEED_PRESETS: &[(&str, f64)] = &[
    ("0.5x", 0.5),
    ("0.75x", 0.75),
    ("1.0x (Normal)", 1.0),
    ("1.5x", 1.5),
    ("1.75x", 1.75),
    ("2.0x", 2.0),
    ("4.0x", 4.0),
];

/// Accepted range for a custom speed multiplier
pub const SPEED_RANGE: (f64, f64) = (0.1, 100.0);

/// Parse a speed label such as `1.5x`, `1.0x (Normal)` or a bare `0.3`.
pub fn parse_speed(label: &str) -> Result<f64, ValidationError> {
    let trimmed = label.trim();
    if let Some((_, factor)) = SPEED_PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(*factor);
    }

    let number = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches(['x', 'X']);
    match number.parse::<f64>() {
        Ok(speed) if speed.is_finite() && speed > 0.0 => Ok(speed),
        _ => Err(ValidationError::new(
            "speed",
            format!("Invalid speed '{}' (expected e.g. 1.5x)", trimmed),
        )),
    }
}

/// Start/end of the clip in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start_s: f64,
    pub end_s: f64,
}

impl TrimRange {
    pub fn new(start_s: f64, end_s: f64) -> Self {
        Self { start_s, end_s }
    }

    /// Build a range from user-entered time strings using strict parsing
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeParseError> {
        Ok(Self {
            start_s: parse_time_strict(start)?,
            end_s: parse_time_strict(end)?,
        })
    }

    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// Snapshot of the user's encode choices, taken once when the job is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub video_codec: VideoCodec,
    pub crf: u8,
    pub preset: Preset,
    /// Target frame rate; `None` keeps the source rate
    pub fps: Option<u32>,
    /// Target frame size; `None` keeps the source size
    pub resolution: Option<Resolution>,
    pub audio_bitrate: AudioBitrate,
    pub container: Container,
    pub speed: f64,
    /// Global stream index of the subtitle track to carry over
    pub subtitle_track: Option<u32>,
    /// Global stream index of the audio track to keep
    pub audio_track: Option<u32>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            crf: 20,
            preset: Preset::Medium,
            fps: None,
            resolution: None,
            audio_bitrate: AudioBitrate::Kbps(128),
            container: Container::Mp4,
            speed: 1.0,
            subtitle_track: None,
            audio_track: None,
        }
    }
}

impl EncodeOptions {
    pub fn changes_speed(&self) -> bool {
        (self.speed - 1.0).abs() > f64::EPSILON
    }
}

/// A fully specified encode, owned by the session that runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// `None` means no advanced options were chosen
    pub options: Option<EncodeOptions>,
    pub trim: Option<TrimRange>,
}

impl EncodeJob {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            options: None,
            trim: None,
        }
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_trim(mut self, trim: TrimRange) -> Self {
        self.trim = Some(trim);
        self
    }

    /// Options in effect. Without explicit options the defaults are used,
    /// adjusted to the container implied by the output path.
    pub fn effective_options(&self) -> EncodeOptions {
        match &self.options {
            Some(options) => options.clone(),
            None => {
                let container = self.container();
                let video_codec = if container.supports_codec(VideoCodec::H264) {
                    VideoCodec::H264
                } else {
                    VideoCodec::Vp9
                };
                EncodeOptions {
                    video_codec,
                    container,
                    ..EncodeOptions::default()
                }
            }
        }
    }

    /// Output container: explicit option, else output extension, else mp4
    pub fn container(&self) -> Container {
        match &self.options {
            Some(options) => options.container,
            None => Container::from_path(&self.output_path).unwrap_or(Container::Mp4),
        }
    }
}
