// Input probing using ffprobe

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::core::Tools;

/// Frame size and rate of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// One audio or subtitle stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Global stream index within the file
    pub index: u32,
    /// 0-based position within its stream-type group, used by `-map 0:a:N`
    pub map_index: u32,
    pub codec_name: String,
    pub language: String,
    pub title: String,
}

impl StreamInfo {
    /// Short human-readable label, e.g. `#2 eng - Commentary [aac]`
    pub fn label(&self) -> String {
        let mut label = format!("#{} {}", self.index, self.language);
        if !self.title.is_empty() {
            label.push_str(" - ");
            label.push_str(&self.title);
        }
        if !self.codec_name.is_empty() {
            label.push_str(&format!(" [{}]", self.codec_name));
        }
        label
    }
}

/// Everything the command builder needs to know about a source file.
///
/// Each field is filled independently; a failed query leaves its field
/// empty rather than failing the whole probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration; `None` when unknown or non-positive
    pub duration_s: Option<f64>,
    pub video: Option<VideoStreamInfo>,
    pub audio_streams: Vec<StreamInfo>,
    pub subtitle_streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn audio_stream(&self, index: u32) -> Option<&StreamInfo> {
        self.audio_streams.iter().find(|s| s.index == index)
    }

    pub fn subtitle_stream(&self, index: u32) -> Option<&StreamInfo> {
        self.subtitle_streams.iter().find(|s| s.index == index)
    }

    /// Position of the selected (or first) audio stream within the audio group
    pub fn audio_map_index(&self, selected: Option<u32>) -> Option<u32> {
        if self.audio_streams.is_empty() {
            return None;
        }
        Some(
            selected
                .and_then(|index| self.audio_stream(index))
                .map(|s| s.map_index)
                .unwrap_or(0),
        )
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return s.trim().parse().ok().filter(|v: &f64| *v > 0.0);
    }

    let numerator: f64 = parts[0].trim().parse().ok()?;
    let denominator: f64 = parts[1].trim().parse().ok()?;

    if denominator == 0.0 {
        return None;
    }

    Some(numerator / denominator)
}

/// Parse the duration from `-show_entries format=duration -of json` output.
/// Zero or negative durations count as unknown.
pub fn parse_duration_json(json: &str) -> Result<Option<f64>> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let duration_str = probe
        .format
        .and_then(|f| f.duration)
        .context("No duration found in ffprobe output")?;

    let duration = duration_str
        .trim()
        .parse::<f64>()
        .context("Failed to parse duration as float")?;

    Ok(Some(duration).filter(|d| d.is_finite() && *d > 0.0))
}

/// Parse width/height/rate of the first stream in a `-select_streams v:0` query.
pub fn parse_video_stream_json(json: &str) -> Result<VideoStreamInfo> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .context("No video stream found")?;

    let width = stream.width.context("Failed to get video width")?;
    let height = stream.height.context("Failed to get video height")?;

    // r_frame_rate is the exact rate; avg_frame_rate is a fallback for odd containers
    let fps_str = stream
        .r_frame_rate
        .or(stream.avg_frame_rate)
        .context("Failed to get video framerate")?;
    let fps = parse_fraction(&fps_str)
        .with_context(|| format!("Failed to parse framerate: {}", fps_str))?;

    Ok(VideoStreamInfo { width, height, fps })
}

/// Parse an audio or subtitle stream listing. `map_index` is the position
/// in the listing, since ffprobe lists only the selected stream type.
pub fn parse_streams_json(json: &str) -> Result<Vec<StreamInfo>> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    Ok(probe
        .streams
        .into_iter()
        .enumerate()
        .map(|(position, stream)| {
            let tags = stream.tags.unwrap_or_default();
            StreamInfo {
                index: stream.index.unwrap_or(position as u32),
                map_index: position as u32,
                codec_name: stream.codec_name.unwrap_or_default(),
                language: tags.language.unwrap_or_else(|| "und".to_string()),
                title: tags.title.unwrap_or_default(),
            }
        })
        .collect())
}

/// Runs ffprobe queries against one input file.
#[derive(Debug, Clone, Default)]
pub struct MediaProber {
    tools: Tools,
}

impl MediaProber {
    pub fn new(tools: Tools) -> Self {
        Self { tools }
    }

    fn query(&self, path: &Path, args: &[&str]) -> Result<String> {
        let output = self
            .tools
            .ffprobe_command()
            .args(args)
            .args(["-of", "json"])
            .arg(path)
            .output()
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Container duration in seconds (`None` when unknown)
    pub fn query_duration(&self, path: &Path) -> Result<Option<f64>> {
        let json = self.query(path, &["-v", "quiet", "-show_entries", "format=duration"])?;
        parse_duration_json(&json)
    }

    pub fn query_video(&self, path: &Path) -> Result<VideoStreamInfo> {
        let json = self.query(
            path,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
            ],
        )?;
        parse_video_stream_json(&json)
    }

    fn query_streams(&self, path: &Path, selector: &str) -> Result<Vec<StreamInfo>> {
        let json = self.query(
            path,
            &[
                "-v",
                "error",
                "-select_streams",
                selector,
                "-show_entries",
                "stream=index,codec_name:stream_tags=language,title",
            ],
        )?;
        parse_streams_json(&json)
    }

    pub fn query_audio_streams(&self, path: &Path) -> Result<Vec<StreamInfo>> {
        self.query_streams(path, "a")
    }

    pub fn query_subtitle_streams(&self, path: &Path) -> Result<Vec<StreamInfo>> {
        self.query_streams(path, "s")
    }

    /// Run every query; each failure degrades to an empty value on its own.
    pub fn probe(&self, path: &Path) -> MediaInfo {
        let duration_s = self.query_duration(path).unwrap_or_else(|e| {
            warn!("Duration probe failed for {}: {:#}", path.display(), e);
            None
        });
        let video = match self.query_video(path) {
            Ok(video) => Some(video),
            Err(e) => {
                warn!("Video stream probe failed for {}: {:#}", path.display(), e);
                None
            }
        };
        let audio_streams = self.query_audio_streams(path).unwrap_or_else(|e| {
            warn!("Audio stream probe failed for {}: {:#}", path.display(), e);
            Vec::new()
        });
        let subtitle_streams = self.query_subtitle_streams(path).unwrap_or_else(|e| {
            warn!("Subtitle stream probe failed for {}: {:#}", path.display(), e);
            Vec::new()
        });

        let info = MediaInfo {
            duration_s,
            video,
            audio_streams,
            subtitle_streams,
        };
        debug!("Probed {}: {:?}", path.display(), info);
        info
    }
}
