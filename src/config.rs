// Optional user configuration (read-only unless init-config is run)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{
    AudioBitrate, Container, EncodeOptions, Preset, SessionSettings, Tools, VideoCodec,
};
use crate::upload::DEFAULT_SERVICE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory holding bundled ffmpeg/ffprobe binaries, searched before PATH
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long ffmpeg gets to exit after a cancel before it is killed
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Kill encodes that run longer than this; unset means no limit
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_codec")]
    pub codec: VideoCodec,

    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_preset")]
    pub preset: Preset,

    #[serde(default = "default_container")]
    pub container: Container,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: AudioBitrate,

    #[serde(default = "default_upload_service")]
    pub upload_service: String,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_grace_period_ms() -> u64 {
    3000
}

fn default_codec() -> VideoCodec {
    VideoCodec::H264
}

fn default_crf() -> u8 {
    20
}

fn default_preset() -> Preset {
    Preset::Medium
}

fn default_container() -> Container {
    Container::Mp4
}

fn default_audio_bitrate() -> AudioBitrate {
    AudioBitrate::Kbps(128)
}

fn default_upload_service() -> String {
    DEFAULT_SERVICE.to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            timeout_secs: None,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            crf: default_crf(),
            preset: default_preset(),
            container: default_container(),
            audio_bitrate: default_audio_bitrate(),
            upload_service: default_upload_service(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("ffclip")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("ffclip")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config file if there is one, otherwise built-in defaults.
    /// Nothing is written.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn tools(&self) -> Tools {
        let tools = Tools::new(&self.tools.ffmpeg, &self.tools.ffprobe);
        match &self.tools.bin_dir {
            Some(dir) => tools.with_bin_dir(dir),
            None => tools,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tools: self.tools(),
            grace_period: Duration::from_millis(self.session.grace_period_ms),
            timeout: self.session.timeout_secs.map(Duration::from_secs),
            ..SessionSettings::default()
        }
    }

    /// Starting point for an explicit options snapshot
    pub fn default_options(&self) -> EncodeOptions {
        EncodeOptions {
            video_codec: self.defaults.codec,
            crf: self.defaults.crf,
            preset: self.defaults.preset,
            container: self.defaults.container,
            audio_bitrate: self.defaults.audio_bitrate,
            ..EncodeOptions::default()
        }
    }
}
