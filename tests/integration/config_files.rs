// Config files feeding session settings and default options

use ffclip::config::Config;
use ffclip::engine::{Container, EncodeOptions, VideoCodec};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_empty_file_means_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.default_options(), EncodeOptions::default());
}

#[test]
fn test_bundled_tools_are_preferred() {
    let dir = TempDir::new().unwrap();
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    let bundled = bin.join(if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" });
    std::fs::write(&bundled, b"").unwrap();

    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[tools]\nbin_dir = {:?}\n", bin.to_string_lossy()),
    )
    .unwrap();

    let tools = Config::load_from(&path).unwrap().tools();
    assert_eq!(tools.ffmpeg_program(), bundled);
    // ffprobe is not bundled here, so the bare name is kept for PATH lookup
    assert_eq!(tools.ffprobe_program(), PathBuf::from("ffprobe"));
    assert!(tools.search_path().is_some());
}

#[test]
fn test_session_and_defaults_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[session]
grace_period_ms = 750
timeout_secs = 3600

[defaults]
codec = "h265"
crf = 26
container = "mkv"
upload_service = "tempsh"
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let settings = config.session_settings();
    assert_eq!(settings.grace_period, Duration::from_millis(750));
    assert_eq!(settings.timeout, Some(Duration::from_secs(3600)));

    let options = config.default_options();
    assert_eq!(options.video_codec, VideoCodec::H265);
    assert_eq!(options.crf, 26);
    assert_eq!(options.container, Container::Mkv);
    assert_ne!(options, EncodeOptions::default());
    assert_eq!(config.defaults.upload_service, "tempsh");
}

#[test]
fn test_malformed_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[defaults\ncrf = ").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("config.toml"));
}
