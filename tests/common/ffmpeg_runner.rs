#![allow(dead_code)]

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Generate a short test clip with a tone track and an SRT subtitle track
pub fn generate_test_video(output_path: &Path, duration_secs: f32) -> Result<()> {
    let srt = output_path.with_extension("srt");
    std::fs::write(
        &srt,
        "1\n00:00:00,000 --> 00:00:01,500\nHello\n\n2\n00:00:01,500 --> 00:00:03,000\nWorld\n",
    )
    .context("Failed to write test subtitles")?;

    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(["-f", "lavfi", "-i"])
        .arg(format!("testsrc=duration={}:size=320x240:rate=25", duration_secs))
        .args(["-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:duration={}", duration_secs))
        .arg("-i")
        .arg(&srt)
        .args(["-map", "0:v", "-map", "1:a", "-map", "2:s"])
        .args(["-c:v", "libx264", "-preset", "ultrafast", "-pix_fmt", "yuv420p"])
        .args(["-c:a", "aac", "-c:s", "srt"])
        .arg(output_path)
        .output()
        .context("Failed to generate test video")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to generate test video: {}", stderr);
    }

    Ok(())
}

pub fn is_ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}
