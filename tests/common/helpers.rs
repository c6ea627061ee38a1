#![allow(dead_code)]

use ffclip::engine::{
    EncodeJob, EncodePlan, EncodeSession, EncodeStrategy, MediaInfo, SessionEvent,
    SessionSettings, StreamInfo, Tools, VideoStreamInfo,
};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest any fake-encoder test waits for a session event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Render ffmpeg arguments as one space-separated string for assertions
pub fn args_to_string(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn stream(index: u32, map_index: u32, codec: &str, language: &str) -> StreamInfo {
    StreamInfo {
        index,
        map_index,
        codec_name: codec.to_string(),
        language: language.to_string(),
        title: String::new(),
    }
}

/// A 10 minute 1080p source with two audio tracks and one subtitle track
pub fn sample_media() -> MediaInfo {
    MediaInfo {
        duration_s: Some(600.0),
        video: Some(VideoStreamInfo {
            width: 1920,
            height: 1080,
            fps: 29.97,
        }),
        audio_streams: vec![stream(1, 0, "aac", "eng"), stream(2, 1, "ac3", "jpn")],
        subtitle_streams: vec![stream(3, 0, "subrip", "eng")],
    }
}

pub fn job(input: &str, output: &str) -> EncodeJob {
    EncodeJob::new(PathBuf::from(input), PathBuf::from(output))
}

/// Write a shell script standing in for ffmpeg and return session settings
/// that run it.
///
/// The script is run through `/bin/sh` rather than executed directly, which
/// avoids "text file busy" races with other tests forking concurrently.
pub fn fake_ffmpeg(dir: &Path, body: &str) -> (SessionSettings, OsString) {
    let script = dir.join("fake-ffmpeg.sh");
    fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();

    let settings = SessionSettings {
        tools: Tools::new("/bin/sh", "/bin/false"),
        grace_period: Duration::from_millis(500),
        ..SessionSettings::default()
    };
    (settings, script.into_os_string())
}

/// A plan whose only argument is the fake encoder script
pub fn script_plan(script: OsString, expected_duration_s: f64) -> EncodePlan {
    EncodePlan {
        args: vec![script],
        strategy: EncodeStrategy::Reencode,
        trim_strategy: None,
        subtitle_strategy: None,
        expected_duration_s,
    }
}

/// Drain events until the job finishes; panics if it takes too long
pub fn collect_events(session: &EncodeSession) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = session
            .events()
            .recv_timeout(EVENT_TIMEOUT)
            .expect("session did not finish in time");
        let finished = matches!(event, SessionEvent::Finished { .. });
        events.push(event);
        if finished {
            return events;
        }
    }
}

pub fn progress_values(events: &[SessionEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}
